use serde_json::Value;

use super::{ColumnRef, Direction, Ident, Predicate, Sql};

/// A `LEFT JOIN related ON left = right` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: Ident,
    pub left: ColumnRef,
    pub right: ColumnRef,
}

/// A `SELECT` over one table with optional joins, filter, ordering and range.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    table: Ident,
    /// Select `table.*` instead of `*`.
    qualify_star: bool,
    joins: Vec<Join>,
    filter: Option<Predicate>,
    order: Vec<(ColumnRef, Direction)>,
    limit: Option<(u64, u64)>,
}

impl Select {
    pub fn from(table: Ident) -> Self {
        Self { table, qualify_star: false, joins: Vec::new(), filter: None, order: Vec::new(), limit: None }
    }

    /// Restricts the select list to the base table's columns.
    pub fn only_own_columns(mut self) -> Self {
        self.qualify_star = true;
        self
    }

    /// Adds a `LEFT JOIN`. Joining the same table twice is a no-op.
    pub fn left_join(&mut self, join: Join) {
        if !self.joins.iter().any(|existing| existing.table == join.table) {
            self.joins.push(join);
        }
    }

    pub fn filter(mut self, predicate: Option<Predicate>) -> Self {
        self.filter = predicate;
        self
    }

    pub fn order_by(mut self, column: ColumnRef, direction: Direction) -> Self {
        self.order.push((column, direction));
        self
    }

    /// `LIMIT skip, take`.
    pub fn limit(mut self, skip: u64, take: u64) -> Self {
        self.limit = Some((skip, take));
        self
    }

    pub fn to_sql(&self) -> Sql {
        let mut sql = Sql::default();
        if self.qualify_star {
            sql.push(&format!("SELECT {}.* FROM {}", self.table, self.table));
        } else {
            sql.push(&format!("SELECT * FROM {}", self.table));
        }
        for join in &self.joins {
            sql.push(&format!(" LEFT JOIN {} ON {} = {}", join.table, join.left, join.right));
        }
        if let Some(filter) = &self.filter {
            sql.push(" WHERE ");
            filter.render(&mut sql);
        }
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|(column, direction)| format!("{column} {}", direction.as_sql()))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push(&format!(" ORDER BY {order}"));
        }
        if let Some((skip, take)) = self.limit {
            sql.push(&format!(" LIMIT {skip}, {take}"));
        }
        sql
    }
}

/// `INSERT INTO table (columns...) VALUES (?...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: Ident,
    pub values: Vec<(Ident, Value)>,
}

impl Insert {
    pub fn to_sql(&self) -> Sql {
        let columns = self.values.iter().map(|(column, _)| column.as_str()).collect::<Vec<_>>().join(", ");
        let mut sql = Sql::default();
        sql.push(&format!("INSERT INTO {} ({columns}) VALUES (", self.table));
        for (i, (_, value)) in self.values.iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            sql.bind(value.clone());
        }
        sql.push(")");
        sql
    }
}

/// `UPDATE table SET a = ?, b = ? WHERE key = ?`.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: Ident,
    pub values: Vec<(Ident, Value)>,
    pub key: Ident,
    pub key_value: Value,
}

impl Update {
    pub fn to_sql(&self) -> Sql {
        let mut sql = Sql::default();
        sql.push(&format!("UPDATE {} SET ", self.table));
        for (i, (column, value)) in self.values.iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            sql.push(&format!("{column} = "));
            sql.bind(value.clone());
        }
        sql.push(&format!(" WHERE {} = ", self.key));
        sql.bind(self.key_value.clone());
        sql
    }
}

/// `DELETE FROM table WHERE key = ?`.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: Ident,
    pub key: Ident,
    pub key_value: Value,
}

impl Delete {
    pub fn to_sql(&self) -> Sql {
        let mut sql = Sql::default();
        sql.push(&format!("DELETE FROM {} WHERE {} = ", self.table, self.key));
        sql.bind(self.key_value.clone());
        sql
    }
}

/// `SELECT COUNT(*) AS total FROM table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Count {
    pub table: Ident,
}

impl Count {
    pub fn to_sql(&self) -> Sql {
        Sql { text: format!("SELECT COUNT(*) AS total FROM {}", self.table), params: Vec::new() }
    }
}
