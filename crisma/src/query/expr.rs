use std::fmt;

use serde_json::Value;

use super::{Ident, Sql};
use crate::Error;

/// A column reference, optionally qualified by its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: Option<Ident>,
    pub column: Ident,
}

impl ColumnRef {
    pub fn new(column: Ident) -> Self {
        Self { table: None, column }
    }

    pub fn qualified(table: Ident, column: Ident) -> Self {
        Self { table: Some(table), column }
    }

    /// Parses `column` or `table.column`.
    pub fn parse(path: &str) -> Result<Self, Error> {
        match path.split_once('.') {
            Some((table, column)) => Ok(Self::qualified(Ident::new(table)?, Ident::new(column)?)),
            None => Ok(Self::new(Ident::new(path)?)),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{table}.{}", self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

/// Sort direction for `ORDER BY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(direction: &str) -> Result<Self, Error> {
        if direction.eq_ignore_ascii_case("asc") {
            Ok(Direction::Asc)
        } else if direction.eq_ignore_ascii_case("desc") {
            Ok(Direction::Desc)
        } else {
            Err(Error::logic(format!("invalid order direction `{direction}`")))
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// A boolean expression tree for `WHERE` clauses.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    IsNull(ColumnRef),
    IsNotNull(ColumnRef),
    Eq(ColumnRef, Value),
    Like(ColumnRef, String),
    Gte(ColumnRef, Value),
    Lte(ColumnRef, Value),
    Between(ColumnRef, Value, Value),
    In(ColumnRef, Vec<Value>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Combines predicates with `AND`, collapsing the single element case.
    pub fn all(mut predicates: Vec<Predicate>) -> Option<Predicate> {
        match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(Predicate::And(predicates)),
        }
    }

    /// Combines predicates with `OR`, collapsing the single element case.
    pub fn any(mut predicates: Vec<Predicate>) -> Option<Predicate> {
        match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(Predicate::Or(predicates)),
        }
    }

    pub(crate) fn render(&self, sql: &mut Sql) {
        match self {
            Predicate::IsNull(column) => sql.push(&format!("{column} IS NULL")),
            Predicate::IsNotNull(column) => sql.push(&format!("{column} IS NOT NULL")),
            Predicate::Eq(column, value) => Self::compare(sql, column, "=", value),
            Predicate::Like(column, pattern) => Self::compare(sql, column, "LIKE", &Value::String(pattern.clone())),
            Predicate::Gte(column, value) => Self::compare(sql, column, ">=", value),
            Predicate::Lte(column, value) => Self::compare(sql, column, "<=", value),
            Predicate::Between(column, low, high) => {
                sql.push(&format!("{column} BETWEEN "));
                sql.bind(low.clone());
                sql.push(" AND ");
                sql.bind(high.clone());
            }
            Predicate::In(column, values) => {
                if values.is_empty() {
                    // `IN ()` is a syntax error; an empty set never matches.
                    sql.push("1 = 0");
                    return;
                }
                sql.push(&format!("{column} IN ("));
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        sql.push(", ");
                    }
                    sql.bind(value.clone());
                }
                sql.push(")");
            }
            Predicate::And(parts) => Self::group(sql, parts, " AND "),
            Predicate::Or(parts) => Self::group(sql, parts, " OR "),
        }
    }

    fn compare(sql: &mut Sql, column: &ColumnRef, op: &str, value: &Value) {
        sql.push(&format!("{column} {op} "));
        sql.bind(value.clone());
    }

    fn group(sql: &mut Sql, parts: &[Predicate], separator: &str) {
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                sql.push(separator);
            }
            let nested = matches!(part, Predicate::And(_) | Predicate::Or(_));
            if nested {
                sql.push("(");
            }
            part.render(sql);
            if nested {
                sql.push(")");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn col(table: &str, column: &str) -> ColumnRef {
        ColumnRef::qualified(Ident::new(table).unwrap(), Ident::new(column).unwrap())
    }

    #[test]
    fn nested_groups_are_parenthesized() {
        let predicate = Predicate::And(vec![
            Predicate::Or(vec![
                Predicate::Like(col("users", "name"), "%ann%".into()),
                Predicate::Like(col("users", "email"), "%ann%".into()),
            ]),
            Predicate::IsNull(col("users", "disabledAt")),
        ]);
        let mut sql = Sql::default();
        predicate.render(&mut sql);
        assert_eq!(sql.text, "(users.name LIKE ? OR users.email LIKE ?) AND users.disabledAt IS NULL");
        assert_eq!(sql.params, vec![json!("%ann%"), json!("%ann%")]);
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let mut sql = Sql::default();
        Predicate::In(col("users", "id"), vec![]).render(&mut sql);
        assert_eq!(sql.text, "1 = 0");
        assert!(sql.params.is_empty());
    }

    #[test]
    fn direction_is_validated() {
        assert_eq!(Direction::parse("desc").unwrap(), Direction::Desc);
        assert_eq!(Direction::parse("ASC").unwrap(), Direction::Asc);
        assert!(matches!(Direction::parse("ASC; DROP TABLE x"), Err(Error::Logic(_))));
    }
}
