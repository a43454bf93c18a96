//! # Accessor Module
//!
//! [`Accessor`] is the dynamic record accessor: CRUD and retrieval over any
//! table, driven by catalog metadata read at request time. Every statement
//! goes through [`Accessor::query`] or [`Accessor::execute`].

// ============================================================================
// External Crate Imports
// ============================================================================

use std::collections::{HashMap, HashSet};

use serde_json::Value;

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{
    filter::Condition,
    query::{ColumnRef, Count, Delete, Ident, Insert, Join, Predicate, Select, Sql, Update},
    Connection, Error, ExecResult, Fields, FindOptions, ForeignKey, InsertResult, Lookup, Record, WriteResult,
};

/// Maximum number of values in one hydration `IN (...)` list.
const HYDRATION_BATCH: usize = 500;

// ============================================================================
// Accessor Struct
// ============================================================================

/// Schema-driven record access over a [`Connection`].
///
/// Holds no state besides the connection; every call re-reads whatever
/// catalog data it needs.
#[derive(Debug, Clone)]
pub struct Accessor<C> {
    pub(crate) conn: C,
}

impl<C: Connection> Accessor<C> {
    pub fn new(conn: C) -> Self {
        Self { conn }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &C {
        &self.conn
    }

    // ------------------------------------------------------------------------
    // Query executor
    // ------------------------------------------------------------------------

    /// Runs `sql` with `params` bound in order and returns the rows.
    ///
    /// Failures are logged with the statement and returned as
    /// [`Error::Query`].
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>, Error> {
        log::debug!("sql: {sql} | params: {params:?}");
        self.conn.fetch_all(sql, params).await.map_err(|err| {
            log::error!("query error: {err} | sql: {sql}");
            Error::Query(err)
        })
    }

    /// Runs a statement that returns no rows.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult, Error> {
        log::debug!("sql: {sql} | params: {params:?}");
        self.conn.execute(sql, params).await.map_err(|err| {
            log::error!("query error: {err} | sql: {sql}");
            Error::Query(err)
        })
    }

    async fn fetch(&self, sql: &Sql) -> Result<Vec<Record>, Error> {
        self.query(&sql.text, &sql.params).await
    }

    async fn run(&self, sql: &Sql) -> Result<ExecResult, Error> {
        self.execute(&sql.text, &sql.params).await
    }

    // ------------------------------------------------------------------------
    // Record mutation
    // ------------------------------------------------------------------------

    /// Inserts one row. Columns and placeholders follow the order of `fields`.
    pub async fn create_record(&self, table: &str, fields: &Fields) -> Result<InsertResult, Error> {
        let insert = Insert { table: Ident::new(table)?, values: idents(fields, "insert")? };
        log::debug!("create {table}: {fields:?}");
        let result = self.run(&insert.to_sql()).await?;
        Ok(InsertResult { inserted_id: result.last_insert_id, affected_rows: result.rows_affected })
    }

    /// Updates the rows where `filter.key = filter.value`. The filter value is
    /// bound after all field values.
    pub async fn update_record(&self, table: &str, filter: &Lookup, fields: &Fields) -> Result<WriteResult, Error> {
        let update = Update {
            table: Ident::new(table)?,
            values: idents(fields, "update")?,
            key: Ident::new(&filter.key)?,
            key_value: filter.value.clone(),
        };
        let sql = update.to_sql();
        let result = self.run(&sql).await?;
        log::debug!("update {table}: {} | values: {:?} | affected: {}", sql.text, sql.params, result.rows_affected);
        Ok(WriteResult { affected_rows: result.rows_affected })
    }

    /// Deletes the rows where `id.key = id.value`.
    pub async fn delete_record(&self, table: &str, id: &Lookup) -> Result<WriteResult, Error> {
        let delete = Delete { table: Ident::new(table)?, key: Ident::new(&id.key)?, key_value: id.value.clone() };
        let result = self.run(&delete.to_sql()).await?;
        Ok(WriteResult { affected_rows: result.rows_affected })
    }

    /// Counts every row of `table`.
    pub async fn count_all(&self, table: &str) -> Result<i64, Error> {
        let rows = self.fetch(&Count { table: Ident::new(table)? }.to_sql()).await?;
        let total = rows.first().and_then(|row| row.get("total")).and_then(count_value);
        total.ok_or_else(|| Error::logic(format!("COUNT(*) on `{table}` returned no total")))
    }

    // ------------------------------------------------------------------------
    // Record retrieval
    // ------------------------------------------------------------------------

    /// Returns the rows where `id.key = id.value`. Not necessarily unique.
    pub async fn find_by_id(&self, table: &str, id: &Lookup) -> Result<Vec<Record>, Error> {
        let select = Select::from(Ident::new(table)?)
            .filter(Some(Predicate::Eq(ColumnRef::new(Ident::new(&id.key)?), id.value.clone())));
        self.fetch(&select.to_sql()).await
    }

    /// Returns the rows matching every `(column, value)` pair of `keys`.
    pub async fn find_by_composite_keys(&self, table: &str, keys: &Fields) -> Result<Vec<Record>, Error> {
        let predicates = keys
            .iter()
            .map(|(column, value)| Ok(Predicate::Eq(ColumnRef::new(Ident::new(column)?), value.clone())))
            .collect::<Result<Vec<_>, Error>>()?;
        let Some(filter) = Predicate::all(predicates) else {
            return Err(Error::logic(format!("no key columns given for `{table}`")));
        };
        let select = Select::from(Ident::new(table)?).filter(Some(filter));
        self.fetch(&select.to_sql()).await
    }

    /// Filtered, ordered, windowed listing with foreign-key hydration.
    ///
    /// Each returned row carries, for every foreign key of `table`, the first
    /// matching row of the referenced table under the referenced table's name.
    /// Rows without a match get no extra key.
    pub async fn find_all(&self, table: &str, options: &FindOptions) -> Result<Vec<Record>, Error> {
        let base = Ident::new(table)?;
        let edges = self.get_foreign_keys(table).await?;

        let mut select = Select::from(base.clone()).only_own_columns();
        let mut predicates = Vec::new();

        let mut alternatives = Vec::new();
        for group in &options.filter.any {
            let mut parts = Vec::new();
            for condition in group {
                parts.extend(self.resolve(&base, &edges, condition, &mut select).await?);
            }
            alternatives.extend(Predicate::all(parts));
        }
        if let Some(any) = Predicate::any(alternatives) {
            predicates.push(any);
        }
        for condition in &options.filter.all {
            predicates.extend(self.resolve(&base, &edges, condition, &mut select).await?);
        }

        let mut select = select.filter(Predicate::all(predicates));
        for (column, direction) in &options.order_by {
            select = select.order_by(ColumnRef::parse(column)?, *direction);
        }
        if let Some((skip, take)) = options.range.limit() {
            select = select.limit(skip, take);
        }

        let mut rows = self.fetch(&select.to_sql()).await?;
        self.hydrate(&mut rows, &edges).await?;
        Ok(rows)
    }

    /// Turns a condition into a predicate, registering the joins it needs.
    async fn resolve(
        &self,
        base: &Ident,
        edges: &[ForeignKey],
        condition: &Condition,
        select: &mut Select,
    ) -> Result<Option<Predicate>, Error> {
        let own = |field: &str| Ok::<_, Error>(ColumnRef::qualified(base.clone(), Ident::new(field)?));
        Ok(match condition {
            Condition::IsNull { field } => Some(Predicate::IsNull(own(field)?)),
            Condition::IsNotNull { field } => Some(Predicate::IsNotNull(own(field)?)),
            Condition::Equals { field, value } => Some(Predicate::Eq(own(field)?, value.clone())),
            Condition::Contains { field, value } => Some(Predicate::Like(own(field)?, format!("%{value}%"))),
            Condition::DateRange { field, gte, lte } => {
                let column = own(field)?;
                match (gte, lte) {
                    (Some(gte), Some(lte)) => Some(Predicate::Between(column, gte.clone().into(), lte.clone().into())),
                    (Some(gte), None) => Some(Predicate::Gte(column, gte.clone().into())),
                    (None, Some(lte)) => Some(Predicate::Lte(column, lte.clone().into())),
                    (None, None) => None,
                }
            }
            Condition::Related { table, field, value } => {
                let related = Ident::new(table)?;
                select.left_join(self.join_for(base, edges, &related).await?);
                Some(Predicate::Like(ColumnRef::qualified(related, Ident::new(field)?), format!("%{value}%")))
            }
        })
    }

    /// Builds the join from `base` to `related`: through the foreign key when
    /// `base` declares one, otherwise on `related`'s primary key column name
    /// on both sides.
    async fn join_for(&self, base: &Ident, edges: &[ForeignKey], related: &Ident) -> Result<Join, Error> {
        if let Some(edge) = edges.iter().find(|edge| edge.referenced_table == related.as_str()) {
            return Ok(Join {
                table: related.clone(),
                left: ColumnRef::qualified(base.clone(), Ident::new(&edge.column)?),
                right: ColumnRef::qualified(related.clone(), Ident::new(&edge.referenced_column)?),
            });
        }
        let Some(pk) = self.get_primary_keys(related.as_str()).await?.into_iter().next() else {
            return Err(Error::logic(format!("cannot join `{related}` from `{base}`: no foreign key or primary key")));
        };
        let pk = Ident::new(&pk)?;
        Ok(Join {
            table: related.clone(),
            left: ColumnRef::qualified(base.clone(), pk.clone()),
            right: ColumnRef::qualified(related.clone(), pk),
        })
    }

    /// Attaches, per edge, the first matching referenced row to each row.
    ///
    /// One `IN` lookup per edge (chunked) instead of one lookup per row.
    async fn hydrate(&self, rows: &mut [Record], edges: &[ForeignKey]) -> Result<(), Error> {
        for edge in edges {
            let mut seen = HashSet::new();
            let keys: Vec<Value> = rows
                .iter()
                .filter_map(|row| row.get(&edge.column))
                .filter(|value| !value.is_null() && seen.insert(match_key(value)))
                .cloned()
                .collect();
            if keys.is_empty() {
                continue;
            }

            let table = Ident::new(&edge.referenced_table)?;
            let column = Ident::new(&edge.referenced_column)?;
            let mut related: HashMap<String, Record> = HashMap::new();
            for chunk in keys.chunks(HYDRATION_BATCH) {
                let select = Select::from(table.clone())
                    .filter(Some(Predicate::In(ColumnRef::new(column.clone()), chunk.to_vec())));
                for found in self.fetch(&select.to_sql()).await? {
                    if let Some(key) = found.get(&edge.referenced_column).map(match_key) {
                        related.entry(key).or_insert(found);
                    }
                }
            }

            for row in rows.iter_mut() {
                let found = row.get(&edge.column).and_then(|value| related.get(&match_key(value))).cloned();
                if let Some(found) = found {
                    row.insert(edge.referenced_table.clone(), Value::Object(found));
                }
            }
        }
        Ok(())
    }
}

fn idents(fields: &Fields, operation: &str) -> Result<Vec<(Ident, Value)>, Error> {
    if fields.is_empty() {
        return Err(Error::logic(format!("{operation} needs at least one field")));
    }
    fields.iter().map(|(column, value)| Ok((Ident::new(column)?, value.clone()))).collect()
}

/// Comparison key for hydration: `5` and `"5"` refer to the same row, as they
/// would in a SQL equality.
fn match_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn count_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
