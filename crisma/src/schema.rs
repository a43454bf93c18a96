//! # Schema Module
//!
//! Catalog introspection for [`Accessor`]. MySQL answers through `DESCRIBE`,
//! `SHOW COLUMNS` and `INFORMATION_SCHEMA.KEY_COLUMN_USAGE`; SQLite through
//! `PRAGMA table_info` and `PRAGMA foreign_key_list`. Both are mapped onto
//! the same [`ColumnInfo`] / [`ForeignKey`] shapes.

use std::collections::HashSet;

use serde_json::Value;

use crate::{query::Ident, Accessor, ColumnInfo, Connection, Drivers, Error, ForeignKey, Record};

const MYSQL_FOREIGN_KEYS: &str = r#"
    SELECT
        CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
        CAST(REFERENCED_TABLE_NAME AS CHAR(255)) AS REFERENCED_TABLE_NAME,
        CAST(REFERENCED_COLUMN_NAME AS CHAR(255)) AS REFERENCED_COLUMN_NAME,
        CAST(ORDINAL_POSITION AS SIGNED) AS ORDINAL_POSITION
    FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
    WHERE TABLE_SCHEMA = DATABASE()
      AND TABLE_NAME = ?
      AND REFERENCED_TABLE_NAME IS NOT NULL
"#;

const MYSQL_PRIMARY_KEYS: &str = r#"
    SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
    FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
    WHERE TABLE_SCHEMA = DATABASE()
      AND TABLE_NAME = ?
      AND CONSTRAINT_NAME = 'PRIMARY'
    ORDER BY ORDINAL_POSITION
"#;

impl<C: Connection> Accessor<C> {
    /// Every column of `table` (`DESCRIBE`).
    pub async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>, Error> {
        let table = Ident::new(table)?;
        match self.conn.driver() {
            Drivers::MySQL => column_infos(self.query(&format!("DESCRIBE {table}"), &[]).await?),
            Drivers::SQLite => self.sqlite_columns(&table).await,
        }
    }

    /// Every column of `table` (`SHOW COLUMNS`).
    pub async fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, Error> {
        let table = Ident::new(table)?;
        match self.conn.driver() {
            Drivers::MySQL => column_infos(self.query(&format!("SHOW COLUMNS FROM {table}"), &[]).await?),
            Drivers::SQLite => self.sqlite_columns(&table).await,
        }
    }

    /// The column of `table` named `column`. Both names are upper-cased
    /// before comparing.
    pub async fn get_column(&self, table: &str, column: &str) -> Result<Option<ColumnInfo>, Error> {
        let wanted = column.to_uppercase();
        Ok(self.list_columns(table).await?.into_iter().find(|info| info.field.to_uppercase() == wanted))
    }

    /// Whether `column` of `table` accepts NULL.
    ///
    /// # Errors
    ///
    /// [`Error::ColumnNotFound`] when the table has no such column.
    pub async fn is_nullable(&self, table: &str, column: &str) -> Result<bool, Error> {
        match self.get_column(table, column).await? {
            Some(info) => Ok(info.is_nullable()),
            None => Err(Error::ColumnNotFound { table: table.to_string(), column: column.to_string() }),
        }
    }

    /// Foreign keys declared on `table`, in catalog order, keeping only the
    /// first edge per (referenced table, referenced column).
    pub async fn get_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>, Error> {
        let edges = self.all_foreign_keys(table).await?;
        let mut seen = HashSet::new();
        Ok(edges
            .into_iter()
            .filter(|edge| seen.insert((edge.referenced_table.clone(), edge.referenced_column.clone())))
            .collect())
    }

    /// Foreign keys of `table` whose referenced column is `column`.
    pub async fn is_foreign_key_column(&self, table: &str, column: &str) -> Result<Vec<ForeignKey>, Error> {
        match self.conn.driver() {
            Drivers::MySQL => {
                let sql = format!("{MYSQL_FOREIGN_KEYS}  AND REFERENCED_COLUMN_NAME = ?");
                let params = [Value::from(table), Value::from(column)];
                foreign_keys(self.query(&sql, &params).await?)
            }
            Drivers::SQLite => Ok(self
                .all_foreign_keys(table)
                .await?
                .into_iter()
                .filter(|edge| edge.referenced_column == column)
                .collect()),
        }
    }

    /// Primary key columns of `table` that are not also foreign key columns.
    /// Empty when the table declares no primary key.
    pub async fn get_primary_keys(&self, table: &str) -> Result<Vec<String>, Error> {
        self.primary_keys(table).await.map_err(|err| {
            log::error!("error retrieving primary keys of `{table}` without foreign keys: {err}");
            err
        })
    }

    async fn primary_keys(&self, table: &str) -> Result<Vec<String>, Error> {
        let primary = self.declared_primary_keys(table).await?;
        if primary.is_empty() {
            return Ok(primary);
        }
        let foreign: HashSet<String> = self.get_foreign_keys(table).await?.into_iter().map(|edge| edge.column).collect();
        Ok(primary.into_iter().filter(|column| !foreign.contains(column)).collect())
    }

    async fn declared_primary_keys(&self, table: &str) -> Result<Vec<String>, Error> {
        let table = Ident::new(table)?;
        match self.conn.driver() {
            Drivers::MySQL => self
                .query(MYSQL_PRIMARY_KEYS, &[Value::from(table.as_str())])
                .await?
                .iter()
                .map(|row| text(row, "COLUMN_NAME"))
                .collect(),
            Drivers::SQLite => {
                let mut keyed = Vec::new();
                for row in self.query(&format!("PRAGMA table_info({table})"), &[]).await? {
                    let position = integer(&row, "pk")?;
                    if position > 0 {
                        keyed.push((position, text(&row, "name")?));
                    }
                }
                keyed.sort_by_key(|(position, _)| *position);
                Ok(keyed.into_iter().map(|(_, name)| name).collect())
            }
        }
    }

    async fn all_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>, Error> {
        let table = Ident::new(table)?;
        match self.conn.driver() {
            Drivers::MySQL => foreign_keys(self.query(MYSQL_FOREIGN_KEYS, &[Value::from(table.as_str())]).await?),
            Drivers::SQLite => {
                let mut edges = Vec::new();
                for row in self.query(&format!("PRAGMA foreign_key_list({table})"), &[]).await? {
                    let referenced_table = text(&row, "table")?;
                    let referenced_column = match row.get("to") {
                        Some(Value::String(to)) => to.clone(),
                        // `REFERENCES parent` without a column targets the parent's primary key.
                        _ => match self.declared_primary_keys(&referenced_table).await?.into_iter().next() {
                            Some(pk) => pk,
                            None => continue,
                        },
                    };
                    edges.push(ForeignKey {
                        column: text(&row, "from")?,
                        referenced_table,
                        referenced_column,
                        ordinal_position: integer(&row, "seq")? + 1,
                    });
                }
                Ok(edges)
            }
        }
    }

    async fn sqlite_columns(&self, table: &Ident) -> Result<Vec<ColumnInfo>, Error> {
        self.query(&format!("PRAGMA table_info({table})"), &[])
            .await?
            .iter()
            .map(|row| {
                Ok(ColumnInfo {
                    field: text(row, "name")?,
                    column_type: text(row, "type")?,
                    null: if integer(row, "notnull")? == 0 { "YES" } else { "NO" }.to_string(),
                    key: if integer(row, "pk")? > 0 { "PRI" } else { "" }.to_string(),
                    default: row.get("dflt_value").filter(|value| !value.is_null()).cloned(),
                    extra: String::new(),
                })
            })
            .collect()
    }
}

fn column_infos(rows: Vec<Record>) -> Result<Vec<ColumnInfo>, Error> {
    rows.into_iter().map(|row| Ok(serde_json::from_value(Value::Object(row))?)).collect()
}

fn foreign_keys(rows: Vec<Record>) -> Result<Vec<ForeignKey>, Error> {
    rows.into_iter().map(|row| Ok(serde_json::from_value(Value::Object(row))?)).collect()
}

fn text(row: &Record, column: &str) -> Result<String, Error> {
    match row.get(column) {
        Some(Value::String(s)) => Ok(s.clone()),
        other => Err(Error::logic(format!("catalog column `{column}` is not text: {other:?}"))),
    }
}

fn integer(row: &Record, column: &str) -> Result<i64, Error> {
    match row.get(column) {
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| Error::logic(format!("catalog column `{column}` is not an integer"))),
        Some(Value::String(s)) => s.parse().map_err(|_| Error::logic(format!("catalog column `{column}` is not an integer"))),
        other => Err(Error::logic(format!("catalog column `{column}` is not an integer: {other:?}"))),
    }
}
