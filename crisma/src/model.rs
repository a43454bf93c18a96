use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A database row: column name to value, in the order the driver returned
/// the columns.
pub type Record = Map<String, Value>;

/// Metadata about a table column, as reported by `DESCRIBE` / `SHOW COLUMNS`.
///
/// Field names follow the MySQL result set so catalog rows deserialize
/// directly into this structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// The column name.
    #[serde(rename = "Field")]
    pub field: String,
    /// The SQL type as the server spells it (e.g. `int(11)`, `TEXT`).
    #[serde(rename = "Type")]
    pub column_type: String,
    /// `"YES"` when the column accepts NULL, `"NO"` otherwise.
    #[serde(rename = "Null")]
    pub null: String,
    /// `"PRI"` for primary key columns, `"MUL"`/`"UNI"` for indexed ones.
    #[serde(rename = "Key", default)]
    pub key: String,
    /// The declared default value, if any.
    #[serde(rename = "Default", default)]
    pub default: Option<Value>,
    /// Extra attributes such as `auto_increment`.
    #[serde(rename = "Extra", default)]
    pub extra: String,
}

impl ColumnInfo {
    /// Whether the column accepts NULL values.
    pub fn is_nullable(&self) -> bool {
        self.null == "YES"
    }

    /// Whether the column is part of the primary key.
    pub fn is_primary_key(&self) -> bool {
        self.key == "PRI"
    }
}

/// A foreign key edge: `column` of the owning table references
/// `referenced_table.referenced_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    #[serde(rename = "COLUMN_NAME")]
    pub column: String,
    #[serde(rename = "REFERENCED_TABLE_NAME")]
    pub referenced_table: String,
    #[serde(rename = "REFERENCED_COLUMN_NAME")]
    pub referenced_column: String,
    #[serde(rename = "ORDINAL_POSITION")]
    pub ordinal_position: i64,
}

/// An ordered list of `(column, value)` pairs.
///
/// Used wherever columns and values must line up positionally: INSERT column
/// lists, UPDATE `SET` clauses and composite key filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Vec<(String, Value)>);

impl Fields {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a pair, builder style.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    /// Appends a pair. A column that is already present keeps its position
    /// and takes the new value.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.0.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.0.push((column, value)),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(column, _)| column.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(column, value)| (column.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Record> for Fields {
    fn from(record: Record) -> Self {
        Self(record.into_iter().collect())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (column, value) in iter {
            fields.push(column, value);
        }
        fields
    }
}

/// A single equality predicate: `key = value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lookup {
    pub key: String,
    pub value: Value,
}

impl Lookup {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// Outcome of a write statement as reported by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// Result of [`Accessor::create_record`](crate::Accessor::create_record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertResult {
    pub inserted_id: Option<i64>,
    pub affected_rows: u64,
}

/// Result of an UPDATE or DELETE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub affected_rows: u64,
}
