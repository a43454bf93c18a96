//! # Error Module
//!
//! Every fallible operation in crisma returns [`Error`]. Driver failures are
//! wrapped untouched so callers can still inspect the underlying `sqlx::Error`.

use thiserror::Error;

/// Errors produced by the record accessor and its collaborators.
#[derive(Error, Debug)]
pub enum Error {
    /// Any failure reported by the database driver (connection, syntax,
    /// constraint violation, decoding).
    #[error("query error: {0}")]
    Query(#[from] sqlx::Error),

    /// Input the accessor cannot turn into a statement, such as a non-array
    /// `OR` filter or an empty field set.
    #[error("logic error: {0}")]
    Logic(String),

    /// A table or column name containing characters outside `[A-Za-z0-9_$]`.
    #[error("invalid identifier `{0}`")]
    InvalidIdentifier(String),

    /// The introspected table has no column with the requested name.
    #[error("column `{column}` not found in table `{table}`")]
    ColumnNotFound { table: String, column: String },

    /// Connection settings are missing or unsupported.
    #[error("configuration error: {0}")]
    Config(String),

    /// A catalog row or an options document did not have the expected shape.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn logic(message: impl Into<String>) -> Self {
        Error::Logic(message.into())
    }
}
