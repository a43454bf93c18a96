//! # Database Module
//!
//! Connection handling for crisma. It owns the SQLx connection pool, detects
//! the driver from the connection URL and implements [`Connection`], the
//! single `execute(sql, params)` seam every accessor operation goes through.

// ============================================================================
// External Crate Imports
// ============================================================================

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use futures::future::BoxFuture;
use serde_json::{Number, Value};
use sqlx::{
    any::{AnyPoolOptions, AnyRow},
    mysql::{MySqlPool, MySqlPoolOptions, MySqlRow},
    types::{Decimal, Json},
    Any, AnyPool, Arguments, Column, Encode, Executor, MySql, Row, Type, TypeInfo, ValueRef,
};

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{filter::format_instant, Accessor, Error, ExecResult, Record};

/// Pool size used when nothing else is configured.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

// ============================================================================
// Database Driver Enum
// ============================================================================

/// Supported database drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drivers {
    /// MySQL / MariaDB driver
    MySQL,
    /// SQLite driver
    SQLite,
}

impl Drivers {
    /// Detects the driver from a connection URL scheme.
    pub fn from_url(url: &str) -> Result<Self, Error> {
        let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "mysql" | "mariadb" => Ok(Drivers::MySQL),
            "sqlite" => Ok(Drivers::SQLite),
            _ => Err(Error::Config(format!("unsupported database url scheme `{scheme}`"))),
        }
    }
}

// ============================================================================
// Connection Trait
// ============================================================================

/// The query primitive the accessor is built on.
///
/// Implemented by [`Database`]; tests and callers with their own pooling can
/// provide other implementations.
pub trait Connection: Send + Sync {
    /// The SQL dialect behind this connection.
    fn driver(&self) -> Drivers;

    /// Runs a statement and returns every row, decoded into [`Record`]s.
    fn fetch_all<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> BoxFuture<'a, Result<Vec<Record>, sqlx::Error>>;

    /// Runs a statement that returns no rows.
    fn execute<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> BoxFuture<'a, Result<ExecResult, sqlx::Error>>;
}

impl<C: Connection + ?Sized> Connection for &C {
    fn driver(&self) -> Drivers {
        (**self).driver()
    }

    fn fetch_all<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> BoxFuture<'a, Result<Vec<Record>, sqlx::Error>> {
        (**self).fetch_all(sql, params)
    }

    fn execute<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> BoxFuture<'a, Result<ExecResult, sqlx::Error>> {
        (**self).execute(sql, params)
    }
}

// ============================================================================
// Database Struct
// ============================================================================

/// The pool behind a [`Database`].
///
/// SQLite goes through sqlx's `Any` driver. MySQL uses the native driver,
/// because `Any` refuses temporal, decimal and JSON columns.
#[derive(Debug, Clone)]
pub(crate) enum Pool {
    Any(AnyPool),
    MySql(MySqlPool),
}

/// A pooled database handle.
///
/// Cheap to clone: clones share the same pool. Create one at startup, hand it
/// (or an [`Accessor`] built from it) to whoever needs it and call
/// [`Database::close`] on shutdown.
#[derive(Debug, Clone)]
pub struct Database {
    /// The underlying SQLx connection pool
    pub(crate) pool: Pool,
    /// The detected database driver
    pub(crate) driver: Drivers,
}

impl Database {
    /// Creates a new DatabaseBuilder for configuring the connection.
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Connects to a database using the provided connection string.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        DatabaseBuilder::new().connect(url).await
    }

    /// Connects using `DATABASE_URL` (and optionally
    /// `DATABASE_MAX_CONNECTIONS`), loading a `.env` file first if present.
    pub async fn from_env() -> Result<Self, Error> {
        DatabaseBuilder::from_env()?.connect_from_env().await
    }

    /// Returns the record accessor bound to this pool.
    pub fn accessor(&self) -> Accessor<Database> {
        Accessor::new(self.clone())
    }

    /// Returns the detected driver.
    pub fn driver(&self) -> Drivers {
        self.driver
    }

    /// Closes the pool, waiting for checked out connections to be returned.
    pub async fn close(&self) {
        match &self.pool {
            Pool::Any(pool) => pool.close().await,
            Pool::MySql(pool) => pool.close().await,
        }
        log::debug!("database pool closed");
    }
}

impl Connection for Database {
    fn driver(&self) -> Drivers {
        self.driver
    }

    fn fetch_all<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> BoxFuture<'a, Result<Vec<Record>, sqlx::Error>> {
        Box::pin(async move {
            // Statements without parameters skip preparation: MySQL refuses to
            // prepare some catalog statements (`SHOW ...`, `DESCRIBE`).
            match &self.pool {
                Pool::Any(pool) => {
                    let rows = if params.is_empty() {
                        pool.fetch_all(sql).await?
                    } else {
                        sqlx::query_with(sql, bind_all::<Any>(params)?).fetch_all(pool).await?
                    };
                    rows.iter().map(decode_any_row).collect()
                }
                Pool::MySql(pool) => {
                    let rows = if params.is_empty() {
                        pool.fetch_all(sql).await?
                    } else {
                        sqlx::query_with(sql, bind_all::<MySql>(params)?).fetch_all(pool).await?
                    };
                    rows.iter().map(decode_mysql_row).collect()
                }
            }
        })
    }

    fn execute<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> BoxFuture<'a, Result<ExecResult, sqlx::Error>> {
        Box::pin(async move {
            match &self.pool {
                Pool::Any(pool) => execute_any(pool, sql, params).await,
                Pool::MySql(pool) => {
                    let result = if params.is_empty() {
                        pool.execute(sql).await?
                    } else {
                        sqlx::query_with(sql, bind_all::<MySql>(params)?).execute(pool).await?
                    };
                    let last_insert_id = match result.last_insert_id() {
                        0 => None,
                        id => i64::try_from(id).ok(),
                    };
                    Ok(ExecResult { rows_affected: result.rows_affected(), last_insert_id })
                }
            }
        })
    }
}

/// Runs a statement on one pooled connection. SQLite's rowid is lost on the
/// way through `Any`, so after an insert it is read back with
/// `last_insert_rowid()` on that same connection.
async fn execute_any(pool: &AnyPool, sql: &str, params: &[Value]) -> Result<ExecResult, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    let result = if params.is_empty() {
        (&mut *conn).execute(sql).await?
    } else {
        sqlx::query_with(sql, bind_all::<Any>(params)?).execute(&mut *conn).await?
    };

    let last_insert_id = match result.last_insert_id() {
        Some(id) => Some(id),
        None if is_insert(sql) && result.rows_affected() > 0 => {
            Some(sqlx::query_scalar::<Any, i64>("SELECT last_insert_rowid()").fetch_one(&mut *conn).await?)
        }
        None => None,
    };
    Ok(ExecResult { rows_affected: result.rows_affected(), last_insert_id })
}

fn is_insert(sql: &str) -> bool {
    sql.trim_start().get(..6).is_some_and(|verb| verb.eq_ignore_ascii_case("INSERT"))
}

// ============================================================================
// DatabaseBuilder Struct
// ============================================================================

/// Connection settings for [`Database`].
#[derive(Debug, Clone)]
pub struct DatabaseBuilder {
    max_connections: u32,
    url: Option<String>,
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseBuilder {
    pub fn new() -> Self {
        Self { max_connections: DEFAULT_MAX_CONNECTIONS, url: None }
    }

    /// Reads `DATABASE_URL` and `DATABASE_MAX_CONNECTIONS` from the
    /// environment, after loading `.env` if one exists.
    pub fn from_env() -> Result<Self, Error> {
        dotenvy::dotenv().ok();
        let url = std::env::var("DATABASE_URL").map_err(|_| Error::Config("DATABASE_URL is not set".into()))?;
        let mut builder = Self::new();
        builder.url = Some(url);
        if let Ok(raw) = std::env::var("DATABASE_MAX_CONNECTIONS") {
            let max = raw
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("DATABASE_MAX_CONNECTIONS must be a number, got `{raw}`")))?;
            builder = builder.max_connections(max);
        }
        Ok(builder)
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Connects to the URL read by [`DatabaseBuilder::from_env`].
    pub async fn connect_from_env(self) -> Result<Database, Error> {
        let url = self.url.clone().ok_or_else(|| Error::Config("no database url configured".into()))?;
        self.connect(&url).await
    }

    pub async fn connect(self, url: &str) -> Result<Database, Error> {
        let driver = Drivers::from_url(url)?;
        let pool = match driver {
            Drivers::MySQL => Pool::MySql(MySqlPoolOptions::new().max_connections(self.max_connections).connect(url).await?),
            Drivers::SQLite => {
                sqlx::any::install_default_drivers();
                Pool::Any(AnyPoolOptions::new().max_connections(self.max_connections).connect(url).await?)
            }
        };
        log::debug!("connected to {driver:?} database with up to {} connections", self.max_connections);
        Ok(Database { pool, driver })
    }
}

// ============================================================================
// Value Binding
// ============================================================================

fn bind_all<'q, DB>(params: &[Value]) -> Result<DB::Arguments<'q>, sqlx::Error>
where
    DB: sqlx::Database,
    Option<String>: Encode<'q, DB> + Type<DB>,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
{
    let mut args: DB::Arguments<'q> = Default::default();
    for param in params {
        let bound = match param {
            Value::Null => args.add(Option::<String>::None),
            Value::Bool(b) => args.add(*b),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => args.add(i),
                (None, Some(f)) => args.add(f),
                (None, None) => args.add(n.to_string()),
            },
            Value::String(s) => args.add(s.clone()),
            // Nested documents are stored as their JSON text.
            other => args.add(other.to_string()),
        };
        bound.map_err(sqlx::Error::Encode)?;
    }
    Ok(args)
}

// ============================================================================
// Row Decoding
// ============================================================================

/// Decodes every column of an `Any` row into a JSON value, keeping column order.
fn decode_any_row(row: &AnyRow) -> Result<Record, sqlx::Error> {
    let mut record = Record::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let kind = raw.type_info().name().to_string();
            decode_any_value(row, i, &kind)?
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

fn decode_any_value(row: &AnyRow, i: usize, kind: &str) -> Result<Value, sqlx::Error> {
    Ok(match kind {
        "BOOLEAN" => Value::Bool(row.try_get::<bool, _>(i)?),
        "SMALLINT" => Value::from(row.try_get::<i16, _>(i)?),
        "INTEGER" => Value::from(row.try_get::<i32, _>(i)?),
        "BIGINT" => Value::from(row.try_get::<i64, _>(i)?),
        "REAL" => float(row.try_get::<f32, _>(i)? as f64),
        "DOUBLE" => float(row.try_get::<f64, _>(i)?),
        "BLOB" => bytes(row.try_get::<Vec<u8>, _>(i)?),
        _ => Value::String(row.try_get::<String, _>(i)?),
    })
}

/// How a MySQL column is carried into JSON, picked from the driver's type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MySqlKind {
    Bool,
    Signed,
    Unsigned,
    Float,
    Double,
    /// Rendered as text to keep every digit.
    Decimal,
    Date,
    Time,
    /// `DATETIME` and `TIMESTAMP`, rendered like filter instants.
    DateTime,
    Json,
    Bytes,
    Text,
}

impl MySqlKind {
    fn of(type_name: &str) -> Self {
        match type_name {
            "BOOLEAN" => MySqlKind::Bool,
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => MySqlKind::Signed,
            "YEAR" | "BIT" => MySqlKind::Unsigned,
            name if name.ends_with(" UNSIGNED") => MySqlKind::Unsigned,
            "FLOAT" => MySqlKind::Float,
            "DOUBLE" => MySqlKind::Double,
            "DECIMAL" => MySqlKind::Decimal,
            "DATE" => MySqlKind::Date,
            "TIME" => MySqlKind::Time,
            "DATETIME" | "TIMESTAMP" => MySqlKind::DateTime,
            "JSON" => MySqlKind::Json,
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "GEOMETRY" => MySqlKind::Bytes,
            _ => MySqlKind::Text,
        }
    }
}

/// Decodes every column of a MySQL row into a JSON value, keeping column order.
fn decode_mysql_row(row: &MySqlRow) -> Result<Record, sqlx::Error> {
    let mut record = Record::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let kind = MySqlKind::of(raw.type_info().name());
            decode_mysql_value(row, i, kind)?
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

fn decode_mysql_value(row: &MySqlRow, i: usize, kind: MySqlKind) -> Result<Value, sqlx::Error> {
    Ok(match kind {
        MySqlKind::Bool => Value::Bool(row.try_get::<bool, _>(i)?),
        MySqlKind::Signed => Value::from(row.try_get::<i64, _>(i)?),
        // YEAR and BIT do not always carry the unsigned flag the typed check wants.
        MySqlKind::Unsigned => Value::from(row.try_get_unchecked::<u64, _>(i)?),
        MySqlKind::Float => float(row.try_get::<f32, _>(i)? as f64),
        MySqlKind::Double => float(row.try_get::<f64, _>(i)?),
        MySqlKind::Decimal => Value::String(row.try_get::<Decimal, _>(i)?.to_string()),
        MySqlKind::Date => Value::String(row.try_get::<NaiveDate, _>(i)?.format("%Y-%m-%d").to_string()),
        MySqlKind::Time => Value::String(row.try_get::<NaiveTime, _>(i)?.format("%H:%M:%S%.f").to_string()),
        MySqlKind::DateTime => Value::String(format_instant(row.try_get::<NaiveDateTime, _>(i)?.and_utc())),
        MySqlKind::Json => row.try_get::<Json<Value>, _>(i)?.0,
        MySqlKind::Bytes => bytes(row.try_get_unchecked::<Vec<u8>, _>(i)?),
        MySqlKind::Text => Value::String(row.try_get_unchecked::<String, _>(i)?),
    })
}

/// UTF-8 blobs come back as text, anything else as an array of bytes.
fn bytes(raw: Vec<u8>) -> Value {
    match String::from_utf8(raw) {
        Ok(text) => Value::String(text),
        Err(err) => Value::from(err.into_bytes()),
    }
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}
