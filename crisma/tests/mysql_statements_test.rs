//! Statement shapes for the MySQL dialect, checked against a recording
//! connection instead of a live server.

use std::sync::Mutex;

use crisma::{Accessor, Connection, Drivers, Error, ExecResult, Fields, FindOptions, Lookup, Record, Value};
use futures::future::BoxFuture;
use serde_json::json;

/// Answers each statement with the rows of the first registered fragment it
/// contains, and records everything it was asked to run.
struct Recording {
    responses: Vec<(&'static str, Vec<Record>)>,
    fail_on: Option<&'static str>,
    log: Mutex<Vec<(String, Vec<Value>)>>,
}

impl Recording {
    fn new() -> Self {
        Self { responses: Vec::new(), fail_on: None, log: Mutex::new(Vec::new()) }
    }

    fn respond(mut self, fragment: &'static str, rows: Value) -> Self {
        let rows = match rows {
            Value::Array(rows) => rows
                .into_iter()
                .filter_map(|row| match row {
                    Value::Object(record) => Some(record),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        self.responses.push((fragment, rows));
        self
    }

    fn fail_on(mut self, fragment: &'static str) -> Self {
        self.fail_on = Some(fragment);
        self
    }

    fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.log.lock().unwrap().clone()
    }

    fn last(&self) -> (String, Vec<Value>) {
        self.statements().pop().expect("at least one statement")
    }

    fn record(&self, sql: &str, params: &[Value]) -> Result<(), sqlx::Error> {
        self.log.lock().unwrap().push((sql.to_string(), params.to_vec()));
        match self.fail_on {
            Some(fragment) if sql.contains(fragment) => Err(sqlx::Error::Protocol(format!("refused: {sql}"))),
            _ => Ok(()),
        }
    }
}

impl Connection for Recording {
    fn driver(&self) -> Drivers {
        Drivers::MySQL
    }

    fn fetch_all<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> BoxFuture<'a, Result<Vec<Record>, sqlx::Error>> {
        let result = self.record(sql, params).map(|_| {
            self.responses
                .iter()
                .find(|(fragment, _)| sql.contains(fragment))
                .map(|(_, rows)| rows.clone())
                .unwrap_or_default()
        });
        Box::pin(async move { result })
    }

    fn execute<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> BoxFuture<'a, Result<ExecResult, sqlx::Error>> {
        let result = self.record(sql, params).map(|_| ExecResult { rows_affected: 1, last_insert_id: Some(42) });
        Box::pin(async move { result })
    }
}

fn edge(column: &str, table: &str, referenced: &str, position: i64) -> Value {
    json!({
        "COLUMN_NAME": column,
        "REFERENCED_TABLE_NAME": table,
        "REFERENCED_COLUMN_NAME": referenced,
        "ORDINAL_POSITION": position
    })
}

#[tokio::test]
async fn test_create_keeps_column_and_value_order() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Recording::new();
    let records = Accessor::new(&conn);

    let result = records.create_record("t", &Fields::new().set("a", 1).set("b", 2)).await?;
    assert_eq!(result.inserted_id, Some(42));
    assert_eq!(result.affected_rows, 1);

    let (sql, params) = conn.last();
    assert_eq!(sql, "INSERT INTO t (a, b) VALUES (?, ?)");
    assert_eq!(params, vec![json!(1), json!(2)]);
    Ok(())
}

#[tokio::test]
async fn test_update_binds_where_value_last() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Recording::new();
    let records = Accessor::new(&conn);

    records.update_record("t", &Lookup::new("id", 5), &Fields::new().set("name", "x")).await?;
    let (sql, params) = conn.last();
    assert_eq!(sql, "UPDATE t SET name = ? WHERE id = ?");
    assert_eq!(params, vec![json!("x"), json!(5)]);
    Ok(())
}

#[tokio::test]
async fn test_simple_statements() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Recording::new().respond("COUNT(*)", json!([{ "total": 7 }]));
    let records = Accessor::new(&conn);

    assert_eq!(records.count_all("t").await?, 7);
    assert_eq!(conn.last().0, "SELECT COUNT(*) AS total FROM t");

    records.delete_record("t", &Lookup::new("id", 3)).await?;
    assert_eq!(conn.last(), ("DELETE FROM t WHERE id = ?".to_string(), vec![json!(3)]));

    records.find_by_id("t", &Lookup::new("code", "A")).await?;
    assert_eq!(conn.last(), ("SELECT * FROM t WHERE code = ?".to_string(), vec![json!("A")]));

    records.find_by_composite_keys("t", &Fields::new().set("a", "x'y").set("b", 2)).await?;
    assert_eq!(conn.last(), ("SELECT * FROM t WHERE a = ? AND b = ?".to_string(), vec![json!("x'y"), json!(2)]));
    Ok(())
}

#[tokio::test]
async fn test_find_all_clauses() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Recording::new();
    let records = Accessor::new(&conn);

    let options = FindOptions::from_json(&json!({ "where": { "disabledAt": null } }))?;
    records.find_all("T", &options).await?;
    assert_eq!(conn.last().0, "SELECT T.* FROM T WHERE T.disabledAt IS NULL");

    let options = FindOptions::from_json(&json!({ "where": { "disabledAt": { "not": null } } }))?;
    records.find_all("T", &options).await?;
    assert_eq!(conn.last().0, "SELECT T.* FROM T WHERE T.disabledAt IS NOT NULL");

    let options = FindOptions::from_json(&json!({
        "where": { "createdAt": { "gte": "2024-01-01", "lte": "2024-02-01" } }
    }))?;
    records.find_all("T", &options).await?;
    let (sql, params) = conn.last();
    assert_eq!(sql, "SELECT T.* FROM T WHERE T.createdAt BETWEEN ? AND ?");
    assert_eq!(params, vec![json!("2024-01-01T00:00:00.000Z"), json!("2024-02-01T00:00:00.000Z")]);

    let options = FindOptions::from_json(&json!({ "range": { "skip": 0, "take": 10 } }))?;
    records.find_all("T", &options).await?;
    assert_eq!(conn.last().0, "SELECT T.* FROM T LIMIT 0, 10");

    let options = FindOptions::from_json(&json!({ "range": { "skip": 0 } }))?;
    records.find_all("T", &options).await?;
    assert_eq!(conn.last().0, "SELECT T.* FROM T");

    let options = FindOptions::from_json(&json!({
        "where": {
            "name": { "contains": "an" },
            "OR": [{ "city": { "contains": "ly" } }, { "city": { "contains": "par" }, "vip": 1 }]
        },
        "orderBy": [{ "name": "ASC", "city": "desc" }]
    }))?;
    records.find_all("T", &options).await?;
    let (sql, params) = conn.last();
    assert_eq!(
        sql,
        "SELECT T.* FROM T WHERE (T.city LIKE ? OR (T.city LIKE ? AND T.vip = ?)) AND T.name LIKE ? \
         ORDER BY name ASC, city DESC"
    );
    assert_eq!(params, vec![json!("%ly%"), json!("%par%"), json!(1), json!("%an%")]);
    Ok(())
}

#[tokio::test]
async fn test_related_filter_join_columns() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Recording::new()
        .respond("CONSTRAINT_NAME = 'PRIMARY'", json!([{ "COLUMN_NAME": "id" }]))
        .respond("KEY_COLUMN_USAGE", json!([edge("owner_id", "users", "id", 1)]));
    let records = Accessor::new(&conn);

    let options = FindOptions::from_json(&json!({
        "where": { "users": { "name": { "contains": "ann" } } }
    }))?;
    records.find_all("pets", &options).await?;

    let select = conn
        .statements()
        .into_iter()
        .find(|(sql, _)| sql.starts_with("SELECT pets.*"))
        .expect("main select");
    assert_eq!(select.0, "SELECT pets.* FROM pets LEFT JOIN users ON pets.owner_id = users.id WHERE users.name LIKE ?");
    assert_eq!(select.1, vec![json!("%ann%")]);
    Ok(())
}

#[tokio::test]
async fn test_hydration_is_batched_per_edge() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Recording::new()
        .respond("FROM users WHERE", json!([
            { "id": 1, "name": "Ann" },
            { "id": 2, "name": "Bob" },
            { "id": 1, "name": "Ann (duplicate)" }
        ]))
        .respond("KEY_COLUMN_USAGE", json!([
            edge("owner_id", "users", "id", 1),
            edge("keeper_id", "users", "id", 1)
        ]))
        .respond("FROM pets", json!([
            { "id": 10, "owner_id": 1 },
            { "id": 11, "owner_id": 2 },
            { "id": 12, "owner_id": 1 },
            { "id": 13, "owner_id": null },
            { "id": 14, "owner_id": 3 }
        ]));
    let records = Accessor::new(&conn);

    let rows = records.find_all("pets", &FindOptions::new()).await?;

    let lookups: Vec<_> = conn.statements().into_iter().filter(|(sql, _)| sql.contains("FROM users WHERE")).collect();
    assert_eq!(lookups.len(), 1, "one batched lookup for the single grouped edge");
    assert_eq!(lookups[0].0, "SELECT * FROM users WHERE id IN (?, ?, ?)");
    assert_eq!(lookups[0].1, vec![json!(1), json!(2), json!(3)]);

    assert_eq!(rows[0]["users"]["name"], json!("Ann"), "first match wins");
    assert_eq!(rows[1]["users"]["name"], json!("Bob"));
    assert_eq!(rows[2]["users"]["name"], json!("Ann"));
    assert!(rows[3].get("users").is_none());
    assert!(rows[4].get("users").is_none());
    Ok(())
}

#[tokio::test]
async fn test_catalog_statements() -> Result<(), Box<dyn std::error::Error>> {
    let column = |field: &str, nullable: &str, key: &str| {
        json!({ "Field": field, "Type": "int(11)", "Null": nullable, "Key": key, "Default": null, "Extra": "" })
    };
    let conn = Recording::new()
        .respond("SHOW COLUMNS FROM", json!([column("id", "NO", "PRI"), column("owner_id", "YES", "MUL")]))
        .respond("DESCRIBE", json!([column("id", "NO", "PRI"), column("owner_id", "YES", "MUL")]))
        .respond("CONSTRAINT_NAME = 'PRIMARY'", json!([{ "COLUMN_NAME": "id" }, { "COLUMN_NAME": "owner_id" }]))
        .respond("KEY_COLUMN_USAGE", json!([
            edge("owner_id", "users", "id", 1),
            edge("owner_id", "users", "id", 1),
            edge("vet_id", "vets", "id", 1)
        ]));
    let records = Accessor::new(&conn);

    assert_eq!(records.describe_table("pets").await?.len(), 2);
    assert_eq!(conn.last().0, "DESCRIBE pets");

    assert_eq!(records.list_columns("pets").await?.len(), 2);
    assert_eq!(conn.last().0, "SHOW COLUMNS FROM pets");

    assert_eq!(records.get_column("pets", "Owner_Id").await?.map(|c| c.field), Some("owner_id".to_string()));
    assert!(records.is_nullable("pets", "owner_id").await?);
    assert!(matches!(records.is_nullable("pets", "name").await, Err(Error::ColumnNotFound { .. })));

    let edges = records.get_foreign_keys("pets").await?;
    assert_eq!(edges.len(), 2);
    assert_eq!(edges[1].referenced_table, "vets");
    assert_eq!(conn.last().1, vec![json!("pets")]);

    records.is_foreign_key_column("pets", "id").await?;
    let (sql, params) = conn.last();
    assert!(sql.contains("REFERENCED_COLUMN_NAME = ?"));
    assert_eq!(params, vec![json!("pets"), json!("id")]);

    assert_eq!(records.get_primary_keys("pets").await?, vec!["id".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_driver_errors_propagate() -> Result<(), Box<dyn std::error::Error>> {
    let conn = Recording::new().fail_on("KEY_COLUMN_USAGE");
    let records = Accessor::new(&conn);

    assert!(matches!(records.get_primary_keys("pets").await, Err(Error::Query(_))));
    assert!(matches!(records.find_all("pets", &FindOptions::new()).await, Err(Error::Query(_))));

    // Nothing is sent for names that fail validation.
    let before = conn.statements().len();
    assert!(matches!(records.find_by_id("pets`", &Lookup::new("id", 1)).await, Err(Error::InvalidIdentifier(_))));
    assert_eq!(conn.statements().len(), before);
    Ok(())
}
