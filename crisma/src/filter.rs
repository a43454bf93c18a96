//! # Filter Module
//!
//! The `where` / `orderBy` / `range` options accepted by
//! [`Accessor::find_all`](crate::Accessor::find_all), either built in Rust or
//! parsed from the JSON shape callers already send:
//!
//! ```json
//! {
//!   "where": {
//!     "OR": [{ "name": { "contains": "ann" } }, { "email": { "contains": "ann" } }],
//!     "disabledAt": null,
//!     "createdAt": { "gte": "2024-01-01", "lte": "2024-02-01" },
//!     "roles": { "name": { "contains": "admin" } }
//!   },
//!   "orderBy": [{ "name": "asc" }],
//!   "range": { "skip": 0, "take": 10 }
//! }
//! ```

// ============================================================================
// External Crate Imports
// ============================================================================

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{query::Direction, Error, Range};

/// Field whose `null` / `{not: null}` values become `IS NULL` / `IS NOT NULL`.
pub const DISABLED_AT: &str = "disabledAt";
/// Field whose `{gte, lte}` values become a date window.
pub const CREATED_AT: &str = "createdAt";

const OR_KEY: &str = "OR";

// ============================================================================
// Conditions
// ============================================================================

/// One filter fragment on the queried table (or a related one).
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `table.field IS NULL`
    IsNull { field: String },
    /// `table.field IS NOT NULL`
    IsNotNull { field: String },
    /// `table.field = ?`
    Equals { field: String, value: Value },
    /// `table.field LIKE '%value%'`
    Contains { field: String, value: String },
    /// `BETWEEN`, `>=` or `<=` depending on which bounds are set. Bounds are
    /// normalized ISO-8601 UTC instants.
    DateRange { field: String, gte: Option<String>, lte: Option<String> },
    /// Joins `table` and filters `table.field LIKE '%value%'`.
    Related { table: String, field: String, value: String },
}

/// Conditions of a `find_all` call.
///
/// `any` holds the alternatives of the `OR` group (each alternative is itself
/// AND-joined); the group as a whole is AND-combined with `all`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub any: Vec<Vec<Condition>>,
    pub all: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.any.is_empty() && self.all.is_empty()
    }

    pub fn is_null(self, field: impl Into<String>) -> Self {
        self.with(Condition::IsNull { field: field.into() })
    }

    pub fn is_not_null(self, field: impl Into<String>) -> Self {
        self.with(Condition::IsNotNull { field: field.into() })
    }

    pub fn equals(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(Condition::Equals { field: field.into(), value: value.into() })
    }

    pub fn contains(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(Condition::Contains { field: field.into(), value: value.into() })
    }

    /// Filters on a column of a related table, joining it.
    pub fn related_contains(
        self,
        table: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.with(Condition::Related { table: table.into(), field: field.into(), value: value.into() })
    }

    /// Adds a date window. Bounds accept `YYYY-MM-DD` or ISO-8601 date-times.
    pub fn date_range(self, field: impl Into<String>, gte: Option<&str>, lte: Option<&str>) -> Result<Self, Error> {
        let gte = gte.map(normalize_instant).transpose()?;
        let lte = lte.map(normalize_instant).transpose()?;
        Ok(self.with(Condition::DateRange { field: field.into(), gte, lte }))
    }

    /// Adds one alternative to the `OR` group.
    pub fn or(mut self, alternative: Vec<Condition>) -> Self {
        self.any.push(alternative);
        self
    }

    pub fn with(mut self, condition: Condition) -> Self {
        self.all.push(condition);
        self
    }

    /// Parses a `where` document.
    pub fn from_json(document: &Value) -> Result<Self, Error> {
        let entries = match document {
            Value::Null => return Ok(Self::default()),
            Value::Object(entries) => entries,
            other => return Err(Error::logic(format!("'where' must be an object, got {other}"))),
        };

        let mut filter = Self::default();
        for (key, value) in entries {
            if key == OR_KEY {
                let Value::Array(alternatives) = value else {
                    return Err(Error::logic("'OR' condition must be an array."));
                };
                for alternative in alternatives {
                    let Value::Object(mapping) = alternative else {
                        return Err(Error::logic("'OR' entries must be objects"));
                    };
                    let mut conditions = Vec::new();
                    for (field, value) in mapping {
                        conditions.extend(parse_condition(field, value)?);
                    }
                    if !conditions.is_empty() {
                        filter.any.push(conditions);
                    }
                }
            } else {
                filter.all.extend(parse_condition(key, value)?);
            }
        }
        Ok(filter)
    }
}

fn parse_condition(field: &str, value: &Value) -> Result<Option<Condition>, Error> {
    let field = field.to_string();

    if field == DISABLED_AT {
        return Ok(match value {
            Value::Null => Some(Condition::IsNull { field }),
            Value::Object(map) if map.get("not") == Some(&Value::Null) => Some(Condition::IsNotNull { field }),
            _ => None,
        });
    }

    match value {
        Value::Object(map) if !map.contains_key("contains") => {
            if field == CREATED_AT {
                let gte = date_bound(map, "gte")?;
                let lte = date_bound(map, "lte")?;
                if gte.is_none() && lte.is_none() {
                    return Ok(None);
                }
                return Ok(Some(Condition::DateRange { field, gte, lte }));
            }
            let Some((nested, inner)) = map.iter().next() else {
                return Err(Error::logic(format!("filter on related table `{field}` names no column")));
            };
            let Some(needle) = inner.get("contains") else {
                return Err(Error::logic(format!("filter on `{field}.{nested}` needs a 'contains' value")));
            };
            Ok(Some(Condition::Related { table: field, field: nested.clone(), value: text(needle)? }))
        }
        Value::Object(map) => {
            let needle = map.get("contains").unwrap_or(&Value::Null);
            Ok(Some(Condition::Contains { field, value: text(needle)? }))
        }
        Value::Null => Ok(Some(Condition::IsNull { field })),
        scalar => Ok(Some(Condition::Equals { field, value: scalar.clone() })),
    }
}

fn date_bound(map: &Map<String, Value>, key: &str) -> Result<Option<String>, Error> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) if raw.is_empty() => Ok(None),
        Some(Value::String(raw)) => normalize_instant(raw).map(Some),
        Some(other) => Err(Error::logic(format!("'{key}' must be a date string, got {other}"))),
    }
}

fn text(value: &Value) -> Result<String, Error> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(Error::logic(format!("'contains' must be a string, got {other}"))),
    }
}

/// Normalizes a date or date-time string to `YYYY-MM-DDTHH:MM:SS.mmmZ`.
///
/// Inputs without an offset are read as UTC.
pub fn normalize_instant(raw: &str) -> Result<String, Error> {
    let raw = raw.trim();
    let instant = if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        parsed.with_timezone(&Utc)
    } else if let Some(naive) = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
    {
        naive.and_utc()
    } else if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0).ok_or_else(|| Error::logic(format!("invalid date `{raw}`")))?.and_utc()
    } else {
        return Err(Error::logic(format!("invalid date `{raw}`")));
    };
    Ok(format_instant(instant))
}

/// Renders an instant as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub(crate) fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// Find Options
// ============================================================================

/// Everything [`Accessor::find_all`](crate::Accessor::find_all) accepts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub filter: Filter,
    /// `(column or table.column, direction)` pairs, in order.
    pub order_by: Vec<(String, Direction)>,
    pub range: Range,
}

#[derive(Deserialize)]
struct RawOptions {
    #[serde(rename = "where", default)]
    filter: Value,
    #[serde(rename = "orderBy", default)]
    order_by: Option<Vec<Map<String, Value>>>,
    #[serde(default)]
    range: Option<Range>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push((column.into(), direction));
        self
    }

    pub fn range(mut self, range: Range) -> Self {
        self.range = range;
        self
    }

    /// Parses `{where, orderBy, range}`. Only the first `orderBy` mapping is
    /// used; unknown keys are ignored.
    pub fn from_json(document: &Value) -> Result<Self, Error> {
        if document.is_null() {
            return Ok(Self::default());
        }
        let raw: RawOptions = serde_json::from_value(document.clone())?;

        let mut order_by = Vec::new();
        if let Some(first) = raw.order_by.as_ref().and_then(|mappings| mappings.first()) {
            for (column, direction) in first {
                let Value::String(direction) = direction else {
                    return Err(Error::logic(format!("order direction for `{column}` must be a string")));
                };
                order_by.push((column.clone(), Direction::parse(direction)?));
            }
        }

        Ok(Self { filter: Filter::from_json(&raw.filter)?, order_by, range: raw.range.unwrap_or_default() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dates_are_normalized_to_utc_millis() {
        assert_eq!(normalize_instant("2024-01-01").unwrap(), "2024-01-01T00:00:00.000Z");
        assert_eq!(normalize_instant("2024-01-01T10:30:00").unwrap(), "2024-01-01T10:30:00.000Z");
        assert_eq!(normalize_instant("2024-01-01T10:30:00+02:00").unwrap(), "2024-01-01T08:30:00.000Z");
        assert_eq!(normalize_instant("2024-01-01 10:30:00.25").unwrap(), "2024-01-01T10:30:00.250Z");
        assert!(matches!(normalize_instant("yesterday"), Err(Error::Logic(_))));
    }

    #[test]
    fn disabled_at_forms() {
        let filter = Filter::from_json(&json!({ "disabledAt": null })).unwrap();
        assert_eq!(filter.all, vec![Condition::IsNull { field: "disabledAt".into() }]);

        let filter = Filter::from_json(&json!({ "disabledAt": { "not": null } })).unwrap();
        assert_eq!(filter.all, vec![Condition::IsNotNull { field: "disabledAt".into() }]);

        let filter = Filter::from_json(&json!({ "disabledAt": { "not": "2024-01-01" } })).unwrap();
        assert!(filter.is_empty());
    }

    #[test]
    fn created_at_bounds() {
        let filter = Filter::from_json(&json!({ "createdAt": { "gte": "2024-01-01" } })).unwrap();
        assert_eq!(
            filter.all,
            vec![Condition::DateRange {
                field: "createdAt".into(),
                gte: Some("2024-01-01T00:00:00.000Z".into()),
                lte: None,
            }]
        );
        assert!(Filter::from_json(&json!({ "createdAt": {} })).unwrap().is_empty());
    }

    #[test]
    fn or_must_be_an_array() {
        let err = Filter::from_json(&json!({ "OR": { "name": { "contains": "x" } } })).unwrap_err();
        assert!(matches!(err, Error::Logic(_)));
    }

    #[test]
    fn or_alternatives_and_related_filters() {
        let filter = Filter::from_json(&json!({
            "OR": [{ "name": { "contains": "ann" } }, { "roles": { "name": { "contains": "admin" } } }],
            "code": "A1"
        }))
        .unwrap();
        assert_eq!(
            filter.any,
            vec![
                vec![Condition::Contains { field: "name".into(), value: "ann".into() }],
                vec![Condition::Related { table: "roles".into(), field: "name".into(), value: "admin".into() }],
            ]
        );
        assert_eq!(filter.all, vec![Condition::Equals { field: "code".into(), value: json!("A1") }]);
    }

    #[test]
    fn options_document() {
        let options = FindOptions::from_json(&json!({
            "where": { "name": { "contains": "a" } },
            "orderBy": [{ "name": "desc" }],
            "range": { "skip": 0 },
            "includes": []
        }))
        .unwrap();
        assert_eq!(options.order_by, vec![("name".to_string(), Direction::Desc)]);
        assert_eq!(options.range.limit(), None);

        let bad = FindOptions::from_json(&json!({ "orderBy": [{ "name": "sideways" }] }));
        assert!(matches!(bad, Err(Error::Logic(_))));
    }
}
