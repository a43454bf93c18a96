//! # Query Module
//!
//! A small statement builder that renders parameterized SQL for the dialect
//! shared by MySQL and SQLite (`?` placeholders, `LIMIT offset, count`).
//!
//! Identifiers go through [`Ident`] validation before they reach SQL text and
//! values only ever travel as bound parameters, so rendering itself is
//! infallible.

mod expr;
mod ident;
mod statement;

pub use expr::{ColumnRef, Direction, Predicate};
pub use ident::Ident;
pub use statement::{Count, Delete, Insert, Join, Select, Update};

use serde_json::Value;

/// Rendered SQL text plus its bind parameters, in placeholder order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sql {
    pub text: String,
    pub params: Vec<Value>,
}

impl Sql {
    pub(crate) fn push(&mut self, text: &str) {
        self.text.push_str(text);
    }

    pub(crate) fn bind(&mut self, value: Value) {
        self.text.push('?');
        self.params.push(value);
    }
}
