//! # Pagination Module
//!
//! Row windows for `find_all`. A window only applies when both ends are
//! known: `skip` without `take` (or the reverse) renders no `LIMIT` at all.

// ============================================================================
// External Crate Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// Range Struct
// ============================================================================

/// `{skip, take}` window rendered as `LIMIT skip, take`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    /// Number of rows to skip
    #[serde(default)]
    pub skip: Option<u64>,
    /// Number of rows to return
    #[serde(default)]
    pub take: Option<u64>,
}

impl Range {
    /// Creates a complete window.
    pub fn new(skip: u64, take: u64) -> Self {
        Self { skip: Some(skip), take: Some(take) }
    }

    /// Creates the window for a zero-based page.
    ///
    /// # Arguments
    ///
    /// * `page` - Zero-based page number
    /// * `per_page` - Rows per page
    ///
    /// # Example
    ///
    /// ```rust
    /// use crisma::Range;
    ///
    /// assert_eq!(Range::page(2, 25).limit(), Some((50, 25)));
    /// ```
    pub fn page(page: u64, per_page: u64) -> Self {
        Self::new(page.saturating_mul(per_page), per_page)
    }

    /// Returns `(skip, take)` when both are defined.
    pub fn limit(&self) -> Option<(u64, u64)> {
        match (self.skip, self.take) {
            (Some(skip), Some(take)) => Some((skip, take)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_requires_both_bounds() {
        assert_eq!(Range::new(0, 10).limit(), Some((0, 10)));
        assert_eq!(Range { skip: Some(0), take: None }.limit(), None);
        assert_eq!(Range { skip: None, take: Some(10) }.limit(), None);
        assert_eq!(Range::default().limit(), None);
    }

    #[test]
    fn null_bounds_count_as_undefined() {
        let range: Range = serde_json::from_str(r#"{"skip": 0, "take": null}"#).unwrap();
        assert_eq!(range.limit(), None);
    }
}
