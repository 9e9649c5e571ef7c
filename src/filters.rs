//! Declarative query filters.
//!
//! A filter list is a JSON-friendly sequence of descriptors such as
//! `{"ref": "equalTo", "key": "channel", "val": "c1"}`, applied in order to
//! a [`Query`]. Operands are not checked here; the query reports malformed
//! input when it is used.

use crate::backend::Query;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, trace};

/// Operator vocabulary understood by [`apply_filters`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterOp {
    EqualTo,
    NotEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
    ContainedIn,
    Limit,
    Skip,
    Ascending,
    Descending,
}

impl FilterOp {
    pub const ALL: [FilterOp; 11] = [
        FilterOp::EqualTo,
        FilterOp::NotEqualTo,
        FilterOp::GreaterThan,
        FilterOp::GreaterThanOrEqualTo,
        FilterOp::LessThan,
        FilterOp::LessThanOrEqualTo,
        FilterOp::ContainedIn,
        FilterOp::Limit,
        FilterOp::Skip,
        FilterOp::Ascending,
        FilterOp::Descending,
    ];

    /// Look up an operator tag. Unknown tags yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        FilterOp::ALL.into_iter().find(|op| op.tag() == tag)
    }

    pub fn tag(self) -> &'static str {
        match self {
            FilterOp::EqualTo => "equalTo",
            FilterOp::NotEqualTo => "notEqualTo",
            FilterOp::GreaterThan => "greaterThan",
            FilterOp::GreaterThanOrEqualTo => "greaterThanOrEqualTo",
            FilterOp::LessThan => "lessThan",
            FilterOp::LessThanOrEqualTo => "lessThanOrEqualTo",
            FilterOp::ContainedIn => "containedIn",
            FilterOp::Limit => "limit",
            FilterOp::Skip => "skip",
            FilterOp::Ascending => "ascending",
            FilterOp::Descending => "descending",
        }
    }

    /// Whether the operator constrains a key (as opposed to shaping results).
    pub fn uses_key(self) -> bool {
        !matches!(
            self,
            FilterOp::Limit | FilterOp::Skip | FilterOp::Ascending | FilterOp::Descending
        )
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One filter: an operator tag plus its operands.
///
/// The tag is kept as a string so lists carrying operators this version
/// does not know still deserialize.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    #[serde(rename = "ref")]
    pub op: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<Value>,
}

impl FilterDescriptor {
    pub fn new(op: FilterOp, key: Option<&str>, val: impl Into<Value>) -> Self {
        Self {
            op: op.tag().to_string(),
            key: key.map(str::to_string),
            val: Some(val.into()),
        }
    }

    pub fn equal_to(key: &str, val: impl Into<Value>) -> Self {
        Self::new(FilterOp::EqualTo, Some(key), val)
    }

    pub fn not_equal_to(key: &str, val: impl Into<Value>) -> Self {
        Self::new(FilterOp::NotEqualTo, Some(key), val)
    }

    pub fn greater_than(key: &str, val: impl Into<Value>) -> Self {
        Self::new(FilterOp::GreaterThan, Some(key), val)
    }

    pub fn greater_than_or_equal_to(key: &str, val: impl Into<Value>) -> Self {
        Self::new(FilterOp::GreaterThanOrEqualTo, Some(key), val)
    }

    pub fn less_than(key: &str, val: impl Into<Value>) -> Self {
        Self::new(FilterOp::LessThan, Some(key), val)
    }

    pub fn less_than_or_equal_to(key: &str, val: impl Into<Value>) -> Self {
        Self::new(FilterOp::LessThanOrEqualTo, Some(key), val)
    }

    pub fn contained_in(key: &str, vals: impl Into<Value>) -> Self {
        Self::new(FilterOp::ContainedIn, Some(key), vals)
    }

    pub fn limit(n: u64) -> Self {
        Self::new(FilterOp::Limit, None, n)
    }

    pub fn skip(n: u64) -> Self {
        Self::new(FilterOp::Skip, None, n)
    }

    pub fn ascending(key: &str) -> Self {
        Self::new(FilterOp::Ascending, None, key)
    }

    pub fn descending(key: &str) -> Self {
        Self::new(FilterOp::Descending, None, key)
    }

    /// Parse a JSON array of descriptors.
    pub fn list_from_json(json: &str) -> crate::Result<Vec<FilterDescriptor>> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Apply `filters` to `query` in order, one setter call per recognized
/// descriptor. Unknown operator tags are skipped.
///
/// A missing `key` is passed as `""` and a missing `val` as `null`.
pub fn apply_filters<'q, Q>(query: &'q mut Q, filters: &[FilterDescriptor]) -> &'q mut Q
where
    Q: Query + ?Sized,
{
    for filter in filters {
        let Some(op) = FilterOp::from_tag(&filter.op) else {
            debug!(op = %filter.op, "filter operator not implemented, skipping");
            continue;
        };

        let key = filter.key.as_deref().unwrap_or_default();
        let val = filter.val.clone().unwrap_or(Value::Null);
        trace!(class_name = query.class_name(), %op, key, "applying filter");

        match op {
            FilterOp::EqualTo => query.equal_to(key, val),
            FilterOp::NotEqualTo => query.not_equal_to(key, val),
            FilterOp::GreaterThan => query.greater_than(key, val),
            FilterOp::GreaterThanOrEqualTo => query.greater_than_or_equal_to(key, val),
            FilterOp::LessThan => query.less_than(key, val),
            FilterOp::LessThanOrEqualTo => query.less_than_or_equal_to(key, val),
            FilterOp::ContainedIn => query.contained_in(key, val),
            FilterOp::Limit => query.limit(val),
            FilterOp::Skip => query.skip(val),
            FilterOp::Ascending => query.ascending(val),
            FilterOp::Descending => query.descending(val),
        }
    }
    query
}
