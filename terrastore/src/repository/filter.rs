//! Filter values, conditions and composable predicates
//!
//! [`SqlValue`] is the closed set of values the engine can bind into a query.
//! [`FilterCondition`] compares one column against a value, and [`Predicate`]
//! combines conditions with AND / OR / NOT.
//!
//! # Example
//!
//! ```rust
//! use terrastore::repository::{FilterCondition, Predicate};
//!
//! let active_ports = Predicate::all([
//!     FilterCondition::eq("kind", "port").into(),
//!     Predicate::any([
//!         FilterCondition::gte("capacity", 1000_i64).into(),
//!         FilterCondition::is_null("closed_at").into(),
//!     ]),
//! ]);
//! assert!(!active_ports.is_empty());
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::table::ColumnType;

/// A value that can be bound into a query
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// String value
    String(String),
    /// 64-bit integer value
    Integer(i64),
    /// 64-bit floating point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// UUID value
    Uuid(Uuid),
    /// Timestamp value (UTC)
    Timestamp(DateTime<Utc>),
    /// JSON document
    Json(serde_json::Value),
    /// List of string values (for IN)
    StringList(Vec<String>),
    /// List of integer values (for IN)
    IntegerList(Vec<i64>),
    /// List of UUID values (for IN)
    UuidList(Vec<Uuid>),
    /// SQL NULL
    Null,
}

impl SqlValue {
    /// Whether the value is a string (compared case-insensitively in uniqueness checks)
    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// Whether the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether the value is a list (bound as an array)
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            Self::StringList(_) | Self::IntegerList(_) | Self::UuidList(_)
        )
    }

    /// Bind this value as the next query parameter
    ///
    /// `Null` is bound with the declared column type so Postgres can infer the
    /// parameter type; untyped nulls fall back to `text`.
    pub(crate) fn push_bind(&self, builder: &mut QueryBuilder<'_, Postgres>, ty: Option<ColumnType>) {
        match self {
            Self::String(value) => builder.push_bind(value.clone()),
            Self::Integer(value) => builder.push_bind(*value),
            Self::Float(value) => builder.push_bind(*value),
            Self::Boolean(value) => builder.push_bind(*value),
            Self::Uuid(value) => builder.push_bind(*value),
            Self::Timestamp(value) => builder.push_bind(*value),
            Self::Json(value) => builder.push_bind(value.clone()),
            Self::StringList(values) => builder.push_bind(values.clone()),
            Self::IntegerList(values) => builder.push_bind(values.clone()),
            Self::UuidList(values) => builder.push_bind(values.clone()),
            Self::Null => match ty {
                Some(ColumnType::Integer) => builder.push_bind(None::<i32>),
                Some(ColumnType::BigInt) => builder.push_bind(None::<i64>),
                Some(ColumnType::Float) => builder.push_bind(None::<f64>),
                Some(ColumnType::Boolean) => builder.push_bind(None::<bool>),
                Some(ColumnType::Uuid) => builder.push_bind(None::<Uuid>),
                Some(ColumnType::Timestamp) => builder.push_bind(None::<DateTime<Utc>>),
                Some(ColumnType::Json) => builder.push_bind(None::<serde_json::Value>),
                Some(ColumnType::Text) | None => builder.push_bind(None::<String>),
            },
        };
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<T: fmt::Display>(values: &[T]) -> String {
            values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        }

        match self {
            Self::String(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Uuid(value) => write!(f, "{value}"),
            Self::Timestamp(value) => write!(f, "{}", value.to_rfc3339()),
            Self::Json(value) => write!(f, "{value}"),
            Self::StringList(values) => write!(f, "[{}]", join(values)),
            Self::IntegerList(values) => write!(f, "[{}]", join(values)),
            Self::UuidList(values) => write!(f, "[{}]", join(values)),
            Self::Null => write!(f, "NULL"),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&String> for SqlValue {
    fn from(s: &String) -> Self {
        Self::String(s.clone())
    }
}

impl From<i64> for SqlValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for SqlValue {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for SqlValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<Uuid> for SqlValue {
    fn from(id: Uuid) -> Self {
        Self::Uuid(id)
    }
}

impl From<&Uuid> for SqlValue {
    fn from(id: &Uuid) -> Self {
        Self::Uuid(*id)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(at: DateTime<Utc>) -> Self {
        Self::Timestamp(at)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<Vec<String>> for SqlValue {
    fn from(list: Vec<String>) -> Self {
        Self::StringList(list)
    }
}

impl From<Vec<i64>> for SqlValue {
    fn from(list: Vec<i64>) -> Self {
        Self::IntegerList(list)
    }
}

impl From<Vec<Uuid>> for SqlValue {
    fn from(list: Vec<Uuid>) -> Self {
        Self::UuidList(list)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Comparison operators for filter conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Equal to (=), or IS NULL for a null value
    Equal,
    /// Not equal to (<>), or IS NOT NULL for a null value
    NotEqual,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal to (>=)
    GreaterThanOrEqual,
    /// Less than (<)
    LessThan,
    /// Less than or equal to (<=)
    LessThanOrEqual,
    /// Pattern matching (LIKE)
    Like,
    /// Case-insensitive pattern matching (ILIKE)
    ILike,
    /// Case-insensitive equality (LOWER(a) = LOWER(b))
    EqualIgnoreCase,
    /// Value is in a list (= ANY)
    In,
    /// Value is null (IS NULL)
    IsNull,
    /// Value is not null (IS NOT NULL)
    IsNotNull,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "="),
            Self::NotEqual => write!(f, "<>"),
            Self::GreaterThan => write!(f, ">"),
            Self::GreaterThanOrEqual => write!(f, ">="),
            Self::LessThan => write!(f, "<"),
            Self::LessThanOrEqual => write!(f, "<="),
            Self::Like => write!(f, "LIKE"),
            Self::ILike => write!(f, "ILIKE"),
            Self::EqualIgnoreCase => write!(f, "= (ignore case)"),
            Self::In => write!(f, "IN"),
            Self::IsNull => write!(f, "IS NULL"),
            Self::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// A single filter condition
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    /// The column to filter on
    pub field: String,
    /// The comparison operator
    pub operator: FilterOperator,
    /// The value to compare against
    pub value: SqlValue,
}

impl FilterCondition {
    /// Create a new filter condition
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: SqlValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Equality filter (field = value)
    pub fn eq(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::new(field, FilterOperator::Equal, value.into())
    }

    /// Not-equal filter (field <> value)
    pub fn ne(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::new(field, FilterOperator::NotEqual, value.into())
    }

    /// Greater-than filter
    pub fn gt(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::new(field, FilterOperator::GreaterThan, value.into())
    }

    /// Greater-than-or-equal filter
    pub fn gte(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::new(field, FilterOperator::GreaterThanOrEqual, value.into())
    }

    /// Less-than filter
    pub fn lt(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::new(field, FilterOperator::LessThan, value.into())
    }

    /// Less-than-or-equal filter
    pub fn lte(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::new(field, FilterOperator::LessThanOrEqual, value.into())
    }

    /// LIKE pattern filter
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::Like, SqlValue::String(pattern.into()))
    }

    /// ILIKE pattern filter
    pub fn ilike(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::ILike, SqlValue::String(pattern.into()))
    }

    /// Case-insensitive equality filter for strings
    pub fn eq_ignore_case(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(
            field,
            FilterOperator::EqualIgnoreCase,
            SqlValue::String(value.into()),
        )
    }

    /// IN list filter
    pub fn in_list(field: impl Into<String>, values: impl Into<SqlValue>) -> Self {
        Self::new(field, FilterOperator::In, values.into())
    }

    /// IS NULL filter
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNull, SqlValue::Null)
    }

    /// IS NOT NULL filter
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNotNull, SqlValue::Null)
    }
}

/// A composable boolean expression over filter conditions
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// A single comparison
    Condition(FilterCondition),
    /// Logical AND; an empty list is TRUE
    All(Vec<Predicate>),
    /// Logical OR; an empty list is FALSE
    Any(Vec<Predicate>),
    /// Logical NOT
    Not(Box<Predicate>),
    /// Case-insensitive substring match of `term` against any of `fields`
    Search {
        /// Columns to search
        fields: Vec<String>,
        /// Raw search term (wildcards are escaped when rendered)
        term: String,
    },
}

impl Predicate {
    /// Conjunction of predicates
    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self::All(predicates.into_iter().collect())
    }

    /// Disjunction of predicates
    pub fn any(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self::Any(predicates.into_iter().collect())
    }

    /// Negation of a predicate
    #[allow(clippy::should_implement_trait)]
    pub fn not(predicate: Predicate) -> Self {
        Self::Not(Box::new(predicate))
    }

    /// AND this predicate with another, flattening nested conjunctions
    #[must_use]
    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Self::All(mut left), Self::All(right)) => {
                left.extend(right);
                Self::All(left)
            }
            (Self::All(mut left), other) => {
                left.push(other);
                Self::All(left)
            }
            (this, Self::All(mut right)) => {
                right.insert(0, this);
                Self::All(right)
            }
            (this, other) => Self::All(vec![this, other]),
        }
    }

    /// Whether the predicate is an empty conjunction (always true)
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::All(items) if items.iter().all(Predicate::is_empty))
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Self::All(Vec::new())
    }
}

impl From<FilterCondition> for Predicate {
    fn from(condition: FilterCondition) -> Self {
        Self::Condition(condition)
    }
}
