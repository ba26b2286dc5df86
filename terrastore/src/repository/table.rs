//! Table descriptors
//!
//! A [`Table`] is the static shape the engine needs to build SQL for an
//! entity: the table name, the primary-key column, the declared columns with
//! their SQL types, and the soft-delete / updated-at bookkeeping columns.
//! Descriptors are `const` so entity modules can declare them once.
//!
//! ```rust
//! use terrastore::repository::{Column, Table};
//!
//! pub const CITIES: Table = Table::new(
//!     "cities",
//!     &[
//!         Column::uuid("id"),
//!         Column::text("name"),
//!         Column::uuid("state_id"),
//!         Column::timestamp("created_at"),
//!         Column::timestamp("updated_at"),
//!         Column::timestamp("deleted_at"),
//!     ],
//! );
//!
//! assert!(CITIES.has_column("state_id"));
//! assert!(CITIES.has_soft_delete_column());
//! ```

use std::fmt;

use super::error::{RepositoryError, RepositoryResult};

/// SQL type of a declared column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// `text` / `varchar`
    Text,
    /// `integer` (int4)
    Integer,
    /// `bigint` (int8)
    BigInt,
    /// `double precision` / `real` / `numeric`
    Float,
    /// `boolean`
    Boolean,
    /// `uuid`
    Uuid,
    /// `timestamptz` / `timestamp`
    Timestamp,
    /// `jsonb` / `json`
    Json,
}

impl ColumnType {
    /// Whether values of this type are compared as text
    pub const fn is_textual(&self) -> bool {
        matches!(self, Self::Text)
    }

    /// Postgres type name used when a text parameter has to be cast
    pub const fn sql_type(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::BigInt => "bigint",
            Self::Float => "double precision",
            Self::Boolean => "boolean",
            Self::Uuid => "uuid",
            Self::Timestamp => "timestamptz",
            Self::Json => "jsonb",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Integer => write!(f, "integer"),
            Self::BigInt => write!(f, "bigint"),
            Self::Float => write!(f, "float"),
            Self::Boolean => write!(f, "boolean"),
            Self::Uuid => write!(f, "uuid"),
            Self::Timestamp => write!(f, "timestamp"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// A declared column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Column {
    /// Column name as it appears in the database
    pub name: &'static str,
    /// SQL type
    pub ty: ColumnType,
}

impl Column {
    /// Declare a column with an explicit type
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self { name, ty }
    }

    /// Declare a `text` column
    pub const fn text(name: &'static str) -> Self {
        Self::new(name, ColumnType::Text)
    }

    /// Declare an `integer` column
    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    /// Declare a `bigint` column
    pub const fn big_int(name: &'static str) -> Self {
        Self::new(name, ColumnType::BigInt)
    }

    /// Declare a floating point column
    pub const fn float(name: &'static str) -> Self {
        Self::new(name, ColumnType::Float)
    }

    /// Declare a `boolean` column
    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, ColumnType::Boolean)
    }

    /// Declare a `uuid` column
    pub const fn uuid(name: &'static str) -> Self {
        Self::new(name, ColumnType::Uuid)
    }

    /// Declare a timestamp column
    pub const fn timestamp(name: &'static str) -> Self {
        Self::new(name, ColumnType::Timestamp)
    }

    /// Declare a `jsonb` column
    pub const fn json(name: &'static str) -> Self {
        Self::new(name, ColumnType::Json)
    }
}

/// Static description of a relational table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    /// Table name
    pub name: &'static str,
    /// Primary-key column
    pub primary_key: &'static str,
    /// Declared columns
    pub columns: &'static [Column],
    /// Column holding the soft-delete timestamp
    pub soft_delete_column: &'static str,
    /// Column stamped on every update, if the table has one
    pub updated_at_column: Option<&'static str>,
}

impl Table {
    /// Describe a table with the conventional `id`, `deleted_at` and
    /// `updated_at` columns
    pub const fn new(name: &'static str, columns: &'static [Column]) -> Self {
        Self {
            name,
            primary_key: "id",
            columns,
            soft_delete_column: "deleted_at",
            updated_at_column: Some("updated_at"),
        }
    }

    /// Override the primary-key column
    #[must_use]
    pub const fn with_primary_key(mut self, primary_key: &'static str) -> Self {
        self.primary_key = primary_key;
        self
    }

    /// Override the soft-delete column
    #[must_use]
    pub const fn with_soft_delete_column(mut self, column: &'static str) -> Self {
        self.soft_delete_column = column;
        self
    }

    /// Override (or remove) the updated-at column
    #[must_use]
    pub const fn with_updated_at_column(mut self, column: Option<&'static str>) -> Self {
        self.updated_at_column = column;
        self
    }

    /// Find a declared column by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Whether a column with this name is declared
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Whether the soft-delete column is declared on this table
    pub fn has_soft_delete_column(&self) -> bool {
        self.has_column(self.soft_delete_column)
    }

    /// Resolve a column name, failing with `Validation` for undeclared columns
    pub fn require_column(&self, name: &str) -> RepositoryResult<&Column> {
        self.column(name).ok_or_else(|| {
            RepositoryError::validation(format!(
                "Unknown column '{}' on table '{}'",
                name, self.name
            ))
        })
    }

    /// Quoted table name, e.g. `"cities"`
    pub fn quoted_name(&self) -> String {
        quote_ident(self.name)
    }

    /// Table-qualified, quoted column reference, e.g. `"cities"."name"`
    pub fn qualified(&self, column: &str) -> String {
        format!("{}.{}", quote_ident(self.name), quote_ident(column))
    }
}

/// Quote an SQL identifier
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
