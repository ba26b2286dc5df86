//! Entity trait definitions
//!
//! An entity module implements [`Entity`] for its row type and
//! [`IntoColumnValues`] for its create and update payloads. The repository
//! needs nothing else to serve it.
//!
//! # Example
//!
//! ```rust
//! use terrastore::repository::{Entity, IntoColumnValues, SqlValue};
//! use uuid::Uuid;
//!
//! #[derive(Debug, sqlx::FromRow)]
//! struct Country {
//!     id: Uuid,
//!     name: String,
//!     code: String,
//! }
//!
//! struct NewCountry {
//!     name: String,
//!     code: String,
//! }
//!
//! impl IntoColumnValues for NewCountry {
//!     fn into_column_values(self) -> Vec<(&'static str, SqlValue)> {
//!         vec![("name", self.name.into()), ("code", self.code.into())]
//!     }
//! }
//!
//! #[derive(Default)]
//! struct CountryChanges {
//!     name: Option<String>,
//! }
//!
//! impl IntoColumnValues for CountryChanges {
//!     fn into_column_values(self) -> Vec<(&'static str, SqlValue)> {
//!         self.name.map(|name| ("name", name.into())).into_iter().collect()
//!     }
//! }
//!
//! impl Entity for Country {
//!     type Id = Uuid;
//!     type Create = NewCountry;
//!     type Update = CountryChanges;
//! }
//! ```

use std::fmt::Display;

use sqlx::postgres::PgRow;
use sqlx::FromRow;

use super::filter::SqlValue;

/// A payload that can be written as `(column, value)` pairs
///
/// Update payloads list only the columns that change; absent optional fields
/// are simply left out.
pub trait IntoColumnValues {
    /// The column assignments, in insertion order
    fn into_column_values(self) -> Vec<(&'static str, SqlValue)>;
}

impl IntoColumnValues for Vec<(&'static str, SqlValue)> {
    fn into_column_values(self) -> Vec<(&'static str, SqlValue)> {
        self
    }
}

/// A row type served by a repository
pub trait Entity: for<'r> FromRow<'r, PgRow> + Send + Sync + Unpin + 'static {
    /// Primary-key type
    type Id: Clone + Display + Into<SqlValue> + Send + Sync;
    /// Payload accepted by `create`
    type Create: IntoColumnValues + Send;
    /// Payload accepted by `update`
    type Update: IntoColumnValues + Send;
}
