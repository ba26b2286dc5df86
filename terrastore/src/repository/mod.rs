//! Generic repository engine
//!
//! One parameterised data-access layer for every entity table:
//!
//! - **CRUD and pagination**: [`Repository`] with [`FindOptions`] and [`PageRequest`]
//! - **Search**: case-insensitive, optionally accent-insensitive substring search
//! - **Uniqueness**: [`Repository::check_uniqueness`] ignores case and soft-deleted rows
//! - **Soft delete**: refused while active dependents reference the row
//! - **Dependents**: [`CatalogIntrospector`] with declared and discovered foreign keys
//! - **Transactions**: [`Repository::transaction`] and shared [`TransactionHandle`]s
//! - **Scopes**: [`ScopedRepository`] for named, reusable predicates
//! - **Errors**: a closed [`RepositoryErrorKind`] set, with driver errors translated
//!
//! # Example
//!
//! ```rust,ignore
//! use terrastore::repository::{
//!     Column, FindOptions, OrderDirection, PageRequest, RepositoryConfig, RepositoryRegistry, Table,
//! };
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
//! let registry = RepositoryRegistry::connect(&config).await?;
//! let cities = registry.create_repository::<City>(
//!     CITIES,
//!     "City",
//!     RepositoryConfig::new()
//!         .with_searchable_fields(["name"])
//!         .with_soft_delete(true),
//! );
//!
//! let page = cities
//!     .find_all_paginated(
//!         FindOptions::new()
//!             .with_filter("state_id", state_id)
//!             .with_search("spring")
//!             .order_by("name", OrderDirection::Ascending),
//!         PageRequest::new(1, 20),
//!     )
//!     .await?;
//! ```

mod catalog;
mod config;
mod core;
mod error;
mod filter;
mod pagination;
mod query;
mod registry;
mod scope;
mod table;
mod traits;
mod transaction;
mod translate;

pub use catalog::{CatalogIntrospector, ForeignKeyEdge};
pub use config::{RepositoryConfig, UniqueField, UniquenessConflict};
pub use self::core::Repository;
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult};
pub use filter::{FilterCondition, FilterOperator, Predicate, SqlValue};
pub use pagination::{OrderBy, OrderDirection, PageRequest, PaginatedResult, PaginationMeta};
pub use query::{compose, like_pattern, FindOptions, QueryExpressions};
pub use registry::RepositoryRegistry;
pub use scope::{ParameterisedScopeFn, ScopeFn, ScopedRepository, Scopes};
pub use table::{quote_ident, Column, ColumnType, Table};
pub use traits::{Entity, IntoColumnValues};
pub use transaction::{DbConnection, TransactionHandle};
pub use translate::{
    normalize_key_expression, translate_error, translate_failure, DbFailure, CHECK_VIOLATION,
    FOREIGN_KEY_VIOLATION, NOT_NULL_VIOLATION, UNIQUE_VIOLATION,
};
