//! # terrastore
//!
//! Generic PostgreSQL repository engine built on sqlx.
//!
//! ## Features
//!
//! - **CRUD and pagination**: one [`Repository`](repository::Repository) per entity table
//! - **Search**: case-insensitive, optionally accent-insensitive substring search
//! - **Soft delete**: dependency-aware, with restore and force delete
//! - **Uniqueness checks**: case-insensitive, ignoring soft-deleted rows
//! - **Transactions**: closure-scoped or shared across repositories
//! - **Scopes**: named, reusable query predicates
//! - **Configuration**: layered figment config (files, XDG, environment)
//!
//! ## Example
//!
//! ```rust,no_run
//! use terrastore::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let registry = RepositoryRegistry::connect(&config).await?;
//!     tracing::info!(tables = ?registry.introspector().cached_tables(), "ready");
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod observability;
pub mod repository;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, DatabaseConfig, LogFormat, RepositorySettings, ServiceConfig};
    pub use crate::database::create_pool;
    pub use crate::error::{DatabaseError, DatabaseErrorKind, DatabaseOperation, Error, Result};
    pub use crate::observability::init_tracing;

    pub use crate::repository::{
        Column, ColumnType, DbConnection, Entity, FilterCondition, FilterOperator, FindOptions,
        ForeignKeyEdge, IntoColumnValues, OrderBy, OrderDirection, PageRequest, PaginatedResult,
        PaginationMeta, Predicate, Repository, RepositoryConfig, RepositoryError,
        RepositoryErrorKind, RepositoryOperation, RepositoryRegistry, RepositoryResult,
        ScopedRepository, Scopes, SqlValue, Table, TransactionHandle, UniqueField,
    };

    pub use sqlx::PgPool;
}
