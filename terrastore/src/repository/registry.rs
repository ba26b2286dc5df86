//! Startup-time repository factory
//!
//! The registry owns what every repository of a process shares: the pool,
//! the catalog introspector (and therefore its dependents cache) and the
//! engine settings. Entity modules ask it for repositories.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use super::catalog::{CatalogIntrospector, ForeignKeyEdge};
use super::config::RepositoryConfig;
use super::core::Repository;
use super::error::RepositoryResult;
use super::table::Table;
use super::traits::Entity;
use super::transaction::TransactionHandle;
use crate::config::{Config, RepositorySettings};
use crate::database::create_pool;
use crate::error::{Error, Result};

/// Shared pool, introspector and settings for all repositories
#[derive(Debug, Clone)]
pub struct RepositoryRegistry {
    pool: PgPool,
    introspector: Arc<CatalogIntrospector>,
    settings: Arc<RepositorySettings>,
}

impl RepositoryRegistry {
    /// Create a registry over an existing pool
    pub fn new(pool: PgPool, settings: RepositorySettings) -> Self {
        let introspector = Arc::new(CatalogIntrospector::from_settings(&settings));
        Self {
            pool,
            introspector,
            settings: Arc::new(settings),
        }
    }

    /// Create a registry with a caller-built introspector
    pub fn with_introspector(
        pool: PgPool,
        settings: RepositorySettings,
        introspector: CatalogIntrospector,
    ) -> Self {
        Self {
            pool,
            introspector: Arc::new(introspector),
            settings: Arc::new(settings),
        }
    }

    /// Connect using the `[database]` section of `config`
    pub async fn connect(config: &Config) -> Result<Self> {
        let database = config.database.as_ref().ok_or_else(|| {
            Error::Config(Box::new(figment::Error::from(
                "No [database] section configured".to_string(),
            )))
        })?;
        let pool = create_pool(database).await?;
        info!(
            service = %config.service.name,
            introspection = config.repository.catalog_introspection,
            "Repository registry ready"
        );
        Ok(Self::new(pool, config.repository.clone()))
    }

    /// Create a repository for entity `E` stored in `table`
    pub fn create_repository<E: Entity>(
        &self,
        table: Table,
        entity_name: impl Into<String>,
        config: RepositoryConfig,
    ) -> Repository<E> {
        Repository::new(
            self.pool.clone(),
            table,
            entity_name,
            config,
            Arc::clone(&self.introspector),
            Arc::clone(&self.settings),
        )
    }

    /// Declare a foreign-key dependent of `parent_table`
    ///
    /// Declared dependents take precedence over catalog discovery.
    pub fn declare_dependent(&self, parent_table: &Table, edge: ForeignKeyEdge) {
        self.introspector.declare_dependent(parent_table.name, edge);
    }

    /// Begin a transaction several repositories can join via
    /// [`Repository::with_transaction`]
    pub async fn begin(&self) -> RepositoryResult<TransactionHandle> {
        TransactionHandle::begin(&self.pool).await
    }

    /// The shared pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The shared catalog introspector
    pub fn introspector(&self) -> &Arc<CatalogIntrospector> {
        &self.introspector
    }

    /// The engine settings
    pub fn settings(&self) -> &RepositorySettings {
        &self.settings
    }
}
