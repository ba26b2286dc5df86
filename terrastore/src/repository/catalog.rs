//! Foreign-key dependent discovery
//!
//! Before soft-deleting a row the engine needs every table whose foreign key
//! points at it. Edges come from two places: declarations registered at
//! startup, which always win, and the Postgres `information_schema`, queried
//! once per parent table and cached for the lifetime of the introspector.
//! The cache is append-only and never invalidated; schema changes require a
//! new introspector.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use sqlx::PgConnection;
use tracing::{debug, info};

use super::error::{RepositoryOperation, RepositoryResult};
use super::table::Table;
use super::translate::translate_error;
use crate::config::RepositorySettings;

/// A foreign key from a dependent table to a parent table's primary key
#[derive(Debug, Clone, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct ForeignKeyEdge {
    /// Table holding the reference
    pub dependent_table: String,
    /// Column holding the reference
    pub dependent_column: String,
    /// Whether the dependent table has the soft-delete column
    pub dependent_has_soft_delete: bool,
}

impl ForeignKeyEdge {
    /// Describe an edge
    pub fn new(
        dependent_table: impl Into<String>,
        dependent_column: impl Into<String>,
        dependent_has_soft_delete: bool,
    ) -> Self {
        Self {
            dependent_table: dependent_table.into(),
            dependent_column: dependent_column.into(),
            dependent_has_soft_delete,
        }
    }
}

const DEPENDENTS_QUERY: &str = r#"
SELECT
    kcu.table_name::text AS dependent_table,
    kcu.column_name::text AS dependent_column,
    EXISTS (
        SELECT 1
        FROM information_schema.columns c
        WHERE c.table_schema = kcu.table_schema
          AND c.table_name = kcu.table_name
          AND c.column_name::text = $3
    ) AS dependent_has_soft_delete
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON kcu.constraint_name = tc.constraint_name
 AND kcu.constraint_schema = tc.constraint_schema
JOIN information_schema.constraint_column_usage ccu
  ON ccu.constraint_name = tc.constraint_name
 AND ccu.constraint_schema = tc.constraint_schema
WHERE tc.constraint_type = 'FOREIGN KEY'
  AND tc.table_schema::text = COALESCE($1, current_schema())
  AND ccu.table_name::text = $2
  AND ccu.column_name::text = $4
ORDER BY kcu.table_name, kcu.column_name
"#;

/// Resolves and caches the foreign-key dependents of parent tables
#[derive(Debug)]
pub struct CatalogIntrospector {
    declared: DashMap<String, Vec<ForeignKeyEdge>>,
    discovered: DashMap<String, Arc<[ForeignKeyEdge]>>,
    introspection_enabled: bool,
    schema: Option<String>,
    soft_delete_column: String,
}

impl CatalogIntrospector {
    /// Create an introspector
    ///
    /// `schema` of `None` means the connection's `current_schema()`.
    pub fn new(introspection_enabled: bool, schema: Option<String>) -> Self {
        Self {
            declared: DashMap::new(),
            discovered: DashMap::new(),
            introspection_enabled,
            schema,
            soft_delete_column: "deleted_at".to_string(),
        }
    }

    /// Create an introspector from engine settings
    pub fn from_settings(settings: &RepositorySettings) -> Self {
        Self::new(settings.catalog_introspection, settings.catalog_schema.clone())
    }

    /// Use a different soft-delete column name when probing dependent tables
    #[must_use]
    pub fn with_soft_delete_column(mut self, column: impl Into<String>) -> Self {
        self.soft_delete_column = column.into();
        self
    }

    /// Register a dependent of `parent_table`
    ///
    /// Once a table has declarations, the catalog is never queried for it.
    pub fn declare_dependent(&self, parent_table: impl Into<String>, edge: ForeignKeyEdge) {
        let parent_table = parent_table.into();
        debug!(
            parent_table = %parent_table,
            dependent_table = %edge.dependent_table,
            dependent_column = %edge.dependent_column,
            "Declared foreign-key dependent"
        );
        let mut edges = self.declared.entry(parent_table).or_default();
        if !edges.contains(&edge) {
            edges.push(edge);
        }
    }

    /// Register every edge in `dependents`, keyed by parent table
    pub fn declare_all(&self, dependents: HashMap<String, Vec<ForeignKeyEdge>>) {
        for (parent_table, edges) in dependents {
            for edge in edges {
                self.declare_dependent(parent_table.clone(), edge);
            }
        }
    }

    /// Declared or cached edges for `table_name`, without touching the database
    pub fn lookup(&self, table_name: &str) -> Option<Arc<[ForeignKeyEdge]>> {
        if let Some(edges) = self.declared.get(table_name) {
            return Some(Arc::from(edges.as_slice()));
        }
        self.discovered.get(table_name).map(|edges| Arc::clone(&edges))
    }

    /// Parent tables whose dependents have been discovered from the catalog
    pub fn cached_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.discovered.iter().map(|e| e.key().clone()).collect();
        tables.sort();
        tables
    }

    /// Whether catalog queries are allowed
    pub fn is_introspection_enabled(&self) -> bool {
        self.introspection_enabled
    }

    /// Column probed on dependent tables to decide whether a reference is active
    pub fn soft_delete_column(&self) -> &str {
        &self.soft_delete_column
    }

    /// Resolve the dependents of `table`
    ///
    /// Declared edges win, then the cache, then one catalog query whose result
    /// is cached. With introspection disabled an undeclared table has no
    /// dependents.
    pub async fn discover_dependents(
        &self,
        connection: &mut PgConnection,
        table: &Table,
    ) -> RepositoryResult<Arc<[ForeignKeyEdge]>> {
        if let Some(edges) = self.lookup(table.name) {
            debug!(table = table.name, dependents = edges.len(), "Using known dependents");
            return Ok(edges);
        }

        if !self.introspection_enabled {
            return Ok(Arc::from(Vec::new()));
        }

        let edges: Vec<ForeignKeyEdge> = sqlx::query_as(DEPENDENTS_QUERY)
            .bind(self.schema.as_deref())
            .bind(table.name)
            .bind(&self.soft_delete_column)
            .bind(table.primary_key)
            .fetch_all(connection)
            .await
            .map_err(|e| translate_error(e, RepositoryOperation::Introspect, table.name))?;

        info!(
            table = table.name,
            dependents = edges.len(),
            "Discovered foreign-key dependents from catalog"
        );

        let edges: Arc<[ForeignKeyEdge]> = Arc::from(edges);
        let cached = self
            .discovered
            .entry(table.name.to_string())
            .or_insert(edges);
        Ok(Arc::clone(&cached))
    }
}

impl Default for CatalogIntrospector {
    fn default() -> Self {
        Self::new(true, None)
    }
}
