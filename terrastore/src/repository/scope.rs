//! Named, reusable query scopes
//!
//! A scope is a named predicate fragment such as `active`, or a parameterised
//! one such as `in_state` that takes its argument when queued.
//! [`ScopedRepository::scope`] queues scopes by name; the next terminal read
//! ANDs them with its own filters and search, and clears the queue. The queue
//! is cleared before the read runs, so a failed read does not leak scopes
//! into the next one.
//!
//! ```rust,ignore
//! let scopes = Scopes::new()
//!     .define("active", || FilterCondition::eq("status", "active").into())
//!     .define("large", || FilterCondition::gte("population", 1_000_000_i64).into())
//!     .define_with("in_state", |state_id| FilterCondition::eq("state_id", state_id).into());
//!
//! let cities = registry
//!     .create_repository::<City>(CITIES, "City", RepositoryConfig::new())
//!     .with_scopes(scopes);
//!
//! let big_active = cities.scope("active")?.scope("large")?.find_all(FindOptions::new()).await?;
//! let local = cities.scope_with("in_state", state.id)?.count_all(FindOptions::new()).await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use super::core::Repository;
use super::error::{RepositoryError, RepositoryOperation, RepositoryResult};
use super::filter::{FilterCondition, Predicate, SqlValue};
use super::pagination::{PageRequest, PaginatedResult};
use super::query::FindOptions;
use super::traits::Entity;

/// Builds a scope's predicate
pub type ScopeFn = Arc<dyn Fn() -> Predicate + Send + Sync>;

/// Builds a parameterised scope's predicate from its argument
pub type ParameterisedScopeFn = Arc<dyn Fn(SqlValue) -> Predicate + Send + Sync>;

#[derive(Clone)]
enum ScopeDefinition {
    Fixed(ScopeFn),
    Parameterised(ParameterisedScopeFn),
}

/// A set of named scope definitions
#[derive(Clone, Default)]
pub struct Scopes {
    definitions: HashMap<String, ScopeDefinition>,
}

impl Scopes {
    /// No scopes
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or replace) the scope `name`
    #[must_use]
    pub fn define(
        mut self,
        name: impl Into<String>,
        build: impl Fn() -> Predicate + Send + Sync + 'static,
    ) -> Self {
        self.definitions
            .insert(name.into(), ScopeDefinition::Fixed(Arc::new(build)));
        self
    }

    /// Define (or replace) the scope `name`, built from one argument
    #[must_use]
    pub fn define_with(
        mut self,
        name: impl Into<String>,
        build: impl Fn(SqlValue) -> Predicate + Send + Sync + 'static,
    ) -> Self {
        self.definitions
            .insert(name.into(), ScopeDefinition::Parameterised(Arc::new(build)));
        self
    }

    /// Build the predicate of the argument-less scope `name`
    pub fn resolve(&self, name: &str) -> Option<Predicate> {
        match self.definitions.get(name)? {
            ScopeDefinition::Fixed(build) => Some(build()),
            ScopeDefinition::Parameterised(_) => None,
        }
    }

    /// Build the predicate of the parameterised scope `name` for `argument`
    pub fn resolve_with(&self, name: &str, argument: SqlValue) -> Option<Predicate> {
        match self.definitions.get(name)? {
            ScopeDefinition::Parameterised(build) => Some(build(argument)),
            ScopeDefinition::Fixed(_) => None,
        }
    }

    /// Whether `name` is defined and takes an argument
    pub fn takes_argument(&self, name: &str) -> Option<bool> {
        self.definitions
            .get(name)
            .map(|definition| matches!(definition, ScopeDefinition::Parameterised(_)))
    }

    /// Defined scope names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Scopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scopes").field("names", &self.names()).finish()
    }
}

/// A repository with queued named scopes
///
/// The queue belongs to this value; share the underlying [`Repository`]
/// rather than a `ScopedRepository` between concurrent callers.
pub struct ScopedRepository<E: Entity> {
    repository: Repository<E>,
    scopes: Scopes,
    pending: Mutex<Vec<Predicate>>,
}

impl<E: Entity> ScopedRepository<E> {
    /// Wrap `repository` with `scopes`
    pub fn new(repository: Repository<E>, scopes: Scopes) -> Self {
        Self {
            repository,
            scopes,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// The unscoped repository, for writes
    pub fn repository(&self) -> &Repository<E> {
        &self.repository
    }

    /// Queue the scope `name` for the next terminal read
    pub fn scope(&self, name: &str) -> RepositoryResult<&Self> {
        let predicate = self
            .scopes
            .resolve(name)
            .ok_or_else(|| self.scope_error(name))?;
        self.lock_pending().push(predicate);
        Ok(self)
    }

    /// Queue the parameterised scope `name` with `argument`
    pub fn scope_with(
        &self,
        name: &str,
        argument: impl Into<SqlValue>,
    ) -> RepositoryResult<&Self> {
        let predicate = self
            .scopes
            .resolve_with(name, argument.into())
            .ok_or_else(|| self.scope_error(name))?;
        self.lock_pending().push(predicate);
        Ok(self)
    }

    fn scope_error(&self, name: &str) -> RepositoryError {
        let entity = self.repository.entity_name();
        let message = match self.scopes.takes_argument(name) {
            Some(true) => format!("Scope '{name}' on {entity} requires an argument"),
            Some(false) => format!("Scope '{name}' on {entity} takes no argument"),
            None => format!(
                "Unknown scope '{name}' on {entity}; defined scopes: [{}]",
                self.scopes.names().join(", ")
            ),
        };
        RepositoryError::validation(message).with_operation(RepositoryOperation::FindAll)
    }

    /// Number of queued scopes
    pub fn pending_scopes(&self) -> usize {
        self.lock_pending().len()
    }

    /// Drop every queued scope
    pub fn clear_scopes(&self) {
        self.lock_pending().clear();
    }

    /// Scoped [`Repository::find_all`]
    pub async fn find_all(&self, options: FindOptions) -> RepositoryResult<Vec<E>> {
        let scopes = self.take_pending();
        self.repository.find_all_with(&options, scopes).await
    }

    /// Scoped [`Repository::find_all_paginated`]
    pub async fn find_all_paginated(
        &self,
        options: FindOptions,
        page: PageRequest,
    ) -> RepositoryResult<PaginatedResult<E>> {
        let scopes = self.take_pending();
        self.repository
            .find_all_paginated_with(&options, page, scopes)
            .await
    }

    /// Scoped [`Repository::find_one`]
    pub async fn find_one(&self, id: &E::Id) -> RepositoryResult<E> {
        let scopes = self.take_pending();
        self.repository
            .find_one_where(id, scopes, RepositoryOperation::FindOne)
            .await
    }

    /// Scoped [`Repository::find_one_by`]
    pub async fn find_one_by(&self, filters: Vec<FilterCondition>) -> RepositoryResult<Option<E>> {
        let scopes = self.take_pending();
        self.repository
            .find_one_by_with(&FindOptions::from_filters(filters), scopes)
            .await
    }

    /// Scoped [`Repository::find_by`]
    pub async fn find_by(&self, filters: Vec<FilterCondition>) -> RepositoryResult<Vec<E>> {
        let scopes = self.take_pending();
        self.repository
            .find_all_with(&FindOptions::from_filters(filters), scopes)
            .await
    }

    /// Scoped [`Repository::count_all`]
    pub async fn count_all(&self, options: FindOptions) -> RepositoryResult<u64> {
        let scopes = self.take_pending();
        self.repository.count_with(&options, scopes).await
    }

    fn take_pending(&self) -> Vec<Predicate> {
        std::mem::take(&mut *self.lock_pending())
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Vec<Predicate>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: Entity> fmt::Debug for ScopedRepository<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedRepository")
            .field("repository", &self.repository)
            .field("scopes", &self.scopes)
            .field("pending", &self.pending_scopes())
            .finish()
    }
}

impl<E: Entity> Repository<E> {
    /// Wrap this repository with named scopes
    pub fn with_scopes(self, scopes: Scopes) -> ScopedRepository<E> {
        ScopedRepository::new(self, scopes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositorySettings;
    use crate::repository::{CatalogIntrospector, Column, RepositoryConfig, RepositoryErrorKind, Table};
    use uuid::Uuid;

    const PORTS: Table = Table::new(
        "ports",
        &[
            Column::uuid("id"),
            Column::text("name"),
            Column::text("status"),
            Column::integer("berths"),
        ],
    );

    #[derive(Debug, sqlx::FromRow)]
    struct Port {
        #[allow(dead_code)]
        id: Uuid,
    }

    impl Entity for Port {
        type Id = Uuid;
        type Create = Vec<(&'static str, crate::repository::SqlValue)>;
        type Update = Vec<(&'static str, crate::repository::SqlValue)>;
    }

    fn scopes() -> Scopes {
        Scopes::new()
            .define("active", || FilterCondition::eq("status", "active").into())
            .define("large", || FilterCondition::gte("berths", 10_i64).into())
            .define_with("min_berths", |berths| {
                FilterCondition::gte("berths", berths).into()
            })
    }

    fn scoped_ports() -> ScopedRepository<Port> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/terrastore")
            .unwrap();
        Repository::<Port>::new(
            pool,
            PORTS,
            "Port",
            RepositoryConfig::new(),
            Arc::new(CatalogIntrospector::default()),
            Arc::new(RepositorySettings::default()),
        )
        .with_scopes(scopes())
    }

    #[test]
    fn test_scope_names_sorted() {
        assert_eq!(scopes().names(), vec!["active", "large", "min_berths"]);
        assert!(scopes().resolve("missing").is_none());
    }

    #[tokio::test]
    async fn test_scopes_accumulate() {
        let ports = scoped_ports();
        ports.scope("active").unwrap().scope("large").unwrap();
        assert_eq!(ports.pending_scopes(), 2);

        ports.clear_scopes();
        assert_eq!(ports.pending_scopes(), 0);
    }

    #[tokio::test]
    async fn test_unknown_scope_is_validation_error() {
        let ports = scoped_ports();
        let err = ports.scope("archived").unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::Validation);
        assert_eq!(err.operation, RepositoryOperation::FindAll);
        assert!(err.message.contains("archived"));
        assert_eq!(ports.pending_scopes(), 0);
    }

    #[tokio::test]
    async fn test_parameterised_scope_needs_its_argument() {
        let ports = scoped_ports();

        let err = ports.scope("min_berths").unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::Validation);
        assert!(err.message.contains("requires an argument"));

        let err = ports.scope_with("active", 3_i64).unwrap_err();
        assert!(err.message.contains("takes no argument"));
        assert_eq!(ports.pending_scopes(), 0);

        ports.scope_with("min_berths", 3_i64).unwrap().scope("active").unwrap();
        assert_eq!(ports.pending_scopes(), 2);
    }

    #[tokio::test]
    async fn test_parameterised_scope_binds_its_argument() {
        let ports = scoped_ports();
        let min_berths = scopes().resolve_with("min_berths", SqlValue::Integer(4)).unwrap();
        let expressions = ports
            .repository()
            .build_query_expressions(&FindOptions::new().with_predicate(min_berths))
            .unwrap();

        let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new("SELECT * FROM ports");
        expressions.push_where(&mut builder);
        assert_eq!(
            builder.sql(),
            r#"SELECT * FROM ports WHERE "ports"."berths" >= $1"#
        );
    }

    #[tokio::test]
    async fn test_terminal_call_clears_scopes_even_on_failure() {
        let ports = scoped_ports();
        ports.scope("active").unwrap();

        // Search without searchable fields fails before any SQL is sent.
        let result = ports.find_all(FindOptions::new().with_search("x")).await;
        assert!(result.is_err());
        assert_eq!(ports.pending_scopes(), 0);
    }

    #[tokio::test]
    async fn test_scoped_predicate_renders() {
        let ports = scoped_ports();
        let active = scopes().resolve("active").unwrap();
        let expressions = ports
            .repository()
            .build_query_expressions(&FindOptions::new().with_predicate(active))
            .unwrap();

        let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new("SELECT * FROM ports");
        expressions.push_where(&mut builder);
        assert_eq!(
            builder.sql(),
            r#"SELECT * FROM ports WHERE "ports"."status" = $1"#
        );
    }
}
