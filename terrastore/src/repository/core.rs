//! The generic repository
//!
//! [`Repository<E>`] serves one entity table: reads with filters, search,
//! ordering and pagination; writes; soft delete guarded by foreign-key
//! dependents; uniqueness and relation checks; and transaction composition.
//!
//! Every read path ANDs `deleted_at IS NULL` onto its predicate when soft
//! delete is enabled, so soft-deleted rows are invisible everywhere except
//! to [`force_delete`](Repository::force_delete) and
//! [`restore`](Repository::restore).

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, warn};

use super::catalog::{CatalogIntrospector, ForeignKeyEdge};
use super::config::{RepositoryConfig, UniqueField, UniquenessConflict};
use super::error::{RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult};
use super::filter::{FilterCondition, FilterOperator, Predicate, SqlValue};
use super::pagination::{PageRequest, PaginatedResult, PaginationMeta};
use super::query::{compose, push_value, FindOptions, QueryExpressions};
use super::table::{quote_ident, Table};
use super::traits::{Entity, IntoColumnValues};
use super::transaction::{DbConnection, TransactionHandle};
use super::translate::translate_error;
use crate::config::RepositorySettings;

/// Generic repository over one entity table
pub struct Repository<E: Entity> {
    connection: DbConnection,
    table: Table,
    entity_name: Arc<str>,
    config: Arc<RepositoryConfig>,
    introspector: Arc<CatalogIntrospector>,
    settings: Arc<RepositorySettings>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            table: self.table,
            entity_name: Arc::clone(&self.entity_name),
            config: Arc::clone(&self.config),
            introspector: Arc::clone(&self.introspector),
            settings: Arc::clone(&self.settings),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("entity_name", &self.entity_name)
            .field("table", &self.table.name)
            .field("in_transaction", &self.connection.is_transaction())
            .field("config", &self.config)
            .finish()
    }
}

impl<E: Entity> Repository<E> {
    /// Create a repository
    pub fn new(
        connection: impl Into<DbConnection>,
        table: Table,
        entity_name: impl Into<String>,
        config: RepositoryConfig,
        introspector: Arc<CatalogIntrospector>,
        settings: Arc<RepositorySettings>,
    ) -> Self {
        let entity_name: String = entity_name.into();
        if config.soft_delete_enabled && !table.has_soft_delete_column() {
            warn!(
                entity = %entity_name,
                table = table.name,
                column = table.soft_delete_column,
                "Soft delete enabled but the soft-delete column is not declared"
            );
        }
        Self {
            connection: connection.into(),
            table,
            entity_name: Arc::from(entity_name),
            config: Arc::new(config),
            introspector,
            settings,
            _entity: PhantomData,
        }
    }

    /// The table this repository serves
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Entity name used in errors and logs
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Repository configuration
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Where statements are sent
    pub fn connection(&self) -> &DbConnection {
        &self.connection
    }

    /// Whether this repository is bound to a shared transaction
    pub fn is_in_transaction(&self) -> bool {
        self.connection.is_transaction()
    }

    /// A repository bound to `transaction`
    #[must_use]
    pub fn with_transaction(&self, transaction: &TransactionHandle) -> Self {
        let mut repository = self.clone();
        repository.connection = DbConnection::Transaction(transaction.clone());
        repository
    }

    /// Build the predicate and ordering a read with `options` would use
    pub fn build_query_expressions(
        &self,
        options: &FindOptions,
    ) -> RepositoryResult<QueryExpressions> {
        self.expressions(options, Vec::new(), RepositoryOperation::FindAll)
    }

    /// Find a visible row by primary key
    pub async fn find_one(&self, id: &E::Id) -> RepositoryResult<E> {
        self.find_one_where(id, Vec::new(), RepositoryOperation::FindOne)
            .await
    }

    /// Find every visible row matching `options`
    pub async fn find_all(&self, options: FindOptions) -> RepositoryResult<Vec<E>> {
        self.find_all_with(&options, Vec::new()).await
    }

    /// Find one page of visible rows matching `options`
    ///
    /// The count and the page are rendered from the same predicate.
    pub async fn find_all_paginated(
        &self,
        options: FindOptions,
        page: PageRequest,
    ) -> RepositoryResult<PaginatedResult<E>> {
        self.find_all_paginated_with(&options, page, Vec::new())
            .await
    }

    /// Find visible rows matching every condition
    pub async fn find_by(&self, filters: Vec<FilterCondition>) -> RepositoryResult<Vec<E>> {
        self.find_all(FindOptions::from_filters(filters)).await
    }

    /// Find one page of visible rows matching every condition
    pub async fn find_by_paginated(
        &self,
        filters: Vec<FilterCondition>,
        page: PageRequest,
    ) -> RepositoryResult<PaginatedResult<E>> {
        self.find_all_paginated(FindOptions::from_filters(filters), page)
            .await
    }

    /// Find the first visible row matching every condition
    pub async fn find_one_by(&self, filters: Vec<FilterCondition>) -> RepositoryResult<Option<E>> {
        self.find_one_by_with(&FindOptions::from_filters(filters), Vec::new())
            .await
    }

    /// Count visible rows matching `options`
    pub async fn count_all(&self, options: FindOptions) -> RepositoryResult<u64> {
        self.count_with(&options, Vec::new()).await
    }

    /// Whether a visible row matches every condition, optionally ignoring one id
    ///
    /// Equality against a string value ignores case.
    pub async fn exists_by(
        &self,
        conditions: Vec<FilterCondition>,
        exclude_id: Option<&E::Id>,
    ) -> RepositoryResult<bool> {
        let conditions = conditions.into_iter().map(equality_ignoring_case).collect();
        self.exists_where(conditions, exclude_id, RepositoryOperation::Exists)
            .await
    }

    /// Search the configured searchable fields
    #[deprecated(note = "use `find_all` with `FindOptions::with_search`")]
    pub async fn search(&self, term: &str) -> RepositoryResult<Vec<E>> {
        self.find_all(FindOptions::new().with_search(term)).await
    }

    /// Search the configured searchable fields, one page at a time
    #[deprecated(note = "use `find_all_paginated` with `FindOptions::with_search`")]
    pub async fn search_paginated(
        &self,
        term: &str,
        page: PageRequest,
    ) -> RepositoryResult<PaginatedResult<E>> {
        self.find_all_paginated(FindOptions::new().with_search(term), page)
            .await
    }

    pub(crate) async fn find_one_where(
        &self,
        id: &E::Id,
        extra: Vec<Predicate>,
        operation: RepositoryOperation,
    ) -> RepositoryResult<E> {
        let mut predicates = vec![self.id_predicate(id)];
        predicates.extend(extra);
        let expressions = self.expressions(&FindOptions::new(), predicates, operation)?;

        let mut builder = self.select();
        expressions.push_where(&mut builder);
        builder.push(" LIMIT 1");

        self.fetch_optional(&mut builder, operation)
            .await?
            .ok_or_else(|| self.not_found(id, operation))
    }

    pub(crate) async fn find_all_with(
        &self,
        options: &FindOptions,
        extra: Vec<Predicate>,
    ) -> RepositoryResult<Vec<E>> {
        let operation = RepositoryOperation::FindAll;
        let expressions = self.expressions(options, extra, operation)?;

        let mut builder = self.select();
        expressions.push_where(&mut builder);
        expressions.push_order_by(&mut builder);

        self.fetch_all(&mut builder, operation).await
    }

    pub(crate) async fn find_all_paginated_with(
        &self,
        options: &FindOptions,
        page: PageRequest,
        extra: Vec<Predicate>,
    ) -> RepositoryResult<PaginatedResult<E>> {
        let operation = RepositoryOperation::FindAll;
        let expressions = self.expressions(options, extra, operation)?;
        let (current_page, page_size) = page.resolve(
            self.settings.default_page_size,
            self.settings.max_page_size,
        );

        let total_count = self.count_expressions(&expressions, operation).await?;
        let pagination = PaginationMeta::new(current_page, page_size, total_count);

        let mut builder = self.select();
        expressions.push_where(&mut builder);
        expressions.push_order_by(&mut builder);
        builder.push(" LIMIT ");
        builder.push_bind(i64::from(page_size));
        builder.push(" OFFSET ");
        builder.push_bind(i64::try_from(pagination.offset()).unwrap_or(i64::MAX));

        let data = self.fetch_all(&mut builder, operation).await?;
        Ok(PaginatedResult::new(data, pagination))
    }

    pub(crate) async fn find_one_by_with(
        &self,
        options: &FindOptions,
        extra: Vec<Predicate>,
    ) -> RepositoryResult<Option<E>> {
        let operation = RepositoryOperation::FindOne;
        let expressions = self.expressions(options, extra, operation)?;

        let mut builder = self.select();
        expressions.push_where(&mut builder);
        expressions.push_order_by(&mut builder);
        builder.push(" LIMIT 1");

        self.fetch_optional(&mut builder, operation).await
    }

    pub(crate) async fn count_with(
        &self,
        options: &FindOptions,
        extra: Vec<Predicate>,
    ) -> RepositoryResult<u64> {
        let operation = RepositoryOperation::Count;
        let expressions = self.expressions(options, extra, operation)?.without_order();
        self.count_expressions(&expressions, operation).await
    }

    async fn exists_where(
        &self,
        conditions: Vec<FilterCondition>,
        exclude_id: Option<&E::Id>,
        operation: RepositoryOperation,
    ) -> RepositoryResult<bool> {
        let extra = exclude_id
            .map(|id| Predicate::not(self.id_predicate(id)))
            .into_iter()
            .collect();
        let expressions =
            self.expressions(&FindOptions::from_filters(conditions), extra, operation)?;

        let mut builder = QueryBuilder::new("SELECT EXISTS(SELECT 1 FROM ");
        builder.push(self.table.quoted_name());
        expressions.push_where(&mut builder);
        builder.push(")");

        self.fetch_scalar::<bool>(&mut builder, operation).await
    }

    /// Insert a row and return it as stored
    pub async fn create(&self, data: E::Create) -> RepositoryResult<E> {
        let operation = RepositoryOperation::Create;
        let values = data.into_column_values();
        self.validate_columns(&values, operation)?;

        let mut builder = QueryBuilder::new("INSERT INTO ");
        builder.push(self.table.quoted_name());

        if values.is_empty() {
            builder.push(" DEFAULT VALUES");
        } else {
            builder.push(" (");
            for (index, (column, _)) in values.iter().enumerate() {
                if index > 0 {
                    builder.push(", ");
                }
                builder.push(quote_ident(column));
            }
            builder.push(") VALUES (");
            for (index, (column, value)) in values.iter().enumerate() {
                if index > 0 {
                    builder.push(", ");
                }
                push_value(&mut builder, value, self.table.column(column));
            }
            builder.push(")");
        }
        builder.push(" RETURNING *");

        let created = self.fetch_one(&mut builder, operation).await?;
        debug!(entity = %self.entity_name, "Created row");
        Ok(created)
    }

    /// Update a visible row and return it as stored
    ///
    /// The updated-at column is always stamped with `NOW()`; payload values
    /// for it are ignored.
    pub async fn update(&self, id: &E::Id, data: E::Update) -> RepositoryResult<E> {
        let operation = RepositoryOperation::Update;
        let existing = self
            .find_one_where(id, Vec::new(), operation)
            .await?;

        let updated_at = self.table.updated_at_column;
        let values: Vec<(&'static str, SqlValue)> = data
            .into_column_values()
            .into_iter()
            .filter(|(column, _)| Some(*column) != updated_at)
            .collect();
        self.validate_columns(&values, operation)?;

        let stamp_updated_at = updated_at.filter(|column| self.table.has_column(column));
        if values.is_empty() && stamp_updated_at.is_none() {
            return Ok(existing);
        }

        let expressions = self.expressions(
            &FindOptions::new(),
            vec![self.id_predicate(id)],
            operation,
        )?;

        let mut builder = QueryBuilder::new("UPDATE ");
        builder.push(self.table.quoted_name());
        builder.push(" SET ");
        for (index, (column, value)) in values.iter().enumerate() {
            if index > 0 {
                builder.push(", ");
            }
            builder.push(quote_ident(column));
            builder.push(" = ");
            push_value(&mut builder, value, self.table.column(column));
        }
        if let Some(column) = stamp_updated_at {
            if !values.is_empty() {
                builder.push(", ");
            }
            builder.push(quote_ident(column));
            builder.push(" = NOW()");
        }
        expressions.push_where(&mut builder);
        builder.push(" RETURNING *");

        // The row can vanish between the existence check and the update.
        self.fetch_optional(&mut builder, operation)
            .await?
            .ok_or_else(|| self.not_found(id, operation))
    }

    /// Delete a visible row and return it
    ///
    /// Without soft delete the row is removed. With soft delete the row is
    /// marked deleted inside a transaction, after checking that no active
    /// dependent row references it (unless dependency checks are disabled).
    pub async fn delete(&self, id: &E::Id) -> RepositoryResult<E> {
        if !self.config.soft_delete_enabled {
            return self.hard_delete(id, RepositoryOperation::Delete).await;
        }

        let id = id.clone();
        self.transaction(move |repository| async move {
            repository
                .soft_delete_one(&id, RepositoryOperation::Delete)
                .await
        })
        .await
    }

    /// Delete several visible rows, all or nothing
    ///
    /// Repeated ids are deleted once. Every id is verified first; a `NotFound`
    /// error names all missing ids.
    pub async fn delete_many(&self, ids: &[E::Id]) -> RepositoryResult<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen = HashSet::new();
        let ids: Vec<E::Id> = ids
            .iter()
            .filter(|id| seen.insert(id.to_string()))
            .cloned()
            .collect();
        self.transaction(move |repository| async move {
            let operation = RepositoryOperation::DeleteMany;

            let mut missing = Vec::new();
            for id in &ids {
                match repository.find_one_where(id, Vec::new(), operation).await {
                    Ok(_) => {}
                    Err(error) if error.is_not_found() => missing.push(id.to_string()),
                    Err(error) => return Err(error),
                }
            }
            if !missing.is_empty() {
                let missing = missing.join(", ");
                return Err(RepositoryError::new(
                    operation,
                    RepositoryErrorKind::NotFound,
                    format!("{} not found: {missing}", repository.entity_name),
                )
                .with_entity(repository.entity_name.to_string(), missing));
            }

            let mut deleted = Vec::with_capacity(ids.len());
            for id in &ids {
                let row = if repository.config.soft_delete_enabled {
                    repository.soft_delete_one(id, operation).await?
                } else {
                    repository.hard_delete(id, operation).await?
                };
                deleted.push(row);
            }
            Ok(deleted)
        })
        .await
    }

    /// Delete every visible row matching `options` and return how many
    ///
    /// With soft delete and dependency checks enabled, a set-based check runs
    /// first and nothing is deleted if any matching row is still referenced.
    pub async fn delete_all(&self, options: FindOptions) -> RepositoryResult<u64> {
        let operation = RepositoryOperation::DeleteAll;
        let expressions = self.expressions(&options, Vec::new(), operation)?.without_order();

        self.transaction(move |repository| async move {
            let soft = repository.config.soft_delete_enabled;

            if soft && repository.config.check_dependencies_on_soft_delete {
                let blocking = repository
                    .blocking_tables_for_set(&expressions, operation)
                    .await?;
                if !blocking.is_empty() {
                    warn!(
                        entity = %repository.entity_name,
                        blocking_tables = ?blocking,
                        "Bulk soft delete blocked by active dependents"
                    );
                    return Err(RepositoryError::dependency_exists(
                        repository.entity_name.to_string(),
                        blocking,
                    )
                    .with_operation(operation));
                }
            }

            let mut builder = if soft {
                let mut builder = QueryBuilder::new("UPDATE ");
                builder.push(repository.table.quoted_name());
                builder.push(" SET ");
                builder.push(quote_ident(repository.table.soft_delete_column));
                builder.push(" = NOW()");
                builder
            } else {
                let mut builder = QueryBuilder::new("DELETE FROM ");
                builder.push(repository.table.quoted_name());
                builder
            };
            expressions.push_where(&mut builder);

            let affected = repository.execute(&mut builder, operation).await?;
            debug!(entity = %repository.entity_name, affected, soft, "Deleted rows");
            Ok(affected)
        })
        .await
    }

    /// Permanently remove a row, soft-deleted or not
    ///
    /// Dependency checks are skipped; database constraints still apply.
    pub async fn force_delete(&self, id: &E::Id) -> RepositoryResult<E> {
        let operation = RepositoryOperation::ForceDelete;
        self.require_soft_delete(operation)?;

        let expressions = self.unfiltered_id_expressions(id, operation)?;
        let mut builder = QueryBuilder::new("DELETE FROM ");
        builder.push(self.table.quoted_name());
        expressions.push_where(&mut builder);
        builder.push(" RETURNING *");

        self.fetch_optional(&mut builder, operation)
            .await?
            .ok_or_else(|| self.not_found(id, operation))
    }

    /// Clear the soft-delete marker of a row
    ///
    /// Restoring a row that is not deleted returns it unchanged.
    pub async fn restore(&self, id: &E::Id) -> RepositoryResult<E> {
        let operation = RepositoryOperation::Restore;
        self.require_soft_delete(operation)?;

        let expressions = self.unfiltered_id_expressions(id, operation)?;
        let mut builder = QueryBuilder::new("UPDATE ");
        builder.push(self.table.quoted_name());
        builder.push(" SET ");
        builder.push(quote_ident(self.table.soft_delete_column));
        builder.push(" = NULL");
        expressions.push_where(&mut builder);
        builder.push(" RETURNING *");

        self.fetch_optional(&mut builder, operation)
            .await?
            .ok_or_else(|| self.not_found(id, operation))
    }

    async fn hard_delete(&self, id: &E::Id, operation: RepositoryOperation) -> RepositoryResult<E> {
        let expressions = self.expressions(
            &FindOptions::new(),
            vec![self.id_predicate(id)],
            operation,
        )?;

        let mut builder = QueryBuilder::new("DELETE FROM ");
        builder.push(self.table.quoted_name());
        expressions.push_where(&mut builder);
        builder.push(" RETURNING *");

        self.fetch_optional(&mut builder, operation)
            .await?
            .ok_or_else(|| self.not_found(id, operation))
    }

    // Callers run this inside a transaction.
    async fn soft_delete_one(
        &self,
        id: &E::Id,
        operation: RepositoryOperation,
    ) -> RepositoryResult<E> {
        self.find_one_where(id, Vec::new(), operation).await?;

        if self.config.check_dependencies_on_soft_delete {
            let blocking = self.blocking_tables(id, operation).await?;
            if !blocking.is_empty() {
                warn!(
                    entity = %self.entity_name,
                    id = %id,
                    blocking_tables = ?blocking,
                    "Soft delete blocked by active dependents"
                );
                return Err(
                    RepositoryError::dependency_exists(self.entity_name.to_string(), blocking)
                        .with_operation(operation)
                        .with_entity(self.entity_name.to_string(), id.to_string()),
                );
            }
        }

        let expressions = self.expressions(
            &FindOptions::new(),
            vec![self.id_predicate(id)],
            operation,
        )?;

        let mut builder = QueryBuilder::new("UPDATE ");
        builder.push(self.table.quoted_name());
        builder.push(" SET ");
        builder.push(quote_ident(self.table.soft_delete_column));
        builder.push(" = NOW()");
        expressions.push_where(&mut builder);
        builder.push(" RETURNING *");

        self.fetch_optional(&mut builder, operation)
            .await?
            .ok_or_else(|| self.not_found(id, operation))
    }

    /// Dependent tables with an active row referencing `id`, in discovery order
    async fn blocking_tables(
        &self,
        id: &E::Id,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Vec<String>> {
        let edges = self.dependents(operation).await?;
        let id_value: SqlValue = id.clone().into();
        let pk_column = self.table.column(self.table.primary_key);

        let mut blocking: Vec<String> = Vec::new();
        for edge in edges.iter() {
            if blocking.contains(&edge.dependent_table) {
                continue;
            }
            let mut builder = QueryBuilder::new("SELECT EXISTS(SELECT 1 FROM ");
            builder.push(quote_ident(&edge.dependent_table));
            builder.push(" WHERE ");
            builder.push(quote_ident(&edge.dependent_column));
            builder.push(" = ");
            push_value(&mut builder, &id_value, pk_column);
            if edge.dependent_has_soft_delete {
                builder.push(" AND ");
                builder.push(quote_ident(self.introspector.soft_delete_column()));
                builder.push(" IS NULL");
            }
            builder.push(")");

            if self.fetch_scalar::<bool>(&mut builder, operation).await? {
                blocking.push(edge.dependent_table.clone());
            }
        }
        Ok(blocking)
    }

    /// Dependent tables with an active row referencing any row matched by `expressions`
    async fn blocking_tables_for_set(
        &self,
        expressions: &QueryExpressions,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Vec<String>> {
        let edges = self.dependents(operation).await?;

        let mut blocking: Vec<String> = Vec::new();
        for edge in edges.iter() {
            if blocking.contains(&edge.dependent_table) {
                continue;
            }
            let mut builder = QueryBuilder::new("SELECT EXISTS(SELECT 1 FROM ");
            builder.push(quote_ident(&edge.dependent_table));
            builder.push(" WHERE ");
            builder.push(quote_ident(&edge.dependent_column));
            builder.push(" IN (SELECT ");
            builder.push(self.table.qualified(self.table.primary_key));
            builder.push(" FROM ");
            builder.push(self.table.quoted_name());
            expressions.push_where(&mut builder);
            builder.push(")");
            if edge.dependent_has_soft_delete {
                builder.push(" AND ");
                builder.push(quote_ident(self.introspector.soft_delete_column()));
                builder.push(" IS NULL");
            }
            builder.push(")");

            if self.fetch_scalar::<bool>(&mut builder, operation).await? {
                blocking.push(edge.dependent_table.clone());
            }
        }
        Ok(blocking)
    }

    async fn dependents(
        &self,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Arc<[ForeignKeyEdge]>> {
        let mut guard = self
            .connection
            .acquire()
            .await
            .map_err(|e| e.with_operation(operation))?;
        let connection = guard.as_mut().map_err(|e| e.with_operation(operation))?;
        self.introspector
            .discover_dependents(connection, &self.table)
            .await
    }

    /// Find uniqueness conflicts among visible rows
    ///
    /// Text values are compared case-insensitively and soft-deleted rows never
    /// conflict. `exclude_id` skips the row being updated. NULL values are not
    /// checked.
    pub async fn check_uniqueness(
        &self,
        fields: &[UniqueField],
        exclude_id: Option<&E::Id>,
    ) -> RepositoryResult<Vec<UniquenessConflict>> {
        let operation = RepositoryOperation::CheckUniqueness;
        let mut conflicts = Vec::new();

        for field in fields {
            if field.value.is_null() {
                continue;
            }
            let mut conditions = vec![equality_ignoring_case(FilterCondition::eq(
                field.column.clone(),
                field.value.clone(),
            ))];
            if let Some((column, value)) = &field.scope {
                conditions.push(FilterCondition::eq(column.clone(), value.clone()));
            }

            if self.exists_where(conditions, exclude_id, operation).await? {
                conflicts.push(UniquenessConflict {
                    field: field.column.clone(),
                    value: field.value.clone(),
                });
            }
        }

        if !conflicts.is_empty() {
            debug!(
                entity = %self.entity_name,
                conflicts = conflicts.len(),
                "Uniqueness conflicts found"
            );
        }
        Ok(conflicts)
    }

    /// Fail with `Duplicate` on the first uniqueness conflict
    pub async fn ensure_unique(
        &self,
        fields: &[UniqueField],
        exclude_id: Option<&E::Id>,
    ) -> RepositoryResult<()> {
        match self.check_uniqueness(fields, exclude_id).await?.into_iter().next() {
            Some(conflict) => Err(RepositoryError::duplicate(
                Some(conflict.field),
                Some(conflict.value.to_string()),
            )
            .with_operation(RepositoryOperation::CheckUniqueness)),
            None => Ok(()),
        }
    }

    /// Fail with `ForeignKey` unless `relation_id` names a row of `related`
    ///
    /// With `related_has_soft_delete`, soft-deleted rows do not count. A NULL
    /// relation is accepted.
    pub async fn validate_relation_exists(
        &self,
        related: &Table,
        relation_id: impl Into<SqlValue>,
        field: &str,
        related_has_soft_delete: bool,
    ) -> RepositoryResult<()> {
        let operation = RepositoryOperation::ValidateRelation;
        let relation_id = relation_id.into();
        if relation_id.is_null() {
            return Ok(());
        }

        let mut parts = vec![Predicate::from(FilterCondition::eq(
            related.primary_key,
            relation_id,
        ))];
        if related_has_soft_delete {
            parts.push(FilterCondition::is_null(related.soft_delete_column).into());
        }
        let expressions = QueryExpressions::new(*related, Predicate::All(parts), Vec::new(), false)
            .map_err(|e| e.with_operation(operation))?;

        let mut builder = QueryBuilder::new("SELECT EXISTS(SELECT 1 FROM ");
        builder.push(related.quoted_name());
        expressions.push_where(&mut builder);
        builder.push(")");

        if self.fetch_scalar::<bool>(&mut builder, operation).await? {
            Ok(())
        } else {
            Err(RepositoryError::foreign_key(field, related.name).with_operation(operation))
        }
    }

    /// Run `work` inside a transaction
    ///
    /// When this repository is bound to the pool, a transaction is opened,
    /// committed when `work` succeeds and rolled back when it fails. When it
    /// is already bound to a transaction, `work` joins it.
    ///
    /// ```rust,ignore
    /// let city = cities
    ///     .transaction(|cities| async move {
    ///         let city = cities.create(new_city).await?;
    ///         cities.find_one(&city.id).await
    ///     })
    ///     .await?;
    /// ```
    pub async fn transaction<T, F, Fut>(&self, work: F) -> RepositoryResult<T>
    where
        F: FnOnce(Repository<E>) -> Fut,
        Fut: Future<Output = RepositoryResult<T>>,
    {
        let pool = match &self.connection {
            DbConnection::Transaction(_) => return work(self.clone()).await,
            DbConnection::Pool(pool) => pool,
        };

        let handle = TransactionHandle::begin(pool).await?;
        match work(self.with_transaction(&handle)).await {
            Ok(value) => {
                handle.commit().await?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = handle.rollback().await {
                    warn!(
                        entity = %self.entity_name,
                        error = %rollback_error,
                        "Failed to roll back transaction"
                    );
                }
                Err(error)
            }
        }
    }

    fn expressions(
        &self,
        options: &FindOptions,
        extra: Vec<Predicate>,
        operation: RepositoryOperation,
    ) -> RepositoryResult<QueryExpressions> {
        compose(
            self.table,
            &self.config.searchable_fields,
            self.config.soft_delete_enabled,
            self.settings.accent_insensitive_search,
            options,
            extra,
        )
        .map_err(|e| e.with_operation(operation))
    }

    fn unfiltered_id_expressions(
        &self,
        id: &E::Id,
        operation: RepositoryOperation,
    ) -> RepositoryResult<QueryExpressions> {
        QueryExpressions::new(
            self.table,
            self.id_predicate(id),
            Vec::new(),
            self.settings.accent_insensitive_search,
        )
        .map_err(|e| e.with_operation(operation))
    }

    fn id_predicate(&self, id: &E::Id) -> Predicate {
        FilterCondition::eq(self.table.primary_key, id.clone()).into()
    }

    fn select(&self) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new("SELECT ");
        builder.push(self.table.quoted_name());
        builder.push(".* FROM ");
        builder.push(self.table.quoted_name());
        builder
    }

    fn not_found(&self, id: &E::Id, operation: RepositoryOperation) -> RepositoryError {
        RepositoryError::not_found(self.entity_name.to_string(), id.to_string())
            .with_operation(operation)
    }

    fn require_soft_delete(&self, operation: RepositoryOperation) -> RepositoryResult<()> {
        if self.config.soft_delete_enabled {
            Ok(())
        } else {
            Err(RepositoryError::soft_delete_not_configured(operation))
        }
    }

    fn validate_columns(
        &self,
        values: &[(&'static str, SqlValue)],
        operation: RepositoryOperation,
    ) -> RepositoryResult<()> {
        for (column, _) in values {
            self.table
                .require_column(column)
                .map_err(|e| e.with_operation(operation))?;
        }
        Ok(())
    }

    fn db_error(&self, operation: RepositoryOperation) -> impl Fn(sqlx::Error) -> RepositoryError + '_ {
        move |error| translate_error(error, operation, &self.entity_name)
    }

    fn log_statement(&self, builder: &QueryBuilder<'_, Postgres>, operation: RepositoryOperation) {
        debug!(
            entity = %self.entity_name,
            operation = %operation,
            in_transaction = self.connection.is_transaction(),
            sql = builder.sql(),
            "Executing statement"
        );
    }

    async fn count_expressions(
        &self,
        expressions: &QueryExpressions,
        operation: RepositoryOperation,
    ) -> RepositoryResult<u64> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM ");
        builder.push(self.table.quoted_name());
        expressions.push_where(&mut builder);

        let count = self.fetch_scalar::<i64>(&mut builder, operation).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn fetch_all(
        &self,
        builder: &mut QueryBuilder<'_, Postgres>,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Vec<E>> {
        self.log_statement(builder, operation);
        let mut guard = self.connection.acquire().await?;
        let connection = guard.as_mut()?;
        builder
            .build_query_as::<E>()
            .fetch_all(connection)
            .await
            .map_err(self.db_error(operation))
    }

    async fn fetch_optional(
        &self,
        builder: &mut QueryBuilder<'_, Postgres>,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Option<E>> {
        self.log_statement(builder, operation);
        let mut guard = self.connection.acquire().await?;
        let connection = guard.as_mut()?;
        builder
            .build_query_as::<E>()
            .fetch_optional(connection)
            .await
            .map_err(self.db_error(operation))
    }

    async fn fetch_one(
        &self,
        builder: &mut QueryBuilder<'_, Postgres>,
        operation: RepositoryOperation,
    ) -> RepositoryResult<E> {
        self.log_statement(builder, operation);
        let mut guard = self.connection.acquire().await?;
        let connection = guard.as_mut()?;
        builder
            .build_query_as::<E>()
            .fetch_one(connection)
            .await
            .map_err(self.db_error(operation))
    }

    async fn fetch_scalar<T>(
        &self,
        builder: &mut QueryBuilder<'_, Postgres>,
        operation: RepositoryOperation,
    ) -> RepositoryResult<T>
    where
        T: Send + Unpin + 'static,
        (T,): for<'r> sqlx::FromRow<'r, PgRow>,
    {
        self.log_statement(builder, operation);
        let mut guard = self.connection.acquire().await?;
        let connection = guard.as_mut()?;
        builder
            .build_query_scalar::<T>()
            .fetch_one(connection)
            .await
            .map_err(self.db_error(operation))
    }

    async fn execute(
        &self,
        builder: &mut QueryBuilder<'_, Postgres>,
        operation: RepositoryOperation,
    ) -> RepositoryResult<u64> {
        self.log_statement(builder, operation);
        let mut guard = self.connection.acquire().await?;
        let connection = guard.as_mut()?;
        builder
            .build()
            .execute(connection)
            .await
            .map(|result| result.rows_affected())
            .map_err(self.db_error(operation))
    }
}

/// Turn `field = 'text'` into a case-insensitive comparison
fn equality_ignoring_case(condition: FilterCondition) -> FilterCondition {
    if condition.operator == FilterOperator::Equal && condition.value.is_string() {
        FilterCondition {
            operator: FilterOperator::EqualIgnoreCase,
            ..condition
        }
    } else {
        condition
    }
}
