//! Query composition
//!
//! [`FindOptions`] describes a read (equality filters, ordering, free-text
//! search, extra predicates). [`compose`] turns it into [`QueryExpressions`],
//! a validated predicate plus ordering that renders into any
//! `QueryBuilder<Postgres>`. Column references are always table-qualified so
//! the fragments compose with joins.
//!
//! ```rust
//! use sqlx::{Postgres, QueryBuilder};
//! use terrastore::repository::{compose, Column, FindOptions, OrderDirection, Table};
//!
//! const CITIES: Table = Table::new(
//!     "cities",
//!     &[Column::uuid("id"), Column::text("name"), Column::timestamp("deleted_at")],
//! );
//!
//! let options = FindOptions::new()
//!     .with_filter("name", "Rome")
//!     .order_by("name", OrderDirection::Ascending);
//! let expressions = compose(CITIES, &[], false, false, &options, Vec::new()).unwrap();
//!
//! let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM cities");
//! expressions.push_where(&mut builder);
//! expressions.push_order_by(&mut builder);
//! assert_eq!(
//!     builder.sql(),
//!     r#"SELECT * FROM cities WHERE "cities"."name" = $1 ORDER BY "cities"."name" ASC"#
//! );
//! ```

use sqlx::{Postgres, QueryBuilder};

use super::error::{RepositoryError, RepositoryResult};
use super::filter::{FilterCondition, FilterOperator, Predicate, SqlValue};
use super::pagination::{OrderBy, OrderDirection};
use super::table::{Column, Table};

/// Options for a read query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Conditions AND-ed together (equality unless built otherwise)
    pub filters: Vec<FilterCondition>,
    /// Ordering terms, applied left to right
    pub order_by: Vec<OrderBy>,
    /// Free-text search over the repository's searchable fields
    pub search_term: Option<String>,
    /// Additional predicate trees AND-ed with everything else
    pub predicates: Vec<Predicate>,
}

impl FindOptions {
    /// Empty options: every visible row, unordered
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality filter
    #[must_use]
    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.filters.push(FilterCondition::eq(field, value));
        self
    }

    /// Add an equality filter only when a value is present
    #[must_use]
    pub fn with_optional_filter<V: Into<SqlValue>>(
        self,
        field: impl Into<String>,
        value: Option<V>,
    ) -> Self {
        match value {
            Some(value) => self.with_filter(field, value),
            None => self,
        }
    }

    /// Add an arbitrary condition
    #[must_use]
    pub fn with_condition(mut self, condition: FilterCondition) -> Self {
        self.filters.push(condition);
        self
    }

    /// Append an ordering term
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by.push(OrderBy::new(field, direction));
        self
    }

    /// Set the search term
    #[must_use]
    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    /// AND an extra predicate
    #[must_use]
    pub fn with_predicate(mut self, predicate: impl Into<Predicate>) -> Self {
        self.predicates.push(predicate.into());
        self
    }

    /// Options holding only the given filters
    pub fn from_filters(filters: impl IntoIterator<Item = FilterCondition>) -> Self {
        Self {
            filters: filters.into_iter().collect(),
            ..Self::default()
        }
    }

    /// The search term, if it is not blank
    pub fn effective_search_term(&self) -> Option<&str> {
        self.search_term
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }
}

/// A validated predicate and ordering, ready to render
#[derive(Debug, Clone, PartialEq)]
pub struct QueryExpressions {
    table: Table,
    predicate: Predicate,
    order_by: Vec<OrderBy>,
    accent_insensitive: bool,
}

impl QueryExpressions {
    /// Validate `predicate` and `order_by` against `table`
    pub fn new(
        table: Table,
        predicate: Predicate,
        order_by: Vec<OrderBy>,
        accent_insensitive: bool,
    ) -> RepositoryResult<Self> {
        validate_predicate(&table, &predicate)?;
        for order in &order_by {
            table.require_column(&order.field)?;
        }
        Ok(Self {
            table,
            predicate,
            order_by,
            accent_insensitive,
        })
    }

    /// The combined predicate
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// The ordering terms
    pub fn order_by(&self) -> &[OrderBy] {
        &self.order_by
    }

    /// The table the expressions are rendered against
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// AND another predicate onto this one
    pub fn and(mut self, predicate: Predicate) -> RepositoryResult<Self> {
        validate_predicate(&self.table, &predicate)?;
        self.predicate = std::mem::take(&mut self.predicate).and(predicate);
        Ok(self)
    }

    /// Drop the ordering (count queries)
    #[must_use]
    pub fn without_order(mut self) -> Self {
        self.order_by.clear();
        self
    }

    /// Render ` WHERE <predicate>`, or nothing when the predicate is always true
    pub fn push_where(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        if self.predicate.is_empty() {
            return;
        }
        builder.push(" WHERE ");
        self.push_predicate(builder);
    }

    /// Render the bare predicate (`TRUE` when empty)
    pub fn push_predicate(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        render_predicate(&self.table, self.accent_insensitive, &self.predicate, builder);
    }

    /// Render ` ORDER BY …`, or nothing when no ordering was requested
    pub fn push_order_by(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        if self.order_by.is_empty() {
            return;
        }
        builder.push(" ORDER BY ");
        for (index, order) in self.order_by.iter().enumerate() {
            if index > 0 {
                builder.push(", ");
            }
            builder.push(self.table.qualified(&order.field));
            builder.push(" ");
            builder.push(order.direction.as_sql());
        }
    }
}

/// Build the query expressions for a read
///
/// The result ANDs, in order: the soft-delete filter (when `soft_delete`),
/// the option filters, the search disjunction, the option predicates and
/// `extra`. A non-blank search term with no `searchable_fields` is a
/// `Validation` error.
pub fn compose(
    table: Table,
    searchable_fields: &[&str],
    soft_delete: bool,
    accent_insensitive: bool,
    options: &FindOptions,
    extra: Vec<Predicate>,
) -> RepositoryResult<QueryExpressions> {
    let mut parts = Vec::new();

    if soft_delete {
        parts.push(FilterCondition::is_null(table.soft_delete_column).into());
    }

    parts.extend(options.filters.iter().cloned().map(Predicate::from));

    if let Some(term) = options.effective_search_term() {
        if searchable_fields.is_empty() {
            return Err(RepositoryError::validation(format!(
                "Search is not supported on '{}': no searchable fields configured",
                table.name
            )));
        }
        parts.push(Predicate::Search {
            fields: searchable_fields.iter().map(|f| (*f).to_string()).collect(),
            term: term.to_string(),
        });
    }

    parts.extend(options.predicates.iter().cloned());
    parts.extend(extra);

    QueryExpressions::new(
        table,
        Predicate::All(parts),
        options.order_by.clone(),
        accent_insensitive,
    )
}

/// Escape `\`, `%` and `_` and wrap the term for a substring match
pub fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn validate_predicate(table: &Table, predicate: &Predicate) -> RepositoryResult<()> {
    match predicate {
        Predicate::Condition(condition) => table.require_column(&condition.field).map(|_| ()),
        Predicate::All(items) | Predicate::Any(items) => items
            .iter()
            .try_for_each(|item| validate_predicate(table, item)),
        Predicate::Not(inner) => validate_predicate(table, inner),
        Predicate::Search { fields, .. } => fields
            .iter()
            .try_for_each(|field| table.require_column(field).map(|_| ())),
    }
}

fn render_predicate(
    table: &Table,
    accent_insensitive: bool,
    predicate: &Predicate,
    builder: &mut QueryBuilder<'_, Postgres>,
) {
    match predicate {
        Predicate::Condition(condition) => render_condition(table, condition, builder),
        Predicate::All(items) => {
            render_group(table, accent_insensitive, items, " AND ", "TRUE", builder)
        }
        Predicate::Any(items) => {
            render_group(table, accent_insensitive, items, " OR ", "FALSE", builder)
        }
        Predicate::Not(inner) => {
            builder.push("NOT (");
            render_predicate(table, accent_insensitive, inner, builder);
            builder.push(")");
        }
        Predicate::Search { fields, term } => {
            if fields.is_empty() {
                builder.push("FALSE");
                return;
            }
            let pattern = like_pattern(term);
            builder.push("(");
            for (index, field) in fields.iter().enumerate() {
                if index > 0 {
                    builder.push(" OR ");
                }
                let column = table.qualified(field);
                if accent_insensitive {
                    builder.push(format!("unaccent(CAST({column} AS TEXT)) ILIKE unaccent("));
                    builder.push_bind(pattern.clone());
                    builder.push(")");
                } else {
                    builder.push(format!("CAST({column} AS TEXT) ILIKE "));
                    builder.push_bind(pattern.clone());
                }
            }
            builder.push(")");
        }
    }
}

fn render_group(
    table: &Table,
    accent_insensitive: bool,
    items: &[Predicate],
    separator: &str,
    empty: &str,
    builder: &mut QueryBuilder<'_, Postgres>,
) {
    // Empty AND subtrees contribute nothing to a conjunction.
    let items: Vec<&Predicate> = if separator == " AND " {
        items.iter().filter(|item| !item.is_empty()).collect()
    } else {
        items.iter().collect()
    };

    match items.as_slice() {
        [] => {
            builder.push(empty);
        }
        [single] => render_predicate(table, accent_insensitive, single, builder),
        _ => {
            builder.push("(");
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    builder.push(separator);
                }
                render_predicate(table, accent_insensitive, item, builder);
            }
            builder.push(")");
        }
    }
}

fn render_condition(
    table: &Table,
    condition: &FilterCondition,
    builder: &mut QueryBuilder<'_, Postgres>,
) {
    let column = table.column(&condition.field);
    let qualified = table.qualified(&condition.field);

    match (condition.operator, &condition.value) {
        (FilterOperator::Equal | FilterOperator::IsNull, SqlValue::Null)
        | (FilterOperator::IsNull, _) => {
            builder.push(format!("{qualified} IS NULL"));
        }
        (FilterOperator::NotEqual | FilterOperator::IsNotNull, SqlValue::Null)
        | (FilterOperator::IsNotNull, _) => {
            builder.push(format!("{qualified} IS NOT NULL"));
        }
        (FilterOperator::In, value) if value.is_list() => {
            if list_is_empty(value) {
                builder.push("FALSE");
            } else {
                builder.push(format!("{qualified} = ANY("));
                value.push_bind(builder, None);
                builder.push(")");
            }
        }
        (FilterOperator::EqualIgnoreCase, value) => {
            if column.is_some_and(|c| c.ty.is_textual()) {
                builder.push(format!("LOWER({qualified}) = LOWER("));
            } else {
                builder.push(format!("LOWER(CAST({qualified} AS TEXT)) = LOWER("));
            }
            value.push_bind(builder, None);
            builder.push(")");
        }
        (FilterOperator::Like | FilterOperator::ILike, value) => {
            let keyword = if condition.operator == FilterOperator::Like {
                "LIKE"
            } else {
                "ILIKE"
            };
            if column.is_some_and(|c| c.ty.is_textual()) {
                builder.push(format!("{qualified} {keyword} "));
            } else {
                builder.push(format!("CAST({qualified} AS TEXT) {keyword} "));
            }
            value.push_bind(builder, None);
        }
        (operator, value) => {
            let sql_operator = match operator {
                FilterOperator::NotEqual => "<>",
                FilterOperator::GreaterThan => ">",
                FilterOperator::GreaterThanOrEqual => ">=",
                FilterOperator::LessThan => "<",
                FilterOperator::LessThanOrEqual => "<=",
                _ => "=",
            };
            builder.push(format!("{qualified} {sql_operator} "));
            push_value(builder, value, column);
        }
    }
}

/// Bind a value for `column`, casting text parameters to non-text column types
pub(crate) fn push_value(
    builder: &mut QueryBuilder<'_, Postgres>,
    value: &SqlValue,
    column: Option<&Column>,
) {
    match column {
        Some(column) if value.is_string() && !column.ty.is_textual() => {
            builder.push("CAST(");
            value.push_bind(builder, None);
            builder.push(format!(" AS {})", column.ty.sql_type()));
        }
        _ => value.push_bind(builder, column.map(|c| c.ty)),
    }
}

fn list_is_empty(value: &SqlValue) -> bool {
    match value {
        SqlValue::StringList(values) => values.is_empty(),
        SqlValue::IntegerList(values) => values.is_empty(),
        SqlValue::UuidList(values) => values.is_empty(),
        _ => false,
    }
}
