//! Per-repository configuration and uniqueness descriptors

use super::filter::SqlValue;

/// Immutable configuration of one repository instance
///
/// # Example
///
/// ```rust
/// use terrastore::repository::RepositoryConfig;
///
/// let config = RepositoryConfig::new()
///     .with_searchable_fields(["name", "code"])
///     .with_soft_delete(true);
///
/// assert!(config.soft_delete_enabled);
/// assert!(config.check_dependencies_on_soft_delete);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Columns searched by the free-text search
    pub searchable_fields: Vec<&'static str>,
    /// Mark rows deleted instead of removing them
    pub soft_delete_enabled: bool,
    /// Refuse soft deletes while active dependents reference the row
    pub check_dependencies_on_soft_delete: bool,
}

impl RepositoryConfig {
    /// Default configuration: no search, hard delete, dependency checks on
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the searchable columns
    #[must_use]
    pub fn with_searchable_fields(
        mut self,
        fields: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        self.searchable_fields = fields.into_iter().collect();
        self
    }

    /// Enable or disable soft delete
    #[must_use]
    pub fn with_soft_delete(mut self, enabled: bool) -> Self {
        self.soft_delete_enabled = enabled;
        self
    }

    /// Enable or disable dependency checks on soft delete
    #[must_use]
    pub fn with_dependency_checks(mut self, enabled: bool) -> Self {
        self.check_dependencies_on_soft_delete = enabled;
        self
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            searchable_fields: Vec::new(),
            soft_delete_enabled: false,
            check_dependencies_on_soft_delete: true,
        }
    }
}

/// A column/value pair that must be unique, optionally within a scope
///
/// Text values are compared case-insensitively.
///
/// ```rust
/// use terrastore::repository::UniqueField;
/// use uuid::Uuid;
///
/// let state_id = Uuid::nil();
/// let field = UniqueField::new("name", "Springfield").scoped_to("state_id", state_id);
/// assert_eq!(field.scope.unwrap().0, "state_id");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueField {
    /// Column that must be unique
    pub column: String,
    /// Candidate value
    pub value: SqlValue,
    /// Uniqueness applies only among rows with this column/value
    pub scope: Option<(String, SqlValue)>,
}

impl UniqueField {
    /// A globally unique column
    pub fn new(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
            scope: None,
        }
    }

    /// Restrict the check to rows where `column = value`
    #[must_use]
    pub fn scoped_to(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.scope = Some((column.into(), value.into()));
        self
    }
}

/// A uniqueness violation found before a write
#[derive(Debug, Clone, PartialEq)]
pub struct UniquenessConflict {
    /// Conflicting column
    pub field: String,
    /// Conflicting value
    pub value: SqlValue,
}
