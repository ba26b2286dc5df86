//! Repository error types
//!
//! Every failure the engine reports is a [`RepositoryError`] whose [`kind`]
//! is a closed, tagged set of domain errors. Callers branch on the kind, never
//! on the message text.
//!
//! # Example
//!
//! ```rust
//! use terrastore::repository::{RepositoryError, RepositoryErrorKind};
//!
//! let error = RepositoryError::not_found("City", "3f1c");
//! assert!(matches!(error.kind, RepositoryErrorKind::NotFound));
//! assert!(error.entity_id.is_some());
//! ```
//!
//! [`kind`]: RepositoryError::kind

use std::fmt;

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Finding a single entity by primary key or filters
    FindOne,
    /// Finding multiple entities with options
    FindAll,
    /// Counting entities matching options
    Count,
    /// Checking if matching rows exist
    Exists,
    /// Creating a new entity
    Create,
    /// Updating an existing entity
    Update,
    /// Deleting an entity (hard or soft, depending on configuration)
    Delete,
    /// Deleting a batch of entities by id
    DeleteMany,
    /// Deleting every entity matching options
    DeleteAll,
    /// Hard deleting an entity regardless of its soft-delete state
    ForceDelete,
    /// Restoring a soft-deleted entity
    Restore,
    /// Checking uniqueness constraints before a write
    CheckUniqueness,
    /// Validating that a referenced row exists in another table
    ValidateRelation,
    /// Beginning, committing or rolling back a transaction
    Transaction,
    /// Discovering foreign-key dependents from the catalog
    Introspect,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FindOne => write!(f, "find_one"),
            Self::FindAll => write!(f, "find_all"),
            Self::Count => write!(f, "count"),
            Self::Exists => write!(f, "exists"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::DeleteMany => write!(f, "delete_many"),
            Self::DeleteAll => write!(f, "delete_all"),
            Self::ForceDelete => write!(f, "force_delete"),
            Self::Restore => write!(f, "restore"),
            Self::CheckUniqueness => write!(f, "check_uniqueness"),
            Self::ValidateRelation => write!(f, "validate_relation"),
            Self::Transaction => write!(f, "transaction"),
            Self::Introspect => write!(f, "introspect"),
        }
    }
}

/// Category of repository error
///
/// The set is closed: every failure the engine raises is one of these kinds,
/// and none of them is retriable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// No (visible) row matched
    NotFound,
    /// A unique constraint or uniqueness check was violated
    Duplicate {
        /// Conflicting column, when it could be determined
        field: Option<String>,
        /// Conflicting value, when it could be determined
        value: Option<String>,
    },
    /// Invalid input, invalid configuration, or an unclassified database failure
    Validation,
    /// A referenced row does not exist (or is still referenced)
    ForeignKey {
        /// Column holding the reference
        field: String,
        /// Table on the other side of the reference
        reference_table: String,
    },
    /// A soft delete was blocked by active dependent rows
    DependencyExists {
        /// Entity that could not be deleted
        entity_name: String,
        /// Dependent tables holding active references, in discovery order
        blocking_tables: Vec<String>,
    },
    /// A soft-delete-only operation was called on a repository without soft delete
    SoftDeleteNotConfigured {
        /// The operation that requires soft delete
        operation: RepositoryOperation,
    },
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Duplicate { .. } => write!(f, "duplicate"),
            Self::Validation => write!(f, "validation"),
            Self::ForeignKey { .. } => write!(f, "foreign_key"),
            Self::DependencyExists { .. } => write!(f, "dependency_exists"),
            Self::SoftDeleteNotConfigured { .. } => write!(f, "soft_delete_not_configured"),
        }
    }
}

/// Structured repository error with operation context
///
/// # Example
///
/// ```rust
/// use terrastore::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
///
/// let error = RepositoryError::dependency_exists("State", vec!["cities".to_string()])
///     .with_entity("State", "42");
///
/// match &error.kind {
///     RepositoryErrorKind::DependencyExists { blocking_tables, .. } => {
///         assert_eq!(blocking_tables, &["cities".to_string()]);
///     }
///     other => panic!("unexpected kind {other}"),
/// }
/// assert_eq!(error.operation, RepositoryOperation::Delete);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The type of entity involved (e.g., "City", "State")
    pub entity_type: Option<String>,
    /// The ID of the entity involved
    pub entity_id: Option<String>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    /// Create a "not found" error with entity context
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        Self {
            operation: RepositoryOperation::FindOne,
            kind: RepositoryErrorKind::NotFound,
            message: format!("{entity_type} not found"),
            entity_type: Some(entity_type),
            entity_id: Some(entity_id.into()),
        }
    }

    /// Create a duplicate error for a column/value pair
    pub fn duplicate(field: Option<String>, value: Option<String>) -> Self {
        let message = match (&field, &value) {
            (Some(field), Some(value)) => format!("{field} '{value}' already exists"),
            (Some(field), None) => format!("{field} already exists"),
            _ => "Record already exists".to_string(),
        };
        Self {
            operation: RepositoryOperation::Create,
            kind: RepositoryErrorKind::Duplicate { field, value },
            message,
            entity_type: None,
            entity_id: None,
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Create,
            RepositoryErrorKind::Validation,
            message,
        )
    }

    /// Create a foreign-key error
    pub fn foreign_key(field: impl Into<String>, reference_table: impl Into<String>) -> Self {
        let field = field.into();
        let reference_table = reference_table.into();
        Self {
            operation: RepositoryOperation::Create,
            message: format!("{field} references a missing row in {reference_table}"),
            kind: RepositoryErrorKind::ForeignKey {
                field,
                reference_table,
            },
            entity_type: None,
            entity_id: None,
        }
    }

    /// Create a dependency error listing the tables that block a soft delete
    pub fn dependency_exists(entity_name: impl Into<String>, blocking_tables: Vec<String>) -> Self {
        let entity_name = entity_name.into();
        Self {
            operation: RepositoryOperation::Delete,
            message: format!(
                "Cannot delete {entity_name}: it is still referenced by active rows in {}",
                blocking_tables.join(", ")
            ),
            kind: RepositoryErrorKind::DependencyExists {
                entity_name,
                blocking_tables,
            },
            entity_type: None,
            entity_id: None,
        }
    }

    /// Create an error for a soft-delete-only operation on a hard-delete repository
    pub fn soft_delete_not_configured(operation: RepositoryOperation) -> Self {
        Self {
            operation,
            kind: RepositoryErrorKind::SoftDeleteNotConfigured { operation },
            message: format!("{operation} requires soft delete to be enabled"),
            entity_type: None,
            entity_id: None,
        }
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Whether this is a [`RepositoryErrorKind::NotFound`] error
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, RepositoryErrorKind::NotFound)
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let (Some(ref entity_type), Some(ref entity_id)) = (&self.entity_type, &self.entity_id) {
            write!(f, " [{}: {}]", entity_type, entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_operation_display() {
        assert_eq!(format!("{}", RepositoryOperation::FindOne), "find_one");
        assert_eq!(format!("{}", RepositoryOperation::DeleteMany), "delete_many");
        assert_eq!(
            format!("{}", RepositoryOperation::ForceDelete),
            "force_delete"
        );
        assert_eq!(format!("{}", RepositoryOperation::Restore), "restore");
        assert_eq!(
            format!("{}", RepositoryOperation::CheckUniqueness),
            "check_uniqueness"
        );
    }

    #[test]
    fn test_repository_error_kind_display() {
        assert_eq!(format!("{}", RepositoryErrorKind::NotFound), "not_found");
        assert_eq!(
            format!(
                "{}",
                RepositoryErrorKind::Duplicate {
                    field: None,
                    value: None
                }
            ),
            "duplicate"
        );
        assert_eq!(
            format!(
                "{}",
                RepositoryErrorKind::SoftDeleteNotConfigured {
                    operation: RepositoryOperation::Restore
                }
            ),
            "soft_delete_not_configured"
        );
    }

    #[test]
    fn test_not_found_convenience() {
        let error = RepositoryError::not_found("City", "c_123");
        assert_eq!(error.operation, RepositoryOperation::FindOne);
        assert!(error.is_not_found());
        assert_eq!(error.entity_type, Some("City".to_string()));
        assert_eq!(error.entity_id, Some("c_123".to_string()));
    }

    #[test]
    fn test_duplicate_message_degrades() {
        let parsed = RepositoryError::duplicate(Some("code".into()), Some("TC".into()));
        assert_eq!(parsed.message, "code 'TC' already exists");

        let generic = RepositoryError::duplicate(None, None);
        assert_eq!(generic.message, "Record already exists");
        assert_eq!(
            generic.kind,
            RepositoryErrorKind::Duplicate {
                field: None,
                value: None
            }
        );
    }

    #[test]
    fn test_foreign_key_carries_structure() {
        let error = RepositoryError::foreign_key("state_id", "states");
        assert_eq!(
            error.kind,
            RepositoryErrorKind::ForeignKey {
                field: "state_id".to_string(),
                reference_table: "states".to_string(),
            }
        );
    }

    #[test]
    fn test_dependency_exists_lists_tables() {
        let error = RepositoryError::dependency_exists(
            "State",
            vec!["cities".to_string(), "terminals".to_string()],
        );
        assert!(error.message.contains("cities, terminals"));
        assert_eq!(error.operation, RepositoryOperation::Delete);
    }

    #[test]
    fn test_soft_delete_not_configured_keeps_operation() {
        let error = RepositoryError::soft_delete_not_configured(RepositoryOperation::ForceDelete);
        assert_eq!(error.operation, RepositoryOperation::ForceDelete);
        assert_eq!(
            error.kind,
            RepositoryErrorKind::SoftDeleteNotConfigured {
                operation: RepositoryOperation::ForceDelete
            }
        );
    }

    #[test]
    fn test_with_entity_and_operation() {
        let error = RepositoryError::validation("bad column")
            .with_entity("City", "c_1")
            .with_operation(RepositoryOperation::Update);

        assert_eq!(error.operation, RepositoryOperation::Update);
        assert_eq!(error.entity_type, Some("City".to_string()));
    }

    #[test]
    fn test_display_without_entity() {
        let display = format!("{}", RepositoryError::validation("Query failed"));
        assert!(display.contains("validation"));
        assert!(display.contains("create"));
        assert!(display.contains("Query failed"));
        assert!(!display.contains('['));
    }

    #[test]
    fn test_display_with_entity() {
        let display = format!("{}", RepositoryError::not_found("City", "c_123"));
        assert!(display.contains("not_found"));
        assert!(display.contains("find_one"));
        assert!(display.contains("[City: c_123]"));
    }

    #[test]
    fn test_error_is_error_trait() {
        let error: Box<dyn std::error::Error> = Box::new(RepositoryError::not_found("City", "1"));
        assert!(error.to_string().contains("not_found"));
    }
}
