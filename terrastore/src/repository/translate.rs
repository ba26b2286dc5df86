//! Translation of driver errors into repository errors
//!
//! Postgres reports constraint violations through a SQLSTATE code plus a
//! detail line such as `Key (code)=(TC) already exists.`. The translator maps
//! the code to a [`RepositoryErrorKind`] and recovers the column, value and
//! referenced table from the detail text when it can. Parsing never fails:
//! text that does not match degrades to a less specific error of the same
//! kind.

use std::sync::LazyLock;

use regex::Regex;
use sqlx::postgres::PgDatabaseError;
use tracing::debug;

use super::error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};

/// SQLSTATE for `foreign_key_violation`
pub const FOREIGN_KEY_VIOLATION: &str = "23503";
/// SQLSTATE for `unique_violation`
pub const UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE for `not_null_violation`
pub const NOT_NULL_VIOLATION: &str = "23502";
/// SQLSTATE for `check_violation`
pub const CHECK_VIOLATION: &str = "23514";

static FOREIGN_KEY_MISSING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Key \((?P<field>.+?)\)=\((?P<value>.*)\) is not present in table "(?P<table>[^"]+)""#)
        .expect("valid foreign key regex")
});

static FOREIGN_KEY_REFERENCED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Key \((?P<field>.+?)\)=\((?P<value>.*)\) is still referenced from table "(?P<table>[^"]+)""#)
        .expect("valid foreign key regex")
});

static UNIQUE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Key \((?P<field>.+?)\)=\((?P<value>.*)\) already exists")
        .expect("valid unique key regex")
});

static NOT_NULL_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"null value in column "(?P<column>[^"]+)""#).expect("valid not-null regex")
});

static FUNCTION_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+\((?P<inner>.*)\)$").expect("valid function call regex"));

static COLUMN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s(),:]+$").expect("valid column name regex"));

/// The parts of a database failure the translator looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbFailure<'a> {
    /// SQLSTATE code
    pub code: Option<&'a str>,
    /// Primary error message
    pub message: &'a str,
    /// Detail line (`Key (…)=(…) …`)
    pub detail: Option<&'a str>,
    /// Column reported by the server
    pub column: Option<&'a str>,
    /// Table reported by the server
    pub table: Option<&'a str>,
}

/// Translate a driver error raised while running `operation` on `entity_name`
pub fn translate_error(
    error: sqlx::Error,
    operation: RepositoryOperation,
    entity_name: &str,
) -> RepositoryError {
    let mut translated = match &error {
        sqlx::Error::RowNotFound => RepositoryError::new(
            operation,
            RepositoryErrorKind::NotFound,
            format!("{entity_name} not found"),
        ),
        sqlx::Error::Database(db) => {
            let code = db.code();
            let pg = db.try_downcast_ref::<PgDatabaseError>();
            let failure = DbFailure {
                code: code.as_deref(),
                message: db.message(),
                detail: pg.and_then(PgDatabaseError::detail),
                column: pg.and_then(PgDatabaseError::column),
                table: db.table(),
            };
            translate_failure(&failure, operation, entity_name)
        }
        other => RepositoryError::new(
            operation,
            RepositoryErrorKind::Validation,
            format!("Failed to {operation} {entity_name}: {other}"),
        ),
    };

    debug!(
        operation = %operation,
        entity = entity_name,
        kind = %translated.kind,
        error = %error,
        "Translated database error"
    );

    translated.entity_type = Some(entity_name.to_string());
    translated
}

/// Translate an already-decomposed database failure
pub fn translate_failure(
    failure: &DbFailure<'_>,
    operation: RepositoryOperation,
    entity_name: &str,
) -> RepositoryError {
    let text = failure.detail.unwrap_or(failure.message);

    match failure.code {
        Some(FOREIGN_KEY_VIOLATION) => {
            let captures = FOREIGN_KEY_MISSING
                .captures(text)
                .or_else(|| FOREIGN_KEY_REFERENCED.captures(text));
            let (field, table) = match captures {
                Some(caps) => (
                    normalize_key_expression(&caps["field"])
                        .or_else(|| failure.column.map(str::to_string))
                        .unwrap_or_else(|| "unknown".to_string()),
                    caps["table"].to_string(),
                ),
                None => (
                    failure.column.unwrap_or("unknown").to_string(),
                    failure.table.unwrap_or("unknown").to_string(),
                ),
            };
            let mut error = RepositoryError::foreign_key(field, table).with_operation(operation);
            if let Some(detail) = failure.detail {
                error.message = format!("{}: {detail}", error.message);
            }
            error
        }
        Some(UNIQUE_VIOLATION) => {
            let (field, value) = match UNIQUE_KEY.captures(text) {
                Some(caps) => (
                    normalize_key_expression(&caps["field"]),
                    Some(caps["value"].to_string()),
                ),
                None => (failure.column.map(str::to_string), None),
            };
            RepositoryError::duplicate(field, value).with_operation(operation)
        }
        Some(NOT_NULL_VIOLATION) => {
            let column = failure.column.map(str::to_string).or_else(|| {
                NOT_NULL_COLUMN
                    .captures(failure.message)
                    .map(|caps| caps["column"].to_string())
            });
            let message = match column {
                Some(column) => format!("{column} is required"),
                None => format!("A required {entity_name} field is missing"),
            };
            RepositoryError::new(operation, RepositoryErrorKind::Validation, message)
        }
        _ => RepositoryError::new(
            operation,
            RepositoryErrorKind::Validation,
            format!("Failed to {operation} {entity_name}: {text}"),
        ),
    }
}

/// Reduce an index key expression such as `lower((name)::text)` to `name`
///
/// Composite keys are reduced part by part, so
/// `state_id, lower(name::text)` becomes `state_id, name`. Returns `None`
/// when a part does not reduce to a plain column name.
pub fn normalize_key_expression(expression: &str) -> Option<String> {
    let columns = split_top_level(expression)
        .into_iter()
        .map(normalize_key_part)
        .collect::<Option<Vec<_>>>()?;
    Some(columns.join(", "))
}

fn normalize_key_part(part: &str) -> Option<String> {
    let mut current = part.trim().to_string();
    loop {
        let before = current.clone();

        if let Some(caps) = FUNCTION_CALL.captures(&current) {
            current = caps["inner"].trim().to_string();
        }
        if let Some((head, _)) = current.split_once("::") {
            current = head.trim().to_string();
        }
        while current.starts_with('(') && current.ends_with(')') && current.len() >= 2 {
            current = current[1..current.len() - 1].trim().to_string();
        }
        current = current.trim_matches('"').to_string();

        if current == before {
            break;
        }
    }
    COLUMN_NAME.is_match(&current).then_some(current)
}

/// Split on commas outside parentheses and double quotes
fn split_top_level(expression: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut start = 0;
    for (index, ch) in expression.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                parts.push(&expression[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&expression[start..]);
    parts
}
