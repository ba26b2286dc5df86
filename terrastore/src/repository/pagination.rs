//! Ordering and pagination types
//!
//! # Example
//!
//! ```rust
//! use terrastore::repository::{OrderBy, PageRequest, PaginationMeta};
//!
//! let page = PageRequest::new(3, 5);
//! assert_eq!(page.resolve(20, 100), (3, 5));
//!
//! let meta = PaginationMeta::new(3, 5, 12);
//! assert_eq!(meta.total_pages, 3);
//! assert!(!meta.has_next_page);
//!
//! let order = [OrderBy::asc("name"), OrderBy::desc("created_at")];
//! assert_eq!(order.len(), 2);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction for ordering results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    Descending,
}

impl OrderDirection {
    /// SQL keyword for this direction
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// One `(field, direction)` ordering term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Column to order by
    pub field: String,
    /// Sort direction
    pub direction: OrderDirection,
}

impl OrderBy {
    /// Create an ordering term
    pub fn new(field: impl Into<String>, direction: OrderDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    /// Ascending ordering on `field`
    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, OrderDirection::Ascending)
    }

    /// Descending ordering on `field`
    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, OrderDirection::Descending)
    }
}

/// A requested page (1-indexed)
///
/// Page `0` is treated as page `1`. When no page size is given the
/// repository's default applies; explicit sizes are clamped into
/// `1..=max_page_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page number (1-indexed)
    pub page: u32,
    /// Items per page
    pub page_size: Option<u32>,
}

impl PageRequest {
    /// Request `page` with an explicit page size
    #[must_use]
    pub const fn new(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size: Some(page_size),
        }
    }

    /// Request `page` with the default page size
    #[must_use]
    pub const fn page(page: u32) -> Self {
        Self {
            page,
            page_size: None,
        }
    }

    /// Request the first page with the given size
    #[must_use]
    pub const fn first(page_size: u32) -> Self {
        Self::new(1, page_size)
    }

    /// Resolve to a concrete `(page, page_size)` pair
    #[must_use]
    pub fn resolve(&self, default_page_size: u32, max_page_size: u32) -> (u32, u32) {
        let max_page_size = max_page_size.max(1);
        let page_size = self
            .page_size
            .unwrap_or(default_page_size)
            .clamp(1, max_page_size);
        (self.page.max(1), page_size)
    }
}

/// Pagination metadata returned alongside a page of results
///
/// # Example
///
/// ```rust
/// use terrastore::repository::PaginationMeta;
///
/// let pagination = PaginationMeta::new(2, 20, 50);
/// assert_eq!(pagination.total_pages, 3);
/// assert!(pagination.has_next_page);
/// assert!(pagination.has_previous_page);
///
/// let json = serde_json::to_value(&pagination).unwrap();
/// assert_eq!(json["currentPage"], 2);
/// assert_eq!(json["hasPreviousPage"], true);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    /// Current page number (1-indexed)
    pub current_page: u32,
    /// Number of items per page
    pub page_size: u32,
    /// Total number of items across all pages
    pub total_count: u64,
    /// Total number of pages
    pub total_pages: u32,
    /// Whether there is a next page
    pub has_next_page: bool,
    /// Whether there is a previous page
    pub has_previous_page: bool,
}

impl PaginationMeta {
    /// Create new pagination metadata
    ///
    /// Automatically calculates `total_pages`, `has_next_page`, and
    /// `has_previous_page`.
    #[must_use]
    pub fn new(current_page: u32, page_size: u32, total_count: u64) -> Self {
        let page_size = if page_size == 0 { 1 } else { page_size };
        let total_pages = calculate_total_pages(total_count, page_size);

        Self {
            current_page,
            page_size,
            total_count,
            total_pages,
            has_next_page: current_page < total_pages,
            has_previous_page: current_page > 1,
        }
    }

    /// Pagination for an empty result set
    #[must_use]
    pub fn empty(page_size: u32) -> Self {
        Self::new(1, page_size, 0)
    }

    /// Row offset of the current page
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.current_page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

/// Calculate total pages, rounding up
fn calculate_total_pages(total: u64, page_size: u32) -> u32 {
    let page_size = u64::from(page_size);
    let pages = total.saturating_add(page_size).saturating_sub(1) / page_size;
    pages.min(u64::from(u32::MAX)) as u32
}

/// A page of rows with its pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaginatedResult<T> {
    /// Rows on this page
    pub data: Vec<T>,
    /// Pagination metadata
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResult<T> {
    /// Create a paginated result
    pub fn new(data: Vec<T>, pagination: PaginationMeta) -> Self {
        Self { data, pagination }
    }

    /// Map the rows, keeping the metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedResult<U> {
        PaginatedResult {
            data: self.data.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_direction() {
        assert_eq!(OrderDirection::default(), OrderDirection::Ascending);
        assert_eq!(OrderDirection::Descending.as_sql(), "DESC");
        assert_eq!(format!("{}", OrderDirection::Ascending), "asc");
    }

    #[test]
    fn test_page_request_resolution() {
        assert_eq!(PageRequest::new(0, 10).resolve(20, 100), (1, 10));
        assert_eq!(PageRequest::page(2).resolve(20, 100), (2, 20));
        assert_eq!(PageRequest::new(1, 0).resolve(20, 100), (1, 1));
        assert_eq!(PageRequest::new(1, 500).resolve(20, 100), (1, 100));
        assert_eq!(PageRequest::default().resolve(20, 100), (1, 20));
    }

    #[test]
    fn test_twelve_rows_in_pages_of_five() {
        let first = PaginationMeta::new(1, 5, 12);
        assert_eq!(first.total_pages, 3);
        assert!(first.has_next_page);
        assert!(!first.has_previous_page);

        let last = PaginationMeta::new(3, 5, 12);
        assert!(!last.has_next_page);
        assert!(last.has_previous_page);
        assert_eq!(last.offset(), 10);
    }

    #[test]
    fn test_empty_pagination() {
        let meta = PaginationMeta::empty(20);
        assert_eq!(meta.total_pages, 0);
        assert!(!meta.has_next_page);
        assert!(!meta.has_previous_page);
    }

    #[test]
    fn test_zero_page_size_guard() {
        let meta = PaginationMeta::new(1, 0, 3);
        assert_eq!(meta.page_size, 1);
        assert_eq!(meta.total_pages, 3);
    }

    #[test]
    fn test_page_beyond_total() {
        let meta = PaginationMeta::new(9, 5, 12);
        assert!(!meta.has_next_page);
        assert!(meta.has_previous_page);
    }

    #[test]
    fn test_paginated_result_map() {
        let result = PaginatedResult::new(vec![1, 2], PaginationMeta::new(1, 2, 4));
        let mapped = result.map(|n| n * 10);
        assert_eq!(mapped.data, vec![10, 20]);
        assert_eq!(mapped.pagination.total_count, 4);
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(PaginationMeta::new(1, 5, 12)).unwrap();
        assert_eq!(json["pageSize"], 5);
        assert_eq!(json["totalCount"], 12);
        assert_eq!(json["hasNextPage"], true);
    }
}
