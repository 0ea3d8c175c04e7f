//! Shared pagination types for list queries.
//!
//! The booking service uses offset-based pagination with `skip` and `limit` parameters.

use serde::{Deserialize, Serialize};

/// Default number of items to request per page.
pub const DEFAULT_LIMIT: i64 = 10;

/// Maximum number of items the service returns per page.
pub const MAX_LIMIT: i64 = 100;

/// Clamp an optional skip to a non-negative value.
#[inline]
pub fn clamp_skip(skip: Option<i64>) -> i64 {
    skip.unwrap_or(0).max(0)
}

/// Clamp an optional limit between 1 and MAX_LIMIT, defaulting to DEFAULT_LIMIT.
#[inline]
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// A page of results with the metadata needed for client-side pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// The items for the current page
    pub data: Vec<T>,
    /// Total number of items matching the query (before pagination)
    pub total_count: i64,
    /// Number of items skipped
    pub skip: i64,
    /// Maximum items returned per page
    pub limit: i64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total_count: i64, skip: i64, limit: i64) -> Self {
        Self {
            data,
            total_count,
            skip,
            limit,
        }
    }

    /// True if items remain after this page.
    pub fn has_more(&self) -> bool {
        self.skip + (self.data.len() as i64) < self.total_count
    }
}
