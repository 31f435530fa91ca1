//! Pagination directive and response envelope

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Raw pagination input as supplied by a client (`?page=&limit=`)
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PaginationParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// Resolved pagination window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based page number
    pub page: u64,
    pub limit: u64,
    pub skip: u64,
}

impl PaginationParams {
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }

    /// Apply defaults and caps
    pub fn resolve(&self) -> Pagination {
        let limit = self
            .limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        // Offsets are bound as signed 64-bit values
        let page = self
            .page
            .filter(|p| *p > 0)
            .unwrap_or(1)
            .min(i64::MAX as u64 / limit);

        Pagination {
            page,
            limit,
            skip: (page - 1) * limit,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        PaginationParams::default().resolve()
    }
}

/// Pagination metadata returned alongside a page of items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub total_count: u64,
    pub current_page: u64,
    pub total_pages: u64,
    pub limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_page: Option<u64>,
}

impl PageMeta {
    pub fn new(total_count: u64, pagination: Pagination) -> Self {
        let total_pages = total_count.div_ceil(pagination.limit);
        let current_page = pagination.page;

        Self {
            total_count,
            current_page,
            total_pages,
            limit: pagination.limit,
            next_page: (current_page < total_pages).then_some(current_page + 1),
            previous_page: (current_page > 1).then_some(current_page - 1),
        }
    }
}

/// A page of items with its metadata
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub pagination: PageMeta,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: u64, pagination: Pagination) -> Self {
        Self {
            pagination: PageMeta::new(total_count, pagination),
            items,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            pagination: self.pagination,
            items: self.items.into_iter().map(f).collect(),
        }
    }
}
