//! Newsroom Common Library
//!
//! Shared code for the Newsroom services including:
//! - Database models and repository patterns
//! - The publishing engine (slugs, taxonomy, queries, engagement, moderation)
//! - Error types and handling
//! - Configuration management
//! - Identity context extraction
//! - Pagination and metrics

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod pagination;
pub mod publishing;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use errors::{AppError, Result};
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use pagination::{Page, PageMeta, Pagination, PaginationParams};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of articles sampled for the "related content" block of a detail view
pub const RELATED_SAMPLE_SIZE: u64 = 3;
