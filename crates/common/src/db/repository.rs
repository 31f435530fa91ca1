//! Repository for database operations
//!
//! Hands out write transactions and read snapshots to the publishing
//! engine and serves the simple catalogue reads directly.

use crate::db::models::{article, category, comment, tag, Article, Category, Comment, Tag};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use sea_orm::sea_query::Expr;
use sea_orm::{
    AccessMode, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, EntityTrait,
    IsolationLevel, Order, QueryOrder, TransactionTrait,
};

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    pub fn reader(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    pub fn writer(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    /// Start a read-write transaction on the primary
    pub async fn begin(&self) -> Result<DatabaseTransaction> {
        Ok(self.writer().begin().await?)
    }

    /// Start a read-only snapshot so that rows and derived counts agree.
    ///
    /// Postgres gets REPEATABLE READ; other backends fall back to a plain
    /// transaction, which is already serialized there.
    pub async fn begin_snapshot(&self) -> Result<DatabaseTransaction> {
        let conn = self.reader();
        let txn = match conn.get_database_backend() {
            DbBackend::Postgres => {
                conn.begin_with_config(
                    Some(IsolationLevel::RepeatableRead),
                    Some(AccessMode::ReadOnly),
                )
                .await?
            }
            _ => conn.begin().await?,
        };
        Ok(txn)
    }

    // ========================================================================
    // Catalogue
    // ========================================================================

    /// All tags, alphabetically
    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        tag::Entity::find()
            .order_by_asc(tag::Column::Title)
            .all(self.reader())
            .await
            .map_err(Into::into)
    }

    /// All categories by priority (unprioritised last), then title
    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        category::Entity::find()
            .order_by(Expr::col(category::Column::Priority).is_null(), Order::Asc)
            .order_by_asc(category::Column::Priority)
            .order_by_asc(category::Column::Title)
            .all(self.reader())
            .await
            .map_err(Into::into)
    }
}

/// Load an article or fail with `ArticleNotFound`
pub async fn require_article<C: ConnectionTrait>(conn: &C, id: i32) -> Result<Article> {
    article::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::ArticleNotFound { id: id.to_string() })
}

/// Load a comment or fail with `CommentNotFound`
pub async fn require_comment<C: ConnectionTrait>(conn: &C, id: i32) -> Result<Comment> {
    comment::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::CommentNotFound { id: id.to_string() })
}
