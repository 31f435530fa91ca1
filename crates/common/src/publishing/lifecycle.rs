//! Article lifecycle
//!
//! Writes run in a single transaction each: slug resolution, the article
//! row and taxonomy links either all land or none do. Reads run in a read
//! snapshot so listing rows and their counts agree.

use super::query::{self, ArticleDetail, ArticleFilter, ArticlePredicate, ArticleSummary};
use super::slug::SlugResolver;
use super::{now_utc, taxonomy, Ack};
use crate::auth::{AuthContext, Role};
use crate::config::PublishingConfig;
use crate::db::models::{
    article, article_category, article_tag, bookmark, comment, like, Article, ArticleStatus,
};
use crate::db::{require_article, Repository};
use crate::errors::{AppError, Result};
use crate::metrics::{record_article_event, record_content_query};
use crate::pagination::{Page, Pagination};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, QueryFilter, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewArticle {
    #[validate(length(min = 10, max = 150))]
    pub title: String,

    #[validate(length(min = 10))]
    pub content: String,

    pub cover_image: Option<String>,

    /// Preferred slug; derived from the title when absent
    pub slug: Option<String>,

    /// Category titles; entries may hold several comma-separated titles
    #[serde(default)]
    pub categories: Vec<String>,

    /// Tag titles; entries may hold several comma-separated titles
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update. Absent or empty fields leave the article unchanged.
///
/// `tags: Some(vec![])` clears the tag set, while an empty category list
/// keeps the current categories.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ArticlePatch {
    #[validate(length(min = 10, max = 150))]
    pub title: Option<String>,

    #[validate(length(min = 10))]
    pub content: Option<String>,

    pub cover_image: Option<String>,

    pub slug: Option<String>,

    pub categories: Option<Vec<String>>,

    pub tags: Option<Vec<String>>,
}

impl ArticlePatch {
    /// Drop empty strings so they read as "not supplied"
    fn normalized(self) -> Self {
        Self {
            title: non_empty(self.title),
            content: non_empty(self.content),
            cover_image: non_empty(self.cover_image),
            slug: non_empty(self.slug),
            ..self
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Serialize)]
pub struct ArticleCreated {
    pub message: String,
    pub id: i32,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusChanged {
    pub message: String,
    pub status: ArticleStatus,
}

/// Admins, or the journalist who wrote the article
fn authorize_owner(ctx: &AuthContext, article: &Article) -> Result<()> {
    if ctx.is_admin() || ctx.is_authoring_journalist(article.author_id) {
        Ok(())
    } else {
        Err(AppError::forbidden(
            "Only admins or the article's author may change it",
        ))
    }
}

/// A unique-index violation on insert/update means another writer took the slug
fn slug_conflict(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => AppError::Duplicate {
            message: format!("Slug already taken: {}", detail),
        },
        _ => err.into(),
    }
}

#[derive(Clone)]
pub struct ArticleService {
    repo: Repository,
    slugs: SlugResolver,
}

impl ArticleService {
    pub fn new(repo: Repository, config: &PublishingConfig) -> Self {
        Self {
            repo,
            slugs: SlugResolver::new(config),
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Create a draft article with its taxonomy
    pub async fn create(&self, ctx: &AuthContext, input: NewArticle) -> Result<ArticleCreated> {
        ctx.require_role(&[Role::Admin, Role::Journalist])?;
        input.validate()?;

        let txn = self.repo.begin().await?;

        let candidate = input
            .slug
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&input.title);
        let slug = self.slugs.resolve(&txn, candidate, None).await?;

        let now = now_utc();
        let article = article::ActiveModel {
            title: Set(input.title),
            content: Set(input.content),
            cover_image: Set(non_empty(input.cover_image)),
            slug: Set(slug),
            status: Set(ArticleStatus::Draft.into()),
            author_id: Set(ctx.user_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(slug_conflict)?;

        taxonomy::sync_categories(&txn, article.id, &input.categories).await?;
        taxonomy::sync_tags(&txn, article.id, &input.tags).await?;
        txn.commit().await?;

        record_article_event("created");
        info!(
            article_id = article.id,
            slug = %article.slug,
            user_id = ctx.user_id,
            request_id = %ctx.request_id,
            "Article created"
        );

        Ok(ArticleCreated {
            message: "Article created".to_string(),
            id: article.id,
            slug: article.slug,
        })
    }

    /// Apply a partial update
    pub async fn update(
        &self,
        ctx: &AuthContext,
        article_id: i32,
        patch: ArticlePatch,
    ) -> Result<Ack> {
        let patch = patch.normalized();
        patch.validate()?;

        let txn = self.repo.begin().await?;
        let current = require_article(&txn, article_id).await?;
        authorize_owner(ctx, &current)?;

        // An explicit slug wins over a retitle
        let slug_source = match (&patch.slug, &patch.title) {
            (Some(slug), _) if *slug != current.slug => Some(slug.as_str()),
            (None, Some(title)) if *title != current.title => Some(title.as_str()),
            _ => None,
        };
        let new_slug = match slug_source {
            Some(source) => Some(self.slugs.resolve(&txn, source, Some(article_id)).await?),
            None => None,
        };

        let mut active: article::ActiveModel = current.clone().into();
        if let Some(title) = patch.title {
            active.title = Set(title);
        }
        if let Some(content) = patch.content {
            active.content = Set(content);
        }
        if let Some(cover_image) = patch.cover_image {
            active.cover_image = Set(Some(cover_image));
        }
        if let Some(slug) = new_slug.filter(|s| *s != current.slug) {
            active.slug = Set(slug);
        }
        active.updated_at = Set(now_utc());
        let updated = active.update(&txn).await.map_err(slug_conflict)?;

        if let Some(categories) = &patch.categories {
            taxonomy::sync_categories(&txn, article_id, categories).await?;
        }
        if let Some(tags) = &patch.tags {
            taxonomy::sync_tags(&txn, article_id, tags).await?;
        }
        txn.commit().await?;

        record_article_event("updated");
        info!(
            article_id,
            slug = %updated.slug,
            user_id = ctx.user_id,
            request_id = %ctx.request_id,
            "Article updated"
        );

        Ok(Ack::new("Article updated"))
    }

    /// Flip between draft and published
    pub async fn toggle_status(&self, ctx: &AuthContext, article_id: i32) -> Result<StatusChanged> {
        let txn = self.repo.begin().await?;
        let current = require_article(&txn, article_id).await?;
        authorize_owner(ctx, &current)?;

        let status = current.status().toggled();
        let mut active: article::ActiveModel = current.into();
        active.status = Set(status.into());
        active.updated_at = Set(now_utc());
        active.update(&txn).await?;
        txn.commit().await?;

        let event = match status {
            ArticleStatus::Published => "published",
            ArticleStatus::Draft => "unpublished",
        };
        record_article_event(event);
        info!(
            article_id,
            status = status.as_str(),
            user_id = ctx.user_id,
            request_id = %ctx.request_id,
            "Article status changed"
        );

        Ok(StatusChanged {
            message: format!("Article is now {}", status.as_str()),
            status,
        })
    }

    /// Delete an article with its comments, engagement and taxonomy links
    pub async fn delete(&self, ctx: &AuthContext, article_id: i32) -> Result<Ack> {
        let txn = self.repo.begin().await?;
        let current = require_article(&txn, article_id).await?;
        authorize_owner(ctx, &current)?;

        comment::Entity::delete_many()
            .filter(comment::Column::ArticleId.eq(article_id))
            .exec(&txn)
            .await?;
        like::Entity::delete_many()
            .filter(like::Column::ArticleId.eq(article_id))
            .exec(&txn)
            .await?;
        bookmark::Entity::delete_many()
            .filter(bookmark::Column::ArticleId.eq(article_id))
            .exec(&txn)
            .await?;
        article_category::Entity::delete_many()
            .filter(article_category::Column::ArticleId.eq(article_id))
            .exec(&txn)
            .await?;
        article_tag::Entity::delete_many()
            .filter(article_tag::Column::ArticleId.eq(article_id))
            .exec(&txn)
            .await?;
        article::Entity::delete_by_id(article_id).exec(&txn).await?;
        txn.commit().await?;

        record_article_event("deleted");
        info!(
            article_id,
            user_id = ctx.user_id,
            request_id = %ctx.request_id,
            "Article deleted"
        );

        Ok(Ack::new("Article deleted"))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Filtered listing, newest first
    pub async fn list(
        &self,
        filter: &ArticleFilter,
        pagination: Pagination,
    ) -> Result<Page<ArticleSummary>> {
        let predicates = filter.predicates()?;
        self.list_matching("list", &predicates, pagination).await
    }

    /// Articles carrying the tag with `tag_slug`
    pub async fn list_by_tag(
        &self,
        tag_slug: &str,
        pagination: Pagination,
    ) -> Result<Page<ArticleSummary>> {
        let predicates = [ArticlePredicate::Tag(tag_slug.to_string())];
        self.list_matching("by_tag", &predicates, pagination).await
    }

    /// The caller's own articles in any status
    pub async fn list_mine(
        &self,
        ctx: &AuthContext,
        pagination: Pagination,
    ) -> Result<Page<ArticleSummary>> {
        let predicates = [ArticlePredicate::Author(ctx.user_id)];
        self.list_matching("mine", &predicates, pagination).await
    }

    /// Detail view; `viewer` is the signed-in reader, if any
    pub async fn get_by_slug(
        &self,
        slug: &str,
        viewer: Option<&AuthContext>,
        comments: Pagination,
    ) -> Result<ArticleDetail> {
        let started = Instant::now();
        let txn = self.repo.begin_snapshot().await?;
        let detail = query::article_by_slug(&txn, slug, viewer.map(|v| v.user_id), comments).await?;
        txn.commit().await?;

        record_content_query("detail", started.elapsed().as_secs_f64());
        Ok(detail)
    }

    async fn list_matching(
        &self,
        kind: &str,
        predicates: &[ArticlePredicate],
        pagination: Pagination,
    ) -> Result<Page<ArticleSummary>> {
        let started = Instant::now();
        let txn = self.repo.begin_snapshot().await?;
        let page = query::list_articles(&txn, predicates, pagination).await?;
        txn.commit().await?;

        record_content_query(kind, started.elapsed().as_secs_f64());
        tracing::debug!(kind, total = page.pagination.total_count, "Article listing served");
        Ok(page)
    }
}
