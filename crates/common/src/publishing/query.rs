//! Content query builder
//!
//! Filters are parsed into typed `ArticlePredicate`s and folded into one
//! parametrized condition. Engagement counts are computed relationally per
//! page, on the same connection (normally a read snapshot) as the rows.

use super::moderation::{self, CommentThread};
use crate::db::models::{
    article, article_category, article_tag, bookmark, category, comment, like, tag, user, Article,
    ArticleStatus, Category, Tag, User,
};
use crate::errors::{AppError, Result};
use crate::pagination::{Page, Pagination};
use crate::RELATED_SAMPLE_SIZE;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{BinOper, Expr, Func, LikeExpr, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, Order, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, QueryTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One filter clause over articles
#[derive(Debug, Clone, PartialEq)]
pub enum ArticlePredicate {
    /// Linked to a category whose title matches case-insensitively
    Category(String),
    /// Linked to the tag with this slug
    Tag(String),
    /// Case-insensitive substring of title followed by content
    Search(String),
    Status(ArticleStatus),
    Author(i32),
    /// Created at or after (inclusive)
    CreatedFrom(DateTimeWithTimeZone),
    /// Created at or before (inclusive)
    CreatedTo(DateTimeWithTimeZone),
}

impl ArticlePredicate {
    fn to_expr(&self) -> SimpleExpr {
        match self {
            ArticlePredicate::Category(title) => article::Column::Id.in_subquery(
                article_category::Entity::find()
                    .select_only()
                    .column(article_category::Column::ArticleId)
                    .inner_join(category::Entity)
                    .filter(
                        Expr::expr(Func::lower(Expr::col((
                            category::Entity,
                            category::Column::Title,
                        ))))
                        .eq(title.to_lowercase()),
                    )
                    .into_query(),
            ),
            ArticlePredicate::Tag(slug) => article::Column::Id.in_subquery(
                article_tag::Entity::find()
                    .select_only()
                    .column(article_tag::Column::ArticleId)
                    .inner_join(tag::Entity)
                    .filter(tag::Column::Slug.eq(slug.as_str()))
                    .into_query(),
            ),
            ArticlePredicate::Search(term) => {
                let haystack = SimpleExpr::Binary(
                    Box::new(Expr::col((article::Entity, article::Column::Title)).into()),
                    BinOper::Custom("||"),
                    Box::new(Expr::col((article::Entity, article::Column::Content)).into()),
                );
                let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
                Expr::expr(Func::lower(haystack)).like(LikeExpr::new(pattern).escape('\\'))
            }
            ArticlePredicate::Status(status) => article::Column::Status.eq(status.as_str()),
            ArticlePredicate::Author(id) => article::Column::AuthorId.eq(*id),
            ArticlePredicate::CreatedFrom(from) => article::Column::CreatedAt.gte(*from),
            ArticlePredicate::CreatedTo(to) => article::Column::CreatedAt.lte(*to),
        }
    }
}

/// AND of all predicates; an empty slice matches everything
pub fn condition(predicates: &[ArticlePredicate]) -> Condition {
    predicates
        .iter()
        .fold(Condition::all(), |cond, p| cond.add(p.to_expr()))
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Listing filters as supplied by a client; empty values mean "absent"
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    pub status: Option<String>,
    pub author_id: Option<i32>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`
    pub from: Option<String>,
    pub to: Option<String>,
}

impl ArticleFilter {
    pub fn predicates(&self) -> Result<Vec<ArticlePredicate>> {
        let mut predicates = Vec::new();

        if let Some(category) = present(&self.category) {
            predicates.push(ArticlePredicate::Category(category.to_string()));
        }
        if let Some(search) = present(&self.search) {
            predicates.push(ArticlePredicate::Search(search.to_string()));
        }
        if let Some(status) = present(&self.status) {
            predicates.push(ArticlePredicate::Status(parse_status(status)?));
        }
        if let Some(author_id) = self.author_id {
            predicates.push(ArticlePredicate::Author(author_id));
        }
        if let Some(from) = present(&self.from) {
            predicates.push(ArticlePredicate::CreatedFrom(parse_instant("from", from)?));
        }
        if let Some(to) = present(&self.to) {
            predicates.push(ArticlePredicate::CreatedTo(parse_instant("to", to)?));
        }

        Ok(predicates)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_status(raw: &str) -> Result<ArticleStatus> {
    match raw.to_ascii_lowercase().as_str() {
        "draft" => Ok(ArticleStatus::Draft),
        "published" => Ok(ArticleStatus::Published),
        _ => Err(AppError::Validation {
            message: format!("Unknown status '{}'", raw),
            field: Some("status".to_string()),
        }),
    }
}

/// Parse an RFC 3339 timestamp, or a bare date as midnight UTC
pub fn parse_instant(field: &str, raw: &str) -> Result<DateTimeWithTimeZone> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc).fixed_offset());
    }
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(day.and_time(NaiveTime::MIN).and_utc().fixed_offset());
    }
    Err(AppError::Validation {
        message: format!("'{}' is not a date or RFC 3339 timestamp", raw),
        field: Some(field.to_string()),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorView {
    pub id: i32,
    pub username: Option<String>,
    pub display_name: Option<String>,
}

impl From<User> for AuthorView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
        }
    }
}

/// Row of an article listing
#[derive(Debug, Clone, Serialize)]
pub struct ArticleSummary {
    pub id: i32,
    pub title: String,
    pub slug: String,
    pub cover_image: Option<String>,
    pub status: ArticleStatus,
    pub author: Option<AuthorView>,
    pub categories: Vec<Category>,
    pub like_count: u64,
    pub bookmark_count: u64,
    /// Accepted comments only
    pub comment_count: u64,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

/// Full article view for a single slug
#[derive(Debug, Clone, Serialize)]
pub struct ArticleDetail {
    #[serde(flatten)]
    pub article: Article,
    pub author: Option<AuthorView>,
    pub categories: Vec<Category>,
    pub tags: Vec<Tag>,
    pub like_count: u64,
    pub bookmark_count: u64,
    pub is_liked: bool,
    pub is_bookmarked: bool,
    pub comments: Page<CommentThread>,
    pub related: Vec<RelatedArticle>,
}

/// Compact entry of the "related content" block
#[derive(Debug, Clone, Serialize)]
pub struct RelatedArticle {
    pub id: i32,
    pub title: String,
    pub slug: String,
    pub cover_image: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub author: Option<AuthorView>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub like_count: u64,
    pub bookmark_count: u64,
    pub comment_count: u64,
}

/// Page of article summaries matching all predicates, newest first
pub async fn list_articles<C: ConnectionTrait>(
    conn: &C,
    predicates: &[ArticlePredicate],
    pagination: Pagination,
) -> Result<Page<ArticleSummary>> {
    let paginator = article::Entity::find()
        .filter(condition(predicates))
        .order_by_desc(article::Column::Id)
        .paginate(conn, pagination.limit);

    let total = paginator.num_items().await?;
    let articles = paginator.fetch_page(pagination.page - 1).await?;

    let ids: Vec<i32> = articles.iter().map(|a| a.id).collect();
    let authors = authors_by_id(conn, articles.iter().map(|a| a.author_id)).await?;
    let mut categories = categories_by_article(conn, &ids).await?;
    let counts = EngagementCounts::load(conn, &ids).await?;

    let items = articles
        .into_iter()
        .map(|a| ArticleSummary {
            author: authors.get(&a.author_id).cloned(),
            categories: categories.remove(&a.id).unwrap_or_default(),
            like_count: counts.likes(a.id),
            bookmark_count: counts.bookmarks(a.id),
            comment_count: counts.comments(a.id),
            status: a.status(),
            id: a.id,
            title: a.title,
            slug: a.slug,
            cover_image: a.cover_image,
            created_at: a.created_at,
            updated_at: a.updated_at,
        })
        .collect();

    Ok(Page::new(items, total, pagination))
}

/// Detail view of the article with `slug`.
///
/// `viewer` drives the `is_liked`/`is_bookmarked` flags; `comments` pages
/// the accepted top-level comments.
pub async fn article_by_slug<C: ConnectionTrait>(
    conn: &C,
    slug: &str,
    viewer: Option<i32>,
    comments: Pagination,
) -> Result<ArticleDetail> {
    let article = article::Entity::find()
        .filter(article::Column::Slug.eq(slug))
        .one(conn)
        .await?
        .ok_or_else(|| AppError::ArticleNotFound { id: slug.to_string() })?;

    let id = article.id;
    let author = user::Entity::find_by_id(article.author_id)
        .one(conn)
        .await?
        .map(AuthorView::from);
    let categories = categories_by_article(conn, &[id]).await?.remove(&id).unwrap_or_default();
    let tags = tags_by_article(conn, &[id]).await?.remove(&id).unwrap_or_default();
    let counts = EngagementCounts::load(conn, &[id]).await?;

    let (is_liked, is_bookmarked) = match viewer {
        Some(user_id) => (
            like::Entity::find()
                .filter(like::Column::ArticleId.eq(id))
                .filter(like::Column::UserId.eq(user_id))
                .count(conn)
                .await?
                > 0,
            bookmark::Entity::find()
                .filter(bookmark::Column::ArticleId.eq(id))
                .filter(bookmark::Column::UserId.eq(user_id))
                .count(conn)
                .await?
                > 0,
        ),
        None => (false, false),
    };

    let comments = moderation::accepted_threads(conn, id, comments).await?;
    let related = related_articles(conn, id).await?;

    Ok(ArticleDetail {
        author,
        categories,
        tags,
        like_count: counts.likes(id),
        bookmark_count: counts.bookmarks(id),
        is_liked,
        is_bookmarked,
        comments,
        related,
        article,
    })
}

/// Random sample of other articles, drawn fresh on every call
async fn related_articles<C: ConnectionTrait>(
    conn: &C,
    exclude: i32,
) -> Result<Vec<RelatedArticle>> {
    let picks = article::Entity::find()
        .filter(article::Column::Id.ne(exclude))
        .order_by(Expr::cust("RANDOM()"), Order::Asc)
        .limit(RELATED_SAMPLE_SIZE)
        .all(conn)
        .await?;

    let ids: Vec<i32> = picks.iter().map(|a| a.id).collect();
    let authors = authors_by_id(conn, picks.iter().map(|a| a.author_id)).await?;
    let mut categories = categories_by_article(conn, &ids).await?;
    let mut tags = tags_by_article(conn, &ids).await?;
    let counts = EngagementCounts::load(conn, &ids).await?;

    Ok(picks
        .into_iter()
        .map(|a| RelatedArticle {
            author: authors.get(&a.author_id).cloned(),
            categories: distinct(
                categories
                    .remove(&a.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| c.title),
            ),
            tags: distinct(tags.remove(&a.id).unwrap_or_default().into_iter().map(|t| t.slug)),
            like_count: counts.likes(a.id),
            bookmark_count: counts.bookmarks(a.id),
            comment_count: counts.comments(a.id),
            id: a.id,
            title: a.title,
            slug: a.slug,
            cover_image: a.cover_image,
            created_at: a.created_at,
        })
        .collect())
}

fn distinct(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

async fn authors_by_id<C: ConnectionTrait>(
    conn: &C,
    ids: impl Iterator<Item = i32>,
) -> Result<HashMap<i32, AuthorView>> {
    let mut ids: Vec<i32> = ids.collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    Ok(user::Entity::find()
        .filter(user::Column::Id.is_in(ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|u| (u.id, AuthorView::from(u)))
        .collect())
}

async fn categories_by_article<C: ConnectionTrait>(
    conn: &C,
    ids: &[i32],
) -> Result<HashMap<i32, Vec<Category>>> {
    let mut grouped: HashMap<i32, Vec<Category>> = HashMap::new();
    if ids.is_empty() {
        return Ok(grouped);
    }

    let rows = article_category::Entity::find()
        .filter(article_category::Column::ArticleId.is_in(ids.iter().copied()))
        .order_by_asc(article_category::Column::Id)
        .find_also_related(category::Entity)
        .all(conn)
        .await?;

    for (link, category) in rows {
        if let Some(category) = category {
            grouped.entry(link.article_id).or_default().push(category);
        }
    }
    Ok(grouped)
}

async fn tags_by_article<C: ConnectionTrait>(
    conn: &C,
    ids: &[i32],
) -> Result<HashMap<i32, Vec<Tag>>> {
    let mut grouped: HashMap<i32, Vec<Tag>> = HashMap::new();
    if ids.is_empty() {
        return Ok(grouped);
    }

    let rows = article_tag::Entity::find()
        .filter(article_tag::Column::ArticleId.is_in(ids.iter().copied()))
        .find_also_related(tag::Entity)
        .order_by_asc(tag::Column::Title)
        .all(conn)
        .await?;

    for (link, tag) in rows {
        if let Some(tag) = tag {
            grouped.entry(link.article_id).or_default().push(tag);
        }
    }
    Ok(grouped)
}

/// Like, bookmark and accepted-comment counts for a set of articles
#[derive(Debug, Default)]
struct EngagementCounts {
    likes: HashMap<i32, u64>,
    bookmarks: HashMap<i32, u64>,
    comments: HashMap<i32, u64>,
}

impl EngagementCounts {
    async fn load<C: ConnectionTrait>(conn: &C, ids: &[i32]) -> Result<Self> {
        if ids.is_empty() {
            return Ok(Self::default());
        }

        Ok(Self {
            likes: count_by_article::<like::Entity, C>(conn, like::Column::ArticleId, ids, None)
                .await?,
            bookmarks: count_by_article::<bookmark::Entity, C>(
                conn,
                bookmark::Column::ArticleId,
                ids,
                None,
            )
            .await?,
            comments: count_by_article::<comment::Entity, C>(
                conn,
                comment::Column::ArticleId,
                ids,
                Some(comment::Column::Accepted.eq(true)),
            )
            .await?,
        })
    }

    fn likes(&self, id: i32) -> u64 {
        self.likes.get(&id).copied().unwrap_or(0)
    }

    fn bookmarks(&self, id: i32) -> u64 {
        self.bookmarks.get(&id).copied().unwrap_or(0)
    }

    fn comments(&self, id: i32) -> u64 {
        self.comments.get(&id).copied().unwrap_or(0)
    }
}

async fn count_by_article<E, C>(
    conn: &C,
    column: E::Column,
    ids: &[i32],
    extra: Option<SimpleExpr>,
) -> Result<HashMap<i32, u64>>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    let mut query = E::find()
        .select_only()
        .column(column)
        .column_as(Expr::col(column).count(), "total")
        .filter(column.is_in(ids.iter().copied()))
        .group_by(column);

    if let Some(extra) = extra {
        query = query.filter(extra);
    }

    let rows: Vec<(i32, i64)> = query.into_tuple().all(conn).await?;
    Ok(rows
        .into_iter()
        .map(|(id, total)| (id, total.max(0) as u64))
        .collect())
}
