//! Article handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::AppState;
use newsroom_common::{
    auth::{AuthContext, OptionalAuth},
    errors::Result,
    publishing::{
        Ack, ArticleCreated, ArticleDetail, ArticleFilter, ArticlePatch, ArticleSummary,
        NewArticle, StatusChanged,
    },
    Page, PaginationParams,
};

/// Create a draft article
pub async fn create_article(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(input): Json<NewArticle>,
) -> Result<(StatusCode, Json<ArticleCreated>)> {
    let created = state.articles.create(&auth, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Filtered, paginated listing
pub async fn list_articles(
    State(state): State<AppState>,
    Query(filter): Query<ArticleFilter>,
    Query(page): Query<PaginationParams>,
) -> Result<Json<Page<ArticleSummary>>> {
    let articles = state.articles.list(&filter, page.resolve()).await?;
    Ok(Json(articles))
}

pub async fn my_articles(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(page): Query<PaginationParams>,
) -> Result<Json<Page<ArticleSummary>>> {
    let articles = state.articles.list_mine(&auth, page.resolve()).await?;
    Ok(Json(articles))
}

pub async fn articles_by_tag(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(page): Query<PaginationParams>,
) -> Result<Json<Page<ArticleSummary>>> {
    let articles = state.articles.list_by_tag(&slug, page.resolve()).await?;
    Ok(Json(articles))
}

/// Detail view; the pagination parameters page the comments
pub async fn get_article(
    State(state): State<AppState>,
    OptionalAuth(viewer): OptionalAuth,
    Path(slug): Path<String>,
    Query(page): Query<PaginationParams>,
) -> Result<Json<ArticleDetail>> {
    let detail = state
        .articles
        .get_by_slug(&slug, viewer.as_ref(), page.resolve())
        .await?;
    Ok(Json(detail))
}

pub async fn update_article(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<i32>,
    Json(patch): Json<ArticlePatch>,
) -> Result<Json<Ack>> {
    Ok(Json(state.articles.update(&auth, id, patch).await?))
}

pub async fn toggle_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<i32>,
) -> Result<Json<StatusChanged>> {
    Ok(Json(state.articles.toggle_status(&auth, id).await?))
}

pub async fn delete_article(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<i32>,
) -> Result<Json<Ack>> {
    Ok(Json(state.articles.delete(&auth, id).await?))
}
