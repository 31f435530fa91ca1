//! Comment and moderation handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::AppState;
use newsroom_common::{
    auth::AuthContext,
    db::models::Comment,
    errors::Result,
    publishing::{Ack, CommentCreated, CommentThread, NewComment},
    Page, PaginationParams,
};

/// Submit a comment (pending until accepted)
pub async fn create_comment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(article_id): Path<i32>,
    Json(input): Json<NewComment>,
) -> Result<(StatusCode, Json<CommentCreated>)> {
    let created = state.comments.create(&auth, article_id, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Accepted comment threads of an article
pub async fn list_comments(
    State(state): State<AppState>,
    Path(article_id): Path<i32>,
    Query(page): Query<PaginationParams>,
) -> Result<Json<Page<CommentThread>>> {
    Ok(Json(state.comments.list_accepted(article_id, page.resolve()).await?))
}

pub async fn my_comments(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(article_id): Path<i32>,
    Query(page): Query<PaginationParams>,
) -> Result<Json<Page<Comment>>> {
    Ok(Json(state.comments.list_mine(&auth, article_id, page.resolve()).await?))
}

/// Latest accepted comments site-wide
pub async fn latest_comments(
    State(state): State<AppState>,
    Query(page): Query<PaginationParams>,
) -> Result<Json<Page<Comment>>> {
    Ok(Json(state.comments.latest_accepted(page.resolve()).await?))
}

pub async fn accept_comment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<i32>,
) -> Result<Json<Ack>> {
    Ok(Json(state.comments.accept(&auth, id).await?))
}

pub async fn reject_comment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<i32>,
) -> Result<Json<Ack>> {
    Ok(Json(state.comments.reject(&auth, id).await?))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<i32>,
) -> Result<Json<Ack>> {
    Ok(Json(state.comments.delete(&auth, id).await?))
}
