//! Like and bookmark handlers

use axum::{
    extract::{Path, State},
    Json,
};

use crate::AppState;
use newsroom_common::{
    auth::AuthContext,
    errors::Result,
    publishing::{BookmarkToggled, LikeToggled},
};

pub async fn toggle_like(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(article_id): Path<i32>,
) -> Result<Json<LikeToggled>> {
    Ok(Json(state.engagement.toggle_like(&auth, article_id).await?))
}

pub async fn toggle_bookmark(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(article_id): Path<i32>,
) -> Result<Json<BookmarkToggled>> {
    Ok(Json(state.engagement.toggle_bookmark(&auth, article_id).await?))
}
