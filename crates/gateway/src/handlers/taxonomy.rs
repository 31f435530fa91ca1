//! Tag and category catalogue handlers

use axum::{extract::State, Json};

use crate::AppState;
use newsroom_common::{
    db::models::{Category, Tag},
    errors::Result,
};

pub async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<Tag>>> {
    Ok(Json(state.repo.list_tags().await?))
}

pub async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(state.repo.list_categories().await?))
}
