//! Like and bookmark toggles
//!
//! A toggle is a conditional delete followed, when nothing was removed, by
//! an insert that ignores conflicts on the unique (article, user) index.
//! Both run in one transaction, so concurrent duplicates cannot create a
//! second row.

use crate::auth::AuthContext;
use crate::db::models::{bookmark, like};
use crate::db::{require_article, Repository};
use crate::errors::Result;
use crate::metrics::record_toggle;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel,
    QueryFilter, Set,
};
use serde::Serialize;
use tracing::info;

/// A membership table keyed by (article, user)
pub trait EngagementTable: EntityTrait {
    type Row: ActiveModelTrait<Entity = Self> + ActiveModelBehavior + Send;

    /// Metric and log label
    const KIND: &'static str;

    fn article_column() -> Self::Column;
    fn user_column() -> Self::Column;
    fn row(article_id: i32, user_id: i32) -> Self::Row;
}

impl EngagementTable for like::Entity {
    type Row = like::ActiveModel;
    const KIND: &'static str = "like";

    fn article_column() -> Self::Column {
        like::Column::ArticleId
    }

    fn user_column() -> Self::Column {
        like::Column::UserId
    }

    fn row(article_id: i32, user_id: i32) -> Self::Row {
        like::ActiveModel {
            article_id: Set(article_id),
            user_id: Set(user_id),
            ..Default::default()
        }
    }
}

impl EngagementTable for bookmark::Entity {
    type Row = bookmark::ActiveModel;
    const KIND: &'static str = "bookmark";

    fn article_column() -> Self::Column {
        bookmark::Column::ArticleId
    }

    fn user_column() -> Self::Column {
        bookmark::Column::UserId
    }

    fn row(article_id: i32, user_id: i32) -> Self::Row {
        bookmark::ActiveModel {
            article_id: Set(article_id),
            user_id: Set(user_id),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LikeToggled {
    pub message: String,
    pub liked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookmarkToggled {
    pub message: String,
    pub bookmarked: bool,
}

#[derive(Clone)]
pub struct EngagementService {
    repo: Repository,
}

impl EngagementService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub async fn toggle_like(&self, ctx: &AuthContext, article_id: i32) -> Result<LikeToggled> {
        let liked = self.toggle::<like::Entity>(ctx, article_id).await?;
        Ok(LikeToggled {
            message: if liked { "Article liked" } else { "Like removed" }.to_string(),
            liked,
        })
    }

    pub async fn toggle_bookmark(
        &self,
        ctx: &AuthContext,
        article_id: i32,
    ) -> Result<BookmarkToggled> {
        let bookmarked = self.toggle::<bookmark::Entity>(ctx, article_id).await?;
        Ok(BookmarkToggled {
            message: if bookmarked { "Article bookmarked" } else { "Bookmark removed" }.to_string(),
            bookmarked,
        })
    }

    /// Flip membership; returns whether the row exists afterwards
    async fn toggle<E>(&self, ctx: &AuthContext, article_id: i32) -> Result<bool>
    where
        E: EngagementTable,
        E::Model: IntoActiveModel<E::Row>,
    {
        let txn = self.repo.begin().await?;
        require_article(&txn, article_id).await?;

        let removed = E::delete_many()
            .filter(E::article_column().eq(article_id))
            .filter(E::user_column().eq(ctx.user_id))
            .exec(&txn)
            .await?
            .rows_affected;

        let active = if removed > 0 {
            false
        } else {
            E::insert(E::row(article_id, ctx.user_id))
                .on_conflict(
                    OnConflict::columns([E::article_column(), E::user_column()])
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
            true
        };

        txn.commit().await?;

        record_toggle(E::KIND, active);
        info!(
            kind = E::KIND,
            article_id,
            user_id = ctx.user_id,
            active,
            request_id = %ctx.request_id,
            "Engagement toggled"
        );

        Ok(active)
    }
}
