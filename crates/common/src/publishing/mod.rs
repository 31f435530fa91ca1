//! Content publishing and moderation engine
//!
//! - `slug`: collision-free article identifiers
//! - `taxonomy`: category and tag reconciliation
//! - `query`: filtered, count-annotated article listings and detail views
//! - `engagement`: like/bookmark toggles
//! - `moderation`: threaded comments and the accept/reject/delete workflow
//! - `lifecycle`: article create/update/status/delete orchestration
//!
//! Every operation that needs the caller receives an explicit `AuthContext`.

pub mod engagement;
pub mod lifecycle;
pub mod moderation;
pub mod query;
pub mod slug;
pub mod taxonomy;

pub use engagement::{BookmarkToggled, EngagementService, LikeToggled};
pub use lifecycle::{ArticleCreated, ArticlePatch, ArticleService, NewArticle, StatusChanged};
pub use moderation::{CommentCreated, CommentService, CommentThread, NewComment};
pub use query::{
    ArticleDetail, ArticleFilter, ArticlePredicate, ArticleSummary, AuthorView, RelatedArticle,
};

use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};

/// Acknowledgement returned by side-effecting operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub message: String,
}

impl Ack {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Current instant, stored with a UTC offset
pub(crate) fn now_utc() -> DateTimeWithTimeZone {
    chrono::Utc::now().fixed_offset()
}
