//! Threaded comments and the moderation workflow
//!
//! A comment is either pending (`accepted = false`) or accepted. Accept
//! and reject move between the two; delete removes the comment together
//! with every reply below it. Replies reference their parent by id only.

use super::{now_utc, Ack};
use crate::auth::AuthContext;
use crate::db::models::{comment, Article, Comment};
use crate::db::{require_article, require_comment, Repository};
use crate::errors::{AppError, Result};
use crate::metrics::{record_comment_created, record_moderation};
use crate::pagination::{Page, Pagination};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Select, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewComment {
    #[validate(length(min = 1, max = 500))]
    pub text: String,

    /// Comment being replied to; unknown ids make this a top-level comment
    pub parent_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentCreated {
    pub message: String,
    pub comment: Comment,
}

/// An accepted comment with its accepted replies, oldest reply first
#[derive(Debug, Clone, Serialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<CommentThread>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Accept,
    Reject,
}

impl Decision {
    fn as_str(&self) -> &'static str {
        match self {
            Decision::Accept => "accept",
            Decision::Reject => "reject",
        }
    }

    fn target(&self) -> bool {
        matches!(self, Decision::Accept)
    }
}

/// Admins, or the journalist who wrote the article, may moderate its comments
fn can_moderate(ctx: &AuthContext, article: &Article) -> bool {
    ctx.is_admin() || ctx.is_authoring_journalist(article.author_id)
}

#[derive(Clone)]
pub struct CommentService {
    repo: Repository,
}

impl CommentService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Submit a comment for moderation
    pub async fn create(
        &self,
        ctx: &AuthContext,
        article_id: i32,
        input: NewComment,
    ) -> Result<CommentCreated> {
        input.validate()?;
        let conn = self.repo.writer();

        require_article(conn, article_id).await?;

        let parent_id = match input.parent_id {
            Some(parent_id) => match comment::Entity::find_by_id(parent_id).one(conn).await? {
                Some(parent) if parent.article_id != article_id => {
                    return Err(AppError::bad_request(
                        "Parent comment belongs to another article",
                    ));
                }
                Some(parent) => Some(parent.id),
                None => {
                    debug!(parent_id, "Unknown parent comment, posting top-level");
                    None
                }
            },
            None => None,
        };

        let comment = comment::ActiveModel {
            text: Set(input.text),
            accepted: Set(false),
            article_id: Set(article_id),
            author_id: Set(ctx.user_id),
            parent_id: Set(parent_id),
            created_at: Set(now_utc()),
            ..Default::default()
        }
        .insert(conn)
        .await?;

        record_comment_created(parent_id.is_some());
        info!(
            comment_id = comment.id,
            article_id,
            user_id = ctx.user_id,
            request_id = %ctx.request_id,
            "Comment submitted for moderation"
        );

        Ok(CommentCreated {
            message: "Comment submitted for moderation".to_string(),
            comment,
        })
    }

    /// Make a pending comment publicly visible
    pub async fn accept(&self, ctx: &AuthContext, comment_id: i32) -> Result<Ack> {
        self.decide(ctx, comment_id, Decision::Accept).await
    }

    /// Return an accepted comment to pending
    pub async fn reject(&self, ctx: &AuthContext, comment_id: i32) -> Result<Ack> {
        self.decide(ctx, comment_id, Decision::Reject).await
    }

    async fn decide(&self, ctx: &AuthContext, comment_id: i32, decision: Decision) -> Result<Ack> {
        let txn = self.repo.begin().await?;

        let comment = require_comment(&txn, comment_id).await?;
        let article = require_article(&txn, comment.article_id).await?;

        if !can_moderate(ctx, &article) {
            record_moderation(decision.as_str(), false);
            return Err(AppError::forbidden(
                "Only admins or the article's author may moderate its comments",
            ));
        }

        if comment.accepted == decision.target() {
            return Err(AppError::bad_request(match decision {
                Decision::Accept => "Comment is already accepted",
                Decision::Reject => "Comment is already pending",
            }));
        }

        let mut active: comment::ActiveModel = comment.into();
        active.accepted = Set(decision.target());
        active.update(&txn).await?;
        txn.commit().await?;

        record_moderation(decision.as_str(), true);
        info!(
            comment_id,
            action = decision.as_str(),
            user_id = ctx.user_id,
            request_id = %ctx.request_id,
            "Comment moderated"
        );

        Ok(Ack::new(match decision {
            Decision::Accept => "Comment accepted",
            Decision::Reject => "Comment rejected",
        }))
    }

    /// Delete a comment and all replies below it
    pub async fn delete(&self, ctx: &AuthContext, comment_id: i32) -> Result<Ack> {
        let txn = self.repo.begin().await?;

        let comment = require_comment(&txn, comment_id).await?;
        let article = require_article(&txn, comment.article_id).await?;

        if !(comment.author_id == ctx.user_id || can_moderate(ctx, &article)) {
            record_moderation("delete", false);
            return Err(AppError::forbidden(
                "Only admins, the comment's author or the article's author may delete it",
            ));
        }

        let arena: Vec<(i32, Option<i32>)> = comment::Entity::find()
            .select_only()
            .column(comment::Column::Id)
            .column(comment::Column::ParentId)
            .filter(comment::Column::ArticleId.eq(comment.article_id))
            .into_tuple()
            .all(&txn)
            .await?;

        let doomed = subtree(comment_id, &arena);
        let removed = comment::Entity::delete_many()
            .filter(comment::Column::Id.is_in(doomed))
            .exec(&txn)
            .await?
            .rows_affected;
        txn.commit().await?;

        record_moderation("delete", true);
        info!(
            comment_id,
            removed,
            user_id = ctx.user_id,
            request_id = %ctx.request_id,
            "Comment deleted"
        );

        Ok(Ack::new("Comment deleted"))
    }

    /// Public threads of an article
    pub async fn list_accepted(
        &self,
        article_id: i32,
        pagination: Pagination,
    ) -> Result<Page<CommentThread>> {
        let txn = self.repo.begin_snapshot().await?;
        require_article(&txn, article_id).await?;
        let page = accepted_threads(&txn, article_id, pagination).await?;
        txn.commit().await?;
        Ok(page)
    }

    /// The caller's own comments on one article, whatever their state
    pub async fn list_mine(
        &self,
        ctx: &AuthContext,
        article_id: i32,
        pagination: Pagination,
    ) -> Result<Page<Comment>> {
        let conn = self.repo.reader();
        require_article(conn, article_id).await?;

        let query = comment::Entity::find()
            .filter(comment::Column::ArticleId.eq(article_id))
            .filter(comment::Column::AuthorId.eq(ctx.user_id));
        newest_first(conn, query, pagination).await
    }

    /// Accepted comments across all articles
    pub async fn latest_accepted(&self, pagination: Pagination) -> Result<Page<Comment>> {
        let query = comment::Entity::find().filter(comment::Column::Accepted.eq(true));
        newest_first(self.repo.reader(), query, pagination).await
    }
}

async fn newest_first<C: ConnectionTrait>(
    conn: &C,
    query: Select<comment::Entity>,
    pagination: Pagination,
) -> Result<Page<Comment>> {
    let paginator = query
        .order_by_desc(comment::Column::CreatedAt)
        .order_by_desc(comment::Column::Id)
        .paginate(conn, pagination.limit);

    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(pagination.page - 1).await?;
    Ok(Page::new(items, total, pagination))
}

/// Page of accepted top-level comments, newest first, each carrying its
/// accepted replies. Replies under a pending comment are not shown.
pub async fn accepted_threads<C: ConnectionTrait>(
    conn: &C,
    article_id: i32,
    pagination: Pagination,
) -> Result<Page<CommentThread>> {
    let accepted = comment::Entity::find()
        .filter(comment::Column::ArticleId.eq(article_id))
        .filter(comment::Column::Accepted.eq(true));

    let paginator = accepted
        .clone()
        .filter(comment::Column::ParentId.is_null())
        .order_by_desc(comment::Column::CreatedAt)
        .order_by_desc(comment::Column::Id)
        .paginate(conn, pagination.limit);

    let total = paginator.num_items().await?;
    let roots = paginator.fetch_page(pagination.page - 1).await?;

    let mut children: HashMap<i32, Vec<Comment>> = HashMap::new();
    if !roots.is_empty() {
        let replies = accepted
            .filter(comment::Column::ParentId.is_not_null())
            .order_by_asc(comment::Column::CreatedAt)
            .order_by_asc(comment::Column::Id)
            .all(conn)
            .await?;
        for reply in replies {
            if let Some(parent_id) = reply.parent_id {
                children.entry(parent_id).or_default().push(reply);
            }
        }
    }

    let threads = roots
        .into_iter()
        .map(|root| thread(root, &mut children))
        .collect();
    Ok(Page::new(threads, total, pagination))
}

fn thread(comment: Comment, children: &mut HashMap<i32, Vec<Comment>>) -> CommentThread {
    let replies = children
        .remove(&comment.id)
        .unwrap_or_default()
        .into_iter()
        .map(|reply| thread(reply, children))
        .collect();
    CommentThread { comment, replies }
}

/// `root` and every comment below it, from an arena of (id, parent_id) pairs
fn subtree(root: i32, arena: &[(i32, Option<i32>)]) -> Vec<i32> {
    let mut children: HashMap<i32, Vec<i32>> = HashMap::new();
    for &(id, parent) in arena {
        if let Some(parent) = parent {
            children.entry(parent).or_default().push(id);
        }
    }

    let mut seen = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);
    let mut out = Vec::new();

    while let Some(id) = queue.pop_front() {
        out.push(id);
        for &child in children.get(&id).into_iter().flatten() {
            if seen.insert(child) {
                queue.push_back(child);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use crate::PaginationParams;

    struct Fixture {
        repo: Repository,
        service: CommentService,
        article: Article,
    }

    async fn fixture() -> Fixture {
        let repo = testing::repository().await;
        let article = testing::insert_article(&repo, "commented", testing::JOURNALIST).await;
        Fixture {
            service: CommentService::new(repo.clone()),
            repo,
            article,
        }
    }

    fn new_comment(text: &str, parent_id: Option<i32>) -> NewComment {
        NewComment {
            text: text.to_string(),
            parent_id,
        }
    }

    async fn post(f: &Fixture, article_id: i32, text: &str, parent_id: Option<i32>) -> Comment {
        f.service
            .create(&testing::reader(), article_id, new_comment(text, parent_id))
            .await
            .unwrap()
            .comment
    }

    async fn stored(repo: &Repository, id: i32) -> Comment {
        require_comment(repo.writer(), id).await.unwrap()
    }

    #[test]
    fn test_subtree() {
        let arena = [(1, None), (2, Some(1)), (3, Some(2)), (4, None), (5, Some(1)), (6, Some(4))];
        let mut ids = subtree(1, &arena);
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3, 5]);
        assert_eq!(subtree(6, &arena), vec![6]);
    }

    #[test]
    fn test_comment_validation() {
        assert!(new_comment("", None).validate().is_err());
        assert!(new_comment(&"x".repeat(501), None).validate().is_err());
        assert!(new_comment("Good read", None).validate().is_ok());
    }

    #[tokio::test]
    async fn test_new_comment_hidden_until_accepted() {
        let f = fixture().await;
        let created = f
            .service
            .create(&testing::reader(), f.article.id, new_comment("First!", None))
            .await
            .unwrap();
        assert!(!created.comment.accepted);

        let public = f.service.list_accepted(f.article.id, Pagination::default()).await.unwrap();
        assert!(public.items.is_empty());

        let mine = f
            .service
            .list_mine(&testing::reader(), f.article.id, Pagination::default())
            .await
            .unwrap();
        assert_eq!(mine.items.len(), 1);

        f.service.accept(&testing::journalist(), created.comment.id).await.unwrap();

        let public = f.service.list_accepted(f.article.id, Pagination::default()).await.unwrap();
        assert_eq!(public.items.len(), 1);
        assert_eq!(public.items[0].comment.id, created.comment.id);
    }

    #[tokio::test]
    async fn test_reader_cannot_moderate() {
        let f = fixture().await;
        let created = f
            .service
            .create(&testing::reader(), f.article.id, new_comment("Pending", None))
            .await
            .unwrap();

        for result in [
            f.service.accept(&testing::reader(), created.comment.id).await,
            f.service.reject(&testing::reader(), created.comment.id).await,
            f.service.accept(&testing::other_journalist(), created.comment.id).await,
        ] {
            assert!(matches!(result, Err(AppError::Forbidden { .. })));
        }
        assert!(!stored(&f.repo, created.comment.id).await.accepted);

        assert!(matches!(
            f.service.accept(&testing::reader(), 9999).await,
            Err(AppError::CommentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_accept_reject_transitions() {
        let f = fixture().await;
        let id = f
            .service
            .create(&testing::reader(), f.article.id, new_comment("Flip me", None))
            .await
            .unwrap()
            .comment
            .id;

        assert!(matches!(
            f.service.reject(&testing::admin(), id).await,
            Err(AppError::BadRequest { .. })
        ));

        f.service.accept(&testing::admin(), id).await.unwrap();
        assert!(stored(&f.repo, id).await.accepted);

        assert!(matches!(
            f.service.accept(&testing::admin(), id).await,
            Err(AppError::BadRequest { .. })
        ));

        f.service.reject(&testing::journalist(), id).await.unwrap();
        assert!(!stored(&f.repo, id).await.accepted);
    }

    #[tokio::test]
    async fn test_parent_resolution() {
        let f = fixture().await;
        let other = testing::insert_article(&f.repo, "elsewhere", testing::JOURNALIST).await;
        let reader = testing::reader();

        let root = f
            .service
            .create(&reader, f.article.id, new_comment("Root", None))
            .await
            .unwrap()
            .comment;

        let reply = f
            .service
            .create(&reader, f.article.id, new_comment("Reply", Some(root.id)))
            .await
            .unwrap()
            .comment;
        assert_eq!(reply.parent_id, Some(root.id));

        let orphan = f
            .service
            .create(&reader, f.article.id, new_comment("Orphan", Some(9999)))
            .await
            .unwrap()
            .comment;
        assert_eq!(orphan.parent_id, None);

        assert!(matches!(
            f.service.create(&reader, other.id, new_comment("Cross", Some(root.id))).await,
            Err(AppError::BadRequest { .. })
        ));
    }

    #[tokio::test]
    async fn test_threads_nest_accepted_replies() {
        let f = fixture().await;
        let admin = testing::admin();

        let root = post(&f, f.article.id, "Root", None).await;
        let first = post(&f, f.article.id, "First", Some(root.id)).await;
        let second = post(&f, f.article.id, "Second", Some(root.id)).await;
        let hidden = post(&f, f.article.id, "Hidden", Some(root.id)).await;
        let nested = post(&f, f.article.id, "Nested", Some(first.id)).await;

        for id in [root.id, first.id, second.id, nested.id] {
            f.service.accept(&admin, id).await.unwrap();
        }

        let page = f.service.list_accepted(f.article.id, Pagination::default()).await.unwrap();
        assert_eq!(page.pagination.total_count, 1);

        let thread = &page.items[0];
        let reply_ids: Vec<i32> = thread.replies.iter().map(|r| r.comment.id).collect();
        assert_eq!(reply_ids, vec![first.id, second.id]);
        assert!(!reply_ids.contains(&hidden.id));
        assert_eq!(thread.replies[0].replies[0].comment.id, nested.id);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_replies() {
        let f = fixture().await;
        let reader = testing::reader();

        let root = post(&f, f.article.id, "Root", None).await;
        let reply = post(&f, f.article.id, "Reply", Some(root.id)).await;
        post(&f, f.article.id, "Deep", Some(reply.id)).await;
        let sibling = post(&f, f.article.id, "Other", None).await;

        assert!(matches!(
            f.service.delete(&testing::other_journalist(), root.id).await,
            Err(AppError::Forbidden { .. })
        ));

        // The comment's own author may delete it
        f.service.delete(&reader, root.id).await.unwrap();

        let left = comment::Entity::find().all(f.repo.writer()).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, sibling.id);

        // The article's author may delete anyone's comment
        f.service.delete(&testing::journalist(), sibling.id).await.unwrap();
        assert!(comment::Entity::find().all(f.repo.writer()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_admin_delete_and_missing_comment() {
        let f = fixture().await;
        let created = f
            .service
            .create(&testing::reader(), f.article.id, new_comment("Spam", None))
            .await
            .unwrap();

        f.service.delete(&testing::admin(), created.comment.id).await.unwrap();
        assert!(comment::Entity::find().all(f.repo.writer()).await.unwrap().is_empty());

        for ctx in [testing::reader(), testing::admin()] {
            assert!(matches!(
                f.service.delete(&ctx, created.comment.id).await,
                Err(AppError::CommentNotFound { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_latest_accepted_is_site_wide() {
        let f = fixture().await;
        let other =
            testing::insert_article(&f.repo, "second-story", testing::OTHER_JOURNALIST).await;

        let a = post(&f, f.article.id, "On first", None).await;
        let b = post(&f, other.id, "On second", None).await;
        post(&f, other.id, "Pending", None).await;

        f.service.accept(&testing::admin(), a.id).await.unwrap();
        f.service.accept(&testing::other_journalist(), b.id).await.unwrap();

        let page = f.service.latest_accepted(PaginationParams::new(1, 10).resolve()).await.unwrap();
        let ids: Vec<i32> = page.items.iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a.id) && ids.contains(&b.id));
    }
}
