//! Shared fixtures for engine tests: an in-memory SQLite store with seeded users

use crate::auth::{AuthContext, Role};
use crate::db::models::{article, user, Article, ArticleStatus};
use crate::db::{create_schema, DbPool};
use crate::Repository;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, Set};

pub const ADMIN: i32 = 1;
pub const JOURNALIST: i32 = 2;
pub const OTHER_JOURNALIST: i32 = 3;
pub const READER: i32 = 4;

/// Fresh single-connection in-memory database with schema and users.
///
/// The pool holds exactly one connection; a test must not touch the pool
/// while it keeps a transaction open.
pub async fn pool() -> DbPool {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1).min_connections(1).sqlx_logging(false);

    let conn = Database::connect(opts).await.expect("open sqlite");
    create_schema(&conn).await.expect("create schema");

    for (id, name, role) in [
        (ADMIN, "editor", Role::Admin),
        (JOURNALIST, "reporter", Role::Journalist),
        (OTHER_JOURNALIST, "columnist", Role::Journalist),
        (READER, "subscriber", Role::Reader),
    ] {
        user::ActiveModel {
            id: Set(id),
            username: Set(Some(name.to_string())),
            display_name: Set(Some(format!("The {}", name))),
            role: Set(role.as_str().to_string()),
        }
        .insert(&conn)
        .await
        .expect("seed user");
    }

    DbPool::from_connection(conn)
}

pub async fn repository() -> Repository {
    Repository::new(pool().await)
}

pub fn caller(user_id: i32, role: Role) -> AuthContext {
    AuthContext::new(user_id, role)
}

pub fn admin() -> AuthContext {
    caller(ADMIN, Role::Admin)
}

pub fn journalist() -> AuthContext {
    caller(JOURNALIST, Role::Journalist)
}

pub fn other_journalist() -> AuthContext {
    caller(OTHER_JOURNALIST, Role::Journalist)
}

pub fn reader() -> AuthContext {
    caller(READER, Role::Reader)
}

/// Insert an article row directly, bypassing slug and taxonomy handling
pub async fn insert_article(repo: &Repository, slug: &str, author_id: i32) -> Article {
    let now = Utc::now().fixed_offset();
    article::ActiveModel {
        title: Set(format!("Title of {}", slug)),
        content: Set(format!("Body text for {}", slug)),
        cover_image: Set(None),
        slug: Set(slug.to_string()),
        status: Set(ArticleStatus::Draft.into()),
        author_id: Set(author_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(repo.writer())
    .await
    .expect("insert article")
}
