//! SeaORM entity models
//!
//! Database entities for the Newsroom publishing engine

pub mod article;
pub mod article_category;
pub mod article_tag;
pub mod bookmark;
pub mod category;
pub mod comment;
pub mod like;
pub mod tag;
pub mod user;

pub use article::{
    ArticleStatus,
    Entity as ArticleEntity,
    Model as Article,
};

pub use category::{
    Entity as CategoryEntity,
    Model as Category,
};

pub use comment::{
    Entity as CommentEntity,
    Model as Comment,
};

pub use tag::{
    Entity as TagEntity,
    Model as Tag,
};

pub use user::Model as User;
