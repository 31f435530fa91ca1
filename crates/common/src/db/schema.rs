//! Table bootstrap built from the entity definitions

use super::models::{
    article, article_category, article_tag, bookmark, category, comment, like, tag, user,
};
use crate::errors::Result;
use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, EntityTrait, Schema};
use tracing::info;

/// Create every table and index that does not exist yet.
///
/// Tables are created parents first so foreign keys resolve.
pub async fn create_schema<C: ConnectionTrait>(conn: &C) -> Result<()> {
    let schema = Schema::new(conn.get_database_backend());

    create_table(conn, &schema, user::Entity).await?;
    create_table(conn, &schema, category::Entity).await?;
    create_table(conn, &schema, tag::Entity).await?;
    create_table(conn, &schema, article::Entity).await?;
    create_table(conn, &schema, article_category::Entity).await?;
    create_table(conn, &schema, article_tag::Entity).await?;
    create_table(conn, &schema, like::Entity).await?;
    create_table(conn, &schema, bookmark::Entity).await?;
    create_table(conn, &schema, comment::Entity).await?;

    // One engagement row per (article, user)
    create_index(
        conn,
        Index::create()
            .name("uq-article_likes-article_user")
            .table(like::Entity)
            .col(like::Column::ArticleId)
            .col(like::Column::UserId)
            .unique()
            .if_not_exists()
            .to_owned(),
    )
    .await?;

    create_index(
        conn,
        Index::create()
            .name("uq-article_bookmarks-article_user")
            .table(bookmark::Entity)
            .col(bookmark::Column::ArticleId)
            .col(bookmark::Column::UserId)
            .unique()
            .if_not_exists()
            .to_owned(),
    )
    .await?;

    create_index(
        conn,
        Index::create()
            .name("uq-article_categories-article_category")
            .table(article_category::Entity)
            .col(article_category::Column::ArticleId)
            .col(article_category::Column::CategoryId)
            .unique()
            .if_not_exists()
            .to_owned(),
    )
    .await?;

    info!("Database schema ready");
    Ok(())
}

async fn create_table<C, E>(conn: &C, schema: &Schema, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let backend = conn.get_database_backend();

    let table = schema.create_table_from_entity(entity).if_not_exists().to_owned();
    conn.execute(backend.build(&table)).await?;

    // Secondary indexes from `#[sea_orm(indexed)]` columns
    for mut index in schema.create_index_from_entity(entity) {
        index.if_not_exists();
        conn.execute(backend.build(&index)).await?;
    }

    Ok(())
}

async fn create_index<C: ConnectionTrait>(conn: &C, index: IndexCreateStatement) -> Result<()> {
    let backend = conn.get_database_backend();
    conn.execute(backend.build(&index)).await?;
    Ok(())
}
