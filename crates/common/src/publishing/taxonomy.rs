//! Category and tag reconciliation for a single article

use super::slug::slugify;
use crate::db::models::{article_category, article_tag, category, tag, Category, Tag};
use crate::errors::Result;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Split comma-separated entries into trimmed, non-empty terms
pub fn split_terms(entries: &[String]) -> Vec<String> {
    entries
        .iter()
        .flat_map(|entry| entry.split(','))
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(String::from)
        .collect()
}

/// Replace the article's category links with the given titles.
///
/// Titles are matched exactly; unknown ones are created. An input with no
/// usable terms leaves the existing links alone.
pub async fn sync_categories<C: ConnectionTrait>(
    conn: &C,
    article_id: i32,
    titles: &[String],
) -> Result<Vec<Category>> {
    let terms = split_terms(titles);
    if terms.is_empty() {
        debug!(article_id, "No categories supplied, links unchanged");
        return Ok(Vec::new());
    }

    let mut resolved: Vec<Category> = Vec::with_capacity(terms.len());
    for title in terms {
        if resolved.iter().any(|c| c.title == title) {
            continue;
        }

        let existing = category::Entity::find()
            .filter(category::Column::Title.eq(title.as_str()))
            .one(conn)
            .await?;

        let category = match existing {
            Some(category) => category,
            None => {
                debug!(title = %title, "Creating category");
                category::ActiveModel {
                    title: Set(title),
                    priority: Set(None),
                    ..Default::default()
                }
                .insert(conn)
                .await?
            }
        };
        resolved.push(category);
    }

    article_category::Entity::delete_many()
        .filter(article_category::Column::ArticleId.eq(article_id))
        .exec(conn)
        .await?;

    let links = resolved.iter().map(|c| article_category::ActiveModel {
        article_id: Set(article_id),
        category_id: Set(c.id),
        ..Default::default()
    });
    article_category::Entity::insert_many(links)
        .exec_without_returning(conn)
        .await?;

    Ok(resolved)
}

/// Replace the article's tag set with the given titles.
///
/// Titles are deduplicated by slug, keeping the first spelling seen. Tags
/// dropped from the set stay in the catalogue. An empty input clears the
/// article's tags.
pub async fn sync_tags<C: ConnectionTrait>(
    conn: &C,
    article_id: i32,
    titles: &[String],
) -> Result<Vec<Tag>> {
    let mut seen = HashSet::new();
    let wanted: Vec<(String, String)> = split_terms(titles)
        .into_iter()
        .filter_map(|title| {
            let slug = slugify(&title);
            (!slug.is_empty() && seen.insert(slug.clone())).then_some((slug, title))
        })
        .collect();

    let mut existing: HashMap<String, Tag> = if wanted.is_empty() {
        HashMap::new()
    } else {
        tag::Entity::find()
            .filter(tag::Column::Slug.is_in(wanted.iter().map(|(slug, _)| slug.clone())))
            .all(conn)
            .await?
            .into_iter()
            .map(|t| (t.slug.clone(), t))
            .collect()
    };

    let mut resolved = Vec::with_capacity(wanted.len());
    for (slug, title) in wanted {
        let tag = match existing.remove(&slug) {
            Some(tag) => tag,
            None => {
                debug!(slug = %slug, "Creating tag");
                tag::ActiveModel {
                    slug: Set(slug),
                    title: Set(title),
                    ..Default::default()
                }
                .insert(conn)
                .await?
            }
        };
        resolved.push(tag);
    }

    article_tag::Entity::delete_many()
        .filter(article_tag::Column::ArticleId.eq(article_id))
        .exec(conn)
        .await?;

    if !resolved.is_empty() {
        let links = resolved.iter().map(|t| article_tag::ActiveModel {
            article_id: Set(article_id),
            tag_id: Set(t.id),
        });
        article_tag::Entity::insert_many(links)
            .exec_without_returning(conn)
            .await?;
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use sea_orm::{PaginatorTrait, QueryOrder};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    async fn linked_tag_slugs<C: ConnectionTrait>(conn: &C, article_id: i32) -> Vec<String> {
        let mut slugs: Vec<String> = article_tag::Entity::find()
            .filter(article_tag::Column::ArticleId.eq(article_id))
            .find_also_related(tag::Entity)
            .all(conn)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|(_, t)| t.map(|t| t.slug))
            .collect();
        slugs.sort();
        slugs
    }

    #[test]
    fn test_split_terms() {
        assert_eq!(
            split_terms(&strings(&["ai, ML", " ", "Rust,,  Go "])),
            strings(&["ai", "ML", "Rust", "Go"])
        );
        assert!(split_terms(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_tag_dedup_keeps_first_casing() {
        let repo = testing::repository().await;
        let article = testing::insert_article(&repo, "dedup", testing::JOURNALIST).await;

        let tags = sync_tags(repo.writer(), article.id, &strings(&["A", "a ", " A"]))
            .await
            .unwrap();

        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].title, "A");
        assert_eq!(tags[0].slug, "a");
        assert_eq!(tag::Entity::find().count(repo.writer()).await.unwrap(), 1);
        assert_eq!(linked_tag_slugs(repo.writer(), article.id).await, strings(&["a"]));
    }

    #[tokio::test]
    async fn test_tags_reuse_existing_rows() {
        let repo = testing::repository().await;
        let first = testing::insert_article(&repo, "first", testing::JOURNALIST).await;
        let second = testing::insert_article(&repo, "second", testing::JOURNALIST).await;

        let a = sync_tags(repo.writer(), first.id, &strings(&["Rust"])).await.unwrap();
        let b = sync_tags(repo.writer(), second.id, &strings(&["rust", "Go"])).await.unwrap();

        assert_eq!(a[0].id, b[0].id);
        assert_eq!(b[0].title, "Rust");
        assert_eq!(tag::Entity::find().count(repo.writer()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_tag_list_clears_links() {
        let repo = testing::repository().await;
        let article = testing::insert_article(&repo, "clear", testing::JOURNALIST).await;

        sync_tags(repo.writer(), article.id, &strings(&["one", "two"])).await.unwrap();
        sync_tags(repo.writer(), article.id, &[]).await.unwrap();

        assert!(linked_tag_slugs(repo.writer(), article.id).await.is_empty());
        // Orphaned tags stay in the catalogue
        assert_eq!(tag::Entity::find().count(repo.writer()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_categories_replace_and_reuse() {
        let repo = testing::repository().await;
        let article = testing::insert_article(&repo, "cats", testing::JOURNALIST).await;

        let input = strings(&["Tech", "Health", "Tech"]);
        let first = sync_categories(repo.writer(), article.id, &input).await.unwrap();
        assert_eq!(first.len(), 2);

        let second = sync_categories(repo.writer(), article.id, &strings(&["Health"]))
            .await
            .unwrap();
        assert_eq!(second[0].id, first[1].id);

        let links = article_category::Entity::find()
            .filter(article_category::Column::ArticleId.eq(article.id))
            .order_by_asc(article_category::Column::Id)
            .all(repo.writer())
            .await
            .unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].category_id, first[1].id);
        assert_eq!(category::Entity::find().count(repo.writer()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_category_list_keeps_links() {
        let repo = testing::repository().await;
        let article = testing::insert_article(&repo, "keep", testing::JOURNALIST).await;

        sync_categories(repo.writer(), article.id, &strings(&["World"])).await.unwrap();
        sync_categories(repo.writer(), article.id, &strings(&[" , "])).await.unwrap();

        let count = article_category::Entity::find()
            .filter(article_category::Column::ArticleId.eq(article.id))
            .count(repo.writer())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
