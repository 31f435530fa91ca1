//! Slug derivation and collision resolution

use crate::config::PublishingConfig;
use crate::db::models::article;
use crate::errors::{AppError, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};
use tracing::debug;

/// Lower-case the input, keep letters and digits from any script, and
/// collapse every other run of characters into a single `-`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_separator = false;

    for ch in input.chars() {
        if ch.is_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}

/// Random lowercase alphanumeric string
pub fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Resolves candidate titles or slugs into identifiers no other article uses
#[derive(Debug, Clone, Copy)]
pub struct SlugResolver {
    suffix_len: usize,
    max_attempts: u32,
}

impl SlugResolver {
    pub fn new(config: &PublishingConfig) -> Self {
        Self {
            suffix_len: config.slug_suffix_len.max(1),
            max_attempts: config.slug_max_attempts,
        }
    }

    /// Resolve `candidate` to a free slug.
    ///
    /// `exclude_id` is the article being updated; its own slug never counts
    /// as a collision. Suffixed candidates are re-checked, and after
    /// `max_attempts` misses the call fails with `Duplicate`.
    pub async fn resolve<C: ConnectionTrait>(
        &self,
        conn: &C,
        candidate: &str,
        exclude_id: Option<i32>,
    ) -> Result<String> {
        let base = match slugify(candidate) {
            s if s.is_empty() => random_suffix(self.suffix_len),
            s => s,
        };

        if is_free(conn, &base, exclude_id).await? {
            return Ok(base);
        }

        for attempt in 1..=self.max_attempts {
            let suffixed = format!("{}-{}", base, random_suffix(self.suffix_len));
            if is_free(conn, &suffixed, exclude_id).await? {
                debug!(slug = %suffixed, attempt, "Slug collision resolved with suffix");
                return Ok(suffixed);
            }
        }

        Err(AppError::Duplicate {
            message: format!("No free slug found for '{}'", base),
        })
    }
}

async fn is_free<C: ConnectionTrait>(
    conn: &C,
    slug: &str,
    exclude_id: Option<i32>,
) -> Result<bool> {
    let mut query = article::Entity::find().filter(article::Column::Slug.eq(slug));
    if let Some(id) = exclude_id {
        query = query.filter(article::Column::Id.ne(id));
    }
    Ok(query.count(conn).await? == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn resolver(max_attempts: u32) -> SlugResolver {
        SlugResolver::new(&PublishingConfig {
            slug_suffix_len: 8,
            slug_max_attempts: max_attempts,
        })
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust   2024 -- edition "), "rust-2024-edition");
        assert_eq!(slugify("Ünïcode Straße"), "ünïcode-straße");
        assert_eq!(slugify("Новости дня"), "новости-дня");
        assert_eq!(slugify("--"), "");
    }

    #[test]
    fn test_random_suffix() {
        let suffix = random_suffix(8);
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_free_candidate_is_kept() {
        let repo = testing::repository().await;
        let slug = resolver(5).resolve(repo.reader(), "Breaking News Today", None).await.unwrap();
        assert_eq!(slug, "breaking-news-today");
    }

    #[tokio::test]
    async fn test_collision_gets_suffix() {
        let repo = testing::repository().await;
        testing::insert_article(&repo, "breaking-news", testing::JOURNALIST).await;

        let slug = resolver(5).resolve(repo.reader(), "Breaking News", None).await.unwrap();
        assert!(slug.starts_with("breaking-news-"));
        assert_eq!(slug.len(), "breaking-news-".len() + 8);
    }

    #[tokio::test]
    async fn test_own_slug_is_not_a_collision() {
        let repo = testing::repository().await;
        let existing = testing::insert_article(&repo, "breaking-news", testing::JOURNALIST).await;

        let slug = resolver(5)
            .resolve(repo.reader(), "Breaking News", Some(existing.id))
            .await
            .unwrap();
        assert_eq!(slug, "breaking-news");
    }

    #[tokio::test]
    async fn test_exhausted_attempts() {
        let repo = testing::repository().await;
        testing::insert_article(&repo, "taken", testing::JOURNALIST).await;

        let result = resolver(0).resolve(repo.reader(), "Taken", None).await;
        assert!(matches!(result, Err(AppError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_empty_slug_falls_back_to_random() {
        let repo = testing::repository().await;
        let slug = resolver(5).resolve(repo.reader(), "!!!", None).await.unwrap();
        assert_eq!(slug.len(), 8);
    }
}
