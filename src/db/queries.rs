//! Post query/filter layer.
//!
//! Composes the paginated, filtered listings every surface shares, plus the
//! derived aggregates behind the sidebar widgets and the admin dashboard.
//! Counts are always computed here, never stored.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::db::models::{generate_summary, Comment, Tag};

lazy_static! {
    /// Page size for public listings
    pub static ref POSTS_PER_PAGE: i64 = env_page_size("POSTS_PER_PAGE", 5);

    /// Page size for admin listings
    pub static ref ADMIN_PER_PAGE: i64 = env_page_size("ADMIN_PER_PAGE", 10);
}

fn env_page_size(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
}

/// Number of entries in each sidebar widget
const SIDEBAR_LIMIT: i64 = 5;

/// Optional filters composed onto a post listing. `published: None` is
/// admin-only; public callers go through [`PostFilter::public`].
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub published: Option<bool>,
    pub category_id: Option<Uuid>,
    pub tag_id: Option<Uuid>,
    pub keyword: Option<String>,
}

impl PostFilter {
    pub fn public() -> Self {
        Self {
            published: Some(true),
            ..Default::default()
        }
    }
}

/// One page of results plus the metadata pagination controls need.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: i64, page_size: i64, total: i64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + page_size - 1) / page_size
        };
        Self {
            items,
            page,
            page_size,
            total,
            total_pages,
        }
    }
}

/// Normalize a requested page number. A page past the last one simply
/// yields an empty page from the OFFSET, never an error.
pub fn clamp_page(page: Option<i64>) -> i64 {
    page.unwrap_or(1).max(1)
}

/// Escape LIKE metacharacters so the keyword matches literally.
pub fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Listing row: post columns plus category name and derived comment count.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListItem {
    pub id: Uuid,
    pub title: String,
    pub summary: String,
    pub published: bool,
    pub views: i64,
    pub category_id: Uuid,
    pub category_name: String,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Full post row for the detail and edit views.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDetail {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub summary: String,
    pub published: bool,
    pub views: i64,
    pub category_id: Uuid,
    pub category_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Neighbor reference for previous/next navigation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRef {
    pub id: Uuid,
    pub title: String,
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &PostFilter) {
    if let Some(published) = filter.published {
        qb.push(" AND p.published = ").push_bind(published);
    }
    if let Some(category_id) = filter.category_id {
        qb.push(" AND p.category_id = ").push_bind(category_id);
    }
    if let Some(tag_id) = filter.tag_id {
        qb.push(" AND EXISTS (SELECT 1 FROM post_tags pt WHERE pt.post_id = p.id AND pt.tag_id = ")
            .push_bind(tag_id)
            .push(")");
    }
    if let Some(keyword) = &filter.keyword {
        let pattern = like_pattern(keyword);
        qb.push(" AND (p.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.body ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

/// The shared listing query: filtered, newest-first, paginated.
///
/// Unknown category/tag ids fall out naturally as an empty result set.
pub async fn list_posts(
    pool: &PgPool,
    filter: &PostFilter,
    page: i64,
    page_size: i64,
) -> sqlx::Result<Page<PostListItem>> {
    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts p WHERE TRUE");
    push_filters(&mut count, filter);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let offset = (page - 1) * page_size;
    let mut select = QueryBuilder::<Postgres>::new(
        "SELECT p.id, p.title, p.summary, p.published, p.views, p.category_id, \
         c.name AS category_name, \
         (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id) AS comment_count, \
         p.created_at, p.updated_at \
         FROM posts p JOIN categories c ON c.id = p.category_id WHERE TRUE",
    );
    push_filters(&mut select, filter);
    select
        .push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ")
        .push_bind(page_size)
        .push(" OFFSET ")
        .push_bind(offset);
    let items = select
        .build_query_as::<PostListItem>()
        .fetch_all(pool)
        .await?;

    Ok(Page::new(items, page, page_size, total))
}

pub async fn get_post_detail(
    pool: &PgPool,
    id: Uuid,
    include_drafts: bool,
) -> sqlx::Result<Option<PostDetail>> {
    sqlx::query_as(
        "SELECT p.id, p.title, p.body, p.summary, p.published, p.views, p.category_id, \
         c.name AS category_name, p.created_at, p.updated_at \
         FROM posts p JOIN categories c ON c.id = p.category_id \
         WHERE p.id = $1 AND (p.published OR $2)",
    )
    .bind(id)
    .bind(include_drafts)
    .fetch_optional(pool)
    .await
}

/// Bump the view counter of a published post. Last-writer-wins is fine
/// here; the single UPDATE keeps the increment itself atomic.
pub async fn increment_views(pool: &PgPool, id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query("UPDATE posts SET views = views + 1 WHERE id = $1 AND published")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn tags_for_post(pool: &PgPool, post_id: Uuid) -> sqlx::Result<Vec<Tag>> {
    sqlx::query_as(
        "SELECT t.id, t.name, t.created_at FROM tags t \
         JOIN post_tags pt ON pt.tag_id = t.id \
         WHERE pt.post_id = $1 ORDER BY t.name",
    )
    .bind(post_id)
    .fetch_all(pool)
    .await
}

pub async fn comments_for_post(pool: &PgPool, post_id: Uuid) -> sqlx::Result<Vec<Comment>> {
    sqlx::query_as(
        "SELECT id, author, body, post_id, created_at FROM comments \
         WHERE post_id = $1 ORDER BY created_at",
    )
    .bind(post_id)
    .fetch_all(pool)
    .await
}

/// Previous and next published posts around the given creation timestamp.
pub async fn adjacent_posts(
    pool: &PgPool,
    created_at: DateTime<Utc>,
    id: Uuid,
) -> sqlx::Result<(Option<PostRef>, Option<PostRef>)> {
    let prev = sqlx::query_as(
        "SELECT p.id, p.title FROM posts p \
         WHERE p.published AND (p.created_at, p.id) < ($1, $2) \
         ORDER BY p.created_at DESC, p.id DESC LIMIT 1",
    )
    .bind(created_at)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let next = sqlx::query_as(
        "SELECT p.id, p.title FROM posts p \
         WHERE p.published AND (p.created_at, p.id) > ($1, $2) \
         ORDER BY p.created_at, p.id LIMIT 1",
    )
    .bind(created_at)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok((prev, next))
}

// ============================================================================
// Post mutations
// ============================================================================

/// Validated input for creating or updating a post. The summary is always
/// rederived from the body, never supplied by the caller.
#[derive(Debug, Clone)]
pub struct PostInput {
    pub title: String,
    pub body: String,
    pub category_id: Uuid,
    pub tag_names: Vec<String>,
    pub published: bool,
}

pub async fn create_post(pool: &PgPool, input: PostInput) -> sqlx::Result<Uuid> {
    let summary = generate_summary(&input.body);

    let mut tx = pool.begin().await?;

    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO posts (title, body, summary, published, category_id) \
         VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(&input.title)
    .bind(&input.body)
    .bind(&summary)
    .bind(input.published)
    .bind(input.category_id)
    .fetch_one(&mut *tx)
    .await?;

    attach_tags(&mut tx, id, &input.tag_names).await?;

    tx.commit().await?;
    Ok(id)
}

/// Returns false when no post with the given id exists. Tag associations
/// are rewritten wholesale to match the submitted names.
pub async fn update_post(pool: &PgPool, id: Uuid, input: PostInput) -> sqlx::Result<bool> {
    let summary = generate_summary(&input.body);

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "UPDATE posts SET title = $1, body = $2, summary = $3, published = $4, \
         category_id = $5, updated_at = now() WHERE id = $6",
    )
    .bind(&input.title)
    .bind(&input.body)
    .bind(&summary)
    .bind(input.published)
    .bind(input.category_id)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    sqlx::query("DELETE FROM post_tags WHERE post_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    attach_tags(&mut tx, id, &input.tag_names).await?;

    tx.commit().await?;
    Ok(true)
}

/// Resolve tag names case-sensitively, creating rows for unmatched names,
/// and link them to the post.
async fn attach_tags(
    tx: &mut Transaction<'_, Postgres>,
    post_id: Uuid,
    names: &[String],
) -> sqlx::Result<()> {
    for raw in names {
        let name = raw.trim();
        if name.is_empty() {
            continue;
        }

        sqlx::query("INSERT INTO tags (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .execute(&mut **tx)
            .await?;

        let tag_id: Uuid = sqlx::query_scalar("SELECT id FROM tags WHERE name = $1")
            .bind(name)
            .fetch_one(&mut **tx)
            .await?;

        sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(post_id)
            .bind(tag_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

/// Comments and tag associations go with the post (ON DELETE CASCADE);
/// the tag rows themselves stay.
pub async fn delete_post(pool: &PgPool, id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Sidebar widgets and dashboard aggregates
// ============================================================================

/// Category with its published-post count.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub post_count: i64,
}

/// Tag with its published-post count.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagSummary {
    pub id: Uuid,
    pub name: String,
    pub post_count: i64,
}

/// Compact post reference used by the recent/popular widgets.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidebarPost {
    pub id: Uuid,
    pub title: String,
    pub views: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sidebar {
    pub categories: Vec<CategorySummary>,
    pub tags: Vec<TagSummary>,
    pub recent_posts: Vec<SidebarPost>,
    pub popular_posts: Vec<SidebarPost>,
}

pub async fn list_categories(pool: &PgPool) -> sqlx::Result<Vec<CategorySummary>> {
    sqlx::query_as(
        "SELECT c.id, c.name, c.description, \
         COUNT(p.id) FILTER (WHERE p.published) AS post_count \
         FROM categories c LEFT JOIN posts p ON p.category_id = c.id \
         GROUP BY c.id, c.name, c.description ORDER BY c.name",
    )
    .fetch_all(pool)
    .await
}

pub async fn list_tags(pool: &PgPool) -> sqlx::Result<Vec<TagSummary>> {
    sqlx::query_as(
        "SELECT t.id, t.name, COUNT(p.id) FILTER (WHERE p.published) AS post_count \
         FROM tags t \
         LEFT JOIN post_tags pt ON pt.tag_id = t.id \
         LEFT JOIN posts p ON p.id = pt.post_id \
         GROUP BY t.id, t.name ORDER BY t.name",
    )
    .fetch_all(pool)
    .await
}

pub async fn sidebar(pool: &PgPool) -> sqlx::Result<Sidebar> {
    let categories = list_categories(pool).await?;
    let tags = list_tags(pool).await?;

    let recent_posts = sqlx::query_as(
        "SELECT id, title, views, created_at FROM posts WHERE published \
         ORDER BY created_at DESC LIMIT $1",
    )
    .bind(SIDEBAR_LIMIT)
    .fetch_all(pool)
    .await?;

    let popular_posts = sqlx::query_as(
        "SELECT id, title, views, created_at FROM posts WHERE published \
         ORDER BY views DESC, created_at DESC LIMIT $1",
    )
    .bind(SIDEBAR_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(Sidebar {
        categories,
        tags,
        recent_posts,
        popular_posts,
    })
}

/// Entity counts shown on the admin dashboard.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_posts: i64,
    pub published_posts: i64,
    pub draft_posts: i64,
    pub total_categories: i64,
    pub total_tags: i64,
    pub total_comments: i64,
}

pub async fn dashboard_stats(pool: &PgPool) -> sqlx::Result<DashboardStats> {
    sqlx::query_as(
        "SELECT \
         (SELECT COUNT(*) FROM posts) AS total_posts, \
         (SELECT COUNT(*) FROM posts WHERE published) AS published_posts, \
         (SELECT COUNT(*) FROM posts WHERE NOT published) AS draft_posts, \
         (SELECT COUNT(*) FROM categories) AS total_categories, \
         (SELECT COUNT(*) FROM tags) AS total_tags, \
         (SELECT COUNT(*) FROM comments) AS total_comments",
    )
    .fetch_one(pool)
    .await
}

// ============================================================================
// Comment listings (admin)
// ============================================================================

/// Comment row joined with the title of its post.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentListItem {
    pub id: Uuid,
    pub author: String,
    pub body: String,
    pub post_id: Uuid,
    pub post_title: String,
    pub created_at: DateTime<Utc>,
}

pub async fn list_comments(
    pool: &PgPool,
    page: i64,
    page_size: i64,
) -> sqlx::Result<Page<CommentListItem>> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
        .fetch_one(pool)
        .await?;

    let items = sqlx::query_as(
        "SELECT cm.id, cm.author, cm.body, cm.post_id, p.title AS post_title, cm.created_at \
         FROM comments cm JOIN posts p ON p.id = cm.post_id \
         ORDER BY cm.created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(page_size)
    .bind((page - 1) * page_size)
    .fetch_all(pool)
    .await?;

    Ok(Page::new(items, page, page_size, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_wraps_keyword() {
        assert_eq!(like_pattern("rust"), "%rust%");
    }

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("50%"), "%50\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
        assert_eq!(like_pattern("back\\slash"), "%back\\\\slash%");
    }

    #[test]
    fn test_clamp_page_defaults_to_first() {
        assert_eq!(clamp_page(None), 1);
        assert_eq!(clamp_page(Some(0)), 1);
        assert_eq!(clamp_page(Some(-3)), 1);
        assert_eq!(clamp_page(Some(7)), 7);
    }

    #[test]
    fn test_page_metadata() {
        let page = Page::new(vec![1, 2, 3], 1, 5, 13);
        assert_eq!(page.total_pages, 3);

        let empty: Page<i32> = Page::new(vec![], 1, 5, 0);
        assert_eq!(empty.total_pages, 0);

        let exact: Page<i32> = Page::new(vec![], 2, 5, 10);
        assert_eq!(exact.total_pages, 2);
    }

    #[test]
    fn test_public_filter_pins_published() {
        let filter = PostFilter::public();
        assert_eq!(filter.published, Some(true));
        assert!(filter.category_id.is_none());
        assert!(filter.tag_id.is_none());
        assert!(filter.keyword.is_none());
    }

    #[test]
    fn test_page_sizes_positive() {
        assert!(*POSTS_PER_PAGE > 0);
        assert!(*ADMIN_PER_PAGE > 0);
    }
}
