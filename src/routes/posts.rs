/**
 * Public Blog Routes
 * Listings, post detail, search, commenting, sidebar widgets
 */
use axum::{
    extract::{Form, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{
    self,
    models::{Category, Comment, Tag},
    queries::{self, PostDetail, PostFilter, PostListItem, PostRef},
};
use crate::routes::{bad_request, internal_error, not_found, service_unavailable};

/// Longest accepted comment author name, in characters
const MAX_AUTHOR_CHARS: usize = 50;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub page: Option<i64>,
}

/// Category listing: the category descriptor (when it exists) plus its page
/// of posts. An unknown id yields `category: null` and an empty page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryListingResponse {
    pub category: Option<Category>,
    pub posts: queries::Page<PostListItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagListingResponse {
    pub tag: Option<Tag>,
    pub posts: queries::Page<PostListItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub keyword: String,
    pub posts: queries::Page<PostListItem>,
}

/// Full post detail with tags, comments, and neighbor navigation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDetailResponse {
    #[serde(flatten)]
    pub post: PostDetail,
    pub tags: Vec<Tag>,
    pub comments: Vec<Comment>,
    pub prev_post: Option<PostRef>,
    pub next_post: Option<PostRef>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CommentForm {
    pub author: String,
    pub body: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET / - paginated published-post listing
pub async fn index(Query(query): Query<PageQuery>) -> Response {
    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    let page = queries::clamp_page(query.page);
    match queries::list_posts(
        pool.as_ref(),
        &PostFilter::public(),
        page,
        *queries::POSTS_PER_PAGE,
    )
    .await
    {
        Ok(posts) => (StatusCode::OK, Json(posts)).into_response(),
        Err(e) => {
            tracing::error!("Database error listing posts: {}", e);
            internal_error("Failed to load posts")
        }
    }
}

/// GET /post/{id} - single post detail; bumps the view counter;
/// 404 when missing or unpublished
pub async fn post_detail(Path(id): Path<Uuid>) -> Response {
    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    // Counter first so the detail row already reflects this visit.
    match queries::increment_views(pool.as_ref(), id).await {
        Ok(true) => {}
        Ok(false) => return not_found(),
        Err(e) => {
            tracing::error!("Database error counting post view: {}", e);
            return internal_error("Failed to load post");
        }
    }

    let post = match queries::get_post_detail(pool.as_ref(), id, false).await {
        Ok(Some(post)) => post,
        Ok(None) => return not_found(),
        Err(e) => {
            tracing::error!("Database error fetching post: {}", e);
            return internal_error("Failed to load post");
        }
    };

    let tags = queries::tags_for_post(pool.as_ref(), id)
        .await
        .unwrap_or_default();
    let comments = queries::comments_for_post(pool.as_ref(), id)
        .await
        .unwrap_or_default();
    let (prev_post, next_post) = queries::adjacent_posts(pool.as_ref(), post.created_at, post.id)
        .await
        .unwrap_or((None, None));

    (
        StatusCode::OK,
        Json(PostDetailResponse {
            post,
            tags,
            comments,
            prev_post,
            next_post,
        }),
    )
        .into_response()
}

/// GET /category/{id} - published posts in one category
pub async fn category_posts(Path(id): Path<Uuid>, Query(query): Query<PageQuery>) -> Response {
    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    let category = match sqlx::query_as::<_, Category>(
        "SELECT id, name, description, created_at FROM categories WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(category) => category,
        Err(e) => {
            tracing::error!("Database error fetching category: {}", e);
            return internal_error("Failed to load category");
        }
    };

    let filter = PostFilter {
        category_id: Some(id),
        ..PostFilter::public()
    };
    let page = queries::clamp_page(query.page);
    match queries::list_posts(pool.as_ref(), &filter, page, *queries::POSTS_PER_PAGE).await {
        Ok(posts) => (
            StatusCode::OK,
            Json(CategoryListingResponse { category, posts }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error listing category posts: {}", e);
            internal_error("Failed to load posts")
        }
    }
}

/// GET /tag/{id} - published posts carrying one tag
pub async fn tag_posts(Path(id): Path<Uuid>, Query(query): Query<PageQuery>) -> Response {
    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    let tag = match sqlx::query_as::<_, Tag>("SELECT id, name, created_at FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool.as_ref())
        .await
    {
        Ok(tag) => tag,
        Err(e) => {
            tracing::error!("Database error fetching tag: {}", e);
            return internal_error("Failed to load tag");
        }
    };

    let filter = PostFilter {
        tag_id: Some(id),
        ..PostFilter::public()
    };
    let page = queries::clamp_page(query.page);
    match queries::list_posts(pool.as_ref(), &filter, page, *queries::POSTS_PER_PAGE).await {
        Ok(posts) => (StatusCode::OK, Json(TagListingResponse { tag, posts })).into_response(),
        Err(e) => {
            tracing::error!("Database error listing tag posts: {}", e);
            internal_error("Failed to load posts")
        }
    }
}

/// GET /search?q= - keyword search over title and body
pub async fn search(Query(query): Query<SearchQuery>) -> Response {
    let keyword = query.q.as_deref().map(str::trim).unwrap_or("");
    if keyword.is_empty() {
        return bad_request("Search keyword is required");
    }

    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    let filter = PostFilter {
        keyword: Some(keyword.to_string()),
        ..PostFilter::public()
    };
    let page = queries::clamp_page(query.page);
    match queries::list_posts(pool.as_ref(), &filter, page, *queries::POSTS_PER_PAGE).await {
        Ok(posts) => (
            StatusCode::OK,
            Json(SearchResponse {
                keyword: keyword.to_string(),
                posts,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error searching posts: {}", e);
            internal_error("Search failed")
        }
    }
}

/// POST /comment/{post_id} - public comment creation; bounces back to the
/// post detail on success. Drafts and unknown posts take no comment.
pub async fn add_comment(Path(post_id): Path<Uuid>, Form(form): Form<CommentForm>) -> Response {
    let author = form.author.trim();
    let body = form.body.trim();

    if author.is_empty() || body.is_empty() {
        return bad_request("Author and comment text are required");
    }
    if author.chars().count() > MAX_AUTHOR_CHARS {
        return bad_request("Author name is too long");
    }

    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    match sqlx::query_scalar::<_, bool>("SELECT published FROM posts WHERE id = $1")
        .bind(post_id)
        .fetch_optional(pool.as_ref())
        .await
    {
        Ok(Some(true)) => {}
        Ok(_) => return not_found(),
        Err(e) => {
            tracing::error!("Database error checking post for comment: {}", e);
            return internal_error("Failed to save comment");
        }
    }

    let body = ammonia::clean(body);
    match sqlx::query("INSERT INTO comments (author, body, post_id) VALUES ($1, $2, $3)")
        .bind(author)
        .bind(&body)
        .bind(post_id)
        .execute(pool.as_ref())
        .await
    {
        Ok(_) => Redirect::to(&format!("/post/{}", post_id)).into_response(),
        Err(e) => {
            tracing::error!("Database error saving comment: {}", e);
            internal_error("Failed to save comment")
        }
    }
}

/// GET /sidebar - categories, tag cloud, recent and popular posts
pub async fn sidebar() -> Response {
    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    match queries::sidebar(pool.as_ref()).await {
        Ok(sidebar) => (StatusCode::OK, Json(sidebar)).into_response(),
        Err(e) => {
            tracing::error!("Database error building sidebar: {}", e);
            internal_error("Failed to load sidebar")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::routing::{get, post};
    use axum::Router;
    use tower::ServiceExt;

    fn public_router() -> Router {
        Router::new()
            .route("/", get(index))
            .route("/post/{id}", get(post_detail))
            .route("/search", get(search))
            .route("/comment/{post_id}", post(add_comment))
            .route("/sidebar", get(sidebar))
    }

    async fn get_status(app: Router, uri: &str) -> StatusCode {
        let req = Request::get(uri).body(Body::empty()).unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    async fn post_form(app: Router, uri: &str, body: &str) -> StatusCode {
        let req = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_index_without_database_returns_unavailable() {
        let status = get_status(public_router(), "/").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_search_blank_keyword_returns_bad_request() {
        assert_eq!(
            get_status(public_router(), "/search").await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(public_router(), "/search?q=%20%20").await,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_comment_missing_fields_rejected_before_persistence() {
        let uri = format!("/comment/{}", Uuid::new_v4());
        assert_eq!(
            post_form(public_router(), &uri, "author=&body=hello").await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            post_form(public_router(), &uri, "author=alice&body=").await,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_comment_author_too_long_rejected() {
        let uri = format!("/comment/{}", Uuid::new_v4());
        let long_author = "a".repeat(MAX_AUTHOR_CHARS + 1);
        let body = format!("author={}&body=hello", long_author);
        assert_eq!(
            post_form(public_router(), &uri, &body).await,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_comment_valid_input_passes_validation() {
        // With no database the handler gets past validation and stops at
        // the pool lookup.
        let uri = format!("/comment/{}", Uuid::new_v4());
        assert_eq!(
            post_form(public_router(), &uri, "author=alice&body=hello").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_post_detail_malformed_id_rejected() {
        let status = get_status(public_router(), "/post/not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
