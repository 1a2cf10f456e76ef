/**
 * Admin Routes
 * Dashboard and CRUD for posts, categories, tags, and comments.
 * Every handler here sits behind the session guard in routes::auth.
 */
use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{
    self,
    models::Tag,
    queries::{self, CommentListItem, DashboardStats, PostFilter, PostInput, PostListItem},
};
use crate::routes::{
    bad_request, conflict, internal_error, not_found, service_unavailable, SuccessResponse,
};

/// Longest accepted post title, in characters
const MAX_TITLE_CHARS: usize = 200;

/// Longest accepted category/tag name, in characters
const MAX_NAME_CHARS: usize = 50;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AdminListQuery {
    pub page: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminPageQuery {
    pub page: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub stats: DashboardStats,
    pub recent_posts: Vec<PostListItem>,
    pub recent_comments: Vec<CommentListItem>,
}

/// Request body for creating or updating a post. Tags travel as names and
/// are resolved (or created) case-sensitively on save.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePostRequest {
    pub title: String,
    pub body: String,
    pub category_id: Uuid,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_published")]
    pub published: bool,
}

fn default_published() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: Uuid,
}

/// Full post payload for the admin edit view (drafts included)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminPostResponse {
    #[serde(flatten)]
    pub post: queries::PostDetail,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SaveCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SaveTagRequest {
    pub name: String,
}

// ============================================================================
// Error sniffing
// ============================================================================

fn is_unique_violation(e: &sqlx::Error) -> bool {
    let message = e.to_string();
    message.contains("duplicate key") || message.contains("unique constraint")
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    e.to_string().contains("foreign key")
}

// ============================================================================
// Dashboard
// ============================================================================

/// GET /admin, /admin/dashboard - entity counts plus recent activity
pub async fn dashboard() -> Response {
    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    let stats = match queries::dashboard_stats(pool.as_ref()).await {
        Ok(stats) => stats,
        Err(e) => {
            tracing::error!("Database error loading dashboard stats: {}", e);
            return internal_error("Failed to load dashboard");
        }
    };

    // Recent lists include drafts: this is the admin's view of everything.
    let recent_posts = queries::list_posts(pool.as_ref(), &PostFilter::default(), 1, 5)
        .await
        .map(|page| page.items)
        .unwrap_or_default();
    let recent_comments = queries::list_comments(pool.as_ref(), 1, 5)
        .await
        .map(|page| page.items)
        .unwrap_or_default();

    (
        StatusCode::OK,
        Json(DashboardResponse {
            stats,
            recent_posts,
            recent_comments,
        }),
    )
        .into_response()
}

// ============================================================================
// Posts
// ============================================================================

/// GET /admin/posts?status=all|published|draft&page=
pub async fn list_posts(Query(query): Query<AdminListQuery>) -> Response {
    let published = match query.status.as_deref() {
        None | Some("all") => None,
        Some("published") => Some(true),
        Some("draft") => Some(false),
        Some(other) => {
            return bad_request(&format!("Unknown status filter: {}", other));
        }
    };

    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    let filter = PostFilter {
        published,
        ..Default::default()
    };
    let page = queries::clamp_page(query.page);
    match queries::list_posts(pool.as_ref(), &filter, page, *queries::ADMIN_PER_PAGE).await {
        Ok(posts) => (StatusCode::OK, Json(posts)).into_response(),
        Err(e) => {
            tracing::error!("Database error listing posts: {}", e);
            internal_error("Failed to load posts")
        }
    }
}

/// GET /admin/posts/{id} - single post for editing, drafts included
pub async fn get_post(Path(id): Path<Uuid>) -> Response {
    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    let post = match queries::get_post_detail(pool.as_ref(), id, true).await {
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

    (StatusCode::OK, Json(AdminPostResponse { post, tags })).into_response()
}

fn validate_post(payload: &SavePostRequest) -> Result<(), Response> {
    if payload.title.trim().is_empty() {
        return Err(bad_request("Title is required"));
    }
    if payload.title.trim().chars().count() > MAX_TITLE_CHARS {
        return Err(bad_request("Title is too long"));
    }
    if payload.body.trim().is_empty() {
        return Err(bad_request("Body is required"));
    }
    Ok(())
}

fn post_input(payload: SavePostRequest) -> PostInput {
    PostInput {
        title: payload.title.trim().to_string(),
        body: ammonia::clean(payload.body.trim()),
        category_id: payload.category_id,
        tag_names: payload.tags,
        published: payload.published,
    }
}

/// POST /admin/posts - create a post; the summary is derived on save
pub async fn create_post(Json(payload): Json<SavePostRequest>) -> Response {
    if let Err(response) = validate_post(&payload) {
        return response;
    }

    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    match queries::create_post(pool.as_ref(), post_input(payload)).await {
        Ok(id) => (StatusCode::CREATED, Json(CreatedResponse { id })).into_response(),
        Err(e) => {
            if is_foreign_key_violation(&e) {
                return bad_request("Unknown category");
            }
            tracing::error!("Database error creating post: {}", e);
            internal_error("Failed to create post")
        }
    }
}

/// PATCH /admin/posts/{id} - rewrite a post and its tag associations
pub async fn update_post(Path(id): Path<Uuid>, Json(payload): Json<SavePostRequest>) -> Response {
    if let Err(response) = validate_post(&payload) {
        return response;
    }

    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    match queries::update_post(pool.as_ref(), id, post_input(payload)).await {
        Ok(true) => (StatusCode::OK, Json(SuccessResponse { success: true })).into_response(),
        Ok(false) => not_found(),
        Err(e) => {
            if is_foreign_key_violation(&e) {
                return bad_request("Unknown category");
            }
            tracing::error!("Database error updating post: {}", e);
            internal_error("Failed to update post")
        }
    }
}

/// DELETE /admin/posts/{id} - comments and tag links go with it
pub async fn delete_post(Path(id): Path<Uuid>) -> Response {
    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    match queries::delete_post(pool.as_ref(), id).await {
        Ok(true) => (StatusCode::OK, Json(SuccessResponse { success: true })).into_response(),
        Ok(false) => not_found(),
        Err(e) => {
            tracing::error!("Database error deleting post: {}", e);
            internal_error("Failed to delete post")
        }
    }
}

// ============================================================================
// Categories
// ============================================================================

/// GET /admin/categories
pub async fn list_categories() -> Response {
    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    match queries::list_categories(pool.as_ref()).await {
        Ok(categories) => (StatusCode::OK, Json(categories)).into_response(),
        Err(e) => {
            tracing::error!("Database error listing categories: {}", e);
            internal_error("Failed to load categories")
        }
    }
}

fn validate_name(name: &str, what: &str) -> Result<(), Response> {
    if name.is_empty() {
        return Err(bad_request(&format!("{} name is required", what)));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(bad_request(&format!("{} name is too long", what)));
    }
    Ok(())
}

/// POST /admin/categories
pub async fn create_category(Json(payload): Json<SaveCategoryRequest>) -> Response {
    let name = payload.name.trim();
    if let Err(response) = validate_name(name, "Category") {
        return response;
    }

    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    match sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO categories (name, description) VALUES ($1, $2) RETURNING id",
    )
    .bind(name)
    .bind(payload.description.as_deref().map(str::trim))
    .fetch_one(pool.as_ref())
    .await
    {
        Ok(id) => (StatusCode::CREATED, Json(CreatedResponse { id })).into_response(),
        Err(e) => {
            if is_unique_violation(&e) {
                return conflict("Category name already exists");
            }
            tracing::error!("Database error creating category: {}", e);
            internal_error("Failed to create category")
        }
    }
}

/// PATCH /admin/categories/{id}
pub async fn update_category(
    Path(id): Path<Uuid>,
    Json(payload): Json<SaveCategoryRequest>,
) -> Response {
    let name = payload.name.trim();
    if let Err(response) = validate_name(name, "Category") {
        return response;
    }

    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    match sqlx::query("UPDATE categories SET name = $1, description = $2 WHERE id = $3")
        .bind(name)
        .bind(payload.description.as_deref().map(str::trim))
        .bind(id)
        .execute(pool.as_ref())
        .await
    {
        Ok(result) if result.rows_affected() == 0 => not_found(),
        Ok(_) => (StatusCode::OK, Json(SuccessResponse { success: true })).into_response(),
        Err(e) => {
            if is_unique_violation(&e) {
                return conflict("Category name already exists");
            }
            tracing::error!("Database error updating category: {}", e);
            internal_error("Failed to update category")
        }
    }
}

/// DELETE /admin/categories/{id} - blocked while posts still reference it
pub async fn delete_category(Path(id): Path<Uuid>) -> Response {
    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    let post_count: i64 =
        match sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE category_id = $1")
            .bind(id)
            .fetch_one(pool.as_ref())
            .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::error!("Database error checking category posts: {}", e);
                return internal_error("Failed to delete category");
            }
        };

    if post_count > 0 {
        return conflict("Category still has posts");
    }

    match sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
    {
        Ok(result) if result.rows_affected() == 0 => not_found(),
        Ok(_) => (StatusCode::OK, Json(SuccessResponse { success: true })).into_response(),
        Err(e) => {
            // A post slipped in between the count and the delete; the
            // RESTRICT constraint holds the line.
            if is_foreign_key_violation(&e) {
                return conflict("Category still has posts");
            }
            tracing::error!("Database error deleting category: {}", e);
            internal_error("Failed to delete category")
        }
    }
}

// ============================================================================
// Tags
// ============================================================================

/// GET /admin/tags
pub async fn list_tags() -> Response {
    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    match queries::list_tags(pool.as_ref()).await {
        Ok(tags) => (StatusCode::OK, Json(tags)).into_response(),
        Err(e) => {
            tracing::error!("Database error listing tags: {}", e);
            internal_error("Failed to load tags")
        }
    }
}

/// POST /admin/tags
pub async fn create_tag(Json(payload): Json<SaveTagRequest>) -> Response {
    let name = payload.name.trim();
    if let Err(response) = validate_name(name, "Tag") {
        return response;
    }

    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    match sqlx::query_scalar::<_, Uuid>("INSERT INTO tags (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(pool.as_ref())
        .await
    {
        Ok(id) => (StatusCode::CREATED, Json(CreatedResponse { id })).into_response(),
        Err(e) => {
            if is_unique_violation(&e) {
                return conflict("Tag name already exists");
            }
            tracing::error!("Database error creating tag: {}", e);
            internal_error("Failed to create tag")
        }
    }
}

/// PATCH /admin/tags/{id}
pub async fn update_tag(Path(id): Path<Uuid>, Json(payload): Json<SaveTagRequest>) -> Response {
    let name = payload.name.trim();
    if let Err(response) = validate_name(name, "Tag") {
        return response;
    }

    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    match sqlx::query("UPDATE tags SET name = $1 WHERE id = $2")
        .bind(name)
        .bind(id)
        .execute(pool.as_ref())
        .await
    {
        Ok(result) if result.rows_affected() == 0 => not_found(),
        Ok(_) => (StatusCode::OK, Json(SuccessResponse { success: true })).into_response(),
        Err(e) => {
            if is_unique_violation(&e) {
                return conflict("Tag name already exists");
            }
            tracing::error!("Database error updating tag: {}", e);
            internal_error("Failed to update tag")
        }
    }
}

/// DELETE /admin/tags/{id} - associations cascade, posts stay
pub async fn delete_tag(Path(id): Path<Uuid>) -> Response {
    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    match sqlx::query("DELETE FROM tags WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
    {
        Ok(result) if result.rows_affected() == 0 => not_found(),
        Ok(_) => (StatusCode::OK, Json(SuccessResponse { success: true })).into_response(),
        Err(e) => {
            tracing::error!("Database error deleting tag: {}", e);
            internal_error("Failed to delete tag")
        }
    }
}

// ============================================================================
// Comments
// ============================================================================

/// GET /admin/comments?page=
pub async fn list_comments(Query(query): Query<AdminPageQuery>) -> Response {
    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    let page = queries::clamp_page(query.page);
    match queries::list_comments(pool.as_ref(), page, *queries::ADMIN_PER_PAGE).await {
        Ok(comments) => (StatusCode::OK, Json(comments)).into_response(),
        Err(e) => {
            tracing::error!("Database error listing comments: {}", e);
            internal_error("Failed to load comments")
        }
    }
}

/// DELETE /admin/comments/{id}
pub async fn delete_comment(Path(id): Path<Uuid>) -> Response {
    let pool = match db::get_pool() {
        Some(pool) => pool,
        None => return service_unavailable(),
    };

    match sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
    {
        Ok(result) if result.rows_affected() == 0 => not_found(),
        Ok(_) => (StatusCode::OK, Json(SuccessResponse { success: true })).into_response(),
        Err(e) => {
            tracing::error!("Database error deleting comment: {}", e);
            internal_error("Failed to delete comment")
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

    // Handlers are exercised directly here; guard behavior is covered in
    // routes::auth.
    fn admin_router() -> Router {
        Router::new()
            .route("/admin/dashboard", get(dashboard))
            .route("/admin/posts", get(list_posts).post(create_post))
            .route("/admin/categories", post(create_category))
            .route("/admin/tags", post(create_tag))
    }

    async fn post_json(app: Router, uri: &str, json: &impl serde::Serialize) -> StatusCode {
        let req = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(json).unwrap()))
            .unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    async fn get_status(app: Router, uri: &str) -> StatusCode {
        let req = Request::get(uri).body(Body::empty()).unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_dashboard_without_database_returns_unavailable() {
        let status = get_status(admin_router(), "/admin/dashboard").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_create_post_empty_title_rejected() {
        let status = post_json(
            admin_router(),
            "/admin/posts",
            &SavePostRequest {
                title: "  ".to_string(),
                body: "text".to_string(),
                category_id: Uuid::new_v4(),
                tags: vec![],
                published: true,
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_post_empty_body_rejected() {
        let status = post_json(
            admin_router(),
            "/admin/posts",
            &SavePostRequest {
                title: "Hello".to_string(),
                body: "".to_string(),
                category_id: Uuid::new_v4(),
                tags: vec![],
                published: true,
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_post_title_too_long_rejected() {
        let status = post_json(
            admin_router(),
            "/admin/posts",
            &SavePostRequest {
                title: "x".repeat(MAX_TITLE_CHARS + 1),
                body: "text".to_string(),
                category_id: Uuid::new_v4(),
                tags: vec![],
                published: true,
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_posts_unknown_status_rejected() {
        let status = get_status(admin_router(), "/admin/posts?status=bogus").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_category_blank_name_rejected() {
        let status = post_json(
            admin_router(),
            "/admin/categories",
            &SaveCategoryRequest {
                name: "   ".to_string(),
                description: None,
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_tag_blank_name_rejected() {
        let status = post_json(
            admin_router(),
            "/admin/tags",
            &SaveTagRequest {
                name: "".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_save_post_request_defaults() {
        let payload: SavePostRequest = serde_json::from_str(
            r#"{"title":"T","body":"B","categoryId":"00000000-0000-0000-0000-000000000000"}"#,
        )
        .unwrap();
        assert!(payload.published);
        assert!(payload.tags.is_empty());
    }
}
