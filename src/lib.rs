//! Blog Backend - library for app logic and testing

pub mod db;
pub mod logging;
pub mod routes;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};

/// Configure CORS from environment variables.
/// Uses ALLOWED_ORIGINS (comma-separated) or FRONTEND_ORIGIN.
/// Falls back to local development origins.
pub fn configure_cors() -> CorsLayer {
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .and_then(|s| {
            let origins: Vec<HeaderValue> = s
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                None
            } else {
                Some(origins)
            }
        })
        .or_else(|| {
            std::env::var("FRONTEND_ORIGIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|origin| vec![origin])
        })
        .unwrap_or_else(|| {
            vec![
                "http://localhost:3000".parse().unwrap(),
                "http://127.0.0.1:3000".parse().unwrap(),
            ]
        });

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

/// Create and configure the application router.
pub fn create_app() -> Router {
    let cors = configure_cors();
    tracing::info!("CORS configured");

    // Every data route under /admin goes through the session guard; the
    // login/logout entry points stay outside it.
    let admin_routes = Router::new()
        .route("/admin", get(routes::admin::dashboard))
        .route("/admin/dashboard", get(routes::admin::dashboard))
        .route(
            "/admin/posts",
            get(routes::admin::list_posts).post(routes::admin::create_post),
        )
        .route(
            "/admin/posts/{id}",
            get(routes::admin::get_post)
                .patch(routes::admin::update_post)
                .delete(routes::admin::delete_post),
        )
        .route(
            "/admin/categories",
            get(routes::admin::list_categories).post(routes::admin::create_category),
        )
        .route(
            "/admin/categories/{id}",
            patch(routes::admin::update_category).delete(routes::admin::delete_category),
        )
        .route(
            "/admin/tags",
            get(routes::admin::list_tags).post(routes::admin::create_tag),
        )
        .route(
            "/admin/tags/{id}",
            patch(routes::admin::update_tag).delete(routes::admin::delete_tag),
        )
        .route("/admin/comments", get(routes::admin::list_comments))
        .route("/admin/comments/{id}", delete(routes::admin::delete_comment))
        .route("/admin/password", post(routes::auth::change_password))
        .route_layer(middleware::from_fn(routes::auth::require_admin));

    Router::new()
        .route("/", get(routes::posts::index))
        .route("/post/{id}", get(routes::posts::post_detail))
        .route("/category/{id}", get(routes::posts::category_posts))
        .route("/tag/{id}", get(routes::posts::tag_posts))
        .route("/search", get(routes::posts::search))
        .route("/comment/{post_id}", post(routes::posts::add_comment))
        .route("/sidebar", get(routes::posts::sidebar))
        .route("/rss.xml", get(routes::rss::rss_feed))
        .route(
            "/admin/login",
            get(routes::auth::login_page).post(routes::auth::login),
        )
        .route("/admin/logout", get(routes::auth::logout))
        .merge(admin_routes)
        .route("/health", get(routes::health::health_ping))
        .route("/health/detailed", get(routes::health::health_detailed))
        .route("/health/database", get(routes::health::health_database))
        .route("/health/ready", get(routes::health::health_ready))
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        // Compress responses with gzip/br/zstd automatically
        .layer(CompressionLayer::new())
        // Global 2 MB request body cap
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024))
        .layer(cors)
}

/// Run the server (used by main).
pub async fn run() {
    dotenvy::dotenv().ok();

    // Guards MUST be held for the programme's lifetime; dropping them early
    // shuts down background log-writer threads and loses buffered log lines.
    let _log_guards = logging::init();

    routes::health::init_start_time();

    // Refuse to start in production with the insecure default signing key.
    let environment = std::env::var("ENVIRONMENT").unwrap_or_default();
    if environment == "production" {
        let secret = std::env::var("SECRET_KEY").unwrap_or_default();
        if secret.is_empty() || secret == "dev-secret-change-in-production" {
            panic!(
                "FATAL: SECRET_KEY must be set to a secure, unique value in production. \
                 Refusing to start with the default secret."
            );
        }

        // Warn (don't panic) about default admin credentials in production.
        let admin_password_set =
            std::env::var("ADMIN_HASH_PASSWORD").is_ok() || std::env::var("ADMIN_PASSWORD").is_ok();
        if !admin_password_set {
            tracing::warn!(
                "SECURITY: Neither ADMIN_HASH_PASSWORD nor ADMIN_PASSWORD is set. \
                 The fallback default password 'admin123' is insecure. \
                 Set ADMIN_HASH_PASSWORD to a bcrypt hash of a strong password."
            );
        }
    }

    if std::env::var("DATABASE_URL").is_ok() {
        match db::init_pool(None).await {
            Ok(pool) => {
                if let Err(e) = db::run_migrations(&pool).await {
                    tracing::error!("Failed to run database migrations: {}", e);
                } else if let Err(e) = db::seed_default_admin(
                    pool.as_ref(),
                    &routes::auth::ADMIN_USERNAME,
                    &routes::auth::ADMIN_PASSWORD_HASH,
                )
                .await
                {
                    tracing::error!("Failed to seed default admin: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize database pool: {}. Continuing without database.",
                    e
                );
            }
        }
    } else {
        tracing::info!("DATABASE_URL not set. Running without database connection.");
    }

    let app = create_app();

    // Bind address is configurable via HOST / PORT env vars.
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5000);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid HOST/PORT configuration");
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app).await.expect("Server error");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_app_returns_router() {
        let _app = create_app();
        // Just test that it compiles and doesn't panic
    }
}
