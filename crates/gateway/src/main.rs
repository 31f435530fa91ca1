//! Newsroom API Gateway
//!
//! The HTTP entry point for the publishing engine.
//! Handles:
//! - Caller identity extraction
//! - Request routing
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use axum::{
    extract::FromRef,
    middleware::from_fn,
    routing::{delete, get, patch, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use newsroom_common::{
    auth::JwtManager,
    config::{AppConfig, ObservabilityConfig},
    db::{create_schema, DbPool},
    errors::AppError,
    metrics,
    publishing::{ArticleService, CommentService, EngagementService},
    Repository,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repo: Repository,
    pub articles: ArticleService,
    pub comments: CommentService,
    pub engagement: EngagementService,
    pub jwt: Arc<JwtManager>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, db: DbPool) -> Result<Self, AppError> {
        let secret = config
            .auth
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "auth.jwt_secret must be set".to_string(),
            })?;
        let jwt = Arc::new(JwtManager::new(secret, config.auth.jwt_expiration_secs));

        let repo = Repository::new(db);

        Ok(Self {
            articles: ArticleService::new(repo.clone(), &config.publishing),
            comments: CommentService::new(repo.clone()),
            engagement: EngagementService::new(repo.clone()),
            repo,
            jwt,
            config,
        })
    }
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    init_tracing(&config.observability);
    info!(
        service = %config.observability.service_name,
        "Starting Newsroom API Gateway v{}",
        newsroom_common::VERSION
    );

    // Exporter first so metric descriptions reach it
    if config.observability.metrics_port != 0 {
        install_metrics_exporter(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;

    if config.database.auto_migrate {
        create_schema(db.write()).await?;
    }

    let state = AppState::new(config.clone(), db)?;
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn install_metrics_exporter(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(metrics::LATENCY_BUCKETS)?
        .install()?;

    info!(port, "Prometheus exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let timeout = TimeoutLayer::new(state.config.request_timeout());

    let api_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Articles
        .route(
            "/articles",
            post(handlers::articles::create_article).get(handlers::articles::list_articles),
        )
        .route("/articles/mine", get(handlers::articles::my_articles))
        .route("/articles/by-tag/{slug}", get(handlers::articles::articles_by_tag))
        .route("/articles/slug/{slug}", get(handlers::articles::get_article))
        .route(
            "/articles/{id}",
            put(handlers::articles::update_article).delete(handlers::articles::delete_article),
        )
        .route("/articles/{id}/status", patch(handlers::articles::toggle_status))

        // Engagement
        .route("/articles/{id}/like", post(handlers::engagement::toggle_like))
        .route("/articles/{id}/bookmark", post(handlers::engagement::toggle_bookmark))

        // Comments and moderation
        .route(
            "/articles/{id}/comments",
            post(handlers::comments::create_comment).get(handlers::comments::list_comments),
        )
        .route("/articles/{id}/comments/mine", get(handlers::comments::my_comments))
        .route("/comments", get(handlers::comments::latest_comments))
        .route("/comments/{id}/accept", put(handlers::comments::accept_comment))
        .route("/comments/{id}/reject", put(handlers::comments::reject_comment))
        .route("/comments/{id}", delete(handlers::comments::delete_comment))

        // Catalogue
        .route("/tags", get(handlers::taxonomy::list_tags))
        .route("/categories", get(handlers::taxonomy::list_categories))
        .route_layer(from_fn(middleware::track_metrics));

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use newsroom_common::auth::Role;
    use newsroom_common::db::models::user;
    use sea_orm::{ActiveModelTrait, ConnectOptions, Database, Set};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const SECRET: &str = "gateway-test-secret";

    async fn test_state() -> AppState {
        let mut opts = ConnectOptions::new("sqlite::memory:");
        opts.max_connections(1).min_connections(1).sqlx_logging(false);
        let conn = Database::connect(opts).await.unwrap();
        create_schema(&conn).await.unwrap();

        for (id, role) in [(1, Role::Admin), (2, Role::Journalist), (3, Role::Reader)] {
            user::ActiveModel {
                id: Set(id),
                username: Set(Some(format!("user{}", id))),
                display_name: Set(None),
                role: Set(role.as_str().to_string()),
            }
            .insert(&conn)
            .await
            .unwrap();
        }

        let mut config = AppConfig::default();
        config.auth.jwt_secret = Some(SECRET.to_string());
        AppState::new(Arc::new(config), DbPool::from_connection(conn)).unwrap()
    }

    fn bearer(state: &AppState, user_id: i32, role: Role) -> String {
        format!("Bearer {}", state.jwt.generate_token(user_id, role).unwrap())
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn json_request(method: &str, uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_missing_jwt_secret() {
        let conn = sea_orm::DatabaseConnection::Disconnected;
        let result = AppState::new(Arc::new(AppConfig::default()), DbPool::from_connection(conn));
        assert!(matches!(result, Err(AppError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(test_state().await);
        let (status, body) = send(&app, get("/v1/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(&app, get("/v1/ready", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
    }

    #[tokio::test]
    async fn test_identity_is_required_for_writes() {
        let state = test_state().await;
        let reader = bearer(&state, 3, Role::Reader);
        let app = create_router(state);

        let payload = json!({
            "title": "A headline long enough",
            "content": "Body text of the article"
        });

        let request = json_request("POST", "/v1/articles", None, payload.clone());
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let request = json_request("POST", "/v1/articles", Some(&reader), payload);
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_publish_and_engage_flow() {
        let state = test_state().await;
        let journalist = bearer(&state, 2, Role::Journalist);
        let reader = bearer(&state, 3, Role::Reader);
        let app = create_router(state);

        let payload = json!({
            "title": "Local team wins the cup",
            "content": "A long match report with plenty of detail",
            "categories": ["Sport"],
            "tags": ["football, cup"]
        });
        let request = json_request("POST", "/v1/articles", Some(&journalist), payload);
        let (status, created) = send(&app, request).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["slug"], "local-team-wins-the-cup");
        let id = created["id"].as_i64().unwrap();

        let (status, liked) = send(
            &app,
            json_request("POST", &format!("/v1/articles/{}/like", id), Some(&reader), Value::Null),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(liked["liked"], true);

        let request = get("/v1/articles/slug/local-team-wins-the-cup", Some(&reader));
        let (status, detail) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["id"].as_i64(), Some(id));
        assert_eq!(detail["is_liked"], true);
        assert_eq!(detail["like_count"], 1);

        let request = get("/v1/articles?category=sport&status=draft", None);
        let (status, listing) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listing["pagination"]["total_count"], 1);

        let request = get("/v1/articles?page=18446744073709551615&limit=10", None);
        let (status, far_page) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(far_page["items"].as_array().map(Vec::len), Some(0));
        assert_eq!(far_page["pagination"]["total_count"], 1);

        let (status, by_tag) = send(&app, get("/v1/articles/by-tag/cup", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(by_tag["items"][0]["id"].as_i64(), Some(id));

        let (status, tags) = send(&app, get("/v1/tags", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tags.as_array().map(Vec::len), Some(2));

        let status_uri = format!("/v1/articles/{}/status", id);
        let request = json_request("PATCH", &status_uri, Some(&journalist), Value::Null);
        let (status, toggled) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(toggled["status"], "published");

        let (status, _) = send(&app, get("/v1/articles/slug/no-such-story", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_comment_moderation_flow() {
        let state = test_state().await;
        let journalist = bearer(&state, 2, Role::Journalist);
        let reader = bearer(&state, 3, Role::Reader);
        let app = create_router(state);

        let payload = json!({
            "title": "Council approves new park",
            "content": "The council voted on Tuesday"
        });
        let request = json_request("POST", "/v1/articles", Some(&journalist), payload);
        let (_, created) = send(&app, request).await;
        let id = created["id"].as_i64().unwrap();

        let comments_uri = format!("/v1/articles/{}/comments", id);
        let payload = json!({ "text": "Great news" });
        let request = json_request("POST", &comments_uri, Some(&reader), payload);
        let (status, comment) = send(&app, request).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(comment["comment"]["accepted"], false);
        let comment_id = comment["comment"]["id"].as_i64().unwrap();

        let (_, public) = send(&app, get(&comments_uri, None)).await;
        assert_eq!(public["pagination"]["total_count"], 0);

        let accept_uri = format!("/v1/comments/{}/accept", comment_id);
        let request = json_request("PUT", &accept_uri, Some(&reader), Value::Null);
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let request = json_request("PUT", &accept_uri, Some(&journalist), Value::Null);
        let (status, ack) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["message"], "Comment accepted");

        let (_, public) = send(&app, get(&comments_uri, None)).await;
        assert_eq!(public["items"][0]["text"], "Great news");

        let (_, latest) = send(&app, get("/v1/comments", None)).await;
        assert_eq!(latest["pagination"]["total_count"], 1);
    }
}
