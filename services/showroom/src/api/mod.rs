//! HTTP API: public read routes for the marketing site and the protected
//! admin routes behind [`auth::require_admin`].

mod auth;
mod company;
pub mod error;
mod extract;
mod featured;
mod form;
mod hero_media;
mod media;
mod portfolio;
mod products;
mod testimonials;

use crate::catalog::Catalog;
use crate::config::{ApiConfig, AuthConfig};
use crate::featured::FeaturedSet;
use crate::locks::EntityLocks;
use crate::media::MediaResolver;
use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use error::{ApiError, ErrorResponse};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub featured: Arc<FeaturedSet>,
    pub media: Arc<MediaResolver>,
    pub locks: Arc<EntityLocks>,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(catalog: Arc<Catalog>, media: MediaResolver, auth: AuthConfig) -> Self {
        let featured = FeaturedSet::new(catalog.products.clone(), catalog.featured.clone());

        Self {
            catalog,
            featured: Arc::new(featured),
            media: Arc::new(media),
            locks: Arc::new(EntityLocks::new()),
            auth,
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    let protected = Router::new()
        .route(
            "/featured",
            get(featured::featured_snapshot)
                .post(featured::add_featured)
                .delete(featured::remove_featured),
        )
        .route("/products", post(products::create_product))
        .route(
            "/products/:id",
            put(products::update_product).delete(products::delete_product),
        )
        .route("/portfolio", post(portfolio::create_project))
        .route(
            "/portfolio/:id",
            put(portfolio::update_project).delete(portfolio::delete_project),
        )
        .route("/testimonials", post(testimonials::create_testimonial))
        .route(
            "/testimonials/:id",
            put(testimonials::update_testimonial).delete(testimonials::delete_testimonial),
        )
        .route("/hero-media", post(hero_media::create_hero_media))
        .route(
            "/hero-media/:id",
            put(hero_media::update_hero_media).delete(hero_media::delete_hero_media),
        )
        .route("/company-info", put(company::update_company_info))
        .route("/media/probe", post(media::probe_media_url))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/featured", get(featured::list_featured))
        .route("/api/products", get(products::list_products))
        .route("/api/products/:id", get(products::get_product))
        .route("/api/portfolio", get(portfolio::list_projects))
        .route("/api/portfolio/:id", get(portfolio::get_project))
        .route("/api/testimonials", get(testimonials::list_testimonials))
        .route("/api/hero-media", get(hero_media::list_hero_media))
        .route("/api/company-info", get(company::get_company_info))
        .nest("/api/protected", protected)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "showroom"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.catalog.store().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "not_ready",
                    "database": "disconnected",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Serve the API until `shutdown` is cancelled. In-flight requests are
/// allowed to finish.
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting showroom API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::all_collections;
    use crate::config::MediaConfig;
    use crate::document_store::{MemoryDocumentStore, MockDocumentStore, StoreError};
    use crate::document_store::DocumentStore;
    use crate::file_store::{MemoryFileStore, StorageUrls};
    use crate::media::{MediaAccept, MediaKind, UrlProbe};
    use crate::models::Product;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use axum::response::Response;
    use std::time::Duration;
    use tower::ServiceExt;
    use url::Url;

    const TOKEN: &str = "test-admin-token";
    const BOUNDARY: &str = "showroom-test-boundary";

    /// Probe that accepts every URL after `delay`
    struct DelayedProbe(Duration);

    #[async_trait]
    impl UrlProbe for DelayedProbe {
        async fn probe(&self, _url: &Url, _accept: MediaAccept) -> Result<MediaKind, String> {
            tokio::time::sleep(self.0).await;
            Ok(MediaKind::Image)
        }
    }

    fn api_config() -> ApiConfig {
        ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_enabled: false,
            cors_origins: vec![],
            max_body_bytes: 1024 * 1024,
        }
    }

    fn auth(token: Option<&str>) -> AuthConfig {
        AuthConfig {
            admin_token: token.map(str::to_string),
            ..AuthConfig::default()
        }
    }

    fn app_with(
        store: Arc<dyn DocumentStore>,
        probe_delay: Duration,
        token: Option<&str>,
    ) -> (Router, AppState, Arc<MemoryFileStore>) {
        let files = Arc::new(MemoryFileStore::new(StorageUrls::new(
            "https://cdn.atelier.test",
            "media",
        )));
        let catalog = Arc::new(Catalog::new(store, files.clone(), &all_collections()));
        let media = MediaResolver::new(
            files.clone(),
            Arc::new(DelayedProbe(probe_delay)),
            MediaConfig::default(),
        );
        let state = AppState::new(catalog, media, auth(token));
        (create_router(state.clone(), &api_config()), state, files)
    }

    fn app() -> (Router, AppState, Arc<MemoryFileStore>) {
        app_with(
            Arc::new(MemoryDocumentStore::new()),
            Duration::ZERO,
            Some(TOKEN),
        )
    }

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a [u8]),
    }

    fn multipart(method: Method, uri: &str, parts: &[Part]) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File(name, content_type, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; \
                             filename=\"upload.bin\"\r\nContent-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn seed_product(state: &AppState, name: &str) -> Product {
        let product = crate::catalog::test_support::product(name, vec![]);
        state.catalog.products.create(&product).await.unwrap();
        product
    }

    #[tokio::test]
    async fn test_health_check() {
        let (router, _, _) = app();
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_reports_unavailable_store() {
        let mut store = MockDocumentStore::new();
        store
            .expect_ping()
            .returning(|| Err(StoreError::Unavailable("connection refused".to_string())));
        let (router, _, _) = app_with(Arc::new(store), Duration::ZERO, Some(TOKEN));

        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["status"], "not_ready");
    }

    #[tokio::test]
    async fn test_protected_routes_require_session() {
        let (router, _, _) = app();

        let anonymous = router
            .clone()
            .oneshot(
                Request::get("/api/protected/featured")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(anonymous).await["code"], "UNAUTHORIZED");

        let with_cookie = router
            .clone()
            .oneshot(
                Request::get("/api/protected/featured")
                    .header(header::COOKIE, format!("atelier_session={TOKEN}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(with_cookie.status(), StatusCode::OK);

        let public = router
            .oneshot(Request::get("/api/featured").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(public.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_admin_token_locks_admin_routes() {
        let (router, _, _) = app_with(Arc::new(MemoryDocumentStore::new()), Duration::ZERO, None);

        let response = router
            .oneshot(json_request(
                Method::POST,
                "/api/protected/featured",
                serde_json::json!({ "productId": uuid::Uuid::new_v4() }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_product_with_uploaded_image() {
        let (router, state, files) = app();

        let response = router
            .clone()
            .oneshot(multipart(
                Method::POST,
                "/api/protected/products",
                &[
                    Part::Text("name", "Oak lounge chair"),
                    Part::Text("price", "1240"),
                    Part::Text("materials", r#"["oak","wool"]"#),
                    Part::File("imagesFiles", "image/jpeg", b"fake-jpeg"),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let created = json_body(response).await;
        assert_eq!(created["images"][0]["kind"], "uploaded");
        let file_id = created["images"][0]["storedFileId"].as_str().unwrap();
        assert!(files.contains(file_id));

        let stored = state.catalog.products.list().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].materials, vec!["oak", "wool"]);
    }

    #[tokio::test]
    async fn test_rejected_upload_type_stores_nothing() {
        let (router, state, files) = app();

        let response = router
            .oneshot(multipart(
                Method::POST,
                "/api/protected/products",
                &[
                    Part::Text("name", "Oak lounge chair"),
                    Part::File("imagesFiles", "image/png", b"fake-png"),
                    Part::File("imagesFiles", "application/pdf", b"%PDF"),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(files.is_empty());
        assert!(state.catalog.products.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_featured_capacity_over_http() {
        let (router, state, _) = app();
        let mut ids = Vec::new();
        for name in ["A", "B", "C", "D", "E"] {
            ids.push(seed_product(&state, name).await.id);
        }

        let response = router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/protected/featured",
                serde_json::json!({ "productIds": &ids[..3] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["remaining"], 1);

        let response = router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/protected/featured",
                serde_json::json!({ "productIds": &ids[3..] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(response).await["code"], "CAPACITY_EXCEEDED");
        assert_eq!(state.featured.list_featured().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_deleting_product_unfeatures_it() {
        let (router, state, _) = app();
        let product = seed_product(&state, "Walnut table").await;
        state.featured.add_featured(&[product.id]).await.unwrap();

        let response = router
            .oneshot(
                Request::delete(format!("/api/protected/products/{}", product.id))
                    .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.catalog.featured.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_entity_is_not_found() {
        let (router, _, _) = app();

        let response = router
            .oneshot(multipart(
                Method::PUT,
                &format!("/api/protected/testimonials/{}", uuid::Uuid::new_v4()),
                &[Part::Text("name", "Ana"), Part::Text("quote", "Lovely")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_thumbnail_url_writes_no_project() {
        let (router, state, _) = app_with(
            Arc::new(MemoryDocumentStore::new()),
            Duration::from_secs(9),
            Some(TOKEN),
        );

        let response = router
            .oneshot(multipart(
                Method::POST,
                "/api/protected/portfolio",
                &[
                    Part::Text("title", "Harbour loft"),
                    Part::Text("thumbnailUrl", "https://slow.example.com/loft.jpg"),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["code"], "INVALID_MEDIA_URL");
        assert!(state.catalog.portfolio.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_company_update_reconciles_team() {
        let (router, state, files) = app();

        let response = router
            .clone()
            .oneshot(multipart(
                Method::PUT,
                "/api/protected/company-info",
                &[
                    Part::Text("info", r#"{"name":"Atelier"}"#),
                    Part::Text("team", r#"[{"name":"Ana"},{"name":"Ben"}]"#),
                    Part::File("teamPhoto.1", "image/jpeg", b"ben"),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let ana_id = body["team"][0]["id"].as_str().unwrap().to_string();
        let ben_photo = body["team"][1]["photo"]["storedFileId"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(files.contains(&ben_photo));

        // Ben leaves, Ana stays untouched
        let team = format!(r#"[{{"id":"{ana_id}","name":"Ana"}}]"#);
        let response = router
            .oneshot(multipart(
                Method::PUT,
                "/api/protected/company-info",
                &[
                    Part::Text("info", r#"{"name":"Atelier"}"#),
                    Part::Text("team", &team),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stored = state.catalog.team_members.list().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id.to_string(), ana_id);
        assert!(!files.contains(&ben_photo));
    }
    #[tokio::test]
    async fn test_unparseable_body_and_path_use_error_body() {
        let (router, _, _) = app();

        let response = router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/protected/featured",
                serde_json::json!({ "productId": "not-a-uuid" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        assert_eq!(json_body(response).await["code"], "VALIDATION_ERROR");

        let response = router
            .oneshot(
                Request::delete("/api/protected/products/not-a-uuid")
                    .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_unfeature_rejects_id_list() {
        let (router, state, _) = app();
        let product = seed_product(&state, "Walnut table").await;
        state.featured.add_featured(&[product.id]).await.unwrap();

        let response = router
            .oneshot(json_request(
                Method::DELETE,
                "/api/protected/featured",
                serde_json::json!({ "productIds": [product.id] }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "VALIDATION_ERROR");
        assert_eq!(state.featured.list_featured().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_body_over_limit_is_file_too_large() {
        let (_, state, files) = app();
        let config = ApiConfig {
            max_body_bytes: 1024,
            ..api_config()
        };
        let router = create_router(state.clone(), &config);
        let image = vec![0u8; 4096];

        let response = router
            .oneshot(multipart(
                Method::POST,
                "/api/protected/products",
                &[
                    Part::Text("name", "Oak lounge chair"),
                    Part::File("imagesFiles", "image/jpeg", &image),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json_body(response).await["code"], "FILE_TOO_LARGE");
        assert!(files.is_empty());
        assert!(state.catalog.products.list().await.unwrap().is_empty());
    }
}
