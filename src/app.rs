//! 路由组装：接口、静态文件与中间件栈。

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{delete, get, post};
use axum::{Router, middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::http::{add_security_headers, build_cors_layer};
use crate::images;
use crate::rate_limit::{RateLimiter, rate_limit_middleware};
use crate::store::ImageStore;

pub struct RouterOptions {
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

/// 构建应用路由。中间件由外到内：请求追踪、限流、CORS、安全头。
pub fn build_router(
    store: Arc<ImageStore>,
    limiter: Arc<RateLimiter>,
    options: &RouterOptions,
) -> Router {
    let static_files = ServeDir::new(store.root_path());

    let mut app = Router::new()
        .route("/api/images", get(images::list_images))
        .route("/api/images/{id}", delete(images::delete_image))
        .route(
            "/api/upload",
            post(images::upload_image).layer(DefaultBodyLimit::max(options.max_upload_bytes)),
        )
        .nest_service("/images", static_files)
        .layer(middleware::from_fn(add_security_headers));

    if let Some(cors_layer) = build_cors_layer(&options.cors_origins) {
        app = app.layer(cors_layer);
    }

    app.layer(middleware::from_fn(rate_limit_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let client = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(Extension(store))
        .layer(Extension(limiter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_MAX_UPLOAD_BYTES, default_allowed_types};
    use crate::sniff::fixtures::{jpeg, png};
    use axum::body::Body;
    use axum::http::{Method, StatusCode, header};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::time::Duration;
    use tempfile::tempdir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "imgdrop-test-boundary";
    const ORIGIN: &str = "http://localhost:3000";

    struct TestApp {
        _temp: tempfile::TempDir,
        store: Arc<ImageStore>,
        router: Router,
    }

    fn make_app(rate_limit: u32) -> TestApp {
        make_app_with(rate_limit, DEFAULT_MAX_UPLOAD_BYTES)
    }

    fn make_app_with(rate_limit: u32, max_upload_bytes: usize) -> TestApp {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("images");
        std::fs::create_dir_all(&root).expect("create upload root");
        let store = Arc::new(ImageStore::new(root, default_allowed_types()));
        let limiter = Arc::new(RateLimiter::new(rate_limit, Duration::from_secs(60)));
        let router = build_router(
            store.clone(),
            limiter,
            &RouterOptions {
                cors_origins: vec![ORIGIN.to_string()],
                max_upload_bytes,
            },
        );
        TestApp {
            _temp: temp,
            store,
            router,
        }
    }

    fn with_client(mut request: Request<Body>, port: u16) -> Request<Body> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(field, filename, data)))
            .expect("request");
        with_client(request, 40000)
    }

    fn simple_request(method: Method, uri: &str) -> Request<Body> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        with_client(request, 40000)
    }

    async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes()
            .to_vec();
        (status, body)
    }

    async fn list(app: &TestApp) -> Vec<Value> {
        let (status, body) = send(app, simple_request(Method::GET, "/api/images")).await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body).expect("json");
        value.as_array().expect("array").clone()
    }

    #[tokio::test]
    async fn empty_listing_is_an_empty_array() {
        let app = make_app(60);
        assert!(list(&app).await.is_empty());
    }

    #[tokio::test]
    async fn upload_list_delete_round_trip() {
        let app = make_app(60);

        let (status, body) = send(&app, upload_request("image", "photo.png", &png(1024))).await;
        assert_eq!(status, StatusCode::OK);
        let uploaded: Value = serde_json::from_slice(&body).expect("json");
        let filename = uploaded["filename"].as_str().expect("filename").to_string();
        let (stamp, rest) = filename.split_once('_').expect("underscore");
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(rest, "photo.png");
        assert_eq!(uploaded["size"], 1024);
        assert_eq!(uploaded["url"], format!("/images/{filename}"));
        assert!(uploaded["createdAt"].is_string());

        let listed = list(&app).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["filename"], filename.as_str());

        let (status, body) = send(
            &app,
            simple_request(Method::GET, &format!("/images/{filename}")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.len(), 1024);

        let id = uploaded["id"].as_str().expect("id");
        let (status, body) = send(
            &app,
            simple_request(Method::DELETE, &format!("/api/images/{id}")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert!(list(&app).await.is_empty());
    }

    #[tokio::test]
    async fn two_uploads_with_same_name_are_both_kept() {
        let app = make_app(60);
        for _ in 0..2 {
            let (status, _) = send(&app, upload_request("image", "a.jpg", &jpeg(256))).await;
            assert_eq!(status, StatusCode::OK);
        }

        let listed = list(&app).await;
        assert_eq!(listed.len(), 2);
        assert_ne!(listed[0]["filename"], listed[1]["filename"]);
        assert_ne!(listed[0]["id"], listed[1]["id"]);
    }

    #[tokio::test]
    async fn disallowed_type_is_rejected() {
        let app = make_app(60);
        let (status, body) = send(&app, upload_request("image", "a.png", b"not an image")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"File type not allowed");
        assert!(app.store.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn empty_image_part_is_a_server_error() {
        let app = make_app(60);
        let (status, body) = send(&app, upload_request("image", "empty.png", &[])).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, b"upload body is empty");
        assert!(app.store.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn oversized_upload_is_payload_too_large() {
        let app = make_app_with(60, 1024);
        let (status, _) = send(&app, upload_request("image", "big.png", &png(4096))).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(app.store.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn missing_image_field_is_rejected() {
        let app = make_app(60);
        let (status, _) = send(&app, upload_request("file", "a.png", &png(64))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_unknown_id_is_not_found() {
        let app = make_app(60);
        let (status, body) = send(&app, simple_request(Method::DELETE, "/api/images/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, b"Image not found");
    }

    #[tokio::test]
    async fn over_limit_requests_get_429() {
        let app = make_app(2);
        for _ in 0..2 {
            let (status, _) = send(&app, simple_request(Method::GET, "/api/images")).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = send(&app, simple_request(Method::GET, "/api/images")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body, b"Too many requests");

        let other = with_client(
            Request::builder()
                .uri("/api/images")
                .body(Body::empty())
                .expect("request"),
            40001,
        );
        let (status, _) = send(&app, other).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn cors_preflight_allows_configured_origin() {
        let app = make_app(60);
        let request = with_client(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/upload")
                .header(header::ORIGIN, ORIGIN)
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .expect("request"),
            40000,
        );
        let response = app.router.clone().oneshot(request).await.expect("response");

        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|value| value.to_str().ok()),
            Some(ORIGIN)
        );
    }

    #[tokio::test]
    async fn responses_carry_security_headers() {
        let app = make_app(60);
        let response = app
            .router
            .clone()
            .oneshot(simple_request(Method::GET, "/api/images"))
            .await
            .expect("response");

        assert_eq!(
            response.headers().get(header::X_CONTENT_TYPE_OPTIONS),
            Some(&axum::http::HeaderValue::from_static("nosniff"))
        );
    }
}
