use super::{AppState, handlers, identity, serve};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::Level;

pub fn create_app(state: AppState) -> Router {
    let upload = post(handlers::upload_images).fallback(handlers::method_not_allowed);

    Router::new()
        .route("/", get(handlers::root))
        // Uploads
        .route("/upload", upload.clone())
        .route("/upload/", upload)
        // Stored variants (uploads are accepted under any sub-path as well)
        .route(
            "/upload/{*path}",
            get(serve::serve_stored)
                .post(handlers::upload_images)
                .fallback(handlers::method_not_allowed),
        )
        .fallback(handlers::not_found)
        // Bound the multipart body held in memory
        .layer(DefaultBodyLimit::max(state.settings.max_upload_bytes))
        // Resolve the caller identity before any handler runs
        .layer(middleware::from_fn_with_state(
            state.clone(),
            identity::resolve_identity,
        ))
        .layer(cors_layer(&state.settings.allowed_origins))
        // Add tracing for HTTP requests and responses
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::INFO)))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[HeaderValue]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins.iter().cloned()))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("fingerprint"),
        ])
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{Part, multipart_body, multipart_content_type, png_bytes};
    use crate::upload::{
        Orchestrator, Pipeline, image_codec::OutputFormat, pool::RenderPool,
        storage::StorageLayout,
    };
    use crate::web::{IdentityVerifier, ReadAccess, WebSettings, identity::issue_token};
    use axum::{
        body::{Body, Bytes},
        http::{HeaderMap, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use std::path::Path;
    use std::sync::Arc;
    use tower::ServiceExt;

    const SECRET: &[u8] = b"test-secret";

    fn app_with(root: &Path, settings: WebSettings) -> Router {
        create_app(AppState {
            orchestrator: Orchestrator::new(Pipeline::new(
                StorageLayout::new(root),
                RenderPool::new(4),
                OutputFormat::default(),
            )),
            settings: Arc::new(settings),
            identity: Some(Arc::new(IdentityVerifier::new(SECRET))),
        })
    }

    fn app(root: &Path) -> Router {
        app_with(root, WebSettings::default())
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body)
    }

    fn json(body: &Bytes) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }

    fn upload_request(parts: &[Part<'_>], token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/upload/")
            .header(header::CONTENT_TYPE, multipart_content_type());
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(multipart_body(parts))).unwrap()
    }

    fn png_part(file_name: &str, width: u32, height: u32) -> Part<'_> {
        Part {
            field: "files",
            file_name: Some(file_name),
            content_type: Some("image/png"),
            data: png_bytes(width, height),
        }
    }

    fn gif_part() -> Part<'static> {
        Part {
            field: "files",
            file_name: Some("anim.gif"),
            content_type: Some("image/gif"),
            data: b"GIF89a".to_vec(),
        }
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_non_multipart_upload_is_bad_request() {
        let root = tempfile::tempdir().unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/upload/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let (status, _, body) = send(app(root.path()), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["statusCode"], 400);
        assert_eq!(json(&body)["message"], "Bad Request");
    }

    #[tokio::test]
    async fn test_upload_returns_manifest_for_valid_files_only() {
        let root = tempfile::tempdir().unwrap();
        let request = upload_request(&[png_part("wide.png", 600, 300), gif_part()], None);

        let (status, headers, body) = send(app(root.path()), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        let entries = json(&body);
        let entries = entries.as_array().unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry["name"], "wide.png");
        assert_eq!(entry["width"], 600);
        assert_eq!(entry["height"], 300);
        let file = entry["file"].as_str().unwrap();
        assert_eq!(entry["url"], format!("/upload/original/{}", file));
        assert_eq!(entry["sizes"]["256"], format!("/upload/256/{}", file));
        assert_eq!(entry["sizes"]["2048"], format!("/upload/2048/{}", file));

        assert_eq!(
            image::image_dimensions(root.path().join("256").join(file)).unwrap(),
            (256, 128)
        );
        assert_eq!(
            image::image_dimensions(root.path().join("1024").join(file)).unwrap(),
            (600, 300)
        );
    }

    #[tokio::test]
    async fn test_upload_reports_failures_when_enabled() {
        let root = tempfile::tempdir().unwrap();
        let settings = WebSettings {
            report_failures: true,
            ..WebSettings::default()
        };
        let request = upload_request(&[gif_part(), png_part("a.png", 20, 20)], None);

        let (status, _, body) = send(app_with(root.path(), settings), request).await;

        assert_eq!(status, StatusCode::OK);
        let entries = json(&body);
        assert_eq!(entries[0]["name"], "a.png");
        assert_eq!(entries[1]["name"], "anim.gif");
        assert_eq!(entries[1]["error"]["kind"], "UNSUPPORTED_MEDIA_TYPE");
    }

    #[tokio::test]
    async fn test_only_failures_still_succeeds_with_empty_array() {
        let root = tempfile::tempdir().unwrap();
        let request = upload_request(&[gif_part()], None);

        let (status, _, body) = send(app(root.path()), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"[]");
        for label in ["original", "256", "512", "1024", "2048"] {
            assert_eq!(std::fs::read_dir(root.path().join(label)).unwrap().count(), 0);
        }
    }

    #[tokio::test]
    async fn test_authenticated_upload_goes_to_tenant_directory() {
        let root = tempfile::tempdir().unwrap();
        let token = issue_token(SECRET, 42, "USER");
        let request = upload_request(&[png_part("me.png", 30, 60)], Some(&token));

        let (status, _, body) = send(app(root.path()), request).await;

        assert_eq!(status, StatusCode::OK);
        let entries = json(&body);
        let file = entries[0]["file"].as_str().unwrap();
        assert_eq!(entries[0]["url"], format!("/upload/42/original/{}", file));
        assert!(root.path().join("42/512").join(file).is_file());
    }

    #[tokio::test]
    async fn test_invalid_token_uploads_to_shared_root() {
        let root = tempfile::tempdir().unwrap();
        let token = issue_token(b"wrong-secret", 42, "USER");
        let request = upload_request(&[png_part("me.png", 30, 60)], Some(&token));

        let (status, _, body) = send(app(root.path()), request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(json(&body)[0]["url"].as_str().unwrap().starts_with("/upload/original/"));
        assert!(!root.path().join("42").exists());
    }

    #[tokio::test]
    async fn test_parts_past_memory_threshold_are_still_processed() {
        let root = tempfile::tempdir().unwrap();
        let settings = WebSettings {
            multipart_memory_bytes: 1024,
            ..WebSettings::default()
        };
        let large_gif = Part {
            field: "files",
            file_name: Some("huge.gif"),
            content_type: Some("image/gif"),
            data: vec![b'G'; 64 * 1024],
        };
        let request = upload_request(
            &[png_part("small.png", 20, 20), large_gif, png_part("big.png", 300, 200)],
            None,
        );

        let (status, _, body) = send(app_with(root.path(), settings), request).await;

        assert_eq!(status, StatusCode::OK);
        let entries = json(&body);
        let entries = entries.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["name"], "small.png");
        assert_eq!(entries[1]["name"], "big.png");
        assert_eq!(entries[1]["width"], 300);
        assert_eq!(entries[1]["originalSize"], png_bytes(300, 200).len());
    }

    #[tokio::test]
    async fn test_body_over_hard_cap_is_payload_too_large() {
        let root = tempfile::tempdir().unwrap();
        let settings = WebSettings {
            max_upload_bytes: 16 * 1024,
            ..WebSettings::default()
        };
        let large_gif = Part {
            field: "files",
            file_name: Some("huge.gif"),
            content_type: Some("image/gif"),
            data: vec![b'G'; 64 * 1024],
        };
        let request = upload_request(&[png_part("a.png", 20, 20), large_gif], None);

        let (status, _, body) = send(app_with(root.path(), settings), request).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json(&body)["statusCode"], 413);
        assert_eq!(std::fs::read_dir(root.path().join("original")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_identity_named_like_a_size_is_forbidden() {
        let root = tempfile::tempdir().unwrap();
        let token = issue_token(SECRET, 256, "USER");
        let request = upload_request(&[png_part("me.png", 30, 60)], Some(&token));

        let (status, _, body) = send(app(root.path()), request).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json(&body)["statusCode"], 403);
        assert!(!root.path().join("256").exists());
    }

    #[tokio::test]
    async fn test_storage_failure_is_internal_error() {
        let root = tempfile::tempdir().unwrap();
        let not_a_dir = root.path().join("file");
        std::fs::write(&not_a_dir, b"").unwrap();
        let request = upload_request(&[png_part("a.png", 8, 8)], None);

        let (status, _, body) = send(app(&not_a_dir), request).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json(&body)["statusCode"], 500);
    }

    #[tokio::test]
    async fn test_other_methods_on_upload_are_not_allowed() {
        let root = tempfile::tempdir().unwrap();
        let request = Request::builder()
            .method("PUT")
            .uri("/upload/")
            .body(Body::empty())
            .unwrap();

        let (status, _, body) = send(app(root.path()), request).await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(json(&body)["statusCode"], 405);
    }

    #[tokio::test]
    async fn test_root_without_redirect_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let (status, _, body) = send(app(root.path()), get("/", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json(&body)["message"], "Not Found");
    }

    #[tokio::test]
    async fn test_root_redirects_when_configured() {
        let root = tempfile::tempdir().unwrap();
        let settings = WebSettings {
            redirect_url: Some("https://example.com/gallery".to_string()),
            ..WebSettings::default()
        };

        let (status, headers, _) = send(app_with(root.path(), settings), get("/", None)).await;

        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(headers[header::LOCATION], "https://example.com/gallery");
    }

    #[tokio::test]
    async fn test_stored_variant_is_served_with_immutable_caching() {
        let root = tempfile::tempdir().unwrap();
        let (_, _, body) = send(
            app(root.path()),
            upload_request(&[png_part("a.png", 40, 40)], None),
        )
        .await;
        let url = json(&body)[0]["sizes"]["512"].as_str().unwrap().to_string();

        let (status, headers, bytes) = send(app(root.path()), get(&url, None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CACHE_CONTROL], serve::CACHE_CONTROL_VALUE);
        assert_eq!(image::load_from_memory(&bytes).unwrap().width(), 40);
    }

    #[tokio::test]
    async fn test_missing_variant_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let (status, _, _) = send(app(root.path()), get("/upload/256/nope.jpg", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_owner_read_policy_protects_tenant_files() {
        let root = tempfile::tempdir().unwrap();
        let settings = WebSettings {
            read_access: ReadAccess::Owner,
            ..WebSettings::default()
        };
        let owner = issue_token(SECRET, 42, "USER");
        let stranger = issue_token(SECRET, 7, "USER");
        let admin = issue_token(SECRET, 1, "ADMIN");

        let (_, _, body) = send(
            app_with(root.path(), settings.clone()),
            upload_request(&[png_part("a.png", 16, 16)], Some(&owner)),
        )
        .await;
        let url = json(&body)[0]["url"].as_str().unwrap().to_string();

        let read = |token: Option<String>| {
            let app = app_with(root.path(), settings.clone());
            let request = get(&url, token.as_deref());
            async move { send(app, request).await.0 }
        };

        assert_eq!(read(None).await, StatusCode::FORBIDDEN);
        assert_eq!(read(Some(stranger)).await, StatusCode::FORBIDDEN);
        assert_eq!(read(Some(owner)).await, StatusCode::OK);
        assert_eq!(read(Some(admin)).await, StatusCode::OK);
    }
}
