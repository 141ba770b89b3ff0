use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::{
    catch_panic::CatchPanicLayer, normalize_path::NormalizePath, services::ServeDir,
    timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::web::{
    AppState, admin, articles, auth, collections, public,
    uploads::{MAX_UPLOAD_BYTES, UPLOADS_URL_PREFIX},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ADMIN_BODY_LIMIT: usize = 32 * 1024 * 1024;

/// The served application: `/collections/` and `/collections` reach the same route.
pub fn build_app(state: AppState) -> NormalizePath<Router> {
    NormalizePath::trim_trailing_slash(build_router(state))
}

fn build_router(state: AppState) -> Router {
    let config = state.config();
    let static_files = ServeDir::new(&config.static_dir);
    let images = ServeDir::new(&config.images_dir);
    let uploads = ServeDir::new(&config.upload_dir);

    let router = Router::new()
        .route("/", get(public::index))
        .route("/collections", get(public::collections_page))
        .route("/collections/:id", get(public::collection_page))
        .route(
            "/article",
            get(public::article_form_page)
                .post(articles::submit_article)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/admin/login", get(auth::login_page).post(auth::process_login))
        .route("/admin/logout", post(auth::logout))
        .route("/api/collections", get(collections::list_collections_api))
        .route("/api/collections/:id", get(collections::get_collection_api))
        .route("/healthz", get(healthz))
        .merge(admin_router(&state))
        .nest_service("/static", static_files)
        .nest_service("/images", images)
        .nest_service(UPLOADS_URL_PREFIX, uploads);

    with_common_layers(router).with_state(state)
}

fn admin_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/panel/collections", get(admin::collections_panel))
        .route("/admin/panel/articles", get(admin::articles_panel))
        .route("/admin/collection", post(collections::create_collection))
        .route(
            "/admin/collection/:id",
            post(collections::update_collection)
                .put(collections::update_collection)
                .delete(collections::delete_collection),
        )
        .route("/admin/articles", get(articles::list_articles))
        .route(
            "/admin/articles/:id",
            get(articles::get_article).delete(articles::delete_article),
        )
        .route("/admin/articles/:id/download", get(articles::download_article))
        .layer(DefaultBodyLimit::max(ADMIN_BODY_LIMIT))
        .route_layer(middleware::from_fn_with_state(
            state.sessions().clone(),
            admin::admin_only,
        ))
}

/// Panics become `500`, slow handlers `408`, every request gets a trace span.
fn with_common_layers<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use axum::{
        body::Body,
        http::{Request, header},
    };
    use http_body_util::BodyExt;
    use sqlx::postgres::PgPoolOptions;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use super::*;
    use crate::config::AppConfig;

    const GUARDED_ROUTES: &[(&str, &str)] = &[
        ("GET", "/admin/panel/collections"),
        ("GET", "/admin/panel/articles"),
        ("POST", "/admin/collection"),
        ("POST", "/admin/collection/1"),
        ("PUT", "/admin/collection/1"),
        ("DELETE", "/admin/collection/1"),
        ("GET", "/admin/articles"),
        ("GET", "/admin/articles/1"),
        ("DELETE", "/admin/articles/1"),
        ("GET", "/admin/articles/1/download"),
        ("GET", "/admin/articles/"),
    ];

    /// State whose pool never connects; any handler reaching the database would fail.
    fn offline_state(upload_dir: &Path) -> AppState {
        let upload_dir = upload_dir.to_string_lossy().to_string();
        let config = AppConfig::from_lookup(move |key: &str| match key {
            "SESSION_SECRET" => Some("router-secret".to_string()),
            "UPLOAD_DIR" => Some(upload_dir.clone()),
            _ => None,
        })
        .expect("config");
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://postgres@127.0.0.1:1/unused")
            .expect("lazy pool");
        AppState::from_parts(pool, config)
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn every_admin_route_redirects_without_session() {
        let root = tempdir().expect("temp dir");
        let state = offline_state(root.path());

        for (method, uri) in GUARDED_ROUTES {
            let response = build_app(state.clone())
                .oneshot(request(method, uri))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FOUND, "{method} {uri}");
            assert_eq!(
                response.headers().get(header::LOCATION).unwrap(),
                "/admin/login",
                "{method} {uri}"
            );
        }
    }

    #[tokio::test]
    async fn trailing_slash_reaches_the_same_route() {
        let root = tempdir().expect("temp dir");
        let state = offline_state(root.path());

        let response = build_app(state).oneshot(request("GET", "/healthz/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn bad_update_json_answers_with_api_error() {
        let root = tempdir().expect("temp dir");
        let state = offline_state(root.path());
        let cookie = state.sessions().create(1);

        let request = Request::builder()
            .method("PUT")
            .uri("/admin/collection/1")
            .header(header::COOKIE, format!("{}={}", cookie.name(), cookie.value()))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = build_app(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"], "Некорректные данные сборника");
    }

    fn multipart_body(boundary: &str, file_len: usize) -> Vec<u8> {
        let mut body = Vec::with_capacity(file_len + 512);
        for (name, value) in [("author", "Иван"), ("title", "Статья"), ("email", "a@b.com")] {
            body.extend_from_slice(
                format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                    .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"big.pdf\"\r\nContent-Type: application/pdf\r\n\r\n"
            )
            .as_bytes(),
        );
        body.resize(body.len() + file_len, b'a');
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        body
    }

    #[tokio::test]
    async fn oversized_article_is_413_before_anything_is_stored() {
        let root = tempdir().expect("temp dir");
        let state = offline_state(root.path());

        let boundary = "X-BOUNDARY";
        let request = Request::builder()
            .method("POST")
            .uri("/article")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(multipart_body(boundary, 30 * 1024 * 1024)))
            .unwrap();

        let response = build_app(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let json = json_body(response).await;
        assert_eq!(json["error"], "Слишком большой файл (лимит 25 МБ)");
        assert!(!root.path().join("articles").exists());
    }

    async fn exploding_handler() -> StatusCode {
        panic!("handler blew up")
    }

    #[tokio::test]
    async fn panicking_handler_becomes_500() {
        let app = with_common_layers(Router::<()>::new().route("/boom", get(exploding_handler)));

        let response = app.oneshot(request("GET", "/boom")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
