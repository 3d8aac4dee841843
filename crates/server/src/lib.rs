//! Snippet service and HTTP surface.
//!
//! `Server` owns the one piece of real protocol logic in the system:
//! the look-up-evaluate-act sequence that serves an available snippet
//! or purges an expired one. The axum layer on top is thin transport.

use std::{collections::HashMap, future::IntoFuture, net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use codebin_core::{
    errors::ValidationError,
    model::{Snippet, SnippetId},
    traits::Storage,
    validate::{delete_at_after_minutes, validate_code},
};
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub mod html;
pub mod wire;

pub use wire::{CreateSnippetParams, WireError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io: {0}")]
    Io(String),
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Wire(#[from] WireError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
}

pub struct Server<S> {
    storage: Arc<S>,
    // One lock per identifier, held across the whole evaluate-act
    // sequence of `serve_snippet` so two near-simultaneous reads of
    // the final permitted view cannot both count. Shared by all
    // clones of the server.
    serve_locks: Arc<Mutex<HashMap<SnippetId, Arc<Mutex<()>>>>>,
}

impl<S> Clone for Server<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            serve_locks: Arc::clone(&self.serve_locks),
        }
    }
}

impl<S> Server<S>
where
    S: Storage + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(storage: S) -> Self {
        Self {
            storage: Arc::new(storage),
            serve_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn serve_guard(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.serve_locks.lock();
        Arc::clone(
            locks
                .entry(id.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    // Once an identifier is Gone its state is terminal, so the lock
    // table entry can be dropped to keep the table bounded.
    fn forget_serve_guard(&self, id: &str) {
        self.serve_locks.lock().remove(id);
    }

    fn storage_err(err: S::Error) -> ServeError {
        ServeError::Storage(err.to_string())
    }

    /// Validate and store a new snippet. The snippet enters the store
    /// unconditionally; a zero minutes limit is stored expired and
    /// purged on first access.
    pub fn create_snippet(&self, params: CreateSnippetParams) -> Result<Snippet, ServeError> {
        validate_code(&params.code)?;
        let mut snippet = Snippet::new(&params.code);
        if let Some(header) = &params.header {
            snippet = snippet.with_header(header);
        }
        snippet.set_views_limit(params.views_limit);
        if let Some(minutes) = params.minutes_limit {
            snippet.set_delete_at(Some(delete_at_after_minutes(snippet.created_at, minutes)));
        }
        self.storage.put(&snippet).map_err(Self::storage_err)?;
        info!(
            snippet_id = %snippet.id,
            restricted = snippet.is_restricted(),
            "snippet created"
        );
        Ok(snippet)
    }

    /// The expiry-on-access protocol: serve and count a view if the
    /// snippet is available at `now`, otherwise purge it and report
    /// not-found. Never returns an unavailable snippet.
    pub fn serve_snippet(&self, id: &str, now: DateTime<Utc>) -> Result<Snippet, ServeError> {
        let guard = self.serve_guard(id);
        let _held = guard.lock();

        let found = self.storage.get(id).map_err(Self::storage_err)?;
        let Some(mut snippet) = found else {
            debug!(snippet_id = id, "snippet not found");
            self.forget_serve_guard(id);
            return Err(ServeError::NotFound(id.to_owned()));
        };

        if snippet.is_available(now) {
            snippet.record_view();
            self.storage.put(&snippet).map_err(Self::storage_err)?;
            debug!(snippet_id = id, views = snippet.views, "snippet served");
            Ok(snippet)
        } else {
            let removed = self.storage.remove(id).map_err(Self::storage_err)?;
            if removed {
                info!(snippet_id = id, "expired snippet purged");
            }
            self.forget_serve_guard(id);
            Err(ServeError::NotFound(id.to_owned()))
        }
    }

    /// Every stored snippet, newest first.
    pub fn list_snippets(&self) -> Result<Vec<Snippet>, ServeError> {
        let mut snippets = self.storage.list_all().map_err(Self::storage_err)?;
        snippets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(snippets)
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/code/new", post(api_create::<S>))
            .route("/api/code/all", get(api_all::<S>))
            .route("/api/code/{id}", get(api_get::<S>))
            .route("/code/new", get(page_new::<S>))
            .route("/code/all", get(page_all::<S>))
            .route("/code/{id}", get(page_view::<S>))
            .route("/healthz", get(healthz))
            .with_state(self.clone())
    }

    pub async fn run_http(&self, addr: &str) -> Result<(), ServerError> {
        let bind_addr: SocketAddr = addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ServerError::Io(e.to_string()))?;

        let app = self.router();
        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .map_err(|e| ServerError::Io(e.to_string()))?;

        info!(%addr, "http server listening");
        let shutdown_token = CancellationToken::new();
        let server_shutdown = shutdown_token.child_token();
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                server_shutdown.cancelled().await;
            })
            .into_future();
        tokio::pin!(server);

        tokio::select! {
            res = &mut server => {
                res.map_err(|e| ServerError::Io(e.to_string()))
            }
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl_c received; shutting down http server");
                shutdown_token.cancel();
                server.as_mut().await.map_err(|e| ServerError::Io(e.to_string()))
            }
        }
    }
}

// Storage is sync by design, so handlers hop onto the blocking pool.
async fn run_blocking<S, T, F>(server: Server<S>, f: F) -> Result<T, ServeError>
where
    S: Storage + Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(Server<S>) -> Result<T, ServeError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(server))
        .await
        .map_err(|e| ServeError::Storage(e.to_string()))?
}

fn error_response(err: ServeError) -> Response {
    match &err {
        ServeError::Validation(_) | ServeError::Wire(_) => {
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        ServeError::NotFound(_) => StatusCode::NOT_FOUND.into_response(),
        ServeError::Storage(msg) => {
            error!(error = %msg, "storage fault");
            (StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable").into_response()
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn api_create<S: Storage + Send + Sync + 'static>(
    State(server): State<Server<S>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let params = match CreateSnippetParams::from_value(&body) {
        Ok(params) => params,
        Err(err) => return error_response(err.into()),
    };
    match run_blocking(server, move |server| server.create_snippet(params)).await {
        Ok(snippet) => snippet.id.into_response(),
        Err(err) => error_response(err),
    }
}

async fn api_get<S: Storage + Send + Sync + 'static>(
    State(server): State<Server<S>>,
    Path(id): Path<String>,
) -> Response {
    let now = Utc::now();
    match run_blocking(server, move |server| server.serve_snippet(&id, now)).await {
        Ok(snippet) => Json(snippet).into_response(),
        Err(err) => error_response(err),
    }
}

async fn api_all<S: Storage + Send + Sync + 'static>(
    State(server): State<Server<S>>,
) -> Response {
    match run_blocking(server, |server| server.list_snippets()).await {
        Ok(snippets) => Json(snippets).into_response(),
        Err(err) => error_response(err),
    }
}

async fn page_view<S: Storage + Send + Sync + 'static>(
    State(server): State<Server<S>>,
    Path(id): Path<String>,
) -> Response {
    let now = Utc::now();
    match run_blocking(server, move |server| server.serve_snippet(&id, now)).await {
        Ok(snippet) => Html(html::snippet_page(&snippet)).into_response(),
        Err(ServeError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, Html(html::not_found_page())).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn page_new<S: Storage + Send + Sync + 'static>(
    State(_server): State<Server<S>>,
) -> Html<String> {
    Html(html::submit_page())
}

async fn page_all<S: Storage + Send + Sync + 'static>(
    State(server): State<Server<S>>,
) -> Response {
    match run_blocking(server, |server| server.list_snippets()).await {
        Ok(snippets) => Html(html::listing_page(&snippets)).into_response(),
        Err(err) => error_response(err),
    }
}


#[cfg(test)]
mod http_tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use codebin_storage_ephemeral::EphemeralStorage;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn json_request(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn create_route_returns_plain_text_id() {
        let server = Server::new(EphemeralStorage::new());
        let response = server
            .router()
            .oneshot(json_request("/api/code/new", r#"{"code":"print(1)"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        assert!(content_type.starts_with("text/plain"));
        let id = body_string(response).await;
        assert!(server.serve_snippet(&id, Utc::now()).is_ok());
    }

    #[tokio::test]
    async fn create_route_names_the_missing_field() {
        let server = Server::new(EphemeralStorage::new());
        let response = server
            .router()
            .oneshot(json_request("/api/code/new", r#"{"header":"no code"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(response).await, "code value can't be empty");
    }

    #[tokio::test]
    async fn create_route_rejects_wrong_typed_field() {
        let server = Server::new(EphemeralStorage::new());
        let response = server
            .router()
            .oneshot(json_request(
                "/api/code/new",
                r#"{"code":"x","viewsLimit":"many"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_string(response).await,
            "viewsLimit value should be a non-negative integer"
        );
    }

    #[tokio::test]
    async fn api_get_serves_json_then_404_once_expired() {
        let server = Server::new(EphemeralStorage::new());
        let snippet = server
            .create_snippet(CreateSnippetParams {
                code: "print(1)".to_owned(),
                header: None,
                views_limit: Some(1),
                minutes_limit: None,
            })
            .unwrap();
        let uri = format!("/api/code/{}", snippet.id);

        let response = server
            .router()
            .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let served: Snippet = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(served.id, snippet.id);
        assert_eq!(served.views, 1);

        let response = server
            .router()
            .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_id_page_renders_the_html_404() {
        let server = Server::new(EphemeralStorage::new());
        let response = server
            .router()
            .oneshot(Request::get("/code/no-such-id").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        assert!(content_type.starts_with("text/html"));
        assert!(body_string(response).await.contains("<h1>404</h1>"));
    }

    #[tokio::test]
    async fn api_all_lists_stored_snippets() {
        let server = Server::new(EphemeralStorage::new());
        for code in ["a", "b"] {
            server
                .create_snippet(CreateSnippetParams {
                    code: code.to_owned(),
                    header: None,
                    views_limit: None,
                    minutes_limit: None,
                })
                .unwrap();
        }
        let response = server
            .router()
            .oneshot(Request::get("/api/code/all").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let listed: Vec<Snippet> = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn healthz_is_alive() {
        let server = Server::new(EphemeralStorage::new());
        let response = server
            .router()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
