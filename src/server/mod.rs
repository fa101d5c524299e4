//! The control socket: an HTTP/1.1 surface over the timetable and status
//! publisher, built on `axum`. Four resources: `/settings`, `/heating`,
//! `/status`, `/monitor`.

mod handlers;

use crate::cycle::{MasterCondition, SharedDaemon};
use crate::status::StatusPublisher;
use axum::extract::{ConnectInfo, Request};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub daemon: SharedDaemon,
    pub condition: MasterCondition,
    pub status: StatusPublisher,
    pub shutdown: tokio::sync::watch::Receiver<bool>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/settings",
            get(handlers::get_settings)
                .post(handlers::post_settings)
                .fallback(method_not_implemented),
        )
        .route(
            "/heating",
            get(handlers::get_status).fallback(method_not_implemented),
        )
        .route(
            "/status",
            get(handlers::get_status).fallback(method_not_implemented),
        )
        .route(
            "/monitor",
            get(handlers::monitor).fallback(method_not_implemented),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(catch_panic_with_context))
        .with_state(state)
}

/// Binds the listener and serves until cancelled. `ConnectInfo<SocketAddr>`
/// is made available to handlers so the fail2ban-format log lines can
/// include the client `(host, port)`.
pub async fn start_server(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "control socket listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

async fn method_not_implemented(ConnectInfo(addr): ConnectInfo<SocketAddr>, method: Method) -> Response {
    tracing::warn!(
        "('{}', {}) method \"{}\" not implemented",
        addr.ip(),
        addr.port(),
        method
    );
    (
        StatusCode::NOT_IMPLEMENTED,
        axum::Json(handlers::ErrorBody {
            error: "not implemented".to_string(),
            explain: None,
        }),
    )
        .into_response()
}

/// Runs the rest of the stack in its own task so a handler panic surfaces as
/// a `JoinError` here instead of taking down the connection's worker task,
/// and so the critical log line can include the client address and method
/// that `tower_http::catch_panic::CatchPanicLayer`'s panic-only hook has no
/// access to.
async fn catch_panic_with_context(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    match tokio::spawn(next.run(req)).await {
        Ok(response) => response,
        Err(_join_err) => {
            tracing::error!(
                "('{}', {}) the {} request produced an unhandled panic exception",
                addr.ip(),
                addr.port(),
                method
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(handlers::ErrorBody {
                    error: "unhandled exception".to_string(),
                    explain: None,
                }),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::NullActuator;
    use crate::cycle::Daemon;
    use crate::status::StatusPublisher;
    use crate::timetable::{Mode, TimeTable, TimeTableDocument};
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tokio::sync::{watch, Mutex, Notify};
    use tower::ServiceExt;

    fn test_app_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timetable.json");
        let doc = TimeTableDocument::default();
        std::fs::write(&path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
        let timetable = TimeTable::load(&path).unwrap();

        let daemon = Arc::new(Mutex::new(Daemon {
            timetable,
            heating: Arc::new(NullActuator::new()),
            cooling: Arc::new(NullActuator::new()),
            enabled: true,
        }));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = AppState {
            daemon,
            condition: Arc::new(Notify::new()),
            status: StatusPublisher::placeholder(Mode::Auto),
            shutdown: shutdown_rx,
        };
        (state, dir)
    }

    fn request(method: &str, uri: &str, body: &str) -> Request<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 54321))));
        req
    }

    #[tokio::test]
    async fn get_settings_returns_the_live_document() {
        let (state, _dir) = test_app_state();
        let app = build_router(state);

        let response = app.oneshot(request("GET", "/settings", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let doc: TimeTableDocument = serde_json::from_slice(&body).unwrap();
        assert_eq!(doc.mode, Mode::Auto);
    }

    #[tokio::test]
    async fn post_settings_with_invalid_type_is_rejected_and_document_is_unchanged() {
        let (state, _dir) = test_app_state();
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/settings",
                r#"{"differential": "not-a-number"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.oneshot(request("GET", "/settings", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let doc: TimeTableDocument = serde_json::from_slice(&body).unwrap();
        assert_eq!(doc.differential, TimeTableDocument::default().differential);
    }

    #[tokio::test]
    async fn unsupported_method_on_known_path_is_not_implemented() {
        let (state, _dir) = test_app_state();
        let app = build_router(state);

        let response = app
            .oneshot(request("DELETE", "/settings", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let (state, _dir) = test_app_state();
        let app = build_router(state);

        let response = app.oneshot(request("GET", "/nope", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
