//! Handlers for the four control-socket resources. Mutating handlers take
//! the master lock, run one timetable transaction, release it, and notify;
//! `GET /monitor` long-polls the status publisher instead.

use crate::server::AppState;
use crate::timetable::{SettingsPatch, ThermodStatus, TimeTableDocument, TimeTableError};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<String>,
}

/// `GET /settings` — full JSON of the live timetable document.
pub async fn get_settings(State(state): State<AppState>) -> Json<TimeTableDocument> {
    let guard = state.daemon.lock().await;
    Json(guard.timetable.document().clone())
}

/// `POST /settings` — apply a partial update as one transaction, notify the
/// control cycle on success.
pub async fn post_settings(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: axum::body::Bytes,
) -> Response {
    let patch: SettingsPatch = match serde_json::from_slice(&body) {
        Ok(patch) => patch,
        Err(e) => {
            tracing::warn!(
                "('{}', {}) invalid request \"{}\" received",
                addr.ip(),
                addr.port(),
                e
            );
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: "invalid request".to_string(),
                    explain: Some(e.to_string()),
                }),
            )
                .into_response();
        }
    };

    let result = {
        let mut guard = state.daemon.lock().await;
        guard.timetable.update(patch)
    };

    match result {
        Ok(()) => {
            state.condition.notify_one();
            StatusCode::OK.into_response()
        }
        Err(TimeTableError::Io { path, source }) => {
            tracing::error!(
                path = %path,
                source = %source,
                "('{}', {}) the POST request produced an unhandled IOError exception",
                addr.ip(),
                addr.port()
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: "unhandled exception".to_string(),
                    explain: None,
                }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!(
                "('{}', {}) cannot update settings",
                addr.ip(),
                addr.port()
            );
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: "cannot update settings".to_string(),
                    explain: Some(e.to_string()),
                }),
            )
                .into_response()
        }
    }
}

/// `GET /heating` and `GET /status` — both serve the last published snapshot.
pub async fn get_status(State(state): State<AppState>) -> Json<ThermodStatus> {
    Json(state.status.latest())
}

#[derive(Debug, Deserialize)]
pub struct MonitorQuery {
    /// Optional client-chosen name, logged for server-side correlation only.
    pub name: Option<String>,
}

const MONITOR_IDLE_TIMEOUT: Duration = Duration::from_secs(55);

/// `GET /monitor` — holds the connection open until the next status
/// publication (or shutdown, or an idle timeout to recycle the connection),
/// then returns that snapshot and closes.
pub async fn monitor(
    State(state): State<AppState>,
    Query(params): Query<MonitorQuery>,
) -> Json<ThermodStatus> {
    let mut status_rx = state.status.subscribe();
    let mut shutdown_rx = state.shutdown.clone();
    if let Some(name) = &params.name {
        tracing::debug!(monitor = %name, "monitor connected");
    }

    tokio::select! {
        changed = status_rx.changed() => {
            match changed {
                Ok(()) => Json(status_rx.borrow().clone()),
                Err(_) => Json(ThermodStatus::error(Local::now(), state.status.latest().mode, false, "status publisher closed")),
            }
        }
        changed = shutdown_rx.changed() => {
            if changed.is_ok() && *shutdown_rx.borrow() {
                Json(ThermodStatus::error(Local::now(), state.status.latest().mode, false, "daemon shutting down"))
            } else {
                Json(status_rx.borrow().clone())
            }
        }
        _ = tokio::time::sleep(MONITOR_IDLE_TIMEOUT) => {
            Json(status_rx.borrow().clone())
        }
    }
}
