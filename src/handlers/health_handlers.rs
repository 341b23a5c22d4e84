//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness as reported by the object store

use crate::{handlers::gateway_handlers::GatewayState, services::object_store::ReadinessCheck};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::BTreeMap;

/// `GET /healthz`
///
/// Liveness probe. Never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Runs the store's readiness checks (for the SQLite store: `SELECT 1` and
/// a read of the storage directory). HTTP 200 when all checks pass, HTTP 503
/// when any fails.
pub async fn readyz(State(state): State<GatewayState>) -> impl IntoResponse {
    let checks: BTreeMap<&'static str, ReadinessCheck> = state
        .store
        .readiness()
        .await
        .into_iter()
        .map(|check| (check.name, check))
        .collect();
    let overall_ok = checks.values().all(|check| check.ok);

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: BTreeMap<&'static str, ReadinessCheck>,
}
