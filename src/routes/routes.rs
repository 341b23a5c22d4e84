//! Router for the gateway.
//!
//! ## Structure
//! - `GET /healthz`, `GET /readyz`: probes (shadow objects of the same name)
//! - everything else, any method: [`serve_object`], which answers 405 for
//!   methods other than GET/HEAD
//!
//! Object keys are taken from the raw request path, so nested keys like
//! `photos/2025/img.jpg` need no route parameters.

use crate::handlers::{
    gateway_handlers::{GatewayState, serve_object},
    headers::BodyEncoding,
    health_handlers::{healthz, readyz},
};
use axum::{
    Router,
    http::{Extensions, HeaderMap, StatusCode, Version},
    routing::get,
};
use tower_http::{
    compression::{
        CompressionLayer,
        predicate::{DefaultPredicate, Predicate},
    },
    trace::TraceLayer,
};

/// Build the gateway router.
///
/// With `compress`, responses are gzip-encoded when the client accepts it,
/// except for bodies that are already encoded and partial content.
pub fn routes(compress: bool) -> Router<GatewayState> {
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .fallback(serve_object);

    let router = if compress {
        router.layer(
            CompressionLayer::new().compress_when(DefaultPredicate::new().and(may_compress)),
        )
    } else {
        router
    };
    router.layer(TraceLayer::new_for_http())
}

fn may_compress(
    status: StatusCode,
    _version: Version,
    _headers: &HeaderMap,
    extensions: &Extensions,
) -> bool {
    status != StatusCode::PARTIAL_CONTENT
        && extensions.get::<BodyEncoding>() != Some(&BodyEncoding::Manual)
}
