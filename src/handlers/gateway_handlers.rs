//! Request dispatcher: one request in, one response out.
//!
//! Every path that is not a health probe lands here. The dispatcher rejects
//! anything but GET/HEAD before touching the store, runs the resolver, and
//! turns its [`Resolution`] into a response. Errors from any step are
//! translated in exactly one place, [`serve_object`].

use crate::{
    config::ErrorDetail,
    errors::AppError,
    handlers::{
        headers::{ObjectHeaders, compute_headers},
        listing::render_listing,
        response::{GatewayResponse, ResponseBody, TEXT_HTML_UTF8, TEXT_PLAIN_UTF8},
    },
    models::{
        conditional::{ConditionalOutcome, ConditionalSpec},
        flags::FeatureFlags,
        object::StoredObject,
        range::RangeSpec,
    },
    services::{
        object_store::ObjectStore,
        resolver::{ReadMethod, Resolution, ResolveRequest, Resolver},
    },
};
use axum::{
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, info};

const ROBOTS_BODY: &str = "User-agent: *\nDisallow: /";
const NOT_FOUND_BODY: &str = "not found";
const PRECONDITION_FAILED_BODY: &str = "precondition failed";

/// Shared, immutable per-process state.
#[derive(Clone)]
pub struct GatewayState {
    pub store: Arc<dyn ObjectStore>,
    pub flags: FeatureFlags,
    pub error_detail: ErrorDetail,
    pub push_id: Option<String>,
}

/// Fallback handler for every method and path.
pub async fn serve_object(
    State(state): State<GatewayState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    info!("{} {}", method, uri);
    if let Some(push_id) = &state.push_id {
        info!("pushId: {}", push_id);
    }

    match dispatch(&state, &method, uri.path(), &headers).await {
        Ok(response) => response.into_response(),
        Err(err) => err.into_http_response(state.error_detail),
    }
}

async fn dispatch(
    state: &GatewayState,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
) -> Result<GatewayResponse, AppError> {
    let read = ReadMethod::from_method(method)
        .ok_or_else(|| AppError::MethodNotAllowed(method.clone()))?;
    let request = ResolveRequest::from_parts(read, path, headers);
    let resolution = Resolver::new(state.store.as_ref(), state.flags, request)
        .resolve()
        .await?;
    Ok(respond(read, resolution))
}

fn respond(method: ReadMethod, resolution: Resolution) -> GatewayResponse {
    let is_get = method == ReadMethod::Get;
    match resolution {
        Resolution::Robots => GatewayResponse::text(
            StatusCode::OK,
            TEXT_PLAIN_UTF8,
            is_get.then(|| ROBOTS_BODY.to_string()),
        ),
        Resolution::Object {
            object,
            status,
            range,
            only_if,
        } => object_response(method, object, status, range, only_if),
        Resolution::Redirect { status, location } => GatewayResponse::redirect(status, &location),
        Resolution::Listing { prefix, listing } => GatewayResponse::text(
            StatusCode::OK,
            TEXT_HTML_UTF8,
            is_get.then(|| render_listing(&listing, &prefix)),
        ),
        Resolution::NotFound => GatewayResponse::text(
            StatusCode::NOT_FOUND,
            TEXT_PLAIN_UTF8,
            is_get.then(|| NOT_FOUND_BODY.to_string()),
        ),
    }
}

fn object_response(
    method: ReadMethod,
    mut object: StoredObject,
    status: StatusCode,
    range: Option<RangeSpec>,
    only_if: Option<ConditionalSpec>,
) -> GatewayResponse {
    let ObjectHeaders {
        mut headers,
        encode_body,
    } = compute_headers(&object, range);
    debug!("{} {} -> {} ({} bytes)", method.as_str(), object.key, status, object.size);

    let body = match (object.body.take(), method) {
        (Some(body), _) => ResponseBody::Stream(body),
        (None, ReadMethod::Head) => ResponseBody::Empty,
        // A GET without a body: the store withheld it because a
        // precondition did not hold.
        (None, ReadMethod::Get) => {
            match only_if.as_ref().and_then(ConditionalSpec::short_circuit_outcome) {
                Some(ConditionalOutcome::NotModified) => {
                    return GatewayResponse::empty(StatusCode::NOT_MODIFIED);
                }
                Some(ConditionalOutcome::PreconditionFailed) => {
                    return GatewayResponse::text(
                        StatusCode::PRECONDITION_FAILED,
                        TEXT_PLAIN_UTF8,
                        Some(PRECONDITION_FAILED_BODY.to_string()),
                    );
                }
                None => {
                    headers.remove(header::CONTENT_LENGTH);
                    ResponseBody::Empty
                }
            }
        }
    };

    GatewayResponse {
        status,
        headers,
        body,
        encode_body,
    }
}
