//! Transport-neutral gateway response and its conversion into an axum
//! response.

use crate::{handlers::headers::BodyEncoding, models::object::ObjectBody};
use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";
pub const TEXT_HTML_UTF8: &str = "text/html; charset=utf-8";

#[derive(Debug)]
pub enum ResponseBody {
    Empty,
    Text(String),
    Stream(ObjectBody),
}

/// Status, headers and body produced by the dispatcher, plus the
/// body-encoding instruction computed by the header builder.
#[derive(Debug)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
    pub encode_body: BodyEncoding,
}

impl GatewayResponse {
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
            encode_body: BodyEncoding::Auto,
        }
    }

    /// A text response; `body` is `None` for HEAD.
    pub fn text(status: StatusCode, content_type: &'static str, body: Option<String>) -> Self {
        let mut response = Self::empty(status);
        response
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        if let Some(body) = body {
            response.body = ResponseBody::Text(body);
        }
        response
    }

    pub fn redirect(status: StatusCode, location: &str) -> Self {
        let mut response = Self::empty(status);
        match HeaderValue::from_str(location) {
            Ok(value) => {
                response.headers.insert(header::LOCATION, value);
            }
            Err(_) => tracing::warn!("dropping invalid redirect location {:?}", location),
        }
        response
    }
}

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        let Self {
            status,
            mut headers,
            body,
            encode_body,
        } = self;

        let body = match body {
            ResponseBody::Empty => Body::empty(),
            ResponseBody::Text(text) => Body::from(text),
            ResponseBody::Stream(object_body) => {
                // content-length declares the full object; a partial body is shorter.
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(object_body.length));
                Body::from_stream(object_body.stream)
            }
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response.extensions_mut().insert(encode_body);
        response
    }
}
