//! HTTP-facing layer: header building, listing pages, the request
//! dispatcher and health probes.

pub mod gateway_handlers;
pub mod headers;
pub mod health_handlers;
pub mod listing;
pub mod response;
