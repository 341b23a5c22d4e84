//! Core data models for the gateway.
//!
//! Objects and buckets map onto the metadata tables of the backing store via
//! `sqlx::FromRow`; the request-side specs (range, conditional, flags) are
//! parsed fresh for every request and never mutated afterwards.

pub mod bucket;
pub mod conditional;
pub mod flags;
pub mod listing;
pub mod object;
pub mod range;
