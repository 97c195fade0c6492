//! Content-type inference for served responses.
//!
//! Responses on routes with `guess_mime` enabled have their `Content-Type`
//! resolved from the request path's extension, then from the signature of
//! the first body chunk, then from the route's default type, before any
//! header reaches the client.

pub mod config;
pub mod filter;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::{Shutdown, WorkerContext};
