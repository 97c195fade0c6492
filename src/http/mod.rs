//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → middleware.rs (marker, route match, filter chain on the response)
//!     → server.rs dispatch (static root or proxy.rs upstream)
//!     → body.rs (remaining body frames through the chain)
//!     → Send to client
//! ```

pub mod body;
pub mod middleware;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use middleware::{filter_response, response_filter_middleware, FilterState, MatchedRoute};
pub use request::X_REQUEST_ID;
pub use server::{HttpServer, ServerError};
