//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Response headers (after content-type inference):
//!     → headers.rs (nosniff hardening)
//!     → Sent to client
//! ```

pub mod headers;

pub use headers::NoSniffFilter;
