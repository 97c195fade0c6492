//! Security response headers.
//!
//! # Responsibilities
//! - Add `X-Content-Type-Options: nosniff` on routes that ask for it, so
//!   clients keep the content type this server settled on
//!
//! # Design Decisions
//! - Runs as a response filter after content-type inference, so it only ever
//!   sees the final header set
//! - Never overrides a value set by the handler

use axum::http::header::X_CONTENT_TYPE_OPTIONS;
use axum::http::HeaderValue;

use crate::filter::{Decision, FilterError, Next, ResponseContext, ResponseFilter};

/// Appends `X-Content-Type-Options: nosniff`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSniffFilter;

impl NoSniffFilter {
    pub const NAME: &'static str = "nosniff";
}

impl ResponseFilter for NoSniffFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn on_headers(&self, cx: &mut ResponseContext, next: Next<'_>) -> Result<Decision, FilterError> {
        if cx.settings().nosniff {
            let head = cx.head_mut()?;
            if !head.headers.contains_key(X_CONTENT_TYPE_OPTIONS) {
                head.headers
                    .try_insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"))?;
            }
        }
        next.send_headers(cx)
    }
}
