//! Per-request processing marker.
//!
//! A set-once flag recording that the inference filter has already acted on
//! the response for this request. It is attached lazily to the request's
//! extensions, so nested dispatches that carry the same extensions observe
//! the same marker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::http::Extensions;

/// Request-scoped "already processed" flag.
///
/// Clones share the same underlying flag. Once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct ProcessingMarker {
    processed: Arc<AtomicBool>,
}

impl ProcessingMarker {
    /// Fetch the marker attached to these request extensions, creating and
    /// attaching a fresh one on first use.
    pub fn attach(extensions: &mut Extensions) -> Self {
        if let Some(marker) = extensions.get::<ProcessingMarker>() {
            return marker.clone();
        }
        let marker = ProcessingMarker::default();
        extensions.insert(marker.clone());
        marker
    }

    /// Whether the filter has already acted on this request's response.
    pub fn is_set(&self) -> bool {
        self.processed.load(Ordering::Acquire)
    }

    /// Set the marker. Returns `true` only for the call that flipped it.
    pub fn set(&self) -> bool {
        !self.processed.swap(true, Ordering::AcqRel)
    }
}
