//! Per-response filter context.
//!
//! # Responsibilities
//! - Own the response header set until it is released downstream
//! - Refuse header mutation after release
//! - Collect the chunks the chain forwards, in order
//! - Carry the route's resolved filter settings and the request's marker

use std::sync::Arc;

use axum::http::header::MaxSizeReached;
use axum::http::response::Parts;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::filter::marker::ProcessingMarker;

/// Filter settings after merging the server scope into a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterSettings {
    /// Whether content-type inference runs on this route.
    pub guess_mime: bool,
    /// Type sent when nothing better is known.
    pub default_type: String,
    /// Append `x-guess-mime` describing where the type came from.
    pub diagnostic_header: bool,
    /// Append `X-Content-Type-Options: nosniff`.
    pub nosniff: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            guess_mime: false,
            default_type: "application/octet-stream".to_string(),
            diagnostic_header: false,
            nosniff: false,
        }
    }
}

/// Errors raised while filtering a single response.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("response headers already sent")]
    HeadersAlreadySent,

    #[error("body data forwarded before response headers")]
    BodyBeforeHeaders,

    #[error("response headers were never released")]
    HeadersWithheld,

    #[error("response header map is full")]
    HeaderCapacity(#[from] MaxSizeReached),

    #[error("response body failed: {0}")]
    Body(#[source] axum::Error),
}

/// An ordered run of body chunks, optionally ending the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkSequence {
    chunks: Vec<Bytes>,
    last: bool,
}

impl ChunkSequence {
    pub fn new(chunks: Vec<Bytes>) -> Self {
        Self {
            chunks,
            last: false,
        }
    }

    /// An empty sequence that ends the body.
    pub fn end() -> Self {
        Self {
            chunks: Vec::new(),
            last: true,
        }
    }

    /// Mark this sequence as the end of the body.
    pub fn finished(mut self, last: bool) -> Self {
        self.last = last;
        self
    }

    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    pub fn is_last(&self) -> bool {
        self.last
    }

    /// First chunk carrying data, if any.
    pub fn first_data(&self) -> Option<&Bytes> {
        self.chunks.iter().find(|c| !c.is_empty())
    }

    pub fn byte_len(&self) -> usize {
        self.chunks.iter().map(Bytes::len).sum()
    }

    /// Carries neither chunks nor the end-of-body mark. `end()` is not a
    /// no-op even though it holds no bytes.
    pub fn is_noop(&self) -> bool {
        self.chunks.is_empty() && !self.last
    }

    pub fn into_chunks(self) -> Vec<Bytes> {
        self.chunks
    }

    fn append(&mut self, other: ChunkSequence) {
        self.chunks.extend(other.chunks);
        self.last |= other.last;
    }
}

/// State of one response travelling through the filter chain.
#[derive(Debug)]
pub struct ResponseContext {
    head: Option<Parts>,
    headers_sent: bool,
    settings: Arc<FilterSettings>,
    marker: ProcessingMarker,
    lookup_key: String,
    request_id: Option<String>,
    forwarded: ChunkSequence,
}

impl ResponseContext {
    pub fn new(
        head: Parts,
        settings: Arc<FilterSettings>,
        marker: ProcessingMarker,
        lookup_key: impl Into<String>,
    ) -> Self {
        Self {
            head: Some(head),
            headers_sent: false,
            settings,
            marker,
            lookup_key: lookup_key.into(),
            request_id: None,
            forwarded: ChunkSequence::default(),
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    pub fn marker(&self) -> &ProcessingMarker {
        &self.marker
    }

    /// Key for the static type table; the request path.
    pub fn lookup_key(&self) -> &str {
        &self.lookup_key
    }

    pub fn request_id(&self) -> &str {
        self.request_id.as_deref().unwrap_or("-")
    }

    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    /// Read access to the header set, until it is handed to the host.
    pub fn head(&self) -> Option<&Parts> {
        self.head.as_ref()
    }

    /// Write access to the header set. Fails once headers are released.
    pub fn head_mut(&mut self) -> Result<&mut Parts, FilterError> {
        if self.headers_sent {
            return Err(FilterError::HeadersAlreadySent);
        }
        self.head.as_mut().ok_or(FilterError::HeadersAlreadySent)
    }

    /// Hand the released header set to the host for transmission.
    pub fn take_released_head(&mut self) -> Result<Parts, FilterError> {
        if !self.headers_sent {
            return Err(FilterError::HeadersWithheld);
        }
        self.head.take().ok_or(FilterError::HeadersAlreadySent)
    }

    pub(crate) fn commit_headers(&mut self) -> Result<(), FilterError> {
        if self.headers_sent {
            return Err(FilterError::HeadersAlreadySent);
        }
        self.headers_sent = true;
        Ok(())
    }

    pub(crate) fn forward(&mut self, chunks: ChunkSequence) -> Result<(), FilterError> {
        if !self.headers_sent {
            return Err(FilterError::BodyBeforeHeaders);
        }
        self.forwarded.append(chunks);
        Ok(())
    }

    pub(crate) fn take_forwarded(&mut self) -> ChunkSequence {
        std::mem::take(&mut self.forwarded)
    }
}
