//! Content-type inference filter.
//!
//! Header stage: withholds the response headers on routes with `guess_mime`
//! enabled, until the body stage has seen data.
//!
//! Body stage: on the first chunk of a response, resolves the final
//! Content-Type (static table, then a specific type the response already
//! carries, then signature sniffing of that chunk), writes it into the header
//! set, re-runs the header chain to release the headers and only then
//! forwards the chunk. Every later invocation is pass-through.

use std::fmt;
use std::sync::Arc;

use axum::http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, StatusCode};

use crate::filter::chain::{Decision, Next, ResponseFilter};
use crate::filter::classifier::{ClassifyError, Classifier};
use crate::filter::context::{ChunkSequence, FilterError, ResponseContext};
use crate::filter::table::TypeTable;
use crate::observability::metrics;

/// Diagnostic header naming the source of the resolved type.
pub const DIAGNOSTIC_HEADER: HeaderName = HeaderName::from_static("x-guess-mime");

/// Fallback hosts use when they know nothing about the content.
const GENERIC_TYPE: &str = "application/octet-stream";

/// Where a resolved type came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSource {
    Table,
    /// The response already named a specific type; left as is.
    Response,
    Signature,
    Default,
}

impl TypeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeSource::Table => "table",
            TypeSource::Response => "response",
            TypeSource::Signature => "signature",
            TypeSource::Default => "default",
        }
    }
}

impl fmt::Display for TypeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the two-stage lookup for one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedType {
    pub mime: String,
    pub source: TypeSource,
}

impl ResolvedType {
    fn new(mime: impl Into<String>, source: TypeSource) -> Self {
        Self {
            mime: mime.into(),
            source,
        }
    }
}

/// The inference filter.
pub struct GuessMimeFilter {
    table: Arc<dyn TypeTable>,
    classifier: Option<Arc<dyn Classifier>>,
}

impl GuessMimeFilter {
    pub const NAME: &'static str = "guess_mime";

    /// `classifier` is `None` when no signature classifier was initialised
    /// for this worker; responses then fall back to the default type.
    pub fn new(table: Arc<dyn TypeTable>, classifier: Option<Arc<dyn Classifier>>) -> Self {
        Self { table, classifier }
    }

    /// Static table first, then the type the response already names, then
    /// the first chunk's signature.
    pub fn resolve(&self, cx: &ResponseContext, chunks: &ChunkSequence) -> ResolvedType {
        let default_type = cx.settings().default_type.as_str();
        let lookup = self.table.resolve_by_extension(cx.lookup_key(), default_type);
        if !lookup.is_default {
            return ResolvedType::new(lookup.mime, TypeSource::Table);
        }

        if let Some(existing) = specific_content_type(cx) {
            return ResolvedType::new(existing, TypeSource::Response);
        }

        if !sniffable(cx) {
            tracing::debug!(
                request_id = %cx.request_id(),
                path = %cx.lookup_key(),
                "First chunk is not the start of the resource, skipping signature check"
            );
            return ResolvedType::new(lookup.mime, TypeSource::Default);
        }

        let first = chunks.first_data().map(|b| &b[..]).unwrap_or_default();
        match self.classify(first) {
            Ok(Some(mime)) => ResolvedType::new(mime, TypeSource::Signature),
            Ok(None) => ResolvedType::new(lookup.mime, TypeSource::Default),
            Err(e) if !e.is_failure() => {
                tracing::debug!(
                    request_id = %cx.request_id(),
                    path = %cx.lookup_key(),
                    reason = %e,
                    "No signature check, keeping default type"
                );
                ResolvedType::new(lookup.mime, TypeSource::Default)
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %cx.request_id(),
                    path = %cx.lookup_key(),
                    error = %e,
                    "Signature classification failed, keeping default type"
                );
                metrics::record_classifier_failure(&e);
                ResolvedType::new(lookup.mime, TypeSource::Default)
            }
        }
    }

    fn classify(&self, buf: &[u8]) -> Result<Option<String>, ClassifyError> {
        let classifier = self.classifier.as_ref().ok_or(ClassifyError::Unavailable)?;
        classifier.classify(buf)
    }

    fn apply(&self, cx: &mut ResponseContext, resolved: &ResolvedType) -> Result<(), FilterError> {
        let diagnostic = cx.settings().diagnostic_header;
        let default_type = cx.settings().default_type.clone();
        let head = cx.head_mut()?;

        if resolved.source != TypeSource::Response {
            let value = HeaderValue::from_str(&resolved.mime)
                .or_else(|_| HeaderValue::from_str(&default_type))
                .unwrap_or(HeaderValue::from_static(GENERIC_TYPE));
            head.headers.try_insert(CONTENT_TYPE, value)?;
        }

        if diagnostic {
            head.headers
                .try_insert(DIAGNOSTIC_HEADER, HeaderValue::from_static(resolved.source.as_str()))?;
        }
        Ok(())
    }
}

impl ResponseFilter for GuessMimeFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn on_headers(&self, cx: &mut ResponseContext, next: Next<'_>) -> Result<Decision, FilterError> {
        if !cx.settings().guess_mime || cx.marker().is_set() {
            return next.send_headers(cx);
        }

        tracing::trace!(
            request_id = %cx.request_id(),
            path = %cx.lookup_key(),
            "Deferring response headers until first body chunk"
        );
        metrics::record_deferred();
        Ok(Decision::Suppress)
    }

    fn on_body(
        &self,
        cx: &mut ResponseContext,
        chunks: ChunkSequence,
        next: Next<'_>,
    ) -> Result<(), FilterError> {
        if !cx.settings().guess_mime || !cx.marker().set() {
            return next.send_body(cx, chunks);
        }

        if cx.headers_sent() {
            tracing::warn!(
                request_id = %cx.request_id(),
                path = %cx.lookup_key(),
                "Response headers left before inference ran, passing through"
            );
            return next.send_body(cx, chunks);
        }

        let resolved = self.resolve(cx, &chunks);
        tracing::debug!(
            request_id = %cx.request_id(),
            path = %cx.lookup_key(),
            mime = %resolved.mime,
            source = %resolved.source,
            "Resolved response content type"
        );
        metrics::record_resolution(resolved.source);

        self.apply(cx, &resolved)?;
        next.flush_headers(cx)?;
        next.send_body(cx, chunks)
    }
}

/// The response's own Content-Type, unless it is missing, the route default
/// or the generic fallback.
fn specific_content_type(cx: &ResponseContext) -> Option<String> {
    let value = cx.head()?.headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let essence = essence_of(value);
    let is_generic = essence.is_empty()
        || essence.eq_ignore_ascii_case(GENERIC_TYPE)
        || essence.eq_ignore_ascii_case(essence_of(&cx.settings().default_type));
    (!is_generic).then(|| value.to_string())
}

fn essence_of(mime: &str) -> &str {
    mime.split(';').next().unwrap_or_default().trim()
}

/// Signature sniffing only makes sense when the first chunk is the first
/// byte of the resource as stored.
fn sniffable(cx: &ResponseContext) -> bool {
    match cx.head() {
        Some(head) => {
            head.status != StatusCode::PARTIAL_CONTENT
                && !head.headers.contains_key(CONTENT_ENCODING)
        }
        None => false,
    }
}
