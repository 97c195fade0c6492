//! Ordered response filter chain.
//!
//! # Responsibilities
//! - Hold the response filters in the order they wrap each other
//! - Hand every filter a `Next` handle for the rest of the chain
//! - Terminate in the host writer: commit headers, collect forwarded chunks
//!
//! # Design Decisions
//! - The chain is composed once at server construction and never mutated
//! - Index 0 is the outermost filter; it sees headers and body first
//! - Filters that need headers flushed again re-run the chain from the top,
//!   exactly like the host would

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::filter::context::{ChunkSequence, FilterError, ResponseContext};

/// Outcome of the header stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Headers went downstream.
    Forward,
    /// Headers were accepted but withheld.
    Suppress,
}

/// A stage in the response output path.
///
/// Both hooks default to pass-through.
pub trait ResponseFilter: Send + Sync {
    /// Stable name, unique within a chain.
    fn name(&self) -> &'static str;

    fn on_headers(
        &self,
        cx: &mut ResponseContext,
        next: Next<'_>,
    ) -> Result<Decision, FilterError> {
        next.send_headers(cx)
    }

    fn on_body(
        &self,
        cx: &mut ResponseContext,
        chunks: ChunkSequence,
        next: Next<'_>,
    ) -> Result<(), FilterError> {
        next.send_body(cx, chunks)
    }
}

/// Handle to the remainder of the chain after the current filter.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a FilterChain,
    index: usize,
}

impl<'a> Next<'a> {
    /// Pass headers to the next stage.
    pub fn send_headers(self, cx: &mut ResponseContext) -> Result<Decision, FilterError> {
        self.chain.run_headers(self.index, cx)
    }

    /// Pass body chunks to the next stage.
    pub fn send_body(
        self,
        cx: &mut ResponseContext,
        chunks: ChunkSequence,
    ) -> Result<(), FilterError> {
        self.chain.run_body(self.index, cx, chunks)
    }

    /// Send the response headers through the whole chain again, from the
    /// outermost filter.
    pub fn flush_headers(self, cx: &mut ResponseContext) -> Result<Decision, FilterError> {
        self.chain.send_headers(cx)
    }
}

/// Errors raised while installing filters.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("response filter `{0}` installed twice")]
    DuplicateFilter(&'static str),
}

/// Composed filter pipeline.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn ResponseFilter>>,
}

impl FilterChain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder::default()
    }

    /// Names in wrapping order, outermost first.
    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run the header stage for a response.
    pub fn send_headers(&self, cx: &mut ResponseContext) -> Result<Decision, FilterError> {
        self.run_headers(0, cx)
    }

    /// Run the body stage and return what reached the end of the chain.
    pub fn send_body(
        &self,
        cx: &mut ResponseContext,
        chunks: ChunkSequence,
    ) -> Result<ChunkSequence, FilterError> {
        self.run_body(0, cx, chunks)?;
        Ok(cx.take_forwarded())
    }

    fn run_headers(&self, index: usize, cx: &mut ResponseContext) -> Result<Decision, FilterError> {
        match self.filters.get(index) {
            Some(filter) => filter.on_headers(cx, Next { chain: self, index: index + 1 }),
            None => {
                cx.commit_headers()?;
                Ok(Decision::Forward)
            }
        }
    }

    fn run_body(
        &self,
        index: usize,
        cx: &mut ResponseContext,
        chunks: ChunkSequence,
    ) -> Result<(), FilterError> {
        match self.filters.get(index) {
            Some(filter) => filter.on_body(cx, chunks, Next { chain: self, index: index + 1 }),
            None => cx.forward(chunks),
        }
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Builder collecting filters outermost first.
#[derive(Default)]
pub struct ChainBuilder {
    filters: Vec<Arc<dyn ResponseFilter>>,
}

impl ChainBuilder {
    /// Append a filter inside the ones already added.
    pub fn filter<F: ResponseFilter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn build(self) -> Result<FilterChain, ChainError> {
        let mut seen = HashSet::new();
        for filter in &self.filters {
            if !seen.insert(filter.name()) {
                return Err(ChainError::DuplicateFilter(filter.name()));
            }
        }
        Ok(FilterChain {
            filters: self.filters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::context::FilterSettings;
    use crate::filter::marker::ProcessingMarker;
    use axum::http::Response;
    use bytes::Bytes;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ResponseFilter for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn on_headers(&self, cx: &mut ResponseContext, next: Next<'_>) -> Result<Decision, FilterError> {
            self.log.lock().unwrap().push(format!("{}:headers", self.name));
            next.send_headers(cx)
        }

        fn on_body(
            &self,
            cx: &mut ResponseContext,
            chunks: ChunkSequence,
            next: Next<'_>,
        ) -> Result<(), FilterError> {
            self.log.lock().unwrap().push(format!("{}:body", self.name));
            next.send_body(cx, chunks)
        }
    }

    struct Withhold;

    impl ResponseFilter for Withhold {
        fn name(&self) -> &'static str {
            "withhold"
        }

        fn on_headers(&self, _cx: &mut ResponseContext, _next: Next<'_>) -> Result<Decision, FilterError> {
            Ok(Decision::Suppress)
        }
    }

    fn context() -> ResponseContext {
        let (head, ()) = Response::new(()).into_parts();
        ResponseContext::new(
            head,
            Arc::new(FilterSettings::default()),
            ProcessingMarker::default(),
            "/",
        )
    }

    #[test]
    fn test_filters_run_outermost_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = FilterChain::builder()
            .filter(Recorder { name: "outer", log: log.clone() })
            .filter(Recorder { name: "inner", log: log.clone() })
            .build()
            .unwrap();

        let mut cx = context();
        assert_eq!(chain.send_headers(&mut cx).unwrap(), Decision::Forward);
        let out = chain
            .send_body(&mut cx, ChunkSequence::new(vec![Bytes::from_static(b"x")]))
            .unwrap();

        assert_eq!(out.byte_len(), 1);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["outer:headers", "inner:headers", "outer:body", "inner:body"]
        );
    }

    #[test]
    fn test_empty_chain_is_passthrough() {
        let chain = FilterChain::builder().build().unwrap();
        assert!(chain.is_empty());

        let mut cx = context();
        assert_eq!(chain.send_headers(&mut cx).unwrap(), Decision::Forward);
        assert!(cx.headers_sent());
    }

    #[test]
    fn test_suppress_stops_propagation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = FilterChain::builder()
            .filter(Withhold)
            .filter(Recorder { name: "inner", log: log.clone() })
            .build()
            .unwrap();

        let mut cx = context();
        assert_eq!(chain.send_headers(&mut cx).unwrap(), Decision::Suppress);
        assert!(!cx.headers_sent());
        assert!(log.lock().unwrap().is_empty());

        let err = chain
            .send_body(&mut cx, ChunkSequence::new(vec![Bytes::from_static(b"x")]))
            .unwrap_err();
        assert!(matches!(err, FilterError::BodyBeforeHeaders));
    }

    #[test]
    fn test_duplicate_filter_rejected() {
        let err = FilterChain::builder()
            .filter(Withhold)
            .filter(Withhold)
            .build()
            .unwrap_err();
        assert!(matches!(err, ChainError::DuplicateFilter("withhold")));
    }
}
