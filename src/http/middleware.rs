//! Response filter middleware.
//!
//! # Responsibilities
//! - Attach the processing marker and the matched route to each request
//! - Run the header stage of the filter chain on the handler's response
//! - When headers are deferred, pull body frames until the chain releases them
//! - Hand the rest of the body to `FilteredBody`
//!
//! # Design Decisions
//! - Route lookup happens once; the dispatch handler reuses the result
//! - A response whose headers are still withheld after end-of-body fails
//!   with 500 instead of hanging

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::body::{Body, HttpBody};
use axum::extract::{Request, State};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use http_body_util::BodyExt;

use crate::filter::{ChunkSequence, FilterChain, FilterError, ProcessingMarker, ResponseContext};
use crate::http::body::FilteredBody;
use crate::http::request::request_id;
use crate::routing::{Route, RouteTable};

/// State shared by the filter middleware.
#[derive(Clone)]
pub struct FilterState {
    pub chain: Arc<FilterChain>,
    pub routes: Arc<ArcSwap<RouteTable>>,
}

/// Route chosen for a request, `None` when nothing matched.
#[derive(Debug, Clone)]
pub struct MatchedRoute(pub Option<Arc<Route>>);

/// Middleware running every response through the filter chain.
pub async fn response_filter_middleware(
    State(state): State<FilterState>,
    mut request: Request,
    next: middleware::Next,
) -> Response {
    let marker = ProcessingMarker::attach(request.extensions_mut());

    let matched = match request.extensions().get::<MatchedRoute>() {
        Some(matched) => matched.clone(),
        None => {
            let matched = MatchedRoute(state.routes.load().match_request(&request));
            request.extensions_mut().insert(matched.clone());
            matched
        }
    };
    let settings = match &matched.0 {
        Some(route) => route.settings.clone(),
        None => state.routes.load().defaults(),
    };

    let lookup_key = request.uri().path().to_string();
    let request_id = request_id(request.headers());

    let response = next.run(request).await;
    let (head, body) = response.into_parts();
    let cx = ResponseContext::new(head, settings, marker, lookup_key)
        .with_request_id(request_id.clone());

    match filter_response(state.chain, cx, body).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(
                request_id = request_id.as_deref().unwrap_or("-"),
                route = matched.0.as_ref().map(|r| r.name.as_str()).unwrap_or("-"),
                error = %e,
                "Response filter failed"
            );
            e.into_response()
        }
    }
}

/// Drive one response through the chain and rebuild it around the released
/// header set.
pub async fn filter_response(
    chain: Arc<FilterChain>,
    mut cx: ResponseContext,
    mut body: Body,
) -> Result<Response, FilterError> {
    chain.send_headers(&mut cx)?;

    let mut forwarded = ChunkSequence::default();
    let mut trailers = None;
    let mut finished = false;

    if !cx.headers_sent() {
        // Deferred: the first data frame (or end-of-body) decides the headers.
        let first = loop {
            match body.frame().await {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) if data.is_empty() && !body.is_end_stream() => continue,
                    Ok(data) => {
                        break ChunkSequence::new(vec![data]).finished(body.is_end_stream())
                    }
                    Err(frame) => {
                        trailers = frame.into_trailers().ok();
                        break ChunkSequence::end();
                    }
                },
                Some(Err(e)) => return Err(FilterError::Body(e)),
                None => break ChunkSequence::end(),
            }
        };

        finished = first.is_last();
        forwarded = chain.send_body(&mut cx, first)?;

        if !cx.headers_sent() {
            tracing::debug!(
                request_id = %cx.request_id(),
                "Headers withheld past first body invocation, flushing"
            );
            chain.send_headers(&mut cx)?;
        }
    }

    let head = cx.take_released_head()?;
    let body = FilteredBody::new(body, chain, cx, forwarded, trailers, finished);
    Ok(Response::from_parts(head, Body::new(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{
        ChainBuilder, Classifier, Decision, ExtensionTable, FilterSettings, GuessMimeFilter, InferClassifier,
        Next, ResponseFilter,
    };
    use axum::http::header::CONTENT_TYPE;
    use axum::http::HeaderValue;
    use bytes::Bytes;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0x0d];

    struct AlwaysWithhold;

    impl ResponseFilter for AlwaysWithhold {
        fn name(&self) -> &'static str {
            "always_withhold"
        }

        fn on_headers(&self, _cx: &mut ResponseContext, _next: Next<'_>) -> Result<Decision, FilterError> {
            Ok(Decision::Suppress)
        }

        fn on_body(
            &self,
            _cx: &mut ResponseContext,
            _chunks: ChunkSequence,
            _next: Next<'_>,
        ) -> Result<(), FilterError> {
            Ok(())
        }
    }

    fn guessing_chain() -> Arc<FilterChain> {
        let classifier: Arc<dyn Classifier> = Arc::new(InferClassifier::new());
        let chain = ChainBuilder::default()
            .filter(GuessMimeFilter::new(Arc::new(ExtensionTable::new()), Some(classifier)))
            .build()
            .unwrap();
        Arc::new(chain)
    }

    fn context(path: &str) -> ResponseContext {
        let (mut head, ()) = Response::new(()).into_parts();
        head.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
        let settings = FilterSettings {
            guess_mime: true,
            ..FilterSettings::default()
        };
        ResponseContext::new(head, Arc::new(settings), ProcessingMarker::default(), path)
    }

    #[tokio::test]
    async fn test_deferred_headers_resolved_from_body() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(PNG)),
            Ok(Bytes::from_static(b"tail")),
        ];
        let body = Body::from_stream(futures_util::stream::iter(chunks));

        let response = filter_response(guessing_chain(), context("/blob"), body)
            .await
            .unwrap();
        assert_eq!(response.headers()[CONTENT_TYPE], "image/png");

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let mut expected = PNG.to_vec();
        expected.extend_from_slice(b"tail");
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[tokio::test]
    async fn test_empty_body_releases_headers() {
        let response = filter_response(guessing_chain(), context("/blob"), Body::empty())
            .await
            .unwrap();
        assert_eq!(response.headers()[CONTENT_TYPE], "application/octet-stream");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_withheld_headers_fail_response() {
        let chain = Arc::new(ChainBuilder::default().filter(AlwaysWithhold).build().unwrap());
        let err = filter_response(chain, context("/blob"), Body::from("data"))
            .await
            .unwrap_err();
        assert!(matches!(err, FilterError::HeadersWithheld));
    }
}
