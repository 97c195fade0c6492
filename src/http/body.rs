//! Filtered response body.
//!
//! # Responsibilities
//! - Replay chunks the chain forwarded while headers were deferred
//! - Run every later data frame through the body stage of the chain
//! - Signal end-of-body to the chain exactly once
//! - Pass trailers through untouched

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use axum::body::{Body, HttpBody};
use axum::http::HeaderMap;
use bytes::Bytes;
use hyper::body::{Frame, SizeHint};

use crate::filter::{ChunkSequence, FilterChain, ResponseContext};

/// Response body driven through the filter chain frame by frame.
pub struct FilteredBody {
    inner: Body,
    chain: Arc<FilterChain>,
    response: ResponseContext,
    queued: VecDeque<Bytes>,
    trailers: Option<HeaderMap>,
    inner_done: bool,
    end_sent: bool,
}

impl FilteredBody {
    /// `forwarded` holds what the chain already released; `finished` is set
    /// when the end-of-body marker has been through the chain.
    pub fn new(
        inner: Body,
        chain: Arc<FilterChain>,
        response: ResponseContext,
        forwarded: ChunkSequence,
        trailers: Option<HeaderMap>,
        finished: bool,
    ) -> Self {
        Self {
            inner,
            chain,
            response,
            queued: forwarded.into_chunks().into(),
            trailers,
            inner_done: finished,
            end_sent: finished,
        }
    }

    fn run_chain(&mut self, chunks: ChunkSequence) -> Result<(), axum::Error> {
        if chunks.is_last() {
            self.end_sent = true;
        }
        let forwarded = self
            .chain
            .send_body(&mut self.response, chunks)
            .map_err(|e| {
                tracing::error!(
                    request_id = %self.response.request_id(),
                    error = %e,
                    "Response filter failed mid-body"
                );
                axum::Error::new(e)
            })?;
        self.queued.extend(forwarded.into_chunks());
        Ok(())
    }
}

impl HttpBody for FilteredBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        loop {
            if let Some(chunk) = this.queued.pop_front() {
                if chunk.is_empty() {
                    continue;
                }
                return Poll::Ready(Some(Ok(Frame::data(chunk))));
            }

            if this.inner_done {
                if !this.end_sent {
                    if let Err(e) = this.run_chain(ChunkSequence::end()) {
                        return Poll::Ready(Some(Err(e)));
                    }
                    continue;
                }
                return Poll::Ready(this.trailers.take().map(|t| Ok(Frame::trailers(t))));
            }

            match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => {
                        let last = this.inner.is_end_stream();
                        this.inner_done = last;
                        let chunks = ChunkSequence::new(vec![data]).finished(last);
                        if let Err(e) = this.run_chain(chunks) {
                            return Poll::Ready(Some(Err(e)));
                        }
                    }
                    Err(frame) => {
                        if let Ok(trailers) = frame.into_trailers() {
                            this.trailers = Some(trailers);
                        }
                        this.inner_done = true;
                    }
                },
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => this.inner_done = true,
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.queued.is_empty() && self.inner_done && self.end_sent && self.trailers.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        // Filters never change body bytes.
        let queued: u64 = self.queued.iter().map(|b| b.len() as u64).sum();
        let inner = if self.inner_done {
            SizeHint::with_exact(0)
        } else {
            self.inner.size_hint()
        };

        let mut hint = SizeHint::new();
        hint.set_lower(inner.lower() + queued);
        if let Some(upper) = inner.upper() {
            hint.set_upper(upper + queued);
        }
        hint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{ChainBuilder, FilterSettings, ProcessingMarker};
    use axum::http::Response;
    use http_body_util::BodyExt;

    fn released_context(chain: &FilterChain) -> ResponseContext {
        let (head, ()) = Response::new(()).into_parts();
        let mut cx = ResponseContext::new(
            head,
            Arc::new(FilterSettings::default()),
            ProcessingMarker::default(),
            "/",
        );
        chain.send_headers(&mut cx).unwrap();
        cx
    }

    #[tokio::test]
    async fn test_replays_forwarded_then_streams_rest() {
        let chain = Arc::new(ChainBuilder::default().build().unwrap());
        let cx = released_context(&chain);

        let rest: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"second")),
            Ok(Bytes::from_static(b"third")),
        ];
        let inner = Body::from_stream(futures_util::stream::iter(rest));
        let body = FilteredBody::new(
            inner,
            chain,
            cx,
            ChunkSequence::new(vec![Bytes::from_static(b"first")]),
            None,
            false,
        );

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"firstsecondthird");
    }

    #[tokio::test]
    async fn test_finished_body_yields_only_forwarded() {
        let chain = Arc::new(ChainBuilder::default().build().unwrap());
        let cx = released_context(&chain);

        let body = FilteredBody::new(
            Body::empty(),
            chain,
            cx,
            ChunkSequence::new(vec![Bytes::from_static(b"all")]).finished(true),
            None,
            true,
        );
        assert_eq!(body.size_hint().exact(), Some(3));

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"all");
    }
}
