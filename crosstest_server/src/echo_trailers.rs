//
// Copyright 2026 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A layer that appends handler-provided metadata to the trailers of
//! successful responses.
//!
//! Generated tonic services only let handlers choose trailers for failed
//! calls. A handler that wants trailers on success stores them as a
//! [`PendingTrailers`] response extension, and [`EchoTrailersService`]
//! merges them into the final trailers frame.

use std::{
    future::Future,
    pin::Pin,
    task::{ready, Context, Poll},
};

use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};
use pin_project::pin_project;

/// Trailers to append once the response body ends.
#[derive(Clone, Debug, Default)]
pub struct PendingTrailers(pub HeaderMap);

#[derive(Clone, Copy, Debug, Default)]
pub struct EchoTrailersLayer;

impl<S> tower::Layer<S> for EchoTrailersLayer {
    type Service = EchoTrailersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        EchoTrailersService { inner }
    }
}

#[derive(Clone, Debug)]
pub struct EchoTrailersService<S> {
    inner: S,
}

impl<S, T, B> tower::Service<http::Request<T>> for EchoTrailersService<S>
where
    S: tower::Service<http::Request<T>, Response = http::Response<B>> + Clone + Send + 'static,
    S::Future: Send,
    T: Send + 'static,
{
    type Response = http::Response<EchoTrailersBody<B>>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: http::Request<T>) -> Self::Future {
        // `poll_ready` was called on `self.inner`, not on the clone.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let mut response = inner.call(request).await?;
            let pending = response
                .extensions_mut()
                .remove::<PendingTrailers>()
                .map(|PendingTrailers(trailers)| trailers)
                .filter(|trailers| !trailers.is_empty());
            Ok(response.map(|body| EchoTrailersBody { inner: body, pending }))
        })
    }
}

#[pin_project]
#[derive(Debug)]
pub struct EchoTrailersBody<B> {
    #[pin]
    inner: B,
    pending: Option<HeaderMap>,
}

impl<B: Body> Body for EchoTrailersBody<B> {
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        match ready!(this.inner.poll_frame(cx)) {
            Some(Ok(mut frame)) => {
                if let Some(trailers) = frame.trailers_mut() {
                    if let Some(pending) = this.pending.take() {
                        append(trailers, pending);
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            // The inner body ended without trailers of its own.
            None => Poll::Ready(this.pending.take().map(|pending| Ok(Frame::trailers(pending)))),
            other => Poll::Ready(other),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.pending.is_none() && self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

fn append(trailers: &mut HeaderMap, pending: HeaderMap) {
    let mut key = None;
    for (name, value) in pending {
        // Repeated values of a key come with `None` names.
        if name.is_some() {
            key = name;
        }
        if let Some(key) = &key {
            trailers.append(key.clone(), value);
        }
    }
}
