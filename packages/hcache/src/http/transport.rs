//! Transport seam between the cache engine and the network
//!
//! The engine only ever issues `GET` requests with an empty body and consumes
//! fully buffered responses. Trailing headers travel in the [`Trailers`]
//! response extension so they can be persisted with the entry.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{HeaderMap, Request, Response};

use crate::error::Result;

/// Trailing headers received after a response body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trailers(pub HeaderMap);

/// Sends a request to the origin and buffers the response.
///
/// Failures to reach the origin must be reported as transport errors
/// (`error::transport` / `error::timeout`); a response with any status code,
/// including errors, is a successful send.
pub trait HttpTransport: Send + Sync + 'static {
    fn send(&self, request: Request<Bytes>) -> BoxFuture<'_, Result<Response<Bytes>>>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    fn send(&self, request: Request<Bytes>) -> BoxFuture<'_, Result<Response<Bytes>>> {
        (**self).send(request)
    }
}
