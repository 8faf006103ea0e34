//! Default transport built on the hyper-util pooled client

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::{Connect, HttpConnector};
use hyper_util::rt::TokioExecutor;

use super::transport::{HttpTransport, Trailers};
use crate::error::{self, Result};

/// Connector behind [`HyperTransport::new`]: rustls over TCP with the
/// `rustls` feature, plain TCP without it
#[cfg(feature = "rustls")]
pub type DefaultConnector = hyper_rustls::HttpsConnector<HttpConnector>;
#[cfg(not(feature = "rustls"))]
pub type DefaultConnector = HttpConnector;

/// Pooled HTTP/1.1 transport.
///
/// Any connector can be supplied through [`HyperTransport::with_connector`]
/// or a prebuilt client through [`HyperTransport::with_client`].
#[derive(Debug, Clone)]
pub struct HyperTransport<C = DefaultConnector> {
    client: Client<C, Full<Bytes>>,
}

impl HyperTransport<DefaultConnector> {
    /// Transport for `http` and, with the `rustls` feature, `https` resources
    pub fn new() -> Result<Self> {
        Ok(Self::with_connector(default_connector()?))
    }
}

impl HyperTransport<HttpConnector> {
    /// Plain-HTTP transport
    #[must_use]
    pub fn plain() -> Self {
        Self::with_connector(tcp_connector())
    }
}

impl<C> HyperTransport<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    pub fn with_connector(connector: C) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build(connector),
        }
    }
}

impl<C> HyperTransport<C> {
    pub fn with_client(client: Client<C, Full<Bytes>>) -> Self {
        Self { client }
    }
}

fn tcp_connector() -> HttpConnector {
    let mut connector = HttpConnector::new();
    connector.set_nodelay(true);
    connector
}

#[cfg(feature = "rustls")]
fn default_connector() -> Result<DefaultConnector> {
    let provider = std::sync::Arc::new(rustls::crypto::ring::default_provider());
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let tls = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(error::configuration)?
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut tcp = tcp_connector();
    tcp.enforce_http(false);
    Ok(hyper_rustls::HttpsConnector::from((tcp, tls)))
}

#[cfg(not(feature = "rustls"))]
fn default_connector() -> Result<DefaultConnector> {
    Ok(tcp_connector())
}

impl<C> HttpTransport for HyperTransport<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    fn send(&self, request: Request<Bytes>) -> BoxFuture<'_, Result<Response<Bytes>>> {
        let request = request.map(Full::new);
        Box::pin(async move {
            let response = self.client.request(request).await.map_err(error::transport)?;
            let (parts, body) = response.into_parts();
            let collected = body.collect().await.map_err(error::transport)?;
            let trailers = collected.trailers().cloned();

            let mut response = Response::from_parts(parts, collected.to_bytes());
            if let Some(trailers) = trailers {
                response.extensions_mut().insert(Trailers(trailers));
            }

            tracing::trace!(
                target: "hcache::http::hyper_transport",
                status = %response.status(),
                body_len = response.body().len(),
                "Received response"
            );
            Ok(response)
        })
    }
}
