//! HTTP transport capability consumed by the probe.
//!
//! The seam exists so tests can substitute canned outcomes for the
//! hyper client: a send that fails models connection-level errors, a
//! response whose body future fails models a broken read.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use http::header::CONTENT_LENGTH;
use http::Request;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

/// Transport-level failures. Connection errors (DNS, refused,
/// timeout) surface as [`TransportError::Connect`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("body read failed: {0}")]
    Read(String),
    #[error("invalid request: {0}")]
    Request(#[from] http::Error),
}

/// A response whose body has not been consumed yet. The body read is a
/// separate fallible step so the caller can instrument it on its own.
pub struct TransportResponse {
    status: u16,
    content_length: Option<u64>,
    body: BoxFuture<'static, Result<String, TransportError>>,
}

impl TransportResponse {
    pub fn new(
        status: u16,
        content_length: Option<u64>,
        body: BoxFuture<'static, Result<String, TransportError>>,
    ) -> Self {
        Self {
            status,
            content_length,
            body,
        }
    }

    /// Numeric status code of the response.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Declared `Content-Length`, if the response carried one.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Reads the body fully into a string.
    pub async fn read_body(self) -> Result<String, TransportError> {
        self.body.await
    }
}

/// Capability to issue one HTTP request and obtain its response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: Request<Full<Bytes>>)
        -> Result<TransportResponse, TransportError>;
}

/// hyper-backed transport used by the probe binary.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HyperTransport {
    pub fn new() -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for HyperTransport {
    async fn send(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .request(request)
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;

        let status = response.status().as_u16();
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());

        let body = response.into_body();
        let read = async move {
            let collected = body
                .collect()
                .await
                .map_err(|err| TransportError::Read(err.to_string()))?;
            Ok(String::from_utf8_lossy(&collected.to_bytes()).into_owned())
        }
        .boxed();

        Ok(TransportResponse::new(status, content_length, read))
    }
}
