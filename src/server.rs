//! Single-route echo server.
//!
//! For every request the handler logs the observable request facets in
//! a fixed order (method, headers, principal, query) and answers with
//! a deterministic body naming the request URI. Connections are served
//! one at a time; a failed connection is logged and the accept loop
//! moves on.

use std::convert::Infallible;
use std::net::SocketAddr;

use http::header::{HeaderValue, AUTHORIZATION, CONTENT_LENGTH};
use http::{Request, Response};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Handles one request: logs its facets, then responds 200 with
/// `This is the response at <URI>` and an exact `Content-Length`.
/// Method-agnostic; the request body is never read.
pub async fn handle_request<B>(request: Request<B>) -> Result<Response<Full<Bytes>>, Infallible> {
    log_request(&request);

    let body = format!("This is the response at {}", request.uri());
    let length = HeaderValue::from(body.len());
    let mut response = Response::new(Full::new(Bytes::from(body)));
    response.headers_mut().insert(CONTENT_LENGTH, length);
    Ok(response)
}

fn log_request<B>(request: &Request<B>) {
    info!(method = %request.method(), uri = %request.uri(), "request received");
    for (name, value) in request.headers() {
        info!(header = %name, value = ?value, "request header");
    }
    if let Some(principal) = request.headers().get(AUTHORIZATION) {
        info!(principal = ?principal, "request principal");
    }
    if let Some(query) = request.uri().query() {
        info!(query, "request query");
    }
}

/// Binds `addr` and serves connections sequentially until the process
/// is terminated. Bind failures are returned; per-connection I/O
/// errors are logged and do not stop the loop.
pub async fn serve(addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "echo server listening");

    loop {
        let (stream, remote) = listener.accept().await?;
        if let Err(err) = Builder::new(TokioExecutor::new())
            .serve_connection(TokioIo::new(stream), service_fn(handle_request::<Incoming>))
            .await
        {
            error!(error = %err, %remote, "connection error");
        }
    }
}
