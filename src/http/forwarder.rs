//! HTTP forwarding to a single backend.
//!
//! # Responsibilities
//! - Rewrite the request target onto the backend's URL
//! - Send it over the shared pooled client
//! - Buffer the full response so transport failures surface before the
//!   caller sees a single byte
//! - Refuse bodies over `limits.max_response_bytes` without blaming the backend

use std::error::Error as StdError;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, Request, Response, Uri};
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::http::request::{strip_hop_by_hop, UpstreamRequest};
use crate::load_balancer::{Forward, ForwardError};

/// Pooled HTTP client shared by all backends.
pub type UpstreamClient = Client<HttpConnector, Body>;

/// Build the upstream client with a bounded connect phase.
pub fn build_client(connect_timeout: Duration) -> UpstreamClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Forwarding capability for one backend URL.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    base: Url,
    client: UpstreamClient,
    max_response_bytes: usize,
}

impl HttpForwarder {
    pub fn new(base: Url, client: UpstreamClient, max_response_bytes: usize) -> Self {
        Self {
            base,
            client,
            max_response_bytes,
        }
    }

    /// Backend origin + backend path prefix + request path and query.
    fn target_uri(&self, request: &UpstreamRequest) -> Result<Uri, ForwardError> {
        let host = self
            .base
            .host_str()
            .ok_or_else(|| ForwardError::Request(format!("backend {} has no host", self.base)))?;
        let port = self
            .base
            .port_or_known_default()
            .ok_or_else(|| ForwardError::Request(format!("backend {} has no port", self.base)))?;
        let prefix = self.base.path().trim_end_matches('/');

        let target = format!(
            "{}://{}:{}{}{}",
            self.base.scheme(),
            host,
            port,
            prefix,
            request.path_and_query
        );
        Uri::try_from(target).map_err(|e| ForwardError::Request(e.to_string()))
    }

    async fn send(&self, request: UpstreamRequest) -> Result<Response<Body>, ForwardError> {
        let uri = self.target_uri(&request)?;

        let mut builder = Request::builder().method(request.method).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            *headers = request.headers;
        }
        let outbound = builder
            .body(Body::from(request.body))
            .map_err(|e| ForwardError::Request(e.to_string()))?;

        let response = self
            .client
            .request(outbound)
            .await
            .map_err(|e| ForwardError::Transport(error_chain(&e)))?;

        let (mut parts, body) = response.into_parts();
        let declared = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.max_response_bytes) {
            return Err(ForwardError::ResponseTooLarge {
                limit: self.max_response_bytes,
            });
        }

        let bytes = self.buffer(Body::new(body)).await?;
        strip_hop_by_hop(&mut parts.headers);

        Ok(Response::from_parts(parts, Body::from(bytes)))
    }

    /// Read the whole body, stopping as soon as it outgrows the limit.
    async fn buffer(&self, body: Body) -> Result<Bytes, ForwardError> {
        let mut stream = body.into_data_stream();
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ForwardError::Body(error_chain(&e)))?;
            if buf.len() + chunk.len() > self.max_response_bytes {
                return Err(ForwardError::ResponseTooLarge {
                    limit: self.max_response_bytes,
                });
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(buf))
    }
}

impl Forward for HttpForwarder {
    fn forward(&self, request: UpstreamRequest) -> BoxFuture<'_, Result<Response<Body>, ForwardError>> {
        Box::pin(self.send(request))
    }
}

/// Render an error with its full source chain.
fn error_chain(err: &dyn StdError) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::uri::PathAndQuery;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn forwarder(base: &str) -> HttpForwarder {
        HttpForwarder::new(
            Url::parse(base).unwrap(),
            build_client(Duration::from_secs(1)),
            1024,
        )
    }

    fn request(path: &'static str) -> UpstreamRequest {
        UpstreamRequest {
            path_and_query: PathAndQuery::from_static(path),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_target_uri() {
        let f = forwarder("http://127.0.0.1:3000");
        assert_eq!(
            f.target_uri(&request("/a/b?x=1")).unwrap().to_string(),
            "http://127.0.0.1:3000/a/b?x=1"
        );

        let f = forwarder("http://backend.local/api/");
        assert_eq!(
            f.target_uri(&request("/users")).unwrap().to_string(),
            "http://backend.local:80/api/users"
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_forward_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let f = forwarder(&format!("http://{}", addr));
        let err = f.forward(request("/")).await.unwrap_err();
        assert!(matches!(err, ForwardError::Transport(_)), "{:?}", err);
    }

    /// One-shot backend that writes `response` to the first connection.
    async fn canned_backend(response: &'static str) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_oversized_response_with_content_length() {
        let addr = canned_backend(
            "HTTP/1.1 200 OK\r\nContent-Length: 38\r\nConnection: close\r\n\r\nthis body is longer than sixteen bytes",
        )
        .await;
        let f = HttpForwarder::new(
            Url::parse(&format!("http://{}", addr)).unwrap(),
            build_client(Duration::from_secs(1)),
            16,
        );

        let err = f.forward(request("/")).await.unwrap_err();
        assert!(matches!(err, ForwardError::ResponseTooLarge { limit: 16 }), "{:?}", err);
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn test_oversized_response_read_to_close() {
        // No Content-Length: the limit is enforced while streaming.
        let addr = canned_backend(
            "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nthis body is longer than sixteen bytes",
        )
        .await;
        let f = HttpForwarder::new(
            Url::parse(&format!("http://{}", addr)).unwrap(),
            build_client(Duration::from_secs(1)),
            16,
        );

        let err = f.forward(request("/")).await.unwrap_err();
        assert!(matches!(err, ForwardError::ResponseTooLarge { limit: 16 }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_response_within_limit() {
        let addr = canned_backend("HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nshort").await;
        let f = HttpForwarder::new(
            Url::parse(&format!("http://{}", addr)).unwrap(),
            build_client(Duration::from_secs(1)),
            16,
        );

        let response = f.forward(request("/")).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), 16).await.unwrap();
        assert_eq!(&body[..], b"short");
    }
}
