// ABOUTME: Minimal HTTP/1 client used by the cluster API and telemetry clients.
// ABOUTME: One connection per request over a plain TCP stream.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("invalid endpoint {0}: only http:// endpoints are supported")]
    InvalidEndpoint(String),

    #[error("failed to connect to {authority}: {message}")]
    Connect { authority: String, message: String },

    #[error("HTTP handshake failed: {0}")]
    Handshake(String),

    #[error("failed to build request: {0}")]
    Build(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to read response: {0}")]
    Body(String),
}

/// A buffered response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub body: Bytes,
}

/// A plain-HTTP endpoint identified by its `host:port` authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    authority: String,
}

impl Endpoint {
    /// Parse `http://host:port[/]`. TLS endpoints are rejected; the node-local
    /// proxies this crate talks to are plain HTTP.
    pub fn parse(url: &str) -> Result<Self, HttpError> {
        let authority = url
            .strip_prefix("http://")
            .ok_or_else(|| HttpError::InvalidEndpoint(url.to_string()))?
            .trim_end_matches('/');

        if authority.is_empty() || authority.contains('/') {
            return Err(HttpError::InvalidEndpoint(url.to_string()));
        }

        Ok(Self {
            authority: authority.to_string(),
        })
    }

    pub fn from_host_port(host: &str, port: u16) -> Self {
        Self {
            authority: format!("{}:{}", host, port),
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Send a request and buffer the whole response body.
    pub async fn send(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Response, HttpError> {
        let stream = TcpStream::connect(&self.authority)
            .await
            .map_err(|e| HttpError::Connect {
                authority: self.authority.clone(),
                message: e.to_string(),
            })?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| HttpError::Handshake(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::warn!("http connection error: {}", e);
            }
        });

        let mut builder = hyper::Request::builder()
            .method(method)
            .uri(path_and_query)
            .header("Host", &self.authority)
            .header("Accept", "application/json");
        if body.is_some() {
            builder = builder.header("Content-Type", "application/json");
        }

        let req = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| HttpError::Build(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| HttpError::Request(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| HttpError::Body(e.to_string()))?
            .to_bytes();

        Ok(Response { status, body })
    }
}
