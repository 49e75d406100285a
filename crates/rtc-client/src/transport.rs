//! The RPC client capability: `request(method, uri, headers, body) ->
//! future<response>`, with cancellation and a way to be shut down from the
//! outside.
//!
//! Nothing above this layer knows it's talking HTTP over `reqwest` — the
//! orchestration crate depends only on [`RpcTransport`], so a test harness
//! can swap in an in-process fake worker without touching a socket (see
//! `rtc-controller`'s fetcher/sender tests).

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::error::{ClientError, ClientResult};

/// HTTP methods the protocol uses. Deliberately narrower than the full verb
/// set — the controller only ever issues these three.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMethod {
    Get,
    Post,
    Delete,
}

/// One outbound request against a worker's task endpoint.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    pub method: RpcMethod,
    pub uri: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Overrides the transport's default request timeout; long-polls set
    /// this to comfortably exceed their `X-Presto-Max-Wait` header so the
    /// server-side hold isn't mistaken for a transport timeout.
    pub timeout: Option<Duration>,
}

impl RpcRequest {
    pub fn get(uri: Url) -> Self {
        Self {
            method: RpcMethod::Get,
            uri,
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn post(uri: Url, body: Vec<u8>) -> Self {
        Self {
            method: RpcMethod::Post,
            uri,
            headers: Vec::new(),
            body: Some(body),
            timeout: None,
        }
    }

    pub fn delete(uri: Url) -> Self {
        Self {
            method: RpcMethod::Delete,
            uri,
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// What came back. A non-2xx status is still `Ok` here — it's the caller's
/// job (the controller's retry classification) to decide whether
/// `status` makes the response an error.
#[derive(Debug, Clone)]
pub struct RpcResponse {
    pub status: u16,
    pub body: Bytes,
}

impl RpcResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn into_result(self) -> ClientResult<Bytes> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(ClientError::UnexpectedStatus {
                status: self.status,
                body: String::from_utf8_lossy(&self.body).into_owned(),
            })
        }
    }
}

/// The capability the controller's three loops depend on. A suspension
/// point in the scheduling model of §5: every call is a single await, no
/// thread blocks on it, and dropping the returned future cancels the
/// in-flight request (best-effort, per the long-poll cancellation
/// contract).
#[async_trait]
pub trait RpcTransport: Send + Sync + fmt::Debug {
    async fn execute(&self, request: RpcRequest) -> ClientResult<RpcResponse>;

    /// Stop accepting new work. In-flight calls made after this returns
    /// `Ok` with a [`ClientError::Rejected`] rather than attempting the
    /// network call — this is what backs the factory-wide stop switch and
    /// scenario D (rejected execution).
    fn shut_down(&self);

    fn is_shut_down(&self) -> bool;
}

/// `reqwest`-backed [`RpcTransport`].
#[derive(Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    shutdown: AtomicBool,
    default_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(default_timeout: Duration) -> ClientResult<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            shutdown: AtomicBool::new(false),
            default_timeout,
        })
    }
}

#[async_trait]
impl RpcTransport for ReqwestTransport {
    async fn execute(&self, request: RpcRequest) -> ClientResult<RpcResponse> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(ClientError::Rejected);
        }

        let method = match request.method {
            RpcMethod::Get => reqwest::Method::GET,
            RpcMethod::Post => reqwest::Method::POST,
            RpcMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, request.uri.clone())
            .timeout(request.timeout.unwrap_or(self.default_timeout));

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let uri = request.uri.to_string();
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout {
                    uri: uri.clone(),
                    elapsed_millis: request
                        .timeout
                        .unwrap_or(self.default_timeout)
                        .as_millis() as u64,
                }
            } else {
                ClientError::Http(e)
            }
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(RpcResponse { status, body })
    }

    fn shut_down(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_rejects_subsequent_requests() {
        let transport = ReqwestTransport::new(Duration::from_secs(1)).unwrap();
        transport.shut_down();
        assert!(transport.is_shut_down());

        let uri = Url::parse("http://127.0.0.1:1/task/1").unwrap();
        let result = transport.execute(RpcRequest::get(uri)).await;
        assert!(matches!(result, Err(ClientError::Rejected)));
    }

    #[tokio::test]
    async fn get_against_mock_server_round_trips_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/task/1/status")
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(1)).unwrap();
        let uri = Url::parse(&format!("{}/task/1/status", server.url())).unwrap();
        let response = transport.execute(RpcRequest::get(uri)).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body.as_ref(), br#"{"ok":true}"#.as_slice());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_2xx_status_is_still_a_response_not_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/task/1")
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(1)).unwrap();
        let uri = Url::parse(&format!("{}/task/1", server.url())).unwrap();
        let response = transport.execute(RpcRequest::delete(uri)).await.unwrap();

        assert_eq!(response.status, 503);
        assert!(!response.is_success());
        assert!(response.into_result().is_err());
    }
}
