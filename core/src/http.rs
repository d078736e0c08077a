use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::StatusCode;

use crate::{Error, Result};

/// HttpSend is the transport collaborator of the client.
///
/// The pipeline builds a fully resolved `http::Request` and hands it over;
/// everything below that line (connections, pooling, TLS) belongs to the
/// implementation. `cloudreq-http-send-reqwest` provides the reqwest-backed
/// one.
#[async_trait::async_trait]
pub trait HttpSend: Debug + Send + Sync + 'static {
    /// Send http request and return the response.
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>>;
}

/// NoopHttpSend is a no-op implementation that always returns an error.
///
/// This is used when no transport is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHttpSend;

#[async_trait::async_trait]
impl HttpSend for NoopHttpSend {
    async fn http_send(&self, _req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        Err(Error::unexpected(
            "HTTP sending not supported: no transport configured",
        ))
    }
}

/// A snapshot of one outbound request kept by [`StaticHttpSend`].
#[derive(Debug, Clone)]
pub struct SentRequest {
    /// Request method.
    pub method: http::Method,
    /// Fully resolved request URI.
    pub uri: String,
    /// Headers as they reached the transport.
    pub headers: http::HeaderMap,
    /// Request body.
    pub body: Bytes,
}

/// StaticHttpSend replays a fixed script of responses and records every
/// outbound request.
///
/// This is useful for testing: push the responses in the order the code
/// under test will request them, then inspect [`StaticHttpSend::sent`]
/// afterwards. Clones share the script and the record, so a test can keep
/// one handle while a client owns another.
#[derive(Debug, Clone, Default)]
pub struct StaticHttpSend {
    script: Arc<Mutex<VecDeque<http::Response<Bytes>>>>,
    sent: Arc<Mutex<Vec<SentRequest>>>,
}

impl StaticHttpSend {
    /// Create an empty fixture. Sending through it before pushing a
    /// response is an error.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a prepared response.
    pub fn push_response(&self, resp: http::Response<Bytes>) {
        self.script.lock().expect("lock poisoned").push_back(resp);
    }

    /// Queue a JSON response with the given status.
    pub fn push_json(&self, status: StatusCode, body: &serde_json::Value) {
        let resp = http::Response::builder()
            .status(status)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Bytes::from(body.to_string()))
            .expect("static response must be valid");
        self.push_response(resp);
    }

    /// Requests seen so far, in send order.
    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().expect("lock poisoned").clone()
    }
}

#[async_trait::async_trait]
impl HttpSend for StaticHttpSend {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let (parts, body) = req.into_parts();
        self.sent.lock().expect("lock poisoned").push(SentRequest {
            method: parts.method,
            uri: parts.uri.to_string(),
            headers: parts.headers,
            body,
        });

        self.script
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .ok_or_else(|| Error::unexpected("no scripted response left in StaticHttpSend"))
    }
}
