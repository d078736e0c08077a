//! HTTP client driving request descriptors through the handler chain.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use http::{header, HeaderMap, Method, StatusCode};
use log::debug;
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::chain::{Handler, HandlerChain, Stage};
use crate::headers;
use crate::http::HttpSend;
use crate::options::{NormalizedRequest, RequestOptions};
use crate::utils::truncate_token;
use crate::{Error, Result};

/// Base configuration an [`HttpClient`] applies to every call.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Base URL relative resource URLs are joined against.
    pub base_url: Option<String>,
    /// Headers merged into every call before the chain runs.
    pub headers: HeaderMap,
}

impl ClientConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the headers merged into every call.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Status, headers and parsed payload of a successful call.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Response status, always a success code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Parsed JSON payload; `{}` when the body was empty or not JSON.
    pub data: Value,
}

impl HttpResponse {
    /// A header value as text; `None` when absent or not valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// HttpClient drives a request descriptor through merge, chain, URL
/// resolution and the transport, in that order.
///
/// Children created with [`HttpClient::child`] share the parent's chain and
/// transport and override only the base configuration, so one signing or
/// token handler covers a whole client tree. Chain writes happen at setup
/// time; the request path takes the read lock only long enough to apply.
#[derive(Clone)]
pub struct HttpClient {
    config: ClientConfig,
    chain: Arc<RwLock<HandlerChain>>,
    transport: Arc<dyn HttpSend>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .finish()
    }
}

impl HttpClient {
    /// Create a client over the given transport.
    pub fn new(config: ClientConfig, transport: impl HttpSend) -> Self {
        Self {
            config,
            chain: Arc::new(RwLock::new(HandlerChain::new())),
            transport: Arc::new(transport),
        }
    }

    /// Derive a scoped client sharing this client's chain and transport.
    ///
    /// Fields set on `config` override the parent's; unset fields are
    /// inherited.
    pub fn child(&self, config: ClientConfig) -> Self {
        let config = ClientConfig {
            base_url: config.base_url.or_else(|| self.config.base_url.clone()),
            headers: if config.headers.is_empty() {
                self.config.headers.clone()
            } else {
                config.headers
            },
        };

        Self {
            config,
            chain: Arc::clone(&self.chain),
            transport: Arc::clone(&self.transport),
        }
    }

    /// The configured base URL, if any.
    pub fn base_url(&self) -> Option<&str> {
        self.config.base_url.as_deref()
    }

    /// Configure one of the single-assignment chain slots.
    pub fn configure(&self, stage: Stage, handler: Handler) -> Result<()> {
        self.chain.write().expect("lock poisoned").set(stage, handler)
    }

    /// Append a handler to the middleware list.
    pub fn push_middleware(&self, handler: Handler) {
        self.chain
            .write()
            .expect("lock poisoned")
            .push_middleware(handler)
    }

    /// Send a GET request.
    pub async fn get(&self, opts: RequestOptions) -> Result<HttpResponse> {
        self.send(opts.with_method(Method::GET)).await
    }

    /// Send a POST request.
    pub async fn post(&self, opts: RequestOptions) -> Result<HttpResponse> {
        self.send(opts.with_method(Method::POST)).await
    }

    /// Send a PUT request.
    pub async fn put(&self, opts: RequestOptions) -> Result<HttpResponse> {
        self.send(opts.with_method(Method::PUT)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, opts: RequestOptions) -> Result<HttpResponse> {
        self.send(opts.with_method(Method::DELETE)).await
    }

    /// Send a HEAD request.
    pub async fn head(&self, opts: RequestOptions) -> Result<HttpResponse> {
        self.send(opts.with_method(Method::HEAD)).await
    }

    /// Send a request exactly as described by `opts`.
    ///
    /// The descriptor must already carry its method; the verb helpers set it
    /// for the common cases. Any failure before the transport aborts the call
    /// without network activity, and a non-success status never retries.
    pub async fn send(&self, opts: RequestOptions) -> Result<HttpResponse> {
        let one_shot = opts.one_shot();
        let schema = opts.response_schema().cloned();

        let mut req = opts.normalize()?;
        req.headers = headers::merge(&self.config.headers, &req.headers);
        if req.base_url.is_none() {
            req.base_url = self.config.base_url.clone();
        }

        let req = {
            let chain = self.chain.read().expect("lock poisoned");
            chain.apply(req, one_shot.as_ref())?
        };

        let url = req.resolved_url()?;
        debug!("sending {} {url}", req.method);

        let mut http_req = http::Request::builder()
            .method(req.method.clone())
            .uri(&url)
            .body(req.body.clone())?;
        *http_req.headers_mut() = req.headers.clone();

        let resp = self.transport.http_send(http_req).await?;
        let (parts, body) = resp.into_parts();

        if !parts.status.is_success() {
            return Err(error_from_response(&req, &url, parts.status, &body));
        }

        let data = parse_json_body(&parts.headers, &body)?;
        if let Some(schema) = &schema {
            validate_schema(schema, &data)?;
        }

        Ok(HttpResponse {
            status: parts.status,
            headers: parts.headers,
            data,
        })
    }
}

// Headers whose values may carry tokens; dumps truncate them.
static SENSITIVE_HEADERS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| HashSet::from(["authorization", "x-auth-token", "x-subject-token"]));

/// Render the request for an error message, with bearer-like header values
/// truncated so the dump can be logged without leaking credentials.
fn sanitized_request_dump(req: &NormalizedRequest, url: &str) -> String {
    let mut dump = format!("{} {url}", req.method);
    for (name, value) in req.headers.iter() {
        let value = value.to_str().unwrap_or("<opaque>");
        let shown = if SENSITIVE_HEADERS.contains(name.as_str()) {
            truncate_token(value)
        } else {
            value.to_string()
        };
        dump.push_str(&format!("\n  {name}: {shown}"));
    }
    dump
}

fn error_from_response(
    req: &NormalizedRequest,
    url: &str,
    status: StatusCode,
    body: &Bytes,
) -> Error {
    let reason = status.canonical_reason().unwrap_or("Unknown");
    let body_text = String::from_utf8_lossy(body);

    Error::http(
        status,
        format!(
            "HTTP error received. {} {reason}: {body_text}\n{}",
            status.as_u16(),
            sanitized_request_dump(req, url)
        ),
    )
}

/// Parse a success body as JSON when the content type says so; any other
/// content type yields an empty object.
fn parse_json_body(headers: &HeaderMap, body: &Bytes) -> Result<Value> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("json"))
        .unwrap_or(false);

    if !is_json || body.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }

    serde_json::from_slice(body)
        .map_err(|err| Error::unexpected(format!("invalid JSON in response body: {err}")))
}

/// Check a success payload against the declared response schema.
fn validate_schema(schema: &Value, data: &Value) -> Result<()> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|err| Error::config_invalid(format!("invalid response schema: {err}")))?;

    if let Err(err) = validator.validate(data) {
        return Err(Error::schema_invalid(format!(
            "response body failed schema validation: {err}"
        )));
    }

    Ok(())
}
