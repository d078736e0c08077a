//! Request descriptors and their fully specified normalized form.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method};
use serde_json::Value;

use crate::chain::Handler;
use crate::headers::{self, Scalar};
use crate::{Error, Result};

/// A loosely specified description of one call.
///
/// Everything is optional at assembly time; [`RequestOptions::normalize`]
/// checks the invariants (method and URL present) and produces the
/// [`NormalizedRequest`] the pipeline works on. Descriptors that fail
/// normalization never reach the transport.
#[derive(Clone, Default)]
pub struct RequestOptions {
    method: Option<Method>,
    url: Option<String>,
    base_url: Option<String>,
    headers: Vec<(String, Option<Scalar>)>,
    params: Vec<(String, Option<Scalar>)>,
    json: Option<Value>,
    handler: Option<Handler>,
    response_schema: Option<Value>,
}

impl RequestOptions {
    /// Create an empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the HTTP method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the resource URL. May be absolute or relative to the base URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the base URL the resource URL is joined against.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Add a header.
    pub fn with_header(self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.with_header_opt(name, Some(value))
    }

    /// Add a header that may be unset; `None` values are dropped at
    /// normalization.
    pub fn with_header_opt(
        mut self,
        name: impl Into<String>,
        value: Option<impl Into<Scalar>>,
    ) -> Self {
        self.headers.push((name.into(), value.map(Into::into)));
        self
    }

    /// Add a query parameter.
    pub fn with_param(self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.with_param_opt(name, Some(value))
    }

    /// Add a query parameter that may be unset; `None` values are dropped
    /// at normalization.
    pub fn with_param_opt(
        mut self,
        name: impl Into<String>,
        value: Option<impl Into<Scalar>>,
    ) -> Self {
        self.params.push((name.into(), value.map(Into::into)));
        self
    }

    /// Drop all query parameters accumulated so far.
    pub fn clear_params(mut self) -> Self {
        self.params.clear();
        self
    }

    /// Set the JSON body.
    pub fn with_json(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }

    /// Set the per-call handler, applied once between the common-header
    /// stage and the middleware list.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(NormalizedRequest) -> Result<NormalizedRequest> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Declare a JSON Schema the response body must satisfy.
    pub fn with_response_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// The per-call handler, if any.
    pub fn one_shot(&self) -> Option<Handler> {
        self.handler.clone()
    }

    /// The declared response schema, if any.
    pub fn response_schema(&self) -> Option<&Value> {
        self.response_schema.as_ref()
    }

    /// Validate the descriptor and derive the fully specified request.
    ///
    /// Fails fast when the method or URL is missing. Query parameters with
    /// unset values are dropped and the rest stringified; the JSON body is
    /// serialized here, once. Normalizing the same descriptor twice yields
    /// the same result.
    pub fn normalize(&self) -> Result<NormalizedRequest> {
        let Some(method) = self.method.clone() else {
            return Err(Error::request_invalid(format!(
                "Request without Method: {self:?}"
            )));
        };
        let url = match self.url.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => {
                return Err(Error::request_invalid(format!(
                    "Request without URL: {self:?}"
                )))
            }
        };

        let headers = headers::from_pairs(
            self.headers
                .iter()
                .map(|(name, value)| (name.as_str(), value.clone())),
        )?;

        let query = self
            .params
            .iter()
            .filter_map(|(name, value)| {
                value.as_ref().map(|v| (name.clone(), v.to_string()))
            })
            .collect();

        let body = match &self.json {
            Some(v) => Bytes::from(serde_json::to_vec(v)?),
            None => Bytes::new(),
        };

        Ok(NormalizedRequest {
            method,
            url,
            base_url: self.base_url.clone(),
            headers,
            query,
            body,
        })
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Header values may carry tokens; only names go into the dump.
        f.debug_struct("RequestOptions")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("base_url", &self.base_url)
            .field(
                "headers",
                &self.headers.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .field("params", &self.params)
            .field("json", &self.json.is_some())
            .field("handler", &self.handler.is_some())
            .field("response_schema", &self.response_schema.is_some())
            .finish()
    }
}

/// A fully specified request, produced by [`RequestOptions::normalize`]
/// and passed through the handler chain on its way to the transport.
///
/// Constructed fresh per call and never shared across calls; handlers
/// receive one by value and return the next version.
#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    /// HTTP method.
    pub method: Method,
    /// Resource URL, absolute or relative to `base_url`.
    pub url: String,
    /// Base URL joined with relative resource URLs.
    pub base_url: Option<String>,
    /// Merged headers.
    pub headers: HeaderMap,
    /// Query parameters, stringified, in insertion order.
    pub query: Vec<(String, String)>,
    /// Encoded body; empty when the call has none.
    pub body: Bytes,
}

impl NormalizedRequest {
    /// Serialize the query parameters in insertion order.
    pub fn query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (name, value) in &self.query {
            serializer.append_pair(name, value);
        }
        serializer.finish()
    }

    /// Resolve the absolute URL this request will be sent to.
    ///
    /// A relative URL is joined with the base URL; the serialized query
    /// string is appended. The signer and the send path both call this, so
    /// the signed URL and the sent URL cannot diverge.
    pub fn resolved_url(&self) -> Result<String> {
        let mut url = if is_absolute_url(&self.url) {
            self.url.clone()
        } else {
            let base = match self.base_url.as_deref() {
                Some(base) if !base.is_empty() => base,
                _ => {
                    return Err(Error::request_invalid(format!(
                        "relative url without a base URL: {}",
                        self.url
                    )))
                }
            };
            join_url(base, &self.url)
        };

        let query = self.query_string();
        if !query.is_empty() {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query);
        }
        Ok(url)
    }
}

/// True when the URL already names its scheme and host.
pub fn is_absolute_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Join a base URL and a path with exactly one separating slash.
///
/// Trailing slashes on the base and surrounding slashes on the path are
/// normalized away, so `("https://h/base/", "/p/")` and
/// `("https://h/base", "p")` resolve identically.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_normalize_requires_method() {
        let err = RequestOptions::new()
            .with_url("/v3/projects")
            .normalize()
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RequestInvalid);
        assert!(err.to_string().contains("Request without Method"));
    }

    #[test]
    fn test_normalize_requires_url() {
        let err = RequestOptions::new()
            .with_method(Method::GET)
            .normalize()
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RequestInvalid);
        assert!(err.to_string().contains("Request without URL"));
    }

    #[test]
    fn test_normalize_drops_unset_params_and_stringifies() {
        let req = RequestOptions::new()
            .with_method(Method::GET)
            .with_url("/v1/servers")
            .with_param("limit", 25)
            .with_param_opt("marker", None::<Scalar>)
            .with_param("verbose", true)
            .normalize()
            .unwrap();

        assert_eq!(
            req.query,
            vec![
                ("limit".to_string(), "25".to_string()),
                ("verbose".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_normalize_serializes_json_eagerly_and_idempotently() {
        let opts = RequestOptions::new()
            .with_method(Method::POST)
            .with_url("/v1/cloudservers")
            .with_json(json!({"server": {"name": "test"}}));

        let first = opts.normalize().unwrap();
        let second = opts.normalize().unwrap();

        assert_eq!(first.body, Bytes::from(r#"{"server":{"name":"test"}}"#));
        assert_eq!(first.body, second.body);
        assert_eq!(first.query, second.query);
    }

    #[test]
    fn test_join_url_equivalence() {
        assert_eq!(
            join_url("https://host/base/", "/path/"),
            join_url("https://host/base", "path")
        );
        assert_eq!(join_url("https://host/base", "path"), "https://host/base/path");
    }

    #[test]
    fn test_resolved_url_joins_and_appends_query() {
        let req = RequestOptions::new()
            .with_method(Method::GET)
            .with_url("/v3/projects")
            .with_base_url("https://iam.eu-de.otc.t-systems.com/")
            .with_param("name", "eu-de_test")
            .normalize()
            .unwrap();

        assert_eq!(
            req.resolved_url().unwrap(),
            "https://iam.eu-de.otc.t-systems.com/v3/projects?name=eu-de_test"
        );
    }

    #[test]
    fn test_resolved_url_keeps_absolute_urls() {
        let req = RequestOptions::new()
            .with_method(Method::GET)
            .with_url("https://image.eu-de.example.com/v2/images?marker=abc")
            .with_base_url("https://ignored.example.com")
            .with_param("limit", 25)
            .normalize()
            .unwrap();

        assert_eq!(
            req.resolved_url().unwrap(),
            "https://image.eu-de.example.com/v2/images?marker=abc&limit=25"
        );
    }

    #[test]
    fn test_resolved_url_requires_base_for_relative() {
        let req = RequestOptions::new()
            .with_method(Method::GET)
            .with_url("/v3/projects")
            .normalize()
            .unwrap();

        let err = req.resolved_url().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestInvalid);
    }
}
