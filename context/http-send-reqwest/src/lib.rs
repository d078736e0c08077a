use async_trait::async_trait;
use bytes::Bytes;
use cloudreq_core::{Error, HttpSend, Result};
use http_body_util::BodyExt;
use reqwest::{Client, Request};

#[derive(Debug, Default)]
pub struct ReqwestHttpSend {
    client: Client,
}

impl ReqwestHttpSend {
    /// Create a new ReqwestHttpSend with a reqwest::Client.
    ///
    /// Use this to control timeouts, pooling or TLS settings; the default
    /// client is fine otherwise.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpSend for ReqwestHttpSend {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let req = Request::try_from(req).map_err(request_failed)?;
        let resp: http::Response<_> = self
            .client
            .execute(req)
            .await
            .map_err(request_failed)?
            .into();

        let (parts, body) = resp.into_parts();
        let bs = BodyExt::collect(body)
            .await
            .map(|buf| buf.to_bytes())
            .map_err(request_failed)?;
        Ok(http::Response::from_parts(parts, bs))
    }
}

fn request_failed(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::timeout(format!("http request timed out: {err}")).with_source(err)
    } else {
        Error::unexpected(format!("http request failed: {err}")).with_source(err)
    }
}
