//! Lazy pagination over list endpoints.

use log::debug;
use serde_json::map::Entry;
use serde_json::{Map, Value};

use crate::client::HttpClient;
use crate::options::RequestOptions;
use crate::{Error, Result};

/// One page of a list response.
#[derive(Debug, Clone)]
pub struct Page {
    data: Map<String, Value>,
}

impl Page {
    fn new(value: Value) -> Result<Self> {
        match value {
            Value::Object(data) => Ok(Self { data }),
            other => Err(Error::unexpected(format!(
                "list response is not a JSON object: {other}"
            ))),
        }
    }

    /// Continuation URL advertised by the service, if any.
    pub fn next(&self) -> Option<&str> {
        self.data
            .get("next")
            .and_then(Value::as_str)
            .filter(|next| !next.is_empty())
    }

    /// The raw page object.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// The named array field; empty when absent or not an array.
    pub fn items(&self, field: &str) -> &[Value] {
        self.data
            .get(field)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn into_data(self) -> Map<String, Value> {
        self.data
    }
}

/// Pager walks a paginated list endpoint one GET at a time.
///
/// Forward-only and single-use: each [`Pager::next_page`] call fetches one
/// page and remembers the continuation URL the page advertised. After the
/// first page the original query parameters are dropped since the
/// continuation URL already encodes them. A page without a continuation
/// exhausts the pager; later calls return `Ok(None)` without touching the
/// network.
#[derive(Debug)]
pub struct Pager {
    client: HttpClient,
    opts: RequestOptions,
    exhausted: bool,
}

impl Pager {
    /// Create a pager over the given descriptor.
    pub fn new(client: HttpClient, opts: RequestOptions) -> Self {
        Self {
            client,
            opts,
            exhausted: false,
        }
    }

    /// Whether the last seen page ended the listing.
    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetch the next page, or `None` once the listing has ended.
    pub async fn next_page(&mut self) -> Result<Option<Page>> {
        if self.exhausted {
            return Ok(None);
        }

        let resp = self.client.get(self.opts.clone()).await?;
        let page = Page::new(resp.data)?;

        match page.next() {
            Some(next) => {
                debug!("following continuation url: {next}");
                self.opts = self.opts.clone().with_url(next).clear_params();
            }
            None => self.exhausted = true,
        }

        Ok(Some(page))
    }

    /// Drain the remaining pages and merge them into one object.
    ///
    /// Array fields are concatenated across pages; any other field keeps
    /// the last page's non-empty value.
    pub async fn all(mut self) -> Result<Value> {
        let mut merged = Map::new();

        while let Some(page) = self.next_page().await? {
            for (key, value) in page.into_data() {
                match merged.entry(key) {
                    Entry::Occupied(mut slot) => match (slot.get_mut(), value) {
                        (Value::Array(acc), Value::Array(items)) => acc.extend(items),
                        (slot_value, value) => {
                            if !is_empty_value(&value) {
                                *slot_value = value;
                            }
                        }
                    },
                    Entry::Vacant(slot) => {
                        slot.insert(value);
                    }
                }
            }
        }

        Ok(Value::Object(merged))
    }
}

/// True for values the merge treats as saying nothing: null, empty strings,
/// empty arrays and empty objects.
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::client::ClientConfig;
    use crate::http::StaticHttpSend;

    fn list_client() -> (HttpClient, StaticHttpSend) {
        let transport = StaticHttpSend::new();
        let config = ClientConfig::new().with_base_url("https://ims.eu-de.example.com");
        let client = HttpClient::new(config, transport.clone());
        (client, transport)
    }

    fn page_of(start: usize, count: usize, next: Option<&str>) -> Value {
        let images: Vec<Value> = (start..start + count)
            .map(|id| json!({"id": id.to_string()}))
            .collect();
        let mut page = json!({"images": images, "count": 60});
        if let Some(next) = next {
            page["next"] = json!(next);
        }
        page
    }

    #[tokio::test]
    async fn test_next_page_follows_continuation_without_reapplying_params() -> Result<()> {
        let (client, transport) = list_client();
        transport.push_json(
            StatusCode::OK,
            &page_of(0, 2, Some("https://ims.eu-de.example.com/v2/images?limit=2&marker=1")),
        );
        transport.push_json(StatusCode::OK, &page_of(2, 1, None));

        let mut pager = Pager::new(
            client,
            RequestOptions::new().with_url("/v2/images").with_param("limit", 2),
        );

        let first = pager.next_page().await?.unwrap();
        assert_eq!(first.items("images").len(), 2);
        assert!(!pager.exhausted());

        let second = pager.next_page().await?.unwrap();
        assert_eq!(second.items("images").len(), 1);
        assert!(pager.exhausted());

        assert!(pager.next_page().await?.is_none());

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].uri, "https://ims.eu-de.example.com/v2/images?limit=2");
        // The continuation is requested as-is; the original params are gone.
        assert_eq!(
            sent[1].uri,
            "https://ims.eu-de.example.com/v2/images?limit=2&marker=1"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_all_concatenates_arrays_across_pages() -> Result<()> {
        let (client, transport) = list_client();
        transport.push_json(
            StatusCode::OK,
            &page_of(0, 25, Some("https://ims.eu-de.example.com/v2/images?marker=24")),
        );
        transport.push_json(
            StatusCode::OK,
            &page_of(25, 25, Some("https://ims.eu-de.example.com/v2/images?marker=49")),
        );
        transport.push_json(StatusCode::OK, &page_of(50, 10, None));

        let merged = Pager::new(client, RequestOptions::new().with_url("/v2/images"))
            .all()
            .await?;

        assert_eq!(merged["images"].as_array().map(Vec::len), Some(60));
        assert_eq!(merged["count"], json!(60));
        Ok(())
    }

    #[tokio::test]
    async fn test_all_keeps_last_non_empty_scalar() -> Result<()> {
        let (client, transport) = list_client();
        transport.push_json(
            StatusCode::OK,
            &json!({
                "images": [{"id": "a"}],
                "marker": "a",
                "next": "https://ims.eu-de.example.com/v2/images?marker=a",
            }),
        );
        transport.push_json(
            StatusCode::OK,
            &json!({"images": [{"id": "b"}], "marker": ""}),
        );

        let merged = Pager::new(client, RequestOptions::new().with_url("/v2/images"))
            .all()
            .await?;

        assert_eq!(merged["images"].as_array().map(Vec::len), Some(2));
        // The second page's empty marker does not clobber the first.
        assert_eq!(merged["marker"], json!("a"));
        Ok(())
    }

    #[tokio::test]
    async fn test_next_page_rejects_non_object_pages() {
        let (client, transport) = list_client();
        transport.push_json(StatusCode::OK, &json!(["bare", "array"]));

        let mut pager = Pager::new(client, RequestOptions::new().with_url("/v2/images"));
        let err = pager.next_page().await.unwrap_err();

        assert!(err.to_string().contains("not a JSON object"));
    }
}
