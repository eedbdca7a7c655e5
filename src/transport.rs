//! The admin API as seen by this crate: paginated listing and single-
//! resource fetch, abstracted behind a trait so the dumper and schema
//! registry's orchestration logic can be driven by an in-memory fake in
//! tests instead of a real HTTP stack (§4.5 — "the dumper owns only the
//! orchestration, not the wire format").

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;

/// One page of a tag-filtered, cursor-paginated listing.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub data: Vec<Value>,
    /// Opaque continuation token; `None` signals the last page.
    pub next_offset: Option<String>,
}

pub const PAGE_SIZE: usize = 1000;

#[async_trait]
pub trait AdminApiClient: Send + Sync {
    /// Lists one page of `path` (e.g. `"services"`), filtered to entities
    /// carrying every tag in `tags` (match-all), continuing from
    /// `offset` if given.
    async fn list_page(&self, path: &str, tags: &[String], offset: Option<&str>) -> Result<Page>;

    /// Fetches a single resource (schema documents, a consumer group's
    /// detail view, per-upstream targets). Non-2xx responses surface as
    /// `Error::UnexpectedStatus`/`Error::Transport` for the caller to
    /// classify; this method never silently swallows errors.
    async fn get_one(&self, path: &str) -> Result<Value>;
}

/// `reqwest`-backed production transport. Holds the client and the base
/// URL every request is resolved against — for Konnect, callers pass a
/// base URL that already has the control-plane id interpolated in.
pub struct HttpAdminApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAdminApiClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

#[async_trait]
impl AdminApiClient for HttpAdminApiClient {
    async fn list_page(&self, path: &str, tags: &[String], offset: Option<&str>) -> Result<Page> {
        let mut req = self
            .client
            .get(self.url(path))
            .query(&[("size", PAGE_SIZE.to_string())]);
        if !tags.is_empty() {
            req = req.query(&[("tags", tags.join(",")), ("match_all_tags", "true".into())]);
        }
        if let Some(offset) = offset {
            req = req.query(&[("offset", offset)]);
        }
        let resp = req.send().await.map_err(|e| Error::transport(path, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::UnexpectedStatus {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        let body: Value = resp.json().await.map_err(|e| Error::transport(path, e))?;
        let data = body
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let next_offset = body
            .get("offset")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Page { data, next_offset })
    }

    async fn get_one(&self, path: &str) -> Result<Value> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| Error::transport(path, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::UnexpectedStatus {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        resp.json().await.map_err(|e| Error::transport(path, e))
    }
}
