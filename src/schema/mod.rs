//! Schema Registry (C3): fetches and caches per-kind/per-plugin/per-partial/
//! per-vault schema documents, single-flighted per key so concurrent
//! strippers racing the same cache miss only trigger one fetch.

use crate::error::Result;
use crate::transport::AdminApiClient;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// `None` means "server has no schema for this key" — not an error; the
/// stripper simply skips that entity (§4.3: "404 yields nil schema, nil
/// error").
pub type Schema = Option<Value>;

#[async_trait]
trait SchemaFetcher: Send + Sync {
    async fn fetch_entity_schema(&self, kind: &str) -> Result<Schema>;
    async fn fetch_plugin_schema(&self, name: &str) -> Result<Schema>;
    async fn fetch_partial_schema(&self, partial_type: &str) -> Result<Schema>;
    async fn fetch_vault_schema(&self, vault_type: &str) -> Result<Schema>;
}

fn schema_or_absent(result: Result<Value>) -> Result<Schema> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(crate::error::Error::UnexpectedStatus { status: 404, .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

struct GatewaySchemaSource {
    client: Arc<dyn AdminApiClient>,
}

#[async_trait]
impl SchemaFetcher for GatewaySchemaSource {
    async fn fetch_entity_schema(&self, kind: &str) -> Result<Schema> {
        schema_or_absent(self.client.get_one(&format!("schemas/{kind}")).await)
    }

    async fn fetch_plugin_schema(&self, name: &str) -> Result<Schema> {
        schema_or_absent(self.client.get_one(&format!("plugins/schema/{name}")).await)
    }

    async fn fetch_partial_schema(&self, partial_type: &str) -> Result<Schema> {
        schema_or_absent(
            self.client
                .get_one(&format!("partials/{partial_type}/schema"))
                .await,
        )
    }

    async fn fetch_vault_schema(&self, vault_type: &str) -> Result<Schema> {
        schema_or_absent(self.client.get_one(&format!("schemas/vaults/{vault_type}")).await)
    }
}

/// Plural entity-kind path names, as listed, to their singular Konnect
/// schema-document name (§4.3). Unlisted kinds fall back to stripping a
/// trailing `s`.
fn konnect_kind(kind: &str) -> String {
    match kind {
        "services" => "service".to_string(),
        "routes" => "route".to_string(),
        "ca_certificates" => "ca_certificate".to_string(),
        "snis" => "sni".to_string(),
        "jwt_secrets" | "jwt" => "jwt".to_string(),
        other => other.strip_suffix('s').unwrap_or(other).to_string(),
    }
}

struct KonnectSchemaSource {
    client: Arc<dyn AdminApiClient>,
}

impl KonnectSchemaSource {
    async fn fetch_json(&self, konnect_kind: &str) -> Result<Schema> {
        schema_or_absent(
            self.client
                .get_one(&format!("v1/schemas/json/{konnect_kind}"))
                .await,
        )
    }
}

#[async_trait]
impl SchemaFetcher for KonnectSchemaSource {
    async fn fetch_entity_schema(&self, kind: &str) -> Result<Schema> {
        self.fetch_json(&konnect_kind(kind)).await
    }

    async fn fetch_plugin_schema(&self, name: &str) -> Result<Schema> {
        self.fetch_json(&format!("plugins/{name}")).await
    }

    async fn fetch_partial_schema(&self, partial_type: &str) -> Result<Schema> {
        self.fetch_json(&format!("partials/{partial_type}")).await
    }

    async fn fetch_vault_schema(&self, vault_type: &str) -> Result<Schema> {
        let Some(doc) = self.fetch_json("vault").await? else {
            return Ok(None);
        };
        Ok(flatten_vault_schema(&doc, vault_type))
    }
}

/// Konnect's vault schema is a single document with `allOf`/`if`/`then`
/// branches keyed on `name.const`; this walks the branches to pull out
/// the vault-type-specific `config` sub-tree and attach it to the
/// top-level `properties` (§4.3, scenario S5).
fn flatten_vault_schema(doc: &Value, vault_type: &str) -> Option<Value> {
    let branches = doc.get("allOf")?.as_array()?;
    for branch in branches {
        let matches = branch
            .pointer("/if/properties/name/const")
            .and_then(Value::as_str)
            == Some(vault_type);
        if !matches {
            continue;
        }
        let config = branch.pointer("/then/properties/config")?.clone();
        let mut properties = doc.get("properties").cloned().unwrap_or_else(|| Value::Object(Default::default()));
        if let Value::Object(map) = &mut properties {
            map.insert("config".to_string(), config);
        }
        return Some(serde_json::json!({ "properties": properties }));
    }
    None
}

/// Single-flight cache for one schema key-space: the first `get` for a
/// given key fetches and memoizes; concurrent/later `get`s for the same
/// key await the same in-flight fetch instead of issuing another request.
struct Cache {
    cells: DashMap<String, Arc<OnceCell<Schema>>>,
}

impl Cache {
    fn new() -> Self {
        Self {
            cells: DashMap::new(),
        }
    }

    async fn get<F, Fut>(&self, key: &str, fetch: F) -> Result<Schema>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Schema>>,
    {
        let cell = self
            .cells
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        cell.get_or_try_init(fetch).await.cloned()
    }
}

pub struct SchemaRegistry {
    fetcher: Box<dyn SchemaFetcher>,
    entity: Cache,
    plugin: Cache,
    partial: Cache,
    vault: Cache,
}

impl SchemaRegistry {
    pub fn gateway(client: Arc<dyn AdminApiClient>) -> Self {
        Self::new(Box::new(GatewaySchemaSource { client }))
    }

    pub fn konnect(client: Arc<dyn AdminApiClient>) -> Self {
        Self::new(Box::new(KonnectSchemaSource { client }))
    }

    fn new(fetcher: Box<dyn SchemaFetcher>) -> Self {
        Self {
            fetcher,
            entity: Cache::new(),
            plugin: Cache::new(),
            partial: Cache::new(),
            vault: Cache::new(),
        }
    }

    pub async fn entity_schema(&self, kind: &str) -> Result<Schema> {
        let result = self.entity.get(kind, || self.fetcher.fetch_entity_schema(kind)).await;
        if matches!(result, Ok(None)) {
            debug!(kind, "no schema registered for entity kind");
        }
        result
    }

    pub async fn plugin_schema(&self, name: &str) -> Result<Schema> {
        self.plugin.get(name, || self.fetcher.fetch_plugin_schema(name)).await
    }

    pub async fn partial_schema(&self, partial_type: &str) -> Result<Schema> {
        self.partial
            .get(partial_type, || self.fetcher.fetch_partial_schema(partial_type))
            .await
    }

    pub async fn vault_schema(&self, vault_type: &str) -> Result<Schema> {
        self.vault
            .get(vault_type, || self.fetcher.fetch_vault_schema(vault_type))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn konnect_kind_remaps_known_plurals() {
        assert_eq!(konnect_kind("services"), "service");
        assert_eq!(konnect_kind("ca_certificates"), "ca_certificate");
        assert_eq!(konnect_kind("snis"), "sni");
        assert_eq!(konnect_kind("jwt_secrets"), "jwt");
        assert_eq!(konnect_kind("upstreams"), "upstream");
    }

    #[test]
    fn flattens_vault_schema_for_matching_branch() {
        let doc = json!({
            "properties": {"name": {"type": "string"}},
            "allOf": [
                {
                    "if": {"properties": {"name": {"const": "aws"}}},
                    "then": {"properties": {"config": {"properties": {"region": {"type": "string"}}}}}
                },
                {
                    "if": {"properties": {"name": {"const": "gcp"}}},
                    "then": {"properties": {"config": {"properties": {"project_id": {"type": "string"}}}}}
                }
            ]
        });
        let flattened = flatten_vault_schema(&doc, "aws").unwrap();
        assert_eq!(
            flattened.pointer("/properties/config"),
            doc.pointer("/allOf/0/then/properties/config")
        );
    }

    #[test]
    fn no_matching_branch_returns_none() {
        let doc = json!({
            "allOf": [
                {"if": {"properties": {"name": {"const": "gcp"}}}, "then": {"properties": {"config": {}}}}
            ]
        });
        assert!(flatten_vault_schema(&doc, "aws").is_none());
    }
}
