//! Top-level orchestration tying the pipeline's stages together: dump the
//! remote admin API, build the typed indexed store, then strip each
//! schema-backed entity's config down to its non-default fields (§1's data
//! flow: C5 → raw-state bag → C6 → C1 → C4 (uses C3) → normalized snapshot).

use crate::build::Builder;
use crate::dump::{Dumper, DumperConfig};
use crate::error::Result;
use crate::schema::SchemaRegistry;
use crate::store::Store;
use crate::strip::DefaultStripper;
use crate::transport::AdminApiClient;
use std::sync::Arc;

/// Dumps, builds, and normalizes a full snapshot of the remote's
/// configuration. The returned store is ready for a diff engine to compare
/// against a user-authored target state.
pub async fn snapshot(
    client: Arc<dyn AdminApiClient>,
    dumper_config: DumperConfig,
    schema_registry: Arc<SchemaRegistry>,
) -> Result<Store> {
    let dumper = Dumper::new(client, dumper_config)?;
    let raw = dumper.dump().await?;

    let store = Store::new();
    Builder::new(&store).build(raw)?;

    let stripper = DefaultStripper::new(schema_registry);
    for mut plugin in store.plugins.get_all() {
        stripper.strip_plugin(&mut plugin).await?;
        store.plugins.update(plugin)?;
    }
    for mut vault in store.vaults.get_all() {
        stripper.strip_vault(&mut vault).await?;
        store.vaults.update(vault)?;
    }
    for mut partial in store.partials.get_all() {
        stripper.strip_partial(&mut partial).await?;
        store.partials.update(partial)?;
    }
    for mut credential in store.credentials.get_all() {
        stripper.strip_credential(&mut credential).await?;
        store.credentials.update(credential)?;
    }

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Page;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FakeClient;

    #[async_trait]
    impl AdminApiClient for FakeClient {
        async fn list_page(&self, path: &str, _tags: &[String], _offset: Option<&str>) -> Result<Page> {
            let data = match path {
                "services" => vec![json!({"id": "s1", "name": "svc"})],
                "plugins" => vec![json!({
                    "id": "p1",
                    "name": "rate-limiting",
                    "service": {"id": "s1"},
                    "config": {"minute": 100, "policy": "local"},
                })],
                _ => vec![],
            };
            Ok(Page { data, next_offset: None })
        }

        async fn get_one(&self, path: &str) -> Result<Value> {
            if path == "plugins/schema/rate-limiting" {
                return Ok(json!({
                    "fields": [
                        {"minute": {"default": 100}},
                        {"policy": {"default": "local"}},
                    ]
                }));
            }
            Err(crate::error::Error::UnexpectedStatus { status: 404, path: path.to_string() })
        }
    }

    #[tokio::test]
    async fn snapshot_dumps_builds_and_strips_defaults() {
        let client: Arc<dyn AdminApiClient> = Arc::new(FakeClient);
        let registry = Arc::new(SchemaRegistry::gateway(client.clone()));
        let store = snapshot(client, DumperConfig::default(), registry).await.unwrap();

        assert_eq!(store.services.len(), 1);
        let plugin = store.plugins.get("p1").unwrap();
        assert!(plugin.config.is_empty());
        assert_eq!(plugin.service.unwrap().name.as_deref(), Some("svc"));
    }

    /// Invariant 6: stripping an already-stripped plugin a second time is a
    /// no-op — the schema's default tree has nothing left to remove.
    #[tokio::test]
    async fn stripping_an_already_stripped_plugin_twice_is_idempotent() {
        let client: Arc<dyn AdminApiClient> = Arc::new(FakeClient);
        let registry = Arc::new(SchemaRegistry::gateway(client.clone()));
        let store = snapshot(client, DumperConfig::default(), registry.clone()).await.unwrap();

        let mut plugin = store.plugins.get("p1").unwrap();
        assert!(plugin.config.is_empty());

        let stripper = crate::strip::DefaultStripper::new(registry);
        stripper.strip_plugin(&mut plugin).await.unwrap();
        assert!(plugin.config.is_empty());
    }
}
