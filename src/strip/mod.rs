//! Default Stripper (C4): extracts a schema's default-value tree once per
//! (entity-type, identifier) and recursively removes config entries that
//! equal their schema default, so downstream equality comparisons are not
//! polluted by server-side defaulting.

use crate::entity::creds::Credential;
use crate::entity::proxy::{Partial, Plugin, Vault};
use crate::error::Result;
use crate::schema::SchemaRegistry;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Walks a schema document (gateway `fields` list-of-singleton-maps, or
/// Konnect `properties` object) and builds a tree of `{field: default}`
/// mirroring the field structure (§4.4 step 1–3).
pub fn extract_defaults(schema: &Value, unwrap_konnect_credential_value: bool) -> Value {
    let mut tree = extract_defaults_inner(schema);
    if unwrap_konnect_credential_value {
        unwrap_value_wrapper(&mut tree);
    }
    tree
}

/// Konnect credential schemas wrap the payload in a `value` sub-object;
/// lift its children into the parent and drop the wrapper (§4.4 step 4).
fn unwrap_value_wrapper(tree: &mut Value) {
    if let Value::Object(map) = tree {
        if let Some(Value::Object(inner)) = map.remove("value") {
            for (k, v) in inner {
                map.insert(k, v);
            }
        }
    }
}

fn extract_defaults_inner(schema: &Value) -> Value {
    let mut defaults = serde_json::Map::new();
    let top_level_default = schema.get("default").and_then(Value::as_object);

    if let Some(fields) = schema.get("fields").and_then(Value::as_array) {
        for entry in fields {
            if let Some(singleton) = entry.as_object() {
                for (name, field_schema) in singleton {
                    if let Some(d) = extract_field_default(name, field_schema, top_level_default) {
                        defaults.insert(name.clone(), d);
                    }
                }
            }
        }
    } else if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, field_schema) in properties {
            if let Some(d) = extract_field_default(name, field_schema, top_level_default) {
                defaults.insert(name.clone(), d);
            }
        }
    }

    if let Some(shorthand) = schema.get("shorthand_fields").and_then(Value::as_array) {
        let tree_so_far = Value::Object(defaults.clone());
        for entry in shorthand {
            let Some(singleton) = entry.as_object() else { continue };
            for (alias, field_schema) in singleton {
                if let Some(path) = shorthand_path(field_schema) {
                    if let Some(resolved) = resolve_path(&tree_so_far, &path) {
                        defaults.insert(alias.clone(), resolved);
                    }
                }
            }
        }
    }

    Value::Object(defaults)
}

fn extract_field_default(
    name: &str,
    field_schema: &Value,
    top_level_default: Option<&serde_json::Map<String, Value>>,
) -> Option<Value> {
    let has_nested = field_schema.get("fields").and_then(Value::as_array).is_some()
        || field_schema.get("properties").and_then(Value::as_object).is_some();
    if has_nested {
        return Some(extract_defaults_inner(field_schema));
    }
    if let Some(d) = field_schema.get("default") {
        return Some(d.clone());
    }
    top_level_default.and_then(|top| top.get(name).cloned())
}

/// A shorthand field names its replacement either via
/// `deprecation.replaced_with[0].path` or `translate_backwards`.
fn shorthand_path(field_schema: &Value) -> Option<Vec<String>> {
    let from_deprecation = field_schema
        .pointer("/deprecation/replaced_with/0/path")
        .and_then(Value::as_array);
    let raw = from_deprecation.or_else(|| field_schema.get("translate_backwards").and_then(Value::as_array))?;
    Some(raw.iter().filter_map(Value::as_str).map(str::to_string).collect())
}

fn resolve_path(tree: &Value, path: &[String]) -> Option<Value> {
    let mut cur = tree;
    for segment in path {
        cur = cur.get(segment)?;
    }
    Some(cur.clone())
}

/// Structural equality tolerant of numeric width coercion (i64 vs f64),
/// used instead of `Value`'s derived `PartialEq` when diffing against a
/// schema default (§4.4: "numeric coercion across integer/float widths").
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(xi), Some(yi)) = (x.as_i64(), y.as_i64()) {
                xi == yi
            } else {
                x.as_f64() == y.as_f64()
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len() && xm.iter().all(|(k, v)| ym.get(k).is_some_and(|yv| values_equal(v, yv)))
        }
        _ => a == b,
    }
}

/// Removes entries from `map` whose value equals the corresponding entry
/// in `defaults`; recurses into nested objects, keeping entries absent
/// from `defaults` untouched (§4.4 `strip` algorithm, scenario S4).
pub fn strip_map(map: &mut serde_json::Map<String, Value>, defaults: &Value) {
    let Some(default_map) = defaults.as_object() else {
        return;
    };
    let keys: Vec<String> = map.keys().cloned().collect();
    for key in keys {
        let Some(default_value) = default_map.get(&key) else {
            continue;
        };
        let is_nested_pair = matches!(
            (map.get(&key), default_value),
            (Some(Value::Object(_)), Value::Object(_))
        );
        if is_nested_pair {
            if let Some(Value::Object(sub_map)) = map.get_mut(&key) {
                strip_map(sub_map, default_value);
            }
        } else if map.get(&key).is_some_and(|v| values_equal(v, default_value)) {
            map.remove(&key);
        }
    }
}

/// Per-`(entity-type, identifier)` cache of extracted default trees, plus
/// the schema registry used to populate cache misses (§4.4 caching).
pub struct DefaultStripper {
    registry: Arc<SchemaRegistry>,
    cache: Mutex<HashMap<(&'static str, String), Arc<Value>>>,
    /// Feature flag for the Konnect credential `value`-wrapper unwrap
    /// (§9 open question — default on).
    pub unwrap_konnect_credential_value: bool,
}

impl DefaultStripper {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            cache: Mutex::new(HashMap::new()),
            unwrap_konnect_credential_value: true,
        }
    }

    async fn defaults_for(
        &self,
        kind: &'static str,
        identifier: &str,
        schema: Option<Value>,
        unwrap: bool,
    ) -> Option<Arc<Value>> {
        let key = (kind, identifier.to_string());
        {
            let cache = self.cache.lock().await;
            if let Some(cached) = cache.get(&key) {
                return Some(cached.clone());
            }
        }
        let schema = schema?;
        let tree = Arc::new(extract_defaults(&schema, unwrap));
        self.cache.lock().await.insert(key, tree.clone());
        Some(tree)
    }

    pub async fn strip_plugin(&self, plugin: &mut Plugin) -> Result<()> {
        let schema = self.registry.plugin_schema(&plugin.name).await?;
        if let Some(defaults) = self.defaults_for("plugin", &plugin.name, schema, false).await {
            strip_map(&mut plugin.config, &defaults);
        }
        Ok(())
    }

    pub async fn strip_vault(&self, vault: &mut Vault) -> Result<()> {
        let schema = self.registry.vault_schema(&vault.name).await?;
        if let Some(defaults) = self.defaults_for("vault", &vault.name, schema, false).await {
            strip_map(&mut vault.config, &defaults);
        }
        Ok(())
    }

    pub async fn strip_partial(&self, partial: &mut Partial) -> Result<()> {
        let schema = self.registry.partial_schema(&partial.partial_type).await?;
        if let Some(defaults) = self.defaults_for("partial", &partial.partial_type, schema, false).await {
            strip_map(&mut partial.config, &defaults);
        }
        Ok(())
    }

    /// Credential schemas are the one case where a nested `value` sub-object
    /// is a Konnect wire-format wrapper rather than real config shape (§4.4
    /// step 4), so this is the only strip path that honors
    /// `unwrap_konnect_credential_value`.
    pub async fn strip_credential(&self, credential: &mut Credential) -> Result<()> {
        let kind = credential.kind.plural();
        let schema = self.registry.entity_schema(kind).await?;
        if let Some(defaults) = self
            .defaults_for(kind, &credential.id, schema, self.unwrap_konnect_credential_value)
            .await
        {
            strip_map(&mut credential.fields, &defaults);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::common::ForeignRef;
    use crate::entity::creds::CredentialKind;
    use crate::schema::SchemaRegistry;
    use crate::transport::{AdminApiClient, Page};
    use async_trait::async_trait;
    use serde_json::json;

    #[test]
    fn extracts_defaults_from_gateway_fields_style() {
        let schema = json!({
            "fields": [
                {"timeout": {"type": "integer", "default": 5000}},
                {"retries": {"type": "integer"}}
            ]
        });
        let defaults = extract_defaults(&schema, true);
        assert_eq!(defaults["timeout"], json!(5000));
        assert!(defaults.get("retries").is_none());
    }

    #[test]
    fn extracts_defaults_from_konnect_properties_style() {
        let schema = json!({
            "properties": {
                "region": {"type": "string", "default": "us-east-1"}
            }
        });
        let defaults = extract_defaults(&schema, true);
        assert_eq!(defaults["region"], json!("us-east-1"));
    }

    #[test]
    fn resolves_shorthand_field_default_via_translate_backwards() {
        let schema = json!({
            "fields": [
                {"config": {"fields": [{"timeout": {"default": 5000}}]}}
            ],
            "shorthand_fields": [
                {"config_timeout": {"translate_backwards": ["config", "timeout"]}}
            ]
        });
        let defaults = extract_defaults(&schema, true);
        assert_eq!(defaults["config_timeout"], json!(5000));
    }

    #[test]
    fn unwraps_konnect_credential_value_wrapper_when_enabled() {
        let schema = json!({"properties": {"value": {"properties": {"key": {"default": "abc"}}}}});
        let defaults = extract_defaults(&schema, true);
        assert_eq!(defaults["key"], json!("abc"));
        assert!(defaults.get("value").is_none());
    }

    #[test]
    fn leaves_value_wrapper_when_flag_disabled() {
        let schema = json!({"properties": {"value": {"properties": {"key": {"default": "abc"}}}}});
        let defaults = extract_defaults(&schema, false);
        assert!(defaults.get("value").is_some());
    }

    #[test]
    fn strip_removes_matching_scalar_and_keeps_differing() {
        let mut config = json!({"timeout": 5000, "retries": 3}).as_object().unwrap().clone();
        let defaults = json!({"timeout": 5000, "retries": 5});
        strip_map(&mut config, &defaults);
        assert_eq!(config.get("timeout"), None);
        assert_eq!(config.get("retries"), Some(&json!(3)));
    }

    #[test]
    fn strip_tolerates_numeric_width_coercion() {
        let mut config = json!({"timeout": 5000.0}).as_object().unwrap().clone();
        let defaults = json!({"timeout": 5000});
        strip_map(&mut config, &defaults);
        assert!(config.get("timeout").is_none());
    }

    #[test]
    fn strip_recurses_into_nested_maps_retaining_extra_keys() {
        let mut config = json!({"retry": {"timeout": 5000, "attempts": 2}}).as_object().unwrap().clone();
        let defaults = json!({"retry": {"timeout": 5000}});
        strip_map(&mut config, &defaults);
        assert_eq!(config["retry"], json!({"attempts": 2}));
    }

    struct SchemaFetcherStub(Value, &'static str);

    #[async_trait]
    impl AdminApiClient for SchemaFetcherStub {
        async fn list_page(&self, _path: &str, _tags: &[String], _offset: Option<&str>) -> Result<Page> {
            Ok(Page { data: vec![], next_offset: None })
        }

        async fn get_one(&self, path: &str) -> Result<Value> {
            if path == self.1 {
                return Ok(self.0.clone());
            }
            Err(crate::error::Error::UnexpectedStatus { status: 404, path: path.to_string() })
        }
    }

    /// A plugin schema with a nested record literally named `value` must
    /// keep its own shape — `strip_plugin` must not run the Konnect
    /// credential value-wrapper unwrap. If it wrongly did, the default tree
    /// would flatten to `{inner: "x"}` with no `value` key, and the nested
    /// `value` field in `plugin.config` would never be visited by
    /// `strip_map` at all, leaving it unstripped.
    #[tokio::test]
    async fn plugin_strip_does_not_unwrap_a_literal_value_field() {
        let schema = json!({
            "fields": [
                {"value": {"fields": [{"inner": {"default": "x"}}]}}
            ]
        });
        let client: Arc<dyn AdminApiClient> =
            Arc::new(SchemaFetcherStub(schema, "plugins/schema/custom-auth"));
        let registry = Arc::new(SchemaRegistry::gateway(client));
        let stripper = DefaultStripper::new(registry);

        let mut plugin = Plugin {
            id: "p1".to_string(),
            name: "custom-auth".to_string(),
            config: json!({"value": {"inner": "x"}}).as_object().unwrap().clone(),
            ..Default::default()
        };
        stripper.strip_plugin(&mut plugin).await.unwrap();
        assert_eq!(plugin.config["value"], json!({}));
    }

    /// Credential schemas are the one case where the `value` wrapper is a
    /// Konnect wire-format artifact, not real config shape — `strip_credential`
    /// must unwrap it so `fields.key` strips against the nested default.
    #[tokio::test]
    async fn credential_strip_unwraps_konnect_value_wrapper() {
        let schema = json!({"properties": {"value": {"properties": {"key": {"default": "abc"}}}}});
        let client: Arc<dyn AdminApiClient> = Arc::new(SchemaFetcherStub(schema, "schemas/key-auth"));
        let registry = Arc::new(SchemaRegistry::gateway(client));
        let stripper = DefaultStripper::new(registry);

        let mut credential = Credential::new(CredentialKind::KeyAuth, "c1", ForeignRef::new("cons1"));
        credential.fields.insert("key".to_string(), json!("abc"));
        stripper.strip_credential(&mut credential).await.unwrap();
        assert!(credential.fields.is_empty());
    }
}
