//! Builder (C6): consumes the dumper's raw state and inserts it into the
//! store in reference order, resolving foreign references to their
//! denormalized `{id, name}` form and dropping entities whose required
//! parent is absent (§4.6).

use crate::dump::RawState;
use crate::entity::common::{ForeignRef, Timestamps};
use crate::entity::consumers::{Consumer, ConsumerGroup, ConsumerGroupConsumer, ConsumerGroupPlugin};
use crate::entity::creds::{Credential, CredentialKind};
use crate::entity::custom::CustomEntity;
use crate::entity::proxy::{
    CaCertificate, Certificate, FilterChain, Key, KeySet, License, Partial, Plugin, Route,
    Service, Sni, Target, Upstream, Vault,
};
use crate::entity::rbac::{RbacEndpointPermission, RbacRole};
use crate::entity::Entity;
use crate::error::Result;
use crate::store::Store;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

fn decode_all<T: DeserializeOwned>(raw: Vec<Value>) -> Result<Vec<T>> {
    raw.into_iter().map(|v| Ok(serde_json::from_value(v)?)).collect()
}

/// Denormalizes a bare-ID foreign ref with the parent's endpoint key, if
/// the parent is known to the store (§3 invariant 4).
fn rehydrate<T: Entity>(id: &str, parent: Option<&T>) -> ForeignRef {
    match parent.and_then(Entity::endpoint_key) {
        Some(name) => ForeignRef::with_name(id, name),
        None => ForeignRef::new(id),
    }
}

fn credential_kind_from_path(path: &str) -> Option<CredentialKind> {
    match path {
        "key-auth" => Some(CredentialKind::KeyAuth),
        "hmac-auth" => Some(CredentialKind::HmacAuth),
        "jwt" => Some(CredentialKind::JwtAuth),
        "basic-auth" => Some(CredentialKind::BasicAuth),
        "oauth2" => Some(CredentialKind::Oauth2),
        "acls" => Some(CredentialKind::Acl),
        "mtls-auth" => Some(CredentialKind::MtlsAuth),
        _ => None,
    }
}

fn decode_credential(kind: CredentialKind, raw: &Value) -> Credential {
    let id = raw.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
    let consumer_id = raw.pointer("/consumer/id").and_then(Value::as_str).unwrap_or_default();
    let tags = raw
        .get("tags")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let timestamps = Timestamps {
        created_at: raw.get("created_at").and_then(Value::as_i64),
        updated_at: raw.get("updated_at").and_then(Value::as_i64),
    };
    let mut fields = raw.as_object().cloned().unwrap_or_default();
    for key in ["id", "consumer", "tags", "created_at", "updated_at"] {
        fields.remove(key);
    }
    Credential {
        id,
        kind,
        consumer: ForeignRef::new(consumer_id),
        fields,
        tags,
        timestamps,
    }
}

pub struct Builder<'a> {
    store: &'a Store,
}

impl<'a> Builder<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn build(&self, raw: RawState) -> Result<()> {
        self.build_services(raw.services)?;
        self.build_routes(raw.routes)?;
        self.build_consumers(raw.consumers)?;
        self.build_consumer_groups(raw.consumer_groups)?;
        self.build_consumer_group_consumers(raw.consumer_group_consumers);
        self.build_consumer_group_plugins(raw.consumer_group_plugins);
        self.build_credentials(raw.credentials)?;
        self.build_upstreams(raw.upstreams)?;
        self.build_targets(raw.targets)?;
        self.build_certificates(raw.certificates)?;
        self.build_snis(raw.snis)?;
        self.build_ca_certificates(raw.ca_certificates)?;
        self.build_partials(raw.partials)?;
        self.build_plugins(raw.plugins)?;
        self.build_filter_chains(raw.filter_chains)?;
        self.build_rbac_roles(raw.rbac_roles)?;
        self.build_rbac_permissions(raw.rbac_endpoint_permissions)?;
        self.build_vaults(raw.vaults)?;
        self.build_licenses(raw.licenses)?;
        self.build_custom_entities(raw.custom_entities)?;
        self.build_keys(raw.keys)?;
        self.build_key_sets(raw.key_sets)?;
        Ok(())
    }

    fn build_services(&self, raw: Vec<Value>) -> Result<()> {
        for svc in decode_all::<Service>(raw)? {
            self.store.services.add_ignoring_duplicates(svc)?;
        }
        Ok(())
    }

    fn build_routes(&self, raw: Vec<Value>) -> Result<()> {
        for mut route in decode_all::<Route>(raw)? {
            if let Some(svc_ref) = &route.service {
                let parent = self.store.services.try_get(&svc_ref.id);
                route.service = Some(rehydrate(&svc_ref.id, parent.as_ref()));
            }
            self.store.routes.add_ignoring_duplicates(route)?;
        }
        Ok(())
    }

    fn build_consumers(&self, raw: Vec<Value>) -> Result<()> {
        for consumer in decode_all::<Consumer>(raw)? {
            self.store.consumers.add_ignoring_duplicates(consumer)?;
        }
        Ok(())
    }

    fn build_consumer_groups(&self, raw: Vec<Value>) -> Result<()> {
        for group in decode_all::<ConsumerGroup>(raw)? {
            self.store.consumer_groups.add_ignoring_duplicates(group)?;
        }
        Ok(())
    }

    /// Links come from the consumer-group detail fan-out as
    /// `{consumer_group: {id}, consumer: {...}}`; synthesizes the link's
    /// own id since the wire shape has none. Silently drops a link whose
    /// group or consumer is not present in the store.
    fn build_consumer_group_consumers(&self, raw: Vec<Value>) {
        for link in raw {
            let Some(group_id) = link.pointer("/consumer_group/id").and_then(Value::as_str) else {
                continue;
            };
            let Some(consumer_id) = link.pointer("/consumer/id").and_then(Value::as_str) else {
                continue;
            };
            if self.store.consumer_groups.try_get(group_id).is_none() {
                continue;
            }
            if self.store.consumers.try_get(consumer_id).is_none() {
                continue;
            }
            let entry = ConsumerGroupConsumer {
                id: format!("{group_id}:{consumer_id}"),
                consumer_group: ForeignRef::new(group_id),
                consumer: ForeignRef::new(consumer_id),
            };
            if let Err(e) = self.store.consumer_group_consumers.add_ignoring_duplicates(entry) {
                debug!(error = %e, group_id, consumer_id, "dropping consumer-group link");
            }
        }
    }

    fn build_consumer_group_plugins(&self, raw: Vec<Value>) {
        for link in raw {
            let Some(group_id) = link.pointer("/consumer_group/id").and_then(Value::as_str) else {
                continue;
            };
            let Some(plugin) = link.get("plugin") else { continue };
            let name = plugin.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
            let plugin_id = plugin
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| name.clone());
            let config = plugin.get("config").and_then(Value::as_object).cloned().unwrap_or_default();
            let entry = ConsumerGroupPlugin {
                id: format!("{group_id}:{plugin_id}"),
                name,
                consumer_group: ForeignRef::new(group_id),
                config,
            };
            if let Err(e) = self.store.consumer_group_plugins.add_ignoring_duplicates(entry) {
                debug!(error = %e, group_id, "dropping consumer-group plugin link");
            }
        }
    }

    /// Credentials require a present consumer; orphans are silently
    /// dropped (scenario S3).
    fn build_credentials(&self, raw: HashMap<&'static str, Vec<Value>>) -> Result<()> {
        for (path, rows) in raw {
            let Some(kind) = credential_kind_from_path(path) else { continue };
            for row in rows {
                let mut cred = decode_credential(kind, &row);
                let Some(parent) = self.store.consumers.try_get(&cred.consumer.id) else {
                    debug!(id = %cred.id, kind = ?kind, "dropping orphan credential");
                    continue;
                };
                cred.consumer = rehydrate(&cred.consumer.id, Some(&parent));
                self.store.credentials.add_ignoring_duplicates(cred)?;
            }
        }
        Ok(())
    }

    fn build_upstreams(&self, raw: Vec<Value>) -> Result<()> {
        for upstream in decode_all::<Upstream>(raw)? {
            self.store.upstreams.add_ignoring_duplicates(upstream)?;
        }
        Ok(())
    }

    /// Targets require a present upstream; orphans are silently dropped,
    /// matching the credential drop rule (§3 invariant 4).
    fn build_targets(&self, raw: Vec<Value>) -> Result<()> {
        for mut target in decode_all::<Target>(raw)? {
            let Some(parent) = self.store.upstreams.try_get(&target.upstream.id) else {
                debug!(id = %target.id, "dropping orphan target");
                continue;
            };
            target.upstream = rehydrate(&target.upstream.id, Some(&parent));
            self.store.targets.add_ignoring_duplicates(target)?;
        }
        Ok(())
    }

    fn build_certificates(&self, raw: Vec<Value>) -> Result<()> {
        for cert in decode_all::<Certificate>(raw)? {
            self.store.certificates.add_ignoring_duplicates(cert)?;
        }
        Ok(())
    }

    fn build_snis(&self, raw: Vec<Value>) -> Result<()> {
        for mut sni in decode_all::<Sni>(raw)? {
            let parent = self.store.certificates.try_get(&sni.certificate.id);
            sni.certificate = rehydrate(&sni.certificate.id, parent.as_ref());
            self.store.snis.add_ignoring_duplicates(sni)?;
        }
        Ok(())
    }

    fn build_ca_certificates(&self, raw: Vec<Value>) -> Result<()> {
        for cert in decode_all::<CaCertificate>(raw)? {
            self.store.ca_certificates.add_ignoring_duplicates(cert)?;
        }
        Ok(())
    }

    fn build_partials(&self, raw: Vec<Value>) -> Result<()> {
        for partial in decode_all::<Partial>(raw)? {
            self.store.partials.add_ignoring_duplicates(partial)?;
        }
        Ok(())
    }

    /// Plugin parent refs are tolerant: a missing service/route/consumer/
    /// consumer-group/partial stays a bare-ID reference rather than
    /// dropping the plugin (§4.6).
    fn build_plugins(&self, raw: Vec<Value>) -> Result<()> {
        for mut plugin in decode_all::<Plugin>(raw)? {
            if let Some(r) = &plugin.service {
                let parent = self.store.services.try_get(&r.id);
                plugin.service = Some(rehydrate(&r.id, parent.as_ref()));
            }
            if let Some(r) = &plugin.route {
                let parent = self.store.routes.try_get(&r.id);
                plugin.route = Some(rehydrate(&r.id, parent.as_ref()));
            }
            if let Some(r) = &plugin.consumer {
                let parent = self.store.consumers.try_get(&r.id);
                plugin.consumer = Some(rehydrate(&r.id, parent.as_ref()));
            }
            if let Some(r) = &plugin.consumer_group {
                let parent = self.store.consumer_groups.try_get(&r.id);
                plugin.consumer_group = Some(rehydrate(&r.id, parent.as_ref()));
            }
            for link in plugin.partials.iter_mut() {
                let parent = self.store.partials.try_get(&link.partial.id);
                link.partial = rehydrate(&link.partial.id, parent.as_ref());
            }
            self.store.plugins.add_ignoring_duplicates(plugin)?;
        }
        Ok(())
    }

    /// Filter-chain parent refs are tolerant like plugins'; the
    /// service⊕route XOR invariant is enforced by `Store::add_filter_chain`
    /// regardless (scenario S2).
    fn build_filter_chains(&self, raw: Vec<Value>) -> Result<()> {
        for mut chain in decode_all::<FilterChain>(raw)? {
            if let Some(r) = &chain.service {
                let parent = self.store.services.try_get(&r.id);
                chain.service = Some(rehydrate(&r.id, parent.as_ref()));
            }
            if let Some(r) = &chain.route {
                let parent = self.store.routes.try_get(&r.id);
                chain.route = Some(rehydrate(&r.id, parent.as_ref()));
            }
            self.store.add_filter_chain(chain)?;
        }
        Ok(())
    }

    fn build_rbac_roles(&self, raw: Vec<Value>) -> Result<()> {
        for role in decode_all::<RbacRole>(raw)? {
            self.store.rbac_roles.add_ignoring_duplicates(role)?;
        }
        Ok(())
    }

    fn build_rbac_permissions(&self, raw: Vec<Value>) -> Result<()> {
        for mut perm in decode_all::<RbacEndpointPermission>(raw)? {
            let parent = self.store.rbac_roles.try_get(&perm.role.id);
            perm.role = rehydrate(&perm.role.id, parent.as_ref());
            // Kong's endpoint-permission objects carry no top-level `id`; the
            // (role, workspace, endpoint) triple is itself the identity.
            if perm.id.is_empty() {
                perm.id = perm.composite_key();
            }
            self.store.rbac_endpoint_permissions.add_ignoring_duplicates(perm)?;
        }
        Ok(())
    }

    fn build_vaults(&self, raw: Vec<Value>) -> Result<()> {
        for vault in decode_all::<Vault>(raw)? {
            self.store.vaults.add_ignoring_duplicates(vault)?;
        }
        Ok(())
    }

    fn build_licenses(&self, raw: Vec<Value>) -> Result<()> {
        for license in decode_all::<License>(raw)? {
            self.store.licenses.add_ignoring_duplicates(license)?;
        }
        Ok(())
    }

    /// Custom entity rows come back from the wire scoped to their own path
    /// (e.g. `degraphql_routes`), with no `type` field of their own — it is
    /// attached here from the listing's type name. Known types (currently
    /// `degraphql_routes`) are decoded eagerly and a malformed row aborts
    /// the build (§4.6); unrecognized types are kept only in their raw form.
    fn build_custom_entities(&self, raw: HashMap<String, Vec<Value>>) -> Result<()> {
        for (type_name, rows) in raw {
            for row in rows {
                let id = row.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
                let tags = row
                    .get("tags")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default();
                let timestamps = Timestamps {
                    created_at: row.get("created_at").and_then(Value::as_i64),
                    updated_at: row.get("updated_at").and_then(Value::as_i64),
                };
                let mut fields = row.as_object().cloned().unwrap_or_default();
                for key in ["id", "tags", "created_at", "updated_at"] {
                    fields.remove(key);
                }
                let entity = CustomEntity {
                    id,
                    type_name: type_name.clone(),
                    fields,
                    tags,
                    timestamps,
                };
                // `CustomStore::add` itself decodes known types (currently
                // `degraphql_routes`) and rejects a malformed row.
                self.store.custom_entities.add(entity)?;
            }
        }
        Ok(())
    }

    fn build_keys(&self, raw: Vec<Value>) -> Result<()> {
        for mut key in decode_all::<Key>(raw)? {
            if let Some(r) = &key.set {
                let parent = self.store.key_sets.try_get(&r.id);
                key.set = Some(rehydrate(&r.id, parent.as_ref()));
            }
            self.store.keys.add_ignoring_duplicates(key)?;
        }
        Ok(())
    }

    fn build_key_sets(&self, raw: Vec<Value>) -> Result<()> {
        for key_set in decode_all::<KeySet>(raw)? {
            self.store.key_sets.add_ignoring_duplicates(key_set)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn orphan_credential_is_dropped_scenario_s3() {
        let store = Store::new();
        let builder = Builder::new(&store);
        let mut raw = RawState::default();
        raw.credentials.insert(
            "key-auth",
            vec![json!({"id": "k1", "key": "abc", "consumer": {"id": "c-missing"}})],
        );
        builder.build(raw).unwrap();
        assert!(matches!(
            store.credentials.get("k1"),
            Err(crate::error::Error::NotFound { .. })
        ));
    }

    #[test]
    fn orphan_target_is_dropped() {
        let store = Store::new();
        let builder = Builder::new(&store);
        let mut raw = RawState::default();
        raw.targets = vec![json!({"id": "t1", "upstream": {"id": "up-missing"}, "target": "10.0.0.1:80"})];
        builder.build(raw).unwrap();
        assert!(store.targets.try_get("t1").is_none());
    }

    #[test]
    fn route_keeps_bare_id_when_service_missing() {
        let store = Store::new();
        let builder = Builder::new(&store);
        let mut raw = RawState::default();
        raw.routes = vec![json!({"id": "r1", "name": "r1", "service": {"id": "svc-missing"}})];
        builder.build(raw).unwrap();
        let route = store.routes.get("r1").unwrap();
        assert_eq!(route.service.unwrap().id, "svc-missing");
    }

    #[test]
    fn route_service_ref_is_rehydrated_with_name() {
        let store = Store::new();
        let builder = Builder::new(&store);
        let mut raw = RawState::default();
        raw.services = vec![json!({"id": "svc1", "name": "my-service"})];
        raw.routes = vec![json!({"id": "r1", "name": "r1", "service": {"id": "svc1"}})];
        builder.build(raw).unwrap();
        let route = store.routes.get("r1").unwrap();
        assert_eq!(route.service.unwrap().name.as_deref(), Some("my-service"));
    }

    #[test]
    fn certificate_and_sni_cross_reference_resolve() {
        let store = Store::new();
        let builder = Builder::new(&store);
        let mut raw = RawState::default();
        raw.certificates = vec![json!({"id": "c1", "cert": "x", "key": "y", "snis": []})];
        raw.snis = vec![json!({"id": "s1", "name": "example.com", "certificate": {"id": "c1"}})];
        builder.build(raw).unwrap();
        assert_eq!(store.snis_for_certificate("c1").len(), 1);
    }
}
