//! The Indexed Store (C1): one `Table<T>` per proxy-facing and
//! platform-facing entity kind, plus the dedicated `CustomStore` for
//! open-ended custom entities, wired together with the foreign/unique
//! indexes §3 describes for each relationship.

pub mod custom;
pub mod table;

use crate::entity::common::ForeignRef;
use crate::entity::consumers::{Consumer, ConsumerGroup, ConsumerGroupConsumer, ConsumerGroupPlugin};
use crate::entity::creds::Credential;
use crate::entity::proxy::{
    CaCertificate, Certificate, FilterChain, Key, KeySet, License, Partial, Plugin, Route,
    Service, Sni, Target, Upstream, Vault,
};
use crate::entity::rbac::{RbacEndpointPermission, RbacRole};
use crate::entity::Entity;
use crate::error::Result;
use custom::CustomStore;
use table::Table;

fn fk(r: &Option<ForeignRef>) -> Option<String> {
    r.as_ref().map(|x| x.id.clone())
}

/// The full snapshot: every entity kind the admin API exposes, held
/// in-memory with the cross-references the builder and dumper need.
pub struct Store {
    pub services: Table<Service>,
    pub routes: Table<Route>,
    pub plugins: Table<Plugin>,
    pub filter_chains: Table<FilterChain>,
    pub certificates: Table<Certificate>,
    pub ca_certificates: Table<CaCertificate>,
    pub snis: Table<Sni>,
    pub upstreams: Table<Upstream>,
    pub targets: Table<Target>,
    pub vaults: Table<Vault>,
    pub keys: Table<Key>,
    pub key_sets: Table<KeySet>,
    pub partials: Table<Partial>,
    pub licenses: Table<License>,
    pub consumers: Table<Consumer>,
    pub consumer_groups: Table<ConsumerGroup>,
    pub consumer_group_consumers: Table<ConsumerGroupConsumer>,
    pub consumer_group_plugins: Table<ConsumerGroupPlugin>,
    pub credentials: Table<Credential>,
    pub rbac_roles: Table<RbacRole>,
    pub rbac_endpoint_permissions: Table<RbacEndpointPermission>,
    pub custom_entities: CustomStore,
}

impl Store {
    pub fn new() -> Self {
        Self {
            services: Table::new("service", true),

            routes: Table::new("route", true)
                .with_index("service_id", |r: &Route| fk(&r.service)),

            plugins: Table::new("plugin", false)
                .with_index("service_id", |p: &Plugin| fk(&p.service))
                .with_index("route_id", |p: &Plugin| fk(&p.route))
                .with_index("consumer_id", |p: &Plugin| fk(&p.consumer))
                .with_index("consumer_group_id", |p: &Plugin| fk(&p.consumer_group)),

            // `name` is the endpoint key, but the service⊕route parent is
            // enforced separately by `FilterChain::validate_parent` (S2),
            // not by the store's uniqueness machinery.
            filter_chains: Table::new("filter_chain", true)
                .with_index("service_id", |f: &FilterChain| fk(&f.service))
                .with_index("route_id", |f: &FilterChain| fk(&f.route)),

            certificates: Table::new("certificate", false),

            ca_certificates: Table::new("ca_certificate", true),

            snis: Table::new("sni", true)
                .with_index("certificate_id", |s: &Sni| Some(s.certificate.id.clone())),

            upstreams: Table::new("upstream", true),

            // The `target` string is only unique per upstream, not
            // globally, so it is modeled as a composite unique index
            // rather than the table's endpoint-key index (§3).
            targets: Table::new("target", false)
                .with_index("upstream_id", |t: &Target| Some(t.upstream.id.clone()))
                .with_unique_index("upstream_target", |t: &Target| {
                    Some(format!("{}:{}", t.upstream.id, t.target))
                }),

            vaults: Table::new("vault", true),

            keys: Table::new("key", true)
                .with_index("set_id", |k: &Key| fk(&k.set)),

            key_sets: Table::new("key_set", true),

            partials: Table::new("partial", true),

            licenses: Table::new("license", false),

            consumers: Table::new("consumer", true),

            consumer_groups: Table::new("consumer_group", true),

            // `(consumer_group_id, consumer_id)` is the N:M link's unique
            // key; both sides are also indexed non-uniquely for traversal.
            consumer_group_consumers: Table::new("consumer_group_consumer", false)
                .with_index("consumer_group_id", |c: &ConsumerGroupConsumer| {
                    Some(c.consumer_group.id.clone())
                })
                .with_index("consumer_id", |c: &ConsumerGroupConsumer| {
                    Some(c.consumer.id.clone())
                })
                .with_unique_index("group_consumer", |c: &ConsumerGroupConsumer| {
                    Some(format!("{}:{}", c.consumer_group.id, c.consumer.id))
                }),

            consumer_group_plugins: Table::new("consumer_group_plugin", false)
                .with_index("consumer_group_id", |p: &ConsumerGroupPlugin| {
                    Some(p.consumer_group.id.clone())
                }),

            // Credential keys (`key`, `username`, `client_id`, ...) are
            // only unique per owning consumer, not globally (§3), so this
            // is a composite unique index rather than the endpoint-key one.
            credentials: Table::new("credential", false)
                .with_index("consumer_id", |c: &Credential| Some(c.consumer.id.clone()))
                .with_unique_index("consumer_key", |c: &Credential| {
                    c.endpoint_key().map(|k| format!("{}:{k}", c.consumer.id))
                }),

            rbac_roles: Table::new("rbac_role", true),

            rbac_endpoint_permissions: Table::new("rbac_endpoint_permission", false)
                .with_index("role_id", |p: &RbacEndpointPermission| Some(p.role.id.clone()))
                .with_unique_index("role_workspace_endpoint", |p: &RbacEndpointPermission| {
                    Some(p.composite_key())
                }),

            custom_entities: CustomStore::new(),
        }
    }

    /// Inserts a filter chain after validating its service⊕route parent
    /// invariant (S2) — callers must go through this rather than
    /// `filter_chains.add` directly.
    pub fn add_filter_chain(&self, chain: FilterChain) -> Result<()> {
        chain.validate_parent()?;
        self.filter_chains.add(chain)
    }

    pub fn update_filter_chain(&self, chain: FilterChain) -> Result<()> {
        chain.validate_parent()?;
        self.filter_chains.update(chain)
    }

    /// Union of a consumer's own credentials and a group's member lists
    /// look up differently; this just exposes the per-consumer list the
    /// builder and dumper need for reference resolution.
    pub fn credentials_for_consumer(&self, consumer_id: &str) -> Vec<Credential> {
        self.credentials.get_all_by("consumer_id", consumer_id)
    }

    pub fn consumers_in_group(&self, group_id: &str) -> Vec<ConsumerGroupConsumer> {
        self.consumer_group_consumers
            .get_all_by("consumer_group_id", group_id)
    }

    pub fn plugins_in_group(&self, group_id: &str) -> Vec<ConsumerGroupPlugin> {
        self.consumer_group_plugins
            .get_all_by("consumer_group_id", group_id)
    }

    pub fn targets_for_upstream(&self, upstream_id: &str) -> Vec<Target> {
        self.targets.get_all_by("upstream_id", upstream_id)
    }

    pub fn snis_for_certificate(&self, certificate_id: &str) -> Vec<Sni> {
        self.snis.get_all_by("certificate_id", certificate_id)
    }

    pub fn permissions_for_role(&self, role_id: &str) -> Vec<RbacEndpointPermission> {
        self.rbac_endpoint_permissions.get_all_by("role_id", role_id)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
