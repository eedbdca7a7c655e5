//! Proxy-facing entity kinds: services, routes, plugins, filter chains,
//! certificates, SNIs, upstreams, targets, vaults, keys, key-sets, partials,
//! licenses.

use super::common::{foreign_eq, tags_equal, EqualOpts, ForeignRef, SemanticEq, Timestamps};
use crate::entity::{config_equal, Entity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Service {
    pub id: String,
    pub name: Option<String>,
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub port: Option<i64>,
    pub path: Option<String>,
    pub retries: Option<i64>,
    pub connect_timeout: Option<i64>,
    pub write_timeout: Option<i64>,
    pub read_timeout: Option<i64>,
    #[serde(default)]
    pub ca_certificates: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Entity for Service {
    fn kind(&self) -> &'static str {
        "service"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn endpoint_key(&self) -> Option<&str> {
        self.name.as_deref()
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl SemanticEq for Service {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && self.name == other.name
            && self.protocol == other.protocol
            && self.host == other.host
            && self.port == other.port
            && self.path == other.path
            && self.retries == other.retries
            && self.connect_timeout == other.connect_timeout
            && self.write_timeout == other.write_timeout
            && self.read_timeout == other.read_timeout
            && sorted_string_sets_equal(&self.ca_certificates, &other.ca_certificates)
            && tags_equal(&self.tags, &other.tags)
            && (opts.ignore_timestamps || self.timestamps == other.timestamps)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Route {
    pub id: String,
    pub name: Option<String>,
    pub service: Option<ForeignRef>,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    pub strip_path: Option<bool>,
    pub preserve_host: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Entity for Route {
    fn kind(&self) -> &'static str {
        "route"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn endpoint_key(&self) -> Option<&str> {
        self.name.as_deref()
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl SemanticEq for Route {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && self.name == other.name
            && foreign_eq(&self.service, &other.service, opts)
            && sorted_string_sets_equal(&self.protocols, &other.protocols)
            && self.hosts == other.hosts
            && self.paths == other.paths
            && self.methods == other.methods
            && self.strip_path == other.strip_path
            && self.preserve_host == other.preserve_host
            && tags_equal(&self.tags, &other.tags)
            && (opts.ignore_timestamps || self.timestamps == other.timestamps)
    }
}

/// Ordered link from a plugin to a shared config partial (§3: "its
/// `partials` field is an ordered list of `{partial-id, path}` links").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartialLink {
    pub partial: ForeignRef,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Plugin {
    pub id: String,
    pub name: String,
    pub service: Option<ForeignRef>,
    pub route: Option<ForeignRef>,
    pub consumer: Option<ForeignRef>,
    pub consumer_group: Option<ForeignRef>,
    #[serde(default)]
    pub protocols: Vec<String>,
    pub enabled: Option<bool>,
    #[serde(default)]
    pub config: serde_json::Map<String, Value>,
    #[serde(default)]
    pub partials: Vec<PartialLink>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Plugin {
    /// `true` when `ConfigSource` marks this plugin as managed by the
    /// platform rather than user-authored (§4.5 plugin post-filtering).
    pub fn is_platform_managed(&self) -> bool {
        matches!(
            self.config.get("__config_source").and_then(Value::as_str),
            Some("konnect_managed")
        )
    }

    pub fn has_consumer_scope(&self) -> bool {
        self.consumer.is_some() || self.consumer_group.is_some()
    }
}

impl Entity for Plugin {
    fn kind(&self) -> &'static str {
        "plugin"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl SemanticEq for Plugin {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && self.name == other.name
            && foreign_eq(&self.service, &other.service, opts)
            && foreign_eq(&self.route, &other.route, opts)
            && foreign_eq(&self.consumer, &other.consumer, opts)
            && foreign_eq(&self.consumer_group, &other.consumer_group, opts)
            && sorted_string_sets_equal(&self.protocols, &other.protocols)
            && self.enabled == other.enabled
            && config_equal(
                &Value::Object(self.config.clone()),
                &Value::Object(other.config.clone()),
                opts.plugin_config_schema.as_deref(),
            )
            && self.partials == other.partials
            && tags_equal(&self.tags, &other.tags)
            && (opts.ignore_timestamps || self.timestamps == other.timestamps)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterChainParent {
    Service,
    Route,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    pub enabled: Option<bool>,
    pub config: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FilterChain {
    pub id: String,
    pub name: Option<String>,
    pub service: Option<ForeignRef>,
    pub route: Option<ForeignRef>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl FilterChain {
    /// Enforces the service⊕route invariant (S2). Called by the store on
    /// insert/update.
    pub fn validate_parent(&self) -> crate::error::Result<()> {
        match (&self.service, &self.route) {
            (Some(_), Some(_)) => Err(crate::error::Error::InvalidReference(
                "filter chain must not reference both a service and a route".into(),
            )),
            (None, None) => Err(crate::error::Error::InvalidReference(
                "filter chain must reference exactly one of service or route".into(),
            )),
            _ if self.filters.is_empty() => Err(crate::error::Error::InvalidReference(
                "filter chain must have at least one filter".into(),
            )),
            _ => Ok(()),
        }
    }
}

impl Entity for FilterChain {
    fn kind(&self) -> &'static str {
        "filter_chain"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn endpoint_key(&self) -> Option<&str> {
        self.name.as_deref()
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.enabled == other.enabled && self.config == other.config
    }
}

impl SemanticEq for FilterChain {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && self.name == other.name
            && foreign_eq(&self.service, &other.service, opts)
            && foreign_eq(&self.route, &other.route, opts)
            && self.filters == other.filters
            && tags_equal(&self.tags, &other.tags)
            && (opts.ignore_timestamps || self.timestamps == other.timestamps)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Certificate {
    pub id: String,
    pub cert: String,
    pub key: String,
    pub cert_alt: Option<String>,
    pub key_alt: Option<String>,
    /// Inline SNIs as returned by the server; cleared after dump (S6) since
    /// SNIs are dumped and indexed independently.
    #[serde(default)]
    pub snis: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Entity for Certificate {
    fn kind(&self) -> &'static str {
        "certificate"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl SemanticEq for Certificate {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && self.cert == other.cert
            && self.key == other.key
            && self.cert_alt == other.cert_alt
            && self.key_alt == other.key_alt
            && tags_equal(&self.tags, &other.tags)
            && (opts.ignore_timestamps || self.timestamps == other.timestamps)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CaCertificate {
    pub id: String,
    pub cert: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Entity for CaCertificate {
    fn kind(&self) -> &'static str {
        "ca_certificate"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn endpoint_key(&self) -> Option<&str> {
        Some(&self.cert)
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl SemanticEq for CaCertificate {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && self.cert == other.cert
            && tags_equal(&self.tags, &other.tags)
            && (opts.ignore_timestamps || self.timestamps == other.timestamps)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Sni {
    pub id: String,
    pub name: String,
    pub certificate: ForeignRef,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Entity for Sni {
    fn kind(&self) -> &'static str {
        "sni"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn endpoint_key(&self) -> Option<&str> {
        Some(&self.name)
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl SemanticEq for Sni {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && self.name == other.name
            && foreign_eq(&Some(self.certificate.clone()), &Some(other.certificate.clone()), opts)
            && tags_equal(&self.tags, &other.tags)
            && (opts.ignore_timestamps || self.timestamps == other.timestamps)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Upstream {
    pub id: String,
    pub name: Option<String>,
    pub algorithm: Option<String>,
    pub slots: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Entity for Upstream {
    fn kind(&self) -> &'static str {
        "upstream"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn endpoint_key(&self) -> Option<&str> {
        self.name.as_deref()
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl SemanticEq for Upstream {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && self.name == other.name
            && self.algorithm == other.algorithm
            && self.slots == other.slots
            && tags_equal(&self.tags, &other.tags)
            && (opts.ignore_timestamps || self.timestamps == other.timestamps)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Target {
    pub id: String,
    pub upstream: ForeignRef,
    /// `host:port`, the endpoint key for this kind.
    pub target: String,
    pub weight: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Entity for Target {
    fn kind(&self) -> &'static str {
        "target"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn endpoint_key(&self) -> Option<&str> {
        Some(&self.target)
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl SemanticEq for Target {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && foreign_eq(&Some(self.upstream.clone()), &Some(other.upstream.clone()), opts)
            && self.target == other.target
            && self.weight == other.weight
            && tags_equal(&self.tags, &other.tags)
            && (opts.ignore_timestamps || self.timestamps == other.timestamps)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Vault {
    pub id: String,
    pub name: String,
    pub prefix: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub config: serde_json::Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Entity for Vault {
    fn kind(&self) -> &'static str {
        "vault"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn endpoint_key(&self) -> Option<&str> {
        Some(&self.name)
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl SemanticEq for Vault {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && self.name == other.name
            && self.prefix == other.prefix
            && self.description == other.description
            && self.config == other.config
            && tags_equal(&self.tags, &other.tags)
            && (opts.ignore_timestamps || self.timestamps == other.timestamps)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Key {
    pub id: String,
    pub name: Option<String>,
    pub kid: Option<String>,
    pub set: Option<ForeignRef>,
    pub jwk: Option<String>,
    pub pem_public_key: Option<String>,
    pub pem_private_key: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Entity for Key {
    fn kind(&self) -> &'static str {
        "key"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn endpoint_key(&self) -> Option<&str> {
        self.name.as_deref()
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl SemanticEq for Key {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && self.name == other.name
            && self.kid == other.kid
            && foreign_eq(&self.set, &other.set, opts)
            && self.jwk == other.jwk
            && self.pem_public_key == other.pem_public_key
            && self.pem_private_key == other.pem_private_key
            && tags_equal(&self.tags, &other.tags)
            && (opts.ignore_timestamps || self.timestamps == other.timestamps)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeySet {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Entity for KeySet {
    fn kind(&self) -> &'static str {
        "key_set"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn endpoint_key(&self) -> Option<&str> {
        self.name.as_deref()
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl SemanticEq for KeySet {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && self.name == other.name
            && tags_equal(&self.tags, &other.tags)
            && (opts.ignore_timestamps || self.timestamps == other.timestamps)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Partial {
    pub id: String,
    pub name: Option<String>,
    /// The partial-type this config conforms to (e.g. `redis-ee`); used as
    /// the schema-registry cache key.
    #[serde(rename = "type")]
    pub partial_type: String,
    #[serde(default)]
    pub config: serde_json::Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Entity for Partial {
    fn kind(&self) -> &'static str {
        "partial"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn endpoint_key(&self) -> Option<&str> {
        self.name.as_deref()
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl SemanticEq for Partial {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && self.name == other.name
            && self.partial_type == other.partial_type
            && self.config == other.config
            && tags_equal(&self.tags, &other.tags)
            && (opts.ignore_timestamps || self.timestamps == other.timestamps)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct License {
    pub id: String,
    pub payload: String,
    /// Licenses are not tag-filterable on the server; the field exists
    /// purely so `License` can implement `Entity` uniformly with everything
    /// else and is always empty in practice.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Entity for License {
    fn kind(&self) -> &'static str {
        "license"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl SemanticEq for License {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && self.payload == other.payload
            && (opts.ignore_timestamps || self.timestamps == other.timestamps)
    }
}

/// Sorts treated as sets (used for `protocols`, `ca_certificates`, and, in
/// the legacy no-schema fallback, any scalar array — see §9).
pub fn sorted_string_sets_equal(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn plugin(config: serde_json::Map<String, Value>) -> Plugin {
        Plugin {
            id: "p1".into(),
            name: "rate-limiting".into(),
            config,
            ..Default::default()
        }
    }

    #[test]
    fn plugin_equality_reorders_schema_declared_set_arrays() {
        let a = plugin(json!({"protocols_ext": ["http", "https"]}).as_object().unwrap().clone());
        let b = plugin(json!({"protocols_ext": ["https", "http"]}).as_object().unwrap().clone());
        let schema = Arc::new(json!({"fields": [{"protocols_ext": {"type": "set"}}]}));
        let opts = EqualOpts {
            plugin_config_schema: Some(schema),
            ..Default::default()
        };
        assert!(a.equal_with_opts(&b, &opts));
    }

    #[test]
    fn plugin_equality_without_schema_sorts_legacy_style() {
        let a = plugin(json!({"hosts": ["a", "b"]}).as_object().unwrap().clone());
        let b = plugin(json!({"hosts": ["b", "a"]}).as_object().unwrap().clone());
        assert!(a.equal_with_opts(&b, &EqualOpts::default()));
    }

    #[test]
    fn plugin_equality_preserves_order_for_record_arrays() {
        let a = plugin(json!({"retries": [{"delay": 1}, {"delay": 2}]}).as_object().unwrap().clone());
        let b = plugin(json!({"retries": [{"delay": 2}, {"delay": 1}]}).as_object().unwrap().clone());
        let schema = Arc::new(json!({
            "fields": [{"retries": {"type": "array", "elements": {"type": "record"}}}]
        }));
        let opts = EqualOpts {
            plugin_config_schema: Some(schema),
            ..Default::default()
        };
        assert!(!a.equal_with_opts(&b, &opts));
    }
}
