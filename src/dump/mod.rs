//! Parallel Dumper (C5): concurrently lists every configured entity kind
//! from the remote admin API into a raw, pre-build state bag.

use crate::error::{Error, Result};
use crate::transport::AdminApiClient;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The enumerated dump options (§4.5).
#[derive(Debug, Clone)]
pub struct DumperConfig {
    pub rbac_resources_only: bool,
    pub skip_consumers: bool,
    pub skip_ca_certs: bool,
    pub include_licenses: bool,
    pub custom_entity_types: Vec<String>,
    pub selector_tags: Vec<String>,
    pub look_up_selector_tags_consumer_groups: Vec<String>,
    pub look_up_selector_tags_consumers: Vec<String>,
    pub look_up_selector_tags_routes: Vec<String>,
    pub look_up_selector_tags_services: Vec<String>,
    /// Non-empty means the remote is Konnect; disables kinds Konnect does
    /// not support (oauth2 credentials).
    pub konnect_control_plane: Option<String>,
    /// Advisory: consulted by the builder, not the dumper.
    pub is_consumer_group_scoped_plugin_supported: bool,
}

impl Default for DumperConfig {
    fn default() -> Self {
        Self {
            rbac_resources_only: false,
            skip_consumers: false,
            skip_ca_certs: false,
            include_licenses: false,
            custom_entity_types: Vec::new(),
            selector_tags: Vec::new(),
            look_up_selector_tags_consumer_groups: Vec::new(),
            look_up_selector_tags_consumers: Vec::new(),
            look_up_selector_tags_routes: Vec::new(),
            look_up_selector_tags_services: Vec::new(),
            konnect_control_plane: None,
            is_consumer_group_scoped_plugin_supported: true,
        }
    }
}

impl DumperConfig {
    pub fn validate(&self) -> Result<()> {
        if self.rbac_resources_only && (self.skip_consumers || !self.selector_tags.is_empty()) {
            return Err(Error::ConfigInvalid(
                "rbac_resources_only is incompatible with skip_consumers=true or non-empty selector_tags".into(),
            ));
        }
        Ok(())
    }

    pub fn is_konnect(&self) -> bool {
        self.konnect_control_plane.as_deref().is_some_and(|cp| !cp.is_empty())
    }
}

/// The seven credential listing paths, in the plural form used by the
/// admin API (§3's "seven credential kinds").
const CREDENTIAL_KINDS: &[&str] = &["key-auth", "hmac-auth", "jwt", "basic-auth", "acls", "mtls-auth"];

/// Raw, pre-resolution rows straight off the wire, one slot per kind.
/// The builder (C6) deserializes each row into its typed record.
#[derive(Debug, Default)]
pub struct RawState {
    pub services: Vec<Value>,
    pub routes: Vec<Value>,
    pub plugins: Vec<Value>,
    pub filter_chains: Vec<Value>,
    pub certificates: Vec<Value>,
    pub ca_certificates: Vec<Value>,
    pub snis: Vec<Value>,
    pub upstreams: Vec<Value>,
    pub targets: Vec<Value>,
    pub vaults: Vec<Value>,
    pub keys: Vec<Value>,
    pub key_sets: Vec<Value>,
    pub partials: Vec<Value>,
    pub licenses: Vec<Value>,
    pub consumers: Vec<Value>,
    pub consumer_groups: Vec<Value>,
    pub consumer_group_consumers: Vec<Value>,
    pub consumer_group_plugins: Vec<Value>,
    pub credentials: HashMap<&'static str, Vec<Value>>,
    pub rbac_roles: Vec<Value>,
    pub rbac_endpoint_permissions: Vec<Value>,
    pub custom_entities: HashMap<String, Vec<Value>>,
}

enum Classify {
    Empty,
    Fail,
}

/// Per-kind error classification (§4.5). 404 on kinds the server may not
/// have enabled, 403 on licensed-only kinds, 400 on wasm-gated filter
/// chains — all become "empty, continue" rather than failing the dump.
fn classify(path: &str, err: &Error) -> Classify {
    match err {
        Error::UnexpectedStatus { status: 404, .. } if is_optional_kind(path) => Classify::Empty,
        Error::UnexpectedStatus { status: 403, .. } if matches!(path, "mtls-auth" | "vaults") => Classify::Empty,
        Error::UnexpectedStatus { status: 400, .. } if path == "filter-chains" => Classify::Empty,
        _ => Classify::Fail,
    }
}

fn is_optional_kind(path: &str) -> bool {
    matches!(
        path,
        "ca_certificates"
            | "filter-chains"
            | "mtls-auth"
            | "vaults"
            | "licenses"
            | "key-auth"
            | "hmac-auth"
            | "jwt"
            | "basic-auth"
            | "oauth2"
            | "acls"
    )
}

async fn list_all_tagged(
    client: &dyn AdminApiClient,
    path: &str,
    tags: &[String],
    cancel: &CancellationToken,
) -> Result<Vec<Value>> {
    let mut out = Vec::new();
    let mut offset: Option<String> = None;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let page = client.list_page(path, tags, offset.as_deref()).await?;
        out.extend(page.data);
        let Some(next) = page.next_offset else { break };
        offset = Some(next);
    }
    Ok(out)
}

fn entity_id(v: &Value) -> Option<&str> {
    v.get("id").and_then(Value::as_str)
}

fn entity_tags(v: &Value) -> Vec<String> {
    v.get("tags")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn has_all_tags(v: &Value, want: &[String]) -> bool {
    let got = entity_tags(v);
    want.iter().all(|t| got.contains(t))
}

/// Unions `lookup` into `primary`, deduplicating by id; `primary` wins on
/// collision (§4.5 "look-up merge", scenario S1).
fn union_by_id(primary: Vec<Value>, lookup: Vec<Value>) -> Vec<Value> {
    let mut seen: std::collections::HashSet<String> =
        primary.iter().filter_map(|v| entity_id(v).map(str::to_string)).collect();
    let mut out = primary;
    for item in lookup {
        if let Some(id) = entity_id(&item) {
            if seen.insert(id.to_string()) {
                out.push(item);
            }
        }
    }
    out
}

pub struct Dumper {
    client: Arc<dyn AdminApiClient>,
    config: DumperConfig,
}

impl Dumper {
    pub fn new(client: Arc<dyn AdminApiClient>, config: DumperConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { client, config })
    }

    async fn list_kind(&self, path: &str, tags: &[String], cancel: &CancellationToken) -> Result<Vec<Value>> {
        match list_all_tagged(self.client.as_ref(), path, tags, cancel).await {
            Ok(rows) => Ok(rows),
            Err(e) => match classify(path, &e) {
                Classify::Empty => {
                    info!(path, "kind unavailable on this server, continuing with empty list");
                    Ok(Vec::new())
                }
                Classify::Fail => Err(e),
            },
        }
    }

    /// `rbacResourcesOnly` short-circuits every other kind (§4.5).
    async fn dump_rbac_only(&self, cancel: &CancellationToken) -> Result<RawState> {
        let mut state = RawState::default();
        state.rbac_roles = self.list_kind("rbac/roles", &[], cancel).await?;
        state.rbac_endpoint_permissions = self.fetch_role_permissions(&state.rbac_roles, cancel).await?;
        Ok(state)
    }

    async fn fetch_role_permissions(&self, roles: &[Value], cancel: &CancellationToken) -> Result<Vec<Value>> {
        let mut permissions = Vec::new();
        for role in roles {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if let Some(id) = entity_id(role) {
                let perms = self
                    .list_kind(&format!("rbac/roles/{id}/endpoint_permissions"), &[], cancel)
                    .await?;
                permissions.extend(perms);
            }
        }
        Ok(permissions)
    }

    async fn fetch_targets(&self, upstreams: &[Value], cancel: &CancellationToken) -> Result<Vec<Value>> {
        let mut targets = Vec::new();
        for upstream in upstreams {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if let Some(id) = entity_id(upstream) {
                let rows = list_all_tagged(self.client.as_ref(), &format!("upstreams/{id}/targets"), &[], cancel).await?;
                targets.extend(rows);
            }
        }
        Ok(targets)
    }

    /// Fetches each tag-filtered consumer group's detail view to obtain
    /// its embedded consumers and plugins, applying the tag filter to
    /// each consumer inline (§4.5 cross-entity fan-out).
    async fn fetch_consumer_group_details(
        &self,
        groups: &[Value],
        cancel: &CancellationToken,
    ) -> Result<(Vec<Value>, Vec<Value>)> {
        let mut consumer_links = Vec::new();
        let mut plugin_links = Vec::new();
        for group in groups {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let Some(group_id) = entity_id(group) else { continue };
            let detail = self.client.get_one(&format!("consumer_groups/{group_id}")).await?;
            let consumers = detail.get("consumers").and_then(Value::as_array).cloned().unwrap_or_default();
            let plugins = detail.get("plugins").and_then(Value::as_array).cloned().unwrap_or_default();
            for consumer in consumers {
                if has_all_tags(&consumer, &self.config.selector_tags) {
                    consumer_links.push(serde_json::json!({
                        "consumer_group": {"id": group_id},
                        "consumer": consumer,
                    }));
                }
            }
            for plugin in plugins {
                plugin_links.push(serde_json::json!({
                    "consumer_group": {"id": group_id},
                    "plugin": plugin,
                }));
            }
        }
        Ok((consumer_links, plugin_links))
    }

    /// Drops platform-managed plugins, and (when `skip_consumers`) plugins
    /// scoped to a consumer or consumer group (§4.5 plugin post-filtering).
    fn filter_plugins(&self, plugins: Vec<Value>) -> Vec<Value> {
        plugins
            .into_iter()
            .filter(|p| {
                let platform_managed = p
                    .pointer("/config/__config_source")
                    .and_then(Value::as_str)
                    == Some("konnect_managed");
                if platform_managed {
                    return false;
                }
                if self.config.skip_consumers {
                    let scoped = p.get("consumer").is_some() || p.get("consumer_group").is_some();
                    if scoped {
                        return false;
                    }
                }
                true
            })
            .collect()
    }

    /// Clears each certificate's embedded `snis` list; SNIs are dumped and
    /// indexed independently (scenario S6).
    fn strip_certificate_snis(certificates: Vec<Value>) -> Vec<Value> {
        certificates
            .into_iter()
            .map(|mut c| {
                if let Value::Object(map) = &mut c {
                    map.insert("snis".to_string(), Value::Array(Vec::new()));
                }
                c
            })
            .collect()
    }

    /// Runs a dump with an internally-owned cancellation token; no external
    /// caller can interrupt it mid-flight (invariant 7 is only exercisable
    /// through [`Dumper::dump_with_cancellation`]).
    pub async fn dump(&self) -> Result<RawState> {
        self.dump_with_cancellation(CancellationToken::new()).await
    }

    /// As [`Dumper::dump`], but driven by a caller-supplied token so the
    /// dump can be cancelled from outside — e.g. a timeout task, or a user
    /// abort signal. Every fan-out task and every cross-entity loop checks
    /// `cancel` at each suspension point; once cancelled, the dump returns
    /// only `Error::Cancelled` and never a partial `RawState` (§8 invariant 7).
    pub async fn dump_with_cancellation(&self, cancel: CancellationToken) -> Result<RawState> {
        if self.config.rbac_resources_only {
            return self.dump_rbac_only(&cancel).await;
        }

        #[derive(Clone)]
        enum Job {
            Primary(&'static str, &'static str),
            Lookup(&'static str, &'static str, Vec<String>),
            Credential(&'static str),
            Custom(String),
        }

        let mut jobs = vec![
            Job::Primary("services", "services"),
            Job::Primary("routes", "routes"),
            Job::Primary("plugins", "plugins"),
            Job::Primary("filter_chains", "filter-chains"),
            Job::Primary("certificates", "certificates"),
            Job::Primary("snis", "snis"),
            Job::Primary("upstreams", "upstreams"),
            Job::Primary("vaults", "vaults"),
            Job::Primary("keys", "keys"),
            Job::Primary("key_sets", "key-sets"),
            Job::Primary("partials", "partials"),
            Job::Primary("rbac_roles", "rbac/roles"),
        ];
        if !self.config.skip_ca_certs {
            jobs.push(Job::Primary("ca_certificates", "ca_certificates"));
        }
        if self.config.include_licenses {
            jobs.push(Job::Primary("licenses", "licenses"));
        }
        if !self.config.skip_consumers {
            jobs.push(Job::Primary("consumers", "consumers"));
            jobs.push(Job::Primary("consumer_groups", "consumer_groups"));
            for kind in CREDENTIAL_KINDS {
                jobs.push(Job::Credential(*kind));
            }
            if !self.config.is_konnect() {
                jobs.push(Job::Credential("oauth2"));
            }
        }
        if !self.config.look_up_selector_tags_services.is_empty() {
            jobs.push(Job::Lookup(
                "services",
                "services",
                self.config.look_up_selector_tags_services.clone(),
            ));
        }
        if !self.config.look_up_selector_tags_routes.is_empty() {
            jobs.push(Job::Lookup("routes", "routes", self.config.look_up_selector_tags_routes.clone()));
        }
        if !self.config.skip_consumers && !self.config.look_up_selector_tags_consumers.is_empty() {
            jobs.push(Job::Lookup(
                "consumers",
                "consumers",
                self.config.look_up_selector_tags_consumers.clone(),
            ));
        }
        if !self.config.skip_consumers && !self.config.look_up_selector_tags_consumer_groups.is_empty() {
            jobs.push(Job::Lookup(
                "consumer_groups",
                "consumer_groups",
                self.config.look_up_selector_tags_consumer_groups.clone(),
            ));
        }
        for t in &self.config.custom_entity_types {
            jobs.push(Job::Custom(t.clone()));
        }

        let mut set: JoinSet<Result<(String, Vec<Value>)>> = JoinSet::new();
        for job in jobs {
            let client = self.client.clone();
            let selector_tags = self.config.selector_tags.clone();
            let cancel = cancel.clone();
            set.spawn(async move {
                match job {
                    Job::Primary(slot, path) => {
                        let rows = list_all_tagged(client.as_ref(), path, &selector_tags, &cancel).await;
                        finish(path, slot.to_string(), rows)
                    }
                    Job::Lookup(slot, path, tags) => {
                        let rows = list_all_tagged(client.as_ref(), path, &tags, &cancel).await;
                        finish(path, format!("{slot}__lookup"), rows)
                    }
                    Job::Credential(kind) => {
                        let tags = if kind == "mtls-auth" { Vec::new() } else { selector_tags };
                        let rows = list_all_tagged(client.as_ref(), kind, &tags, &cancel).await;
                        finish(kind, format!("credential:{kind}"), rows)
                    }
                    Job::Custom(type_name) => {
                        let rows = list_all_tagged(client.as_ref(), &type_name, &selector_tags, &cancel).await;
                        finish(&type_name, format!("custom:{type_name}"), rows)
                    }
                }
            });
        }

        fn finish(path: &str, slot: String, rows: Result<Vec<Value>>) -> Result<(String, Vec<Value>)> {
            match rows {
                Ok(rows) => Ok((slot, rows)),
                Err(e) => match classify(path, &e) {
                    Classify::Empty => Ok((slot, Vec::new())),
                    Classify::Fail => Err(e),
                },
            }
        }

        let mut results: HashMap<String, Vec<Value>> = HashMap::new();
        let mut first_error = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok((slot, rows))) => {
                    results.insert(slot, rows);
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "dump task failed, cancelling remaining tasks");
                    cancel.cancel();
                    first_error.get_or_insert(e);
                }
                Err(join_err) => {
                    cancel.cancel();
                    first_error.get_or_insert(Error::ConfigInvalid(format!("dump task panicked: {join_err}")));
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let mut state = RawState::default();
        let take = |results: &mut HashMap<String, Vec<Value>>, key: &str| results.remove(key).unwrap_or_default();

        state.services = union_by_id(take(&mut results, "services"), take(&mut results, "services__lookup"));
        state.routes = union_by_id(take(&mut results, "routes"), take(&mut results, "routes__lookup"));
        state.plugins = self.filter_plugins(take(&mut results, "plugins"));
        state.filter_chains = take(&mut results, "filter_chains");
        state.certificates = Self::strip_certificate_snis(take(&mut results, "certificates"));
        state.snis = take(&mut results, "snis");
        state.upstreams = take(&mut results, "upstreams");
        state.vaults = take(&mut results, "vaults");
        state.keys = take(&mut results, "keys");
        state.key_sets = take(&mut results, "key_sets");
        state.partials = take(&mut results, "partials");
        state.ca_certificates = take(&mut results, "ca_certificates");
        state.licenses = take(&mut results, "licenses");
        state.rbac_roles = take(&mut results, "rbac_roles");

        if !self.config.skip_consumers {
            state.consumers = union_by_id(take(&mut results, "consumers"), take(&mut results, "consumers__lookup"));
            state.consumer_groups = union_by_id(
                take(&mut results, "consumer_groups"),
                take(&mut results, "consumer_groups__lookup"),
            );
            for kind in CREDENTIAL_KINDS.iter().copied().chain(std::iter::once("oauth2")) {
                if let Some(rows) = results.remove(&format!("credential:{kind}")) {
                    state.credentials.insert(kind, rows);
                }
            }
        }

        for t in &self.config.custom_entity_types {
            state
                .custom_entities
                .insert(t.clone(), results.remove(&format!("custom:{t}")).unwrap_or_default());
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        state.targets = self.fetch_targets(&state.upstreams, &cancel).await?;
        state.rbac_endpoint_permissions = self.fetch_role_permissions(&state.rbac_roles, &cancel).await?;
        if !self.config.skip_consumers {
            let (links, plugins) = self.fetch_consumer_group_details(&state.consumer_groups, &cancel).await?;
            state.consumer_group_consumers = links;
            state.consumer_group_plugins = plugins;
        }

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::transport::Page;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;

    struct FakeClient {
        pages: StdHashMap<String, Vec<Value>>,
        details: StdHashMap<String, Value>,
        status_overrides: StdHashMap<String, u16>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeClient {
        fn new() -> Self {
            Self {
                pages: StdHashMap::new(),
                details: StdHashMap::new(),
                status_overrides: StdHashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_rows(mut self, path: &str, rows: Vec<Value>) -> Self {
            self.pages.insert(path.to_string(), rows);
            self
        }

        fn with_status(mut self, path: &str, status: u16) -> Self {
            self.status_overrides.insert(path.to_string(), status);
            self
        }
    }

    #[async_trait]
    impl AdminApiClient for FakeClient {
        async fn list_page(&self, path: &str, tags: &[String], _offset: Option<&str>) -> Result<Page> {
            self.calls.lock().unwrap().push(path.to_string());
            if let Some(status) = self.status_overrides.get(path) {
                return Err(Error::UnexpectedStatus {
                    status: *status,
                    path: path.to_string(),
                });
            }
            let rows = self.pages.get(path).cloned().unwrap_or_default();
            let filtered = if tags.is_empty() {
                rows
            } else {
                rows.into_iter().filter(|r| has_all_tags(r, tags)).collect()
            };
            Ok(Page {
                data: filtered,
                next_offset: None,
            })
        }

        async fn get_one(&self, path: &str) -> Result<Value> {
            self.details
                .get(path)
                .cloned()
                .ok_or_else(|| Error::UnexpectedStatus {
                    status: 404,
                    path: path.to_string(),
                })
        }
    }

    fn svc(id: &str, tags: &[&str]) -> Value {
        serde_json::json!({"id": id, "name": id, "tags": tags})
    }

    #[tokio::test]
    async fn tag_union_dedupes_by_id_scenario_s1() {
        // Both the primary pass (tag "a") and the look-up pass (tag "b")
        // query the same endpoint; the fake filters by tag per call.
        let client = FakeClient::new().with_rows(
            "services",
            vec![svc("s1", &["a"]), svc("s2", &["b"]), svc("s3", &["a", "b"])],
        );
        let mut config = DumperConfig::default();
        config.selector_tags = vec!["a".to_string()];
        config.look_up_selector_tags_services = vec!["b".to_string()];
        let dumper = Dumper::new(Arc::new(client), config).unwrap();
        let state = dumper.dump().await.unwrap();
        let mut ids: Vec<_> = state.services.iter().filter_map(entity_id).map(str::to_string).collect();
        ids.sort();
        assert_eq!(ids, vec!["s1".to_string(), "s2".to_string(), "s3".to_string()]);
    }

    #[tokio::test]
    async fn not_found_on_optional_kind_yields_empty_list() {
        let client = FakeClient::new().with_status("ca_certificates", 404);
        let dumper = Dumper::new(Arc::new(client), DumperConfig::default()).unwrap();
        let state = dumper.dump().await.unwrap();
        assert!(state.ca_certificates.is_empty());
    }

    #[tokio::test]
    async fn forbidden_on_vaults_yields_empty_list() {
        let client = FakeClient::new().with_status("vaults", 403);
        let dumper = Dumper::new(Arc::new(client), DumperConfig::default()).unwrap();
        let state = dumper.dump().await.unwrap();
        assert!(state.vaults.is_empty());
    }

    #[tokio::test]
    async fn unclassified_error_fails_the_whole_dump() {
        let client = FakeClient::new().with_status("services", 500);
        let dumper = Dumper::new(Arc::new(client), DumperConfig::default()).unwrap();
        let err = dumper.dump().await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn rbac_resources_only_excludes_other_kinds() {
        let client = FakeClient::new().with_rows("rbac/roles", vec![serde_json::json!({"id": "r1"})]);
        let client = client.with_rows("rbac/roles/r1/endpoint_permissions", vec![serde_json::json!({"id": "p1"})]);
        let mut config = DumperConfig::default();
        config.rbac_resources_only = true;
        let dumper = Dumper::new(Arc::new(client), config).unwrap();
        let state = dumper.dump().await.unwrap();
        assert_eq!(state.rbac_roles.len(), 1);
        assert_eq!(state.rbac_endpoint_permissions.len(), 1);
        assert!(state.services.is_empty());
    }

    #[test]
    fn rbac_resources_only_with_selector_tags_is_invalid() {
        let mut config = DumperConfig::default();
        config.rbac_resources_only = true;
        config.selector_tags = vec!["prod".into()];
        assert!(matches!(config.validate(), Err(Error::ConfigInvalid(_))));
    }

    #[tokio::test]
    async fn certificate_snis_are_cleared_after_dump_scenario_s6() {
        let client = FakeClient::new().with_rows(
            "certificates",
            vec![serde_json::json!({"id": "c1", "cert": "x", "key": "y", "snis": ["sni1", "sni2"]})],
        );
        let dumper = Dumper::new(Arc::new(client), DumperConfig::default()).unwrap();
        let state = dumper.dump().await.unwrap();
        assert_eq!(state.certificates[0]["snis"], serde_json::json!([]));
    }

    /// Invariant 7: cancelling before the builder sees any rows yields only
    /// `Error::Cancelled`, never a partial `RawState`.
    #[tokio::test]
    async fn cancelling_before_dump_starts_yields_only_cancelled_error_invariant_7() {
        let client = FakeClient::new().with_rows("services", vec![svc("s1", &["a"])]);
        let dumper = Dumper::new(Arc::new(client), DumperConfig::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = dumper.dump_with_cancellation(cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    /// The per-upstream target fetch (`fetch_targets`) runs after the main
    /// fan-out and has its own `is_cancelled()` check; cancelling still
    /// surfaces only `Error::Cancelled`, never a `RawState` with targets
    /// half-populated.
    #[tokio::test]
    async fn cancelling_reaches_post_fan_out_cross_entity_fetch_invariant_7() {
        let client = FakeClient::new()
            .with_rows("upstreams", vec![serde_json::json!({"id": "u1", "name": "u1"})])
            .with_rows("upstreams/u1/targets", vec![serde_json::json!({"id": "t1", "target": "10.0.0.1:80"})]);
        let dumper = Dumper::new(Arc::new(client), DumperConfig::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = dumper.dump_with_cancellation(cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
