//! Access control: RBAC roles and endpoint permissions.

use super::common::{foreign_eq, tags_equal, EqualOpts, ForeignRef, SemanticEq, Timestamps};
use super::proxy::sorted_string_sets_equal;
use crate::entity::Entity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RbacRole {
    pub id: String,
    pub name: Option<String>,
    pub comment: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Entity for RbacRole {
    fn kind(&self) -> &'static str {
        "rbac_role"
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

impl SemanticEq for RbacRole {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && self.name == other.name
            && self.comment == other.comment
            && tags_equal(&self.tags, &other.tags)
            && (opts.ignore_timestamps || self.timestamps == other.timestamps)
    }
}

/// Keyed by `(role-id, workspace, endpoint)`, per §3. Kong returns these
/// objects with no top-level `id`; the builder synthesizes one from
/// `composite_key()`, so both `id` and `role` must tolerate a missing or
/// malformed value on decode rather than aborting the whole dump.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RbacEndpointPermission {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub role: ForeignRef,
    pub workspace: String,
    pub endpoint: String,
    #[serde(default)]
    pub actions: Vec<String>,
    pub negative: Option<bool>,
    pub comment: Option<String>,
}

impl RbacEndpointPermission {
    pub fn composite_key(&self) -> String {
        format!("{}:{}:{}", self.role.id, self.workspace, self.endpoint)
    }
}

impl Entity for RbacEndpointPermission {
    fn kind(&self) -> &'static str {
        "rbac_endpoint_permission"
    }
    fn id(&self) -> &str {
        &self.id
    }
}

impl SemanticEq for RbacEndpointPermission {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && foreign_eq(&Some(self.role.clone()), &Some(other.role.clone()), opts)
            && self.workspace == other.workspace
            && self.endpoint == other.endpoint
            && sorted_string_sets_equal(&self.actions, &other.actions)
            && self.negative == other.negative
            && self.comment == other.comment
    }
}
