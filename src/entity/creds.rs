//! Consumer credentials.
//!
//! All seven credential kinds share the same store-level shape — an ID, an
//! owning consumer, a tag set, and a kind-specific payload — so they are
//! modeled as one `Credential` struct discriminated by `CredentialKind`
//! rather than seven near-identical structs. The endpoint key is derived
//! from the field the corresponding kind names it by on the wire.

use super::common::{foreign_eq, tags_equal, EqualOpts, ForeignRef, SemanticEq, Timestamps};
use crate::entity::Entity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    KeyAuth,
    HmacAuth,
    JwtAuth,
    BasicAuth,
    Oauth2,
    Acl,
    MtlsAuth,
}

impl CredentialKind {
    /// Name of the field on `fields` that serves as this kind's endpoint
    /// key ("the credential key/username/subject", §3).
    pub fn key_field(self) -> &'static str {
        match self {
            CredentialKind::KeyAuth => "key",
            CredentialKind::HmacAuth => "username",
            CredentialKind::JwtAuth => "key",
            CredentialKind::BasicAuth => "username",
            CredentialKind::Oauth2 => "client_id",
            CredentialKind::Acl => "group",
            CredentialKind::MtlsAuth => "subject_name",
        }
    }

    /// Plural path segment as used by the admin API (`/consumers/{c}/{plural}`).
    pub fn plural(self) -> &'static str {
        match self {
            CredentialKind::KeyAuth => "key-auth",
            CredentialKind::HmacAuth => "hmac-auth",
            CredentialKind::JwtAuth => "jwt",
            CredentialKind::BasicAuth => "basic-auth",
            CredentialKind::Oauth2 => "oauth2",
            CredentialKind::Acl => "acls",
            CredentialKind::MtlsAuth => "mtls-auth",
        }
    }

    /// mTLS-auth is dumped without tag filtering (§9: explicit asymmetry
    /// kept to avoid breaking untagged historical credentials).
    pub fn is_tag_filtered(self) -> bool {
        !matches!(self, CredentialKind::MtlsAuth)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub kind: CredentialKind,
    pub consumer: ForeignRef,
    #[serde(default)]
    pub fields: serde_json::Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Credential {
    pub fn new(kind: CredentialKind, id: impl Into<String>, consumer: ForeignRef) -> Self {
        Self {
            id: id.into(),
            kind,
            consumer,
            fields: serde_json::Map::new(),
            tags: Vec::new(),
            timestamps: Timestamps::default(),
        }
    }
}

impl Entity for Credential {
    fn kind(&self) -> &'static str {
        self.kind.plural()
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn endpoint_key(&self) -> Option<&str> {
        self.fields.get(self.kind.key_field()).and_then(Value::as_str)
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl SemanticEq for Credential {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && self.kind == other.kind
            && foreign_eq(&Some(self.consumer.clone()), &Some(other.consumer.clone()), opts)
            && self.fields == other.fields
            && tags_equal(&self.tags, &other.tags)
            && (opts.ignore_timestamps || self.timestamps == other.timestamps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_key_follows_kind() {
        let mut c = Credential::new(CredentialKind::HmacAuth, "c1", ForeignRef::new("cons1"));
        c.fields.insert("username".into(), Value::String("bob".into()));
        assert_eq!(c.endpoint_key(), Some("bob"));
    }
}
