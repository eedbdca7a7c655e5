//! Fields and helpers shared by every entity kind.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Options controlling `EqualWithOpts`'s three levers (see §4.2), plus the
/// schema a caller comparing plugin configs may supply so set-typed config
/// arrays are compared order-insensitively (§4.2, §9). A diff engine built
/// on this crate fetches the relevant plugin schema via `SchemaRegistry`
/// once and passes it in here for every pair of plugins it compares by name;
/// when absent, every config array falls back to unconditional sorting.
#[derive(Debug, Clone, Default)]
pub struct EqualOpts {
    pub ignore_id: bool,
    pub ignore_timestamps: bool,
    pub ignore_foreign: bool,
    pub plugin_config_schema: Option<Arc<Value>>,
}

impl EqualOpts {
    pub fn strict() -> Self {
        Self::default()
    }

    pub fn ignoring_id() -> Self {
        Self {
            ignore_id: true,
            ..Default::default()
        }
    }
}

/// A reference to another entity, carried as a bare ID until the builder
/// rehydrates it with the parent's endpoint key (§4.6). Two refs compare
/// equal by ID alone — the denormalized `name` is cosmetic.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ForeignRef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ForeignRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    pub fn with_name(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }
}

impl PartialEq for ForeignRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Creation/update timestamps. Never participate in equality under the
/// default comparison mode (§3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Timestamps {
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
}

/// Every entity kind implements this to expose the universal attributes
/// the store and the dumper's tag filtering operate on.
pub trait Entity {
    /// The kind name used in error messages and cache keys (e.g. `"service"`).
    fn kind(&self) -> &'static str;

    fn id(&self) -> &str;

    /// Human-friendly second identifier (`name`, `username`, `cert`, ...),
    /// absent for kinds with no endpoint key or when unset on this row.
    fn endpoint_key(&self) -> Option<&str> {
        None
    }

    fn tags(&self) -> &[String] {
        &[]
    }

    /// `endpoint_key()` if set, else `id()` — used by the diff consumer to
    /// name this entity in human-readable output.
    fn identifier(&self) -> &str {
        self.endpoint_key().unwrap_or_else(|| self.id())
    }
}

/// Structural equality with the three levers from §4.2. Implemented per
/// kind because the fields that matter (and how foreign refs are handled)
/// differ per kind; the blanket tag/array-set handling lives in
/// [`tags_equal`] and [`crate::strip::sorted_sets_equal`] and is called out
/// of each impl.
pub trait SemanticEq {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool;
}

/// Tags compared as sets: sort both sides before comparing (invariant 3).
pub fn tags_equal(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

/// Foreign refs compare by ID only, and are skipped entirely when
/// `opts.ignore_foreign` is set (e.g. the diff engine comparing a
/// locally-authored entity that has no denormalized parent yet).
pub fn foreign_eq(a: &Option<ForeignRef>, b: &Option<ForeignRef>, opts: &EqualOpts) -> bool {
    if opts.ignore_foreign {
        return true;
    }
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => x.id == y.id,
        _ => false,
    }
}
