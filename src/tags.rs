//! Selector-tag helpers (C7).
//!
//! Thin, typed wrappers over the plain merge/dedup/membership logic the
//! dumper needs when unioning a primary tag-filtered listing with a
//! look-up-tag-filtered one, or when checking whether an inline consumer
//! (fetched via a consumer-group's embedded listing) still carries every
//! selector tag.

use crate::entity::common::Entity;
use std::collections::HashSet;

/// `true` iff `tags` contains every tag in `required` (match-all semantics,
/// mirroring the server-side `match_all_tags=true` filter).
pub fn has_all(tags: &[String], required: &[String]) -> bool {
    if required.is_empty() {
        return true;
    }
    let have: HashSet<&str> = tags.iter().map(String::as_str).collect();
    required.iter().all(|t| have.contains(t.as_str()))
}

/// Add `tag` if absent; no-op (not a duplicate) if already present.
pub fn add(tags: &mut Vec<String>, tag: &str) {
    if !tags.iter().any(|t| t == tag) {
        tags.push(tag.to_string());
    }
}

/// Remove every occurrence of `tag`.
pub fn remove(tags: &mut Vec<String>, tag: &str) {
    tags.retain(|t| t != tag);
}

/// Union two listings of the same kind by entity ID, primary winning on
/// conflict (S1: primary tags `["a"]`, look-up tags `["b"]` — entities
/// carrying either survive, deduplicated by ID).
pub fn union_by_id<T: Entity + Clone>(primary: Vec<T>, lookup: Vec<T>) -> Vec<T> {
    let mut seen: HashSet<String> = primary.iter().map(|e| e.id().to_string()).collect();
    let mut merged = primary;
    for entity in lookup {
        if seen.insert(entity.id().to_string()) {
            merged.push(entity);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_all_matches_every_required_tag() {
        let tags = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert!(has_all(&tags, &["a".to_string(), "c".to_string()]));
        assert!(!has_all(&tags, &["a".to_string(), "z".to_string()]));
        assert!(has_all(&tags, &[]));
    }

    #[test]
    fn add_is_idempotent() {
        let mut tags = vec!["a".to_string()];
        add(&mut tags, "a");
        add(&mut tags, "b");
        assert_eq!(tags, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn remove_drops_all_occurrences() {
        let mut tags = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        remove(&mut tags, "a");
        assert_eq!(tags, vec!["b".to_string()]);
    }
}
