//! Generic multi-indexed table (C1).
//!
//! One `Table<T>` per entity kind. Holds the primary `id` index, an
//! optional unique endpoint-key index, and any number of named secondary
//! indexes registered at construction time — each either a plain foreign
//! index (`GetAllBy...`) or a composite unique index (e.g. a target's
//! `(upstream_id, target)` pair). A single `parking_lot::RwLock` guards one
//! table's maps; distinct kinds never contend on each other (§5: "tasks do
//! not share mutable state except through the indexed store").

use crate::entity::Entity;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// A function that extracts a secondary-index key from an entity, e.g.
/// "this route's service id" or "this target's `upstream_id:target`
/// composite". Returns `None` when the entity doesn't participate in that
/// index (optional foreign key absent).
pub type IndexFn<T> = Box<dyn Fn(&T) -> Option<String> + Send + Sync>;

struct SecondaryIndex<T> {
    name: &'static str,
    extractor: IndexFn<T>,
    unique: bool,
    entries: HashMap<String, BTreeSet<String>>,
}

struct Indexes<T> {
    by_id: HashMap<String, T>,
    /// Populated only for kinds with an endpoint key; `None` means "this
    /// kind has no unique endpoint-key index at all" vs. an entry simply
    /// being absent when the field is unset (§4.1: "allow-missing").
    by_key: Option<HashMap<String, String>>,
    secondary: Vec<SecondaryIndex<T>>,
}

pub struct Table<T> {
    kind: &'static str,
    data: RwLock<Indexes<T>>,
}

impl<T: Entity + Clone> Table<T> {
    pub fn new(kind: &'static str, has_endpoint_key: bool) -> Self {
        Self {
            kind,
            data: RwLock::new(Indexes {
                by_id: HashMap::new(),
                by_key: has_endpoint_key.then(HashMap::new),
                secondary: Vec::new(),
            }),
        }
    }

    /// Registers a non-unique foreign-key index (`GetAllBy...`). Must be
    /// called before any rows are inserted.
    pub fn with_index(
        mut self,
        name: &'static str,
        extractor: impl Fn(&T) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.data.get_mut().secondary.push(SecondaryIndex {
            name,
            extractor: Box::new(extractor),
            unique: false,
            entries: HashMap::new(),
        });
        self
    }

    /// Registers a composite unique index (e.g. `(upstream_id, target)`,
    /// `(consumer_id, credential_key)`, `(role_id, workspace, endpoint)`).
    /// A collision on this index is an `AlreadyExists`, same as the
    /// endpoint-key index.
    pub fn with_unique_index(
        mut self,
        name: &'static str,
        extractor: impl Fn(&T) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.data.get_mut().secondary.push(SecondaryIndex {
            name,
            extractor: Box::new(extractor),
            unique: true,
            entries: HashMap::new(),
        });
        self
    }

    fn check_unique(&self, guard: &Indexes<T>, entity: &T, skip_id: Option<&str>) -> Result<()> {
        if let Some(by_key) = &guard.by_key {
            if let Some(key) = entity.endpoint_key() {
                if let Some(existing_id) = by_key.get(key) {
                    if Some(existing_id.as_str()) != skip_id {
                        return Err(Error::already_exists(self.kind, key));
                    }
                }
            }
        }
        for index in guard.secondary.iter().filter(|i| i.unique) {
            if let Some(key) = (index.extractor)(entity) {
                if let Some(ids) = index.entries.get(&key) {
                    if ids.iter().any(|id| Some(id.as_str()) != skip_id) {
                        return Err(Error::already_exists(
                            self.kind,
                            format!("{}={key}", index.name),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// `Add(e)` — validates ID, searches every unique index the entity
    /// would occupy, inserts if clear.
    pub fn add(&self, entity: T) -> Result<()> {
        if entity.id().is_empty() {
            return Err(Error::IdRequired);
        }
        let mut guard = self.data.write();
        if guard.by_id.contains_key(entity.id()) {
            return Err(Error::already_exists(self.kind, entity.id()));
        }
        self.check_unique(&guard, &entity, None)?;
        self.insert_unchecked(&mut guard, entity);
        Ok(())
    }

    /// `AddIgnoringDuplicates(e)` — no-op (not an error) when the ID or
    /// endpoint key already exists; otherwise delegates to `Add`'s full
    /// uniqueness check (§4.1), so a composite-unique secondary index
    /// (`upstream_target`, `consumer_key`, `role_workspace_endpoint`) still
    /// rejects a second row under a different ID.
    pub fn add_ignoring_duplicates(&self, entity: T) -> Result<()> {
        if entity.id().is_empty() {
            return Err(Error::IdRequired);
        }
        let mut guard = self.data.write();
        if guard.by_id.contains_key(entity.id()) {
            return Ok(());
        }
        if let Some(by_key) = &guard.by_key {
            if let Some(key) = entity.endpoint_key() {
                if by_key.contains_key(key) {
                    return Ok(());
                }
            }
        }
        self.check_unique(&guard, &entity, None)?;
        self.insert_unchecked(&mut guard, entity);
        Ok(())
    }

    fn insert_unchecked(&self, guard: &mut Indexes<T>, entity: T) {
        let id = entity.id().to_string();
        if let Some(by_key) = guard.by_key.as_mut() {
            if let Some(key) = entity.endpoint_key() {
                by_key.insert(key.to_string(), id.clone());
            }
        }
        for index in guard.secondary.iter_mut() {
            if let Some(fk) = (index.extractor)(&entity) {
                index.entries.entry(fk).or_default().insert(id.clone());
            }
        }
        guard.by_id.insert(id, entity);
    }

    fn remove_from_indexes(&self, guard: &mut Indexes<T>, entity: &T) {
        if let Some(by_key) = guard.by_key.as_mut() {
            if let Some(key) = entity.endpoint_key() {
                by_key.remove(key);
            }
        }
        for index in guard.secondary.iter_mut() {
            if let Some(fk) = (index.extractor)(entity) {
                if let Some(set) = index.entries.get_mut(&fk) {
                    set.remove(entity.id());
                    if set.is_empty() {
                        index.entries.remove(&fk);
                    }
                }
            }
        }
    }

    /// Probes `name`, then `id`, mirroring the kind-defined lookup order
    /// in §4.1. Returns a deep copy (invariant 2 / 5).
    pub fn get(&self, name_or_id: &str) -> Result<T> {
        let guard = self.data.read();
        if let Some(by_key) = &guard.by_key {
            if let Some(id) = by_key.get(name_or_id) {
                return Ok(guard.by_id[id].clone());
            }
        }
        guard
            .by_id
            .get(name_or_id)
            .cloned()
            .ok_or_else(|| Error::not_found(self.kind, name_or_id))
    }

    pub fn try_get(&self, name_or_id: &str) -> Option<T> {
        self.get(name_or_id).ok()
    }

    /// All entities matching a secondary index registered with
    /// `with_index`/`with_unique_index`.
    pub fn get_all_by(&self, index_name: &str, fk: &str) -> Vec<T> {
        let guard = self.data.read();
        let Some(index) = guard.secondary.iter().find(|i| i.name == index_name) else {
            return Vec::new();
        };
        index
            .entries
            .get(fk)
            .map(|ids| ids.iter().filter_map(|id| guard.by_id.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// The single entity matching a unique composite index, if any.
    pub fn get_by_unique(&self, index_name: &str, fk: &str) -> Option<T> {
        self.get_all_by(index_name, fk).into_iter().next()
    }

    /// `Update(e)` — delete-by-id then insert, with all uniqueness checks
    /// re-run against the *new* row before any index is mutated, so a
    /// collision leaves the table untouched (§4.1).
    pub fn update(&self, entity: T) -> Result<()> {
        if entity.id().is_empty() {
            return Err(Error::IdRequired);
        }
        let mut guard = self.data.write();
        if !guard.by_id.contains_key(entity.id()) {
            return Err(Error::not_found(self.kind, entity.id()));
        }
        self.check_unique(&guard, &entity, Some(entity.id()))?;
        let old = guard.by_id.get(entity.id()).cloned().expect("checked above");
        self.remove_from_indexes(&mut guard, &old);
        guard.by_id.remove(entity.id());
        self.insert_unchecked(&mut guard, entity);
        Ok(())
    }

    pub fn delete(&self, name_or_id: &str) -> Result<T> {
        let mut guard = self.data.write();
        let id = if guard.by_id.contains_key(name_or_id) {
            name_or_id.to_string()
        } else if let Some(id) = guard.by_key.as_ref().and_then(|k| k.get(name_or_id)).cloned() {
            id
        } else {
            return Err(Error::not_found(self.kind, name_or_id));
        };
        let removed = guard.by_id.remove(&id).expect("id resolved above");
        self.remove_from_indexes(&mut guard, &removed);
        Ok(removed)
    }

    pub fn get_all(&self) -> Vec<T> {
        self.data.read().by_id.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.data.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::proxy::{Target, Route};

    fn route(id: &str, name: &str, service: Option<&str>) -> Route {
        Route {
            id: id.to_string(),
            name: Some(name.to_string()),
            service: service.map(crate::entity::ForeignRef::new),
            ..Default::default()
        }
    }

    fn routes_table() -> Table<Route> {
        Table::new("route", true).with_index("service_id", |r: &Route| {
            r.service.as_ref().map(|s| s.id.clone())
        })
    }

    fn target(id: &str, upstream: &str, target: &str) -> Target {
        Target {
            id: id.to_string(),
            upstream: crate::entity::ForeignRef::new(upstream),
            target: target.to_string(),
            ..Default::default()
        }
    }

    fn targets_table() -> Table<Target> {
        Table::new("target", false)
            .with_index("upstream_id", |t: &Target| Some(t.upstream.id.clone()))
            .with_unique_index("upstream_target", |t: &Target| {
                Some(format!("{}:{}", t.upstream.id, t.target))
            })
    }

    #[test]
    fn duplicate_endpoint_key_is_rejected() {
        let t = routes_table();
        t.add(route("r1", "foo", None)).unwrap();
        let err = t.add(route("r2", "foo", None)).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[test]
    fn get_returns_deep_copy() {
        let t = routes_table();
        t.add(route("r1", "foo", None)).unwrap();
        let mut got = t.get("foo").unwrap();
        got.name = Some("mutated".to_string());
        let got_again = t.get("r1").unwrap();
        assert_eq!(got_again.name.as_deref(), Some("foo"));
    }

    #[test]
    fn get_all_by_secondary_index() {
        let t = routes_table();
        t.add(route("r1", "a", Some("svc1"))).unwrap();
        t.add(route("r2", "b", Some("svc1"))).unwrap();
        t.add(route("r3", "c", Some("svc2"))).unwrap();
        let mut ids: Vec<_> = t
            .get_all_by("service_id", "svc1")
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["r1".to_string(), "r2".to_string()]);
    }

    #[test]
    fn update_colliding_with_another_row_fails_and_leaves_table_untouched() {
        let t = routes_table();
        t.add(route("r1", "a", None)).unwrap();
        t.add(route("r2", "b", None)).unwrap();
        let err = t.update(route("r2", "a", None)).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
        assert_eq!(t.get("r2").unwrap().name.as_deref(), Some("b"));
        assert_eq!(t.get("a").unwrap().id, "r1");
    }

    #[test]
    fn delete_removes_from_secondary_index() {
        let t = routes_table();
        t.add(route("r1", "a", Some("svc1"))).unwrap();
        t.delete("r1").unwrap();
        assert!(t.get_all_by("service_id", "svc1").is_empty());
        assert!(matches!(t.get("a").unwrap_err(), Error::NotFound { .. }));
    }

    #[test]
    fn composite_unique_index_rejects_same_upstream_and_target_string() {
        let t = targets_table();
        t.add(target("t1", "up1", "10.0.0.1:80")).unwrap();
        let err = t.add(target("t2", "up1", "10.0.0.1:80")).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
        // Same target string under a different upstream is fine.
        t.add(target("t3", "up2", "10.0.0.1:80")).unwrap();
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn add_ignoring_duplicates_still_enforces_composite_unique_index() {
        let t = targets_table();
        t.add_ignoring_duplicates(target("t1", "up1", "10.0.0.1:80")).unwrap();
        // Distinct id, same (upstream, target) composite key: must still
        // be rejected, not silently inserted as a second row (§4.1).
        let err = t
            .add_ignoring_duplicates(target("t2", "up1", "10.0.0.1:80"))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
        assert_eq!(t.len(), 1);
    }
}
