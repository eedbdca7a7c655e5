//! Dedicated store for open-ended custom entities.
//!
//! Custom entities are primary-keyed by the composite `(type, id)` pair
//! rather than a bare id (§3), which doesn't fit `Table<T>`'s single-id
//! model, so they get their own small store here instead of being forced
//! through it. `degraphql_routes` additionally needs a composite `(uri,
//! query)` secondary index, built from `DegraphqlRoute::uri_query_key()`.

use crate::entity::custom::{CustomEntity, DegraphqlRoute};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

fn composite(type_name: &str, id: &str) -> String {
    format!("{type_name}:{id}")
}

#[derive(Default)]
struct Inner {
    by_composite: HashMap<String, CustomEntity>,
    /// `degraphql_routes` only: `uri_query_key -> set of custom-entity ids`.
    degraphql_by_uri_query: HashMap<String, BTreeSet<String>>,
}

pub struct CustomStore {
    data: RwLock<Inner>,
}

impl CustomStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Inner::default()),
        }
    }

    pub fn add(&self, entity: CustomEntity) -> Result<()> {
        if entity.id.is_empty() {
            return Err(Error::IdRequired);
        }
        let key = composite(&entity.type_name, &entity.id);
        let mut guard = self.data.write();
        if guard.by_composite.contains_key(&key) {
            return Err(Error::already_exists("custom_entity", key));
        }
        if entity.type_name == DegraphqlRoute::TYPE_NAME {
            let decoded = DegraphqlRoute::decode(&entity)?;
            let uq = decoded.uri_query_key();
            if let Some(existing) = guard.degraphql_by_uri_query.get(&uq) {
                if !existing.is_empty() {
                    return Err(Error::already_exists(
                        "degraphql_route",
                        format!("uri+query={uq}"),
                    ));
                }
            }
            guard
                .degraphql_by_uri_query
                .entry(uq)
                .or_default()
                .insert(entity.id.clone());
        }
        guard.by_composite.insert(key, entity);
        Ok(())
    }

    pub fn get(&self, type_name: &str, id: &str) -> Result<CustomEntity> {
        self.data
            .read()
            .by_composite
            .get(&composite(type_name, id))
            .cloned()
            .ok_or_else(|| Error::not_found("custom_entity", composite(type_name, id)))
    }

    pub fn get_all_by_type(&self, type_name: &str) -> Vec<CustomEntity> {
        self.data
            .read()
            .by_composite
            .values()
            .filter(|e| e.type_name == type_name)
            .cloned()
            .collect()
    }

    /// All `degraphql_routes` custom entities sharing an MD5 `(uri, query)`
    /// digest, decoded to typed `DegraphqlRoute`s.
    pub fn degraphql_routes_by_uri_query(&self, uri_query_key: &str) -> Vec<DegraphqlRoute> {
        let guard = self.data.read();
        let Some(ids) = guard.degraphql_by_uri_query.get(uri_query_key) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| guard.by_composite.get(&composite(DegraphqlRoute::TYPE_NAME, id)))
            .filter_map(|raw| DegraphqlRoute::decode(raw).ok())
            .collect()
    }

    pub fn delete(&self, type_name: &str, id: &str) -> Result<CustomEntity> {
        let key = composite(type_name, id);
        let mut guard = self.data.write();
        let removed = guard
            .by_composite
            .remove(&key)
            .ok_or_else(|| Error::not_found("custom_entity", key))?;
        if removed.type_name == DegraphqlRoute::TYPE_NAME {
            if let Ok(decoded) = DegraphqlRoute::decode(&removed) {
                let uq = decoded.uri_query_key();
                if let Some(set) = guard.degraphql_by_uri_query.get_mut(&uq) {
                    set.remove(&removed.id);
                    if set.is_empty() {
                        guard.degraphql_by_uri_query.remove(&uq);
                    }
                }
            }
        }
        Ok(removed)
    }

    pub fn get_all(&self) -> Vec<CustomEntity> {
        self.data.read().by_composite.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.data.read().by_composite.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CustomStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::common::Timestamps;
    use serde_json::json;

    fn degraphql(id: &str, uri: &str, query: &str) -> CustomEntity {
        CustomEntity {
            id: id.to_string(),
            type_name: DegraphqlRoute::TYPE_NAME.to_string(),
            fields: json!({
                "service": {"id": "svc1"},
                "uri": uri,
                "query": query,
                "methods": ["GET"],
            })
            .as_object()
            .unwrap()
            .clone(),
            tags: vec![],
            timestamps: Timestamps::default(),
        }
    }

    #[test]
    fn composite_key_isolates_same_id_across_types() {
        let store = CustomStore::new();
        let mut a = degraphql("1", "/a", "{q}");
        a.type_name = "some_type".into();
        a.fields.clear();
        store.add(a).unwrap();
        store.add(degraphql("1", "/b", "{r}")).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn duplicate_uri_query_is_rejected() {
        let store = CustomStore::new();
        store.add(degraphql("1", "/foo", "{ q }")).unwrap();
        let err = store.add(degraphql("2", "/foo", "{ q }")).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[test]
    fn lookup_by_uri_query_key_decodes_route() {
        let store = CustomStore::new();
        store.add(degraphql("1", "/foo", "{ q }")).unwrap();
        let key = DegraphqlRoute {
            id: "1".into(),
            service: crate::entity::ForeignRef::new("svc1"),
            uri: "/foo".into(),
            query: "{ q }".into(),
            methods: vec![],
            tags: vec![],
        }
        .uri_query_key();
        let found = store.degraphql_routes_by_uri_query(&key);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].uri, "/foo");
    }
}
