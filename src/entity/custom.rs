//! Open-ended custom entities, keyed by a declared type string.
//!
//! Per §9, represented generically as `(type, id, payload)` triples; known
//! types get a type-dispatched decoder in the builder that converts the
//! payload into a typed record (e.g. `DegraphqlRoute`) while still storing
//! the raw form for types nobody has written a decoder for.

use super::common::{tags_equal, EqualOpts, SemanticEq, Timestamps};
use crate::entity::Entity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CustomEntity {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub fields: serde_json::Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl CustomEntity {
    /// `(type, id)` is the primary key for custom entities (§3).
    pub fn composite_key(&self) -> (String, String) {
        (self.type_name.clone(), self.id.clone())
    }
}

impl Entity for CustomEntity {
    fn kind(&self) -> &'static str {
        "custom_entity"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl SemanticEq for CustomEntity {
    fn equal_with_opts(&self, other: &Self, opts: &EqualOpts) -> bool {
        (opts.ignore_id || self.id == other.id)
            && self.type_name == other.type_name
            && self.fields == other.fields
            && tags_equal(&self.tags, &other.tags)
            && (opts.ignore_timestamps || self.timestamps == other.timestamps)
    }
}

/// The one custom type this crate knows how to decode out of the box
/// (`degraphql_routes`), with its own composite `(uri, query)` secondary
/// index per §3.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DegraphqlRoute {
    pub id: String,
    pub service: super::common::ForeignRef,
    pub uri: String,
    pub query: String,
    pub methods: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DegraphqlRoute {
    /// MD5 of the concatenated `(uri, query)` fields — "collisions are not
    /// a design concern because inputs are short and cardinality low" (§4.1).
    pub fn uri_query_key(&self) -> String {
        let digest = md5::compute(format!("{}\0{}", self.uri, self.query));
        format!("{digest:x}")
    }

    pub const TYPE_NAME: &'static str = "degraphql_routes";

    /// Decodes a raw custom-entity payload into a typed `DegraphqlRoute`,
    /// returning `MalformedCustomEntity` (aborting the build, per §4.6) if a
    /// required field is missing or the wrong shape.
    pub fn decode(raw: &CustomEntity) -> crate::error::Result<Self> {
        let get_str = |field: &str| -> crate::error::Result<String> {
            raw.fields
                .get(field)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| crate::error::Error::MalformedCustomEntity {
                    type_name: raw.type_name.clone(),
                    reason: format!("missing or non-string field `{field}`"),
                })
        };

        let service_id = raw
            .fields
            .get("service")
            .and_then(|v| v.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| crate::error::Error::MalformedCustomEntity {
                type_name: raw.type_name.clone(),
                reason: "missing `service.id`".to_string(),
            })?
            .to_string();

        let methods = raw
            .fields
            .get("methods")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            id: raw.id.clone(),
            service: super::common::ForeignRef::new(service_id),
            uri: get_str("uri")?,
            query: get_str("query")?,
            methods,
            tags: raw.tags.clone(),
        })
    }
}

impl Entity for DegraphqlRoute {
    fn kind(&self) -> &'static str {
        "degraphql_route"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_missing_uri() {
        let raw = CustomEntity {
            id: "d1".into(),
            type_name: DegraphqlRoute::TYPE_NAME.into(),
            fields: serde_json::json!({
                "service": {"id": "svc1"},
                "query": "{ q }",
            })
            .as_object()
            .unwrap()
            .clone(),
            tags: vec![],
            timestamps: Timestamps::default(),
        };
        let err = DegraphqlRoute::decode(&raw).unwrap_err();
        assert!(matches!(err, crate::error::Error::MalformedCustomEntity { .. }));
    }

    #[test]
    fn uri_query_key_is_stable() {
        let a = DegraphqlRoute {
            id: "1".into(),
            service: super::super::common::ForeignRef::new("s"),
            uri: "/foo".into(),
            query: "{ q }".into(),
            methods: vec![],
            tags: vec![],
        };
        let b = a.clone();
        assert_eq!(a.uri_query_key(), b.uri_query_key());
    }
}
