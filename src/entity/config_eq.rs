//! Schema-driven configuration equality (§4.2).
//!
//! Plugin (and partial) `config` is an opaque JSON tree fetched from a
//! server that may reorder array-valued fields on the wire. A field the
//! schema declares `type: "set"` is reordering-tolerant and must be sorted
//! before comparison; a field holding an ordered array of records must not
//! be — reordering two differently-configured upstream targets, say, is a
//! real change. Absent a schema (§9, the documented ambiguity), every array
//! is sorted, matching the source's legacy no-schema behavior.

use serde_json::Value;

/// Looks up the field-level schema node for `name` in a gateway `fields`
/// list-of-singleton-maps or a Konnect `properties` object.
fn field_schema<'a>(schema: &'a Value, name: &str) -> Option<&'a Value> {
    if let Some(fields) = schema.get("fields").and_then(Value::as_array) {
        fields.iter().find_map(|entry| entry.as_object()?.get(name))
    } else {
        schema.get("properties").and_then(|p| p.get(name))
    }
}

fn is_set_field(field: &Value) -> bool {
    field.get("type").and_then(Value::as_str) == Some("set")
}

fn is_record_elements(field: &Value) -> bool {
    field
        .get("elements")
        .and_then(|e| e.get("type"))
        .and_then(Value::as_str)
        == Some("record")
}

fn sort_key(v: &Value) -> String {
    serde_json::to_string(v).unwrap_or_default()
}

/// Recursively compares two config trees. `schema` is the field-container
/// node (the `fields`/`properties` holder) for the level being compared;
/// `None` means "no schema available here", which sorts every array found
/// beneath this point regardless of declared type.
pub fn config_equal(a: &Value, b: &Value, schema: Option<&Value>) -> bool {
    match (a, b) {
        (Value::Object(am), Value::Object(bm)) => {
            if am.len() != bm.len() {
                return false;
            }
            am.iter().all(|(k, av)| {
                let Some(bv) = bm.get(k) else { return false };
                let field = schema.and_then(|s| field_schema(s, k));
                compare_field(av, bv, field)
            })
        }
        (Value::Array(aa), Value::Array(ba)) => compare_as_set(aa, ba, None),
        _ => a == b,
    }
}

fn compare_field(a: &Value, b: &Value, field: Option<&Value>) -> bool {
    match (a, b) {
        (Value::Array(aa), Value::Array(ba)) => {
            let treat_as_set = field.map(is_set_field).unwrap_or(true);
            let record_elements = field.is_some_and(is_record_elements);
            let element_schema = field.and_then(|f| f.get("elements"));
            if treat_as_set && !record_elements {
                compare_as_set(aa, ba, element_schema)
            } else {
                aa.len() == ba.len()
                    && aa.iter().zip(ba).all(|(x, y)| config_equal(x, y, element_schema))
            }
        }
        (Value::Object(_), Value::Object(_)) => {
            let nested = field.filter(|f| f.get("fields").is_some() || f.get("properties").is_some());
            config_equal(a, b, nested.or(field))
        }
        _ => a == b,
    }
}

fn compare_as_set(a: &[Value], b: &[Value], element_schema: Option<&Value>) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut sa: Vec<&Value> = a.iter().collect();
    let mut sb: Vec<&Value> = b.iter().collect();
    sa.sort_by_key(|v| sort_key(v));
    sb.sort_by_key(|v| sort_key(v));
    sa.iter().zip(sb.iter()).all(|(x, y)| config_equal(x, y, element_schema))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn no_schema_sorts_every_array() {
        let a = json!({"hosts": ["a", "b", "c"]});
        let b = json!({"hosts": ["c", "a", "b"]});
        assert!(config_equal(&a, &b, None));
    }

    #[test]
    fn schema_declared_set_tolerates_reorder() {
        let schema = json!({"fields": [{"protocols": {"type": "set"}}]});
        let a = json!({"protocols": ["http", "https"]});
        let b = json!({"protocols": ["https", "http"]});
        assert!(config_equal(&a, &b, Some(&schema)));
    }

    #[test]
    fn schema_declared_array_of_records_preserves_order() {
        let schema = json!({
            "fields": [
                {"targets": {"type": "array", "elements": {"type": "record"}}}
            ]
        });
        let a = json!({"targets": [{"host": "a"}, {"host": "b"}]});
        let b = json!({"targets": [{"host": "b"}, {"host": "a"}]});
        assert!(!config_equal(&a, &b, Some(&schema)));
        assert!(config_equal(&a, &a, Some(&schema)));
    }

    #[test]
    fn plain_scalar_array_without_set_declaration_is_order_sensitive() {
        let schema = json!({"fields": [{"hosts": {"type": "array", "elements": {"type": "string"}}}]});
        let a = json!({"hosts": ["a", "b"]});
        let b = json!({"hosts": ["b", "a"]});
        assert!(!config_equal(&a, &b, Some(&schema)));
    }

    #[test]
    fn differing_values_are_unequal() {
        let a = json!({"timeout": 5000});
        let b = json!({"timeout": 6000});
        assert!(!config_equal(&a, &b, None));
    }
}
