//! Named schema refinements
//!
//! Each `change_*` operation narrows every schema an [`Address`] designates
//! and returns a new document. The schema-level functions they wrap are
//! public too; the state validator builds its overrides from them.

use serde_json::{Map, Value, json};

use crate::traversal::{self, Address, Selector};
use crate::validation;

// ---------------------------------------------------------------------------
// Response codes
// ---------------------------------------------------------------------------

/// Keep only responses whose code matches `codes`.
#[must_use]
pub fn include_codes(doc: &Value, address: &Address, codes: impl Into<Selector>) -> Value {
    let codes = codes.into();
    traversal::modify_responses(doc, address, |responses| {
        let mut kept = responses.clone();
        kept.retain(|code, _| codes.matches(code));
        kept
    })
}

/// Drop responses whose code matches `codes`.
#[must_use]
pub fn remove_codes(doc: &Value, address: &Address, codes: impl Into<Selector>) -> Value {
    let codes = codes.into();
    traversal::modify_responses(doc, address, |responses| {
        let mut kept = responses.clone();
        kept.retain(|code, _| !codes.matches(code));
        kept
    })
}

/// Copy the `default` response under each of `codes`.
///
/// `default` itself is kept, and codes already declared are left alone.
#[must_use]
pub fn map_default_to_codes<I>(doc: &Value, address: &Address, codes: I) -> Value
where
    I: IntoIterator,
    I::Item: ToString,
{
    let codes: Vec<String> = codes.into_iter().map(|c| c.to_string()).collect();
    traversal::modify_responses(doc, address, |responses| {
        let Some(default) = responses.get("default") else {
            return responses.clone();
        };
        let mut out = responses.clone();
        for code in &codes {
            if !out.contains_key(code) {
                out.insert(code.clone(), default.clone());
            }
        }
        out
    })
}

// ---------------------------------------------------------------------------
// Schema refinements
// ---------------------------------------------------------------------------

#[must_use]
pub fn change_min_items(doc: &Value, address: &Address, n: u64) -> Value {
    traversal::modify(doc, address, |s| min_items(s, n))
}

#[must_use]
pub fn change_max_items(doc: &Value, address: &Address, n: u64) -> Value {
    traversal::modify(doc, address, |s| max_items(s, n))
}

#[must_use]
pub fn change_required_status(doc: &Value, address: &Address, property: &str) -> Value {
    traversal::modify(doc, address, |s| required_status(s, property))
}

/// Intersect (`keep`) or subtract `values` from an existing `enum`.
#[must_use]
pub fn change_enum(doc: &Value, address: &Address, values: &[Value], keep: bool) -> Value {
    traversal::modify(doc, address, |s| enum_values(s, values, keep))
}

/// Pin each located schema to `value`, if `value` validates against it.
#[must_use]
pub fn change_to_const(doc: &Value, address: &Address, value: &Value) -> Value {
    traversal::modify(doc, address, |s| to_const(s, value, doc))
}

#[must_use]
pub fn change_list_to_tuple(doc: &Value, address: &Address, n: u64) -> Value {
    traversal::modify(doc, address, |s| list_to_tuple(s, n))
}

#[must_use]
pub fn one_of_keep(doc: &Value, address: &Address, indices: &[usize]) -> Value {
    traversal::modify(doc, address, |s| filter_variants(s, "oneOf", indices, true))
}

#[must_use]
pub fn one_of_reject(doc: &Value, address: &Address, indices: &[usize]) -> Value {
    traversal::modify(doc, address, |s| filter_variants(s, "oneOf", indices, false))
}

#[must_use]
pub fn any_of_keep(doc: &Value, address: &Address, indices: &[usize]) -> Value {
    traversal::modify(doc, address, |s| filter_variants(s, "anyOf", indices, true))
}

#[must_use]
pub fn any_of_reject(doc: &Value, address: &Address, indices: &[usize]) -> Value {
    traversal::modify(doc, address, |s| filter_variants(s, "anyOf", indices, false))
}

// ---------------------------------------------------------------------------
// Schema-level functions
// ---------------------------------------------------------------------------

/// Whether a schema describes an array (`type: array` or an `items` key).
#[must_use]
pub fn is_array_schema(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("array") || schema.get("items").is_some()
}

/// `minItems = max(existing, n)` on array schemas.
#[must_use]
pub fn min_items(schema: &Value, n: u64) -> Value {
    if !is_array_schema(schema) {
        return schema.clone();
    }
    let current = schema.get("minItems").and_then(Value::as_u64).unwrap_or(0);
    with_key(schema, "minItems", json!(current.max(n)))
}

/// `maxItems = min(existing, n)` on array schemas.
#[must_use]
pub fn max_items(schema: &Value, n: u64) -> Value {
    if !is_array_schema(schema) {
        return schema.clone();
    }
    let next = schema
        .get("maxItems")
        .and_then(Value::as_u64)
        .map_or(n, |current| current.min(n));
    with_key(schema, "maxItems", json!(next))
}

/// Add `property` to `required` when it is a declared property.
#[must_use]
pub fn required_status(schema: &Value, property: &str) -> Value {
    if schema
        .get("properties")
        .and_then(|p| p.get(property))
        .is_none()
    {
        return schema.clone();
    }
    let mut required: Vec<Value> = schema
        .get("required")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if required.iter().any(|r| r.as_str() == Some(property)) {
        return schema.clone();
    }
    required.push(json!(property));
    with_key(schema, "required", Value::Array(required))
}

#[must_use]
pub fn enum_values(schema: &Value, values: &[Value], keep: bool) -> Value {
    let Some(current) = schema.get("enum").and_then(Value::as_array) else {
        return schema.clone();
    };
    let filtered: Vec<Value> = current
        .iter()
        .filter(|v| values.contains(v) == keep)
        .cloned()
        .collect();
    with_key(schema, "enum", Value::Array(filtered))
}

/// Replace `schema` with the literal schema of `value` if `value` validates
/// against it (refs resolved through `doc`); otherwise leave it unchanged.
#[must_use]
pub fn to_const(schema: &Value, value: &Value, doc: &Value) -> Value {
    if validation::validates(schema, doc, value) {
        const_schema(value)
    } else {
        tracing::debug!(value = %value, "value does not satisfy schema, const not applied");
        schema.clone()
    }
}

/// The schema that admits exactly `value`.
///
/// Primitives become `{type, enum: [v]}`, arrays a tuple of element schemas
/// with `minItems = maxItems = len`, objects per-property literals with every
/// provided key required.
#[must_use]
pub fn const_schema(value: &Value) -> Value {
    match value {
        Value::Null => json!({"enum": [null], "nullable": true}),
        Value::Bool(_) => json!({"type": "boolean", "enum": [value]}),
        Value::Number(n) if n.is_i64() || n.is_u64() => {
            json!({"type": "integer", "enum": [value]})
        }
        Value::Number(_) => json!({"type": "number", "enum": [value]}),
        Value::String(_) => json!({"type": "string", "enum": [value]}),
        Value::Array(items) if items.is_empty() => {
            json!({"type": "array", "minItems": 0, "maxItems": 0})
        }
        Value::Array(items) => json!({
            "type": "array",
            "items": items.iter().map(const_schema).collect::<Vec<_>>(),
            "minItems": items.len(),
            "maxItems": items.len(),
        }),
        Value::Object(obj) => {
            let properties: Map<String, Value> = obj
                .iter()
                .map(|(k, v)| (k.clone(), const_schema(v)))
                .collect();
            let required: Vec<&String> = obj.keys().collect();
            json!({"type": "object", "properties": properties, "required": required})
        }
    }
}

/// Turn a list schema into an `n`-tuple of its item schema.
///
/// Only applies when `items` is a single schema and `n` lies within
/// `[minItems, maxItems]`.
#[must_use]
pub fn list_to_tuple(schema: &Value, n: u64) -> Value {
    let Some(items) = schema.get("items").filter(|i| i.is_object()) else {
        return schema.clone();
    };
    let min = schema.get("minItems").and_then(Value::as_u64).unwrap_or(0);
    let max = schema
        .get("maxItems")
        .and_then(Value::as_u64)
        .unwrap_or(u64::MAX);
    if n < min || n > max {
        return schema.clone();
    }
    let Ok(count) = usize::try_from(n) else {
        return schema.clone();
    };
    let mut out = with_key(schema, "minItems", json!(n));
    out["maxItems"] = json!(n);
    if count == 0 {
        if let Some(obj) = out.as_object_mut() {
            obj.remove("items");
        }
    } else {
        out["items"] = Value::Array(vec![items.clone(); count]);
    }
    out
}

/// Keep (or drop) the variants of `oneOf`/`anyOf` at `indices`, in order.
#[must_use]
pub fn filter_variants(schema: &Value, key: &str, indices: &[usize], keep: bool) -> Value {
    let Some(variants) = schema.get(key).and_then(Value::as_array) else {
        return schema.clone();
    };
    let filtered: Vec<Value> = variants
        .iter()
        .enumerate()
        .filter(|(i, _)| indices.contains(i) == keep)
        .map(|(_, v)| v.clone())
        .collect();
    with_key(schema, key, Value::Array(filtered))
}

fn with_key(schema: &Value, key: &str, value: Value) -> Value {
    let mut out = schema.clone();
    if let Some(obj) = out.as_object_mut() {
        obj.insert(key.to_string(), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use oasmock_core::Method;
    use proptest::prelude::*;

    use crate::traversal::PathSegment;

    fn doc() -> Value {
        json!({
            "paths": {"/pets": {"get": {"responses": {
                "200": {"content": {"application/json": {
                    "schema": {"$ref": "#/components/schemas/Pets"}
                }}},
                "404": {"content": {"application/json": {
                    "schema": {"$ref": "#/components/schemas/Error"}
                }}},
                "default": {"content": {"application/json": {
                    "schema": {"$ref": "#/components/schemas/Error"}
                }}}
            }}}},
            "components": {"schemas": {
                "Pet": {"type": "object", "required": ["id"], "properties": {
                    "id": {"type": "integer"},
                    "name": {"type": "string"},
                    "kind": {"type": "string", "enum": ["cat", "dog", "fish"]}
                }},
                "Pets": {"type": "array", "maxItems": 10,
                         "items": {"$ref": "#/components/schemas/Pet"}},
                "Error": {"type": "object", "properties": {"code": {"type": "integer"}}}
            }}
        })
    }

    fn pets_schema(d: &Value) -> &Value {
        &d["paths"]["/pets"]["get"]["responses"]["200"]["content"]["application/json"]["schema"]
    }

    fn codes(d: &Value) -> Vec<String> {
        d["paths"]["/pets"]["get"]["responses"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect()
    }

    #[test]
    fn include_and_remove_codes() {
        let d = doc();
        assert_eq!(codes(&include_codes(&d, &Address::new(), [200u16])), vec!["200"]);
        assert_eq!(
            codes(&remove_codes(&d, &Address::new(), "default")),
            vec!["200", "404"]
        );
        let none = include_codes(&d, &Address::new().method(Method::Post), [200u16]);
        assert_eq!(none, d);
    }

    #[test]
    fn include_codes_is_idempotent() {
        let d = doc();
        let once = include_codes(&d, &Address::new(), ["200", "404"]);
        let twice = include_codes(&once, &Address::new(), ["200", "404"]);
        assert_eq!(once, twice);
    }

    #[test]
    fn default_mapped_without_overwriting() {
        let d = json!({"paths": {"/x": {"get": {"responses": {
            "404": {"description": "explicit"},
            "default": {"description": "fallback"}
        }}}}});
        let out = map_default_to_codes(&d, &Address::new(), ["404", "500"]);
        let r = &out["paths"]["/x"]["get"]["responses"];
        assert_eq!(r["404"]["description"], "explicit");
        assert_eq!(r["500"]["description"], "fallback");
        assert_eq!(r["default"]["description"], "fallback");
    }

    #[test]
    fn min_and_max_items_only_touch_arrays() {
        let d = doc();
        let out = change_min_items(&d, &Address::new(), 2);
        assert_eq!(pets_schema(&out)["minItems"], 2);
        assert_eq!(pets_schema(&out)["type"], "array");
        // Error schemas are objects and stay referenced
        assert_eq!(
            out["paths"]["/pets"]["get"]["responses"]["404"],
            d["paths"]["/pets"]["get"]["responses"]["404"]
        );

        let out = change_max_items(&d, &Address::new(), 20);
        assert_eq!(pets_schema(&out)["maxItems"], 10);
        let out = change_max_items(&d, &Address::new(), 3);
        assert_eq!(pets_schema(&out)["maxItems"], 3);
    }

    #[test]
    fn required_status_needs_declared_property() {
        let d = doc();
        let address = Address::new().code(200u16).segment(PathSegment::ArrayItem);
        let out = change_required_status(&d, &address, "name");
        assert_eq!(pets_schema(&out)["items"]["required"], json!(["id", "name"]));
        let same = change_required_status(&d, &address, "owner");
        assert_eq!(same, d);
    }

    #[test]
    fn enum_keep_and_reject() {
        let d = doc();
        let address = Address::new()
            .code(200u16)
            .segments([PathSegment::ArrayItem, PathSegment::property("kind")]);
        let kept = change_enum(&d, &address, &[json!("dog"), json!("bird")], true);
        assert_eq!(
            pets_schema(&kept)["items"]["properties"]["kind"]["enum"],
            json!(["dog"])
        );
        let rejected = change_enum(&d, &address, &[json!("dog")], false);
        assert_eq!(
            pets_schema(&rejected)["items"]["properties"]["kind"]["enum"],
            json!(["cat", "fish"])
        );
        let no_enum = Address::new()
            .code(200u16)
            .segments([PathSegment::ArrayItem, PathSegment::property("name")]);
        assert_eq!(change_enum(&d, &no_enum, &[json!("x")], true), d);
    }

    #[test]
    fn const_schema_shapes() {
        assert_eq!(const_schema(&json!(3)), json!({"type": "integer", "enum": [3]}));
        assert_eq!(const_schema(&json!(1.5)), json!({"type": "number", "enum": [1.5]}));
        assert_eq!(const_schema(&json!("a")), json!({"type": "string", "enum": ["a"]}));
        assert_eq!(
            const_schema(&json!([1, "a"])),
            json!({"type": "array", "items": [
                {"type": "integer", "enum": [1]}, {"type": "string", "enum": ["a"]}
            ], "minItems": 2, "maxItems": 2})
        );
        assert_eq!(
            const_schema(&json!({"id": 1})),
            json!({"type": "object", "properties": {"id": {"type": "integer", "enum": [1]}},
                   "required": ["id"]})
        );
    }

    #[test]
    fn to_const_validates_first() {
        let d = doc();
        let address = Address::new().code(200u16);
        let value = json!([{"id": 1, "name": "Rex"}]);
        let out = change_to_const(&d, &address, &value);
        assert_eq!(pets_schema(&out), &const_schema(&value));

        let invalid = json!([{"id": "one"}]);
        assert_eq!(change_to_const(&d, &address, &invalid), d);
    }

    #[test]
    fn to_const_is_idempotent() {
        let d = doc();
        let address = Address::new().code(200u16);
        let value = json!([{"id": 1, "kind": "cat"}, {"id": 2, "name": "Tom"}]);
        let once = change_to_const(&d, &address, &value);
        let twice = change_to_const(&once, &address, &value);
        assert_eq!(once, twice);
    }

    #[test]
    fn list_to_tuple_respects_bounds() {
        let d = doc();
        let address = Address::new().code(200u16);
        let out = change_list_to_tuple(&d, &address, 2);
        let schema = pets_schema(&out);
        assert_eq!(schema["items"].as_array().unwrap().len(), 2);
        assert_eq!(schema["minItems"], 2);
        assert_eq!(schema["maxItems"], 2);

        assert_eq!(change_list_to_tuple(&d, &address, 11), d);
        // already a tuple
        assert_eq!(change_list_to_tuple(&out, &address, 2), out);
    }

    #[test]
    fn variant_filters_preserve_order() {
        let schema = json!({"oneOf": [{"title": "a"}, {"title": "b"}, {"title": "c"}]});
        assert_eq!(
            filter_variants(&schema, "oneOf", &[2, 0], true),
            json!({"oneOf": [{"title": "a"}, {"title": "c"}]})
        );
        assert_eq!(
            filter_variants(&schema, "oneOf", &[1], false),
            json!({"oneOf": [{"title": "a"}, {"title": "c"}]})
        );
        assert_eq!(filter_variants(&schema, "anyOf", &[0], true), schema);
    }

    proptest! {
        #[test]
        fn min_items_never_decreases(existing in proptest::option::of(0u64..50), n in 0u64..50) {
            let mut schema = json!({"type": "array", "items": {"type": "integer"}});
            if let Some(e) = existing {
                schema["minItems"] = json!(e);
            }
            let out = min_items(&schema, n);
            let result = out["minItems"].as_u64().unwrap();
            prop_assert!(result >= n);
            prop_assert!(result >= existing.unwrap_or(0));
        }

        #[test]
        fn max_items_never_increases(existing in proptest::option::of(0u64..50), n in 0u64..50) {
            let mut schema = json!({"type": "array"});
            if let Some(e) = existing {
                schema["maxItems"] = json!(e);
            }
            let out = max_items(&schema, n);
            let result = out["maxItems"].as_u64().unwrap();
            prop_assert!(result <= n);
            if let Some(e) = existing {
                prop_assert!(result <= e);
            }
        }

        #[test]
        fn include_and_remove_partition(picked in proptest::sample::subsequence(
            vec!["200", "201", "404", "500", "default"], 0..=5
        )) {
            let mut responses = Map::new();
            for code in ["200", "201", "404", "500", "default"] {
                responses.insert(code.to_string(), json!({"description": code}));
            }
            let d = json!({"paths": {"/x": {"get": {"responses": responses}}}});
            let selector: Vec<&str> = picked.clone();

            let inc = include_codes(&d, &Address::new(), selector.clone());
            let rem = remove_codes(&d, &Address::new(), selector);
            let inc_codes: Vec<String> = inc["paths"]["/x"]["get"]["responses"]
                .as_object().unwrap().keys().cloned().collect();
            let rem_codes: Vec<String> = rem["paths"]["/x"]["get"]["responses"]
                .as_object().unwrap().keys().cloned().collect();

            prop_assert!(inc_codes.iter().all(|c| !rem_codes.contains(c)));
            let mut union: Vec<String> = inc_codes.into_iter().chain(rem_codes).collect();
            union.sort();
            let mut all: Vec<String> = responses.keys().cloned().collect();
            all.sort();
            prop_assert_eq!(union, all);
        }
    }
}
