//! JSON Schema validation of literal values against document schemas
//!
//! OpenAPI schemas reference each other through `#/components/schemas/...`,
//! so the schema under test is wrapped in a root that carries the document's
//! component index. Draft 7 is used because list-form `items` (tuples) is
//! only valid there.

use serde_json::{Value, json};

use crate::refs;

/// Whether `instance` satisfies `schema`, resolving local refs through `doc`.
///
/// A schema that fails to compile is treated as "not valid".
#[must_use]
pub fn validates(schema: &Value, doc: &Value, instance: &Value) -> bool {
    let Some(schema) = refs::deref(doc, schema) else {
        return false;
    };
    if schema.as_object().is_some_and(|o| o.is_empty()) {
        return true;
    }
    if instance.is_null() && schema.get("nullable").and_then(Value::as_bool) == Some(true) {
        return true;
    }
    match jsonschema::draft7::new(&bundle(schema, doc)) {
        Ok(validator) => validator.is_valid(instance),
        Err(e) => {
            tracing::debug!(error = %e, "schema did not compile, treating as invalid");
            false
        }
    }
}

/// Whether a standalone `schema` (no refs) compiles.
#[must_use]
pub fn compiles(schema: &Value) -> bool {
    jsonschema::draft7::new(schema).is_ok()
}

/// First validation error message, for diagnostics.
#[must_use]
pub fn first_error(schema: &Value, doc: &Value, instance: &Value) -> Option<String> {
    let schema = refs::deref(doc, schema)?;
    let validator = jsonschema::draft7::new(&bundle(schema, doc)).ok()?;
    validator
        .iter_errors(instance)
        .next()
        .map(|e| e.to_string())
}

fn bundle(schema: &Value, doc: &Value) -> Value {
    let schemas = doc
        .get("components")
        .and_then(|c| c.get("schemas"))
        .cloned()
        .unwrap_or_else(|| json!({}));
    json!({
        "allOf": [schema],
        "components": {"schemas": schemas}
    })
}
