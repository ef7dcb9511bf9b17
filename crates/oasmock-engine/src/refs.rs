//! Local `$ref` resolution against a document's `components`
//!
//! Only `#/components/<kind>/<name>` references are understood. Resolution
//! never fails loudly: a dangling reference resolves to `None` and the caller
//! decides whether that is fatal.

use serde_json::Value;

/// Maximum chain length for transitive dereferencing and inlining depth.
const MAX_DEPTH: u32 = 32;

/// Component section a reference points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Schemas,
    Parameters,
    Responses,
    RequestBodies,
    Headers,
}

impl ComponentKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Schemas => "schemas",
            Self::Parameters => "parameters",
            Self::Responses => "responses",
            Self::RequestBodies => "requestBodies",
            Self::Headers => "headers",
        }
    }

    #[must_use]
    pub fn parse(section: &str) -> Option<Self> {
        match section {
            "schemas" => Some(Self::Schemas),
            "parameters" => Some(Self::Parameters),
            "responses" => Some(Self::Responses),
            "requestBodies" => Some(Self::RequestBodies),
            "headers" => Some(Self::Headers),
            _ => None,
        }
    }
}

/// Split `#/components/<kind>/<name>` into its kind and (pointer-decoded) name.
#[must_use]
pub fn parse_ref(ref_str: &str) -> Option<(ComponentKind, String)> {
    let pointer = ref_str.strip_prefix("#/")?;
    let mut segments = pointer.split('/');
    if segments.next()? != "components" {
        return None;
    }
    let kind = ComponentKind::parse(segments.next()?)?;
    let name = decode_pointer_segment(segments.next()?);
    if segments.next().is_some() || name.is_empty() {
        return None;
    }
    Some((kind, name))
}

/// Decodes a JSON Pointer segment (handles `~1` and `~0`).
fn decode_pointer_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// The `$ref` string of a reference object, if `value` is one.
#[must_use]
pub fn ref_of(value: &Value) -> Option<&str> {
    value.get("$ref").and_then(Value::as_str)
}

/// Look up `components.<kind>.<name>` in `doc`.
#[must_use]
pub fn resolve<'a>(doc: &'a Value, kind: ComponentKind, name: &str) -> Option<&'a Value> {
    doc.get("components")?.get(kind.as_str())?.get(name)
}

/// Resolve a reference string in one step.
#[must_use]
pub fn resolve_ref<'a>(doc: &'a Value, ref_str: &str) -> Option<&'a Value> {
    let (kind, name) = parse_ref(ref_str)?;
    resolve(doc, kind, &name)
}

/// Follow references from `value` until a non-reference is reached.
///
/// Non-reference values are returned as-is. Returns `None` on a dangling
/// reference or a chain longer than [`MAX_DEPTH`].
#[must_use]
pub fn deref<'a>(doc: &'a Value, value: &'a Value) -> Option<&'a Value> {
    let mut current = value;
    for _ in 0..MAX_DEPTH {
        match ref_of(current) {
            Some(ref_str) => current = resolve_ref(doc, ref_str)?,
            None => return Some(current),
        }
    }
    None
}

/// Recursively replace every resolvable `$ref` in `value` with its target.
///
/// Produces a self-contained value suitable for sampling. Dangling references
/// are left in place. Depth-limited to guard against accidental cycles.
#[must_use]
pub fn inline_refs(value: &Value, doc: &Value) -> Value {
    inline_refs_inner(value, doc, 0)
}

fn inline_refs_inner(value: &Value, doc: &Value, depth: u32) -> Value {
    if depth > MAX_DEPTH {
        return value.clone();
    }
    match value {
        Value::Object(obj) => {
            if let Some(ref_str) = obj.get("$ref").and_then(Value::as_str) {
                if let Some(resolved) = resolve_ref(doc, ref_str) {
                    return inline_refs_inner(resolved, doc, depth + 1);
                }
                return value.clone();
            }
            Value::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), inline_refs_inner(v, doc, depth + 1)))
                    .collect(),
            )
        }
        Value::Array(arr) => Value::Array(
            arr.iter()
                .map(|v| inline_refs_inner(v, doc, depth + 1))
                .collect(),
        ),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "components": {
                "schemas": {
                    "Pet": {"type": "object", "properties": {"id": {"type": "integer"}}},
                    "Alias": {"$ref": "#/components/schemas/Pet"},
                    "Pets": {"type": "array", "items": {"$ref": "#/components/schemas/Pet"}},
                    "a/b": {"type": "string"}
                },
                "responses": {
                    "NotFound": {"description": "missing"}
                }
            }
        })
    }

    #[test]
    fn parse_ref_extracts_kind_and_name() {
        assert_eq!(
            parse_ref("#/components/schemas/Pet"),
            Some((ComponentKind::Schemas, "Pet".to_string()))
        );
        assert_eq!(
            parse_ref("#/components/requestBodies/NewPet"),
            Some((ComponentKind::RequestBodies, "NewPet".to_string()))
        );
        assert_eq!(
            parse_ref("#/components/schemas/a~1b"),
            Some((ComponentKind::Schemas, "a/b".to_string()))
        );
    }

    #[test]
    fn parse_ref_rejects_non_component_refs() {
        assert_eq!(parse_ref("other.yaml#/components/schemas/Pet"), None);
        assert_eq!(parse_ref("#/definitions/Pet"), None);
        assert_eq!(parse_ref("#/components/widgets/Pet"), None);
        assert_eq!(parse_ref("#/components/schemas/Pet/properties"), None);
    }

    #[test]
    fn resolve_missing_is_none() {
        let d = doc();
        assert!(resolve(&d, ComponentKind::Schemas, "Pet").is_some());
        assert!(resolve(&d, ComponentKind::Schemas, "Nope").is_none());
        assert!(resolve(&d, ComponentKind::Parameters, "Pet").is_none());
        assert!(resolve(&json!({}), ComponentKind::Schemas, "Pet").is_none());
    }

    #[test]
    fn deref_is_transitive() {
        let d = doc();
        let alias = json!({"$ref": "#/components/schemas/Alias"});
        let target = deref(&d, &alias).unwrap();
        assert_eq!(target["type"], "object");
    }

    #[test]
    fn deref_passes_through_plain_values() {
        let d = doc();
        let plain = json!({"type": "string"});
        assert_eq!(deref(&d, &plain), Some(&plain));
    }

    #[test]
    fn deref_dangling_is_none() {
        let d = doc();
        assert!(deref(&d, &json!({"$ref": "#/components/schemas/Ghost"})).is_none());
    }

    #[test]
    fn deref_gives_up_on_cycles() {
        let d = json!({"components": {"schemas": {
            "A": {"$ref": "#/components/schemas/B"},
            "B": {"$ref": "#/components/schemas/A"}
        }}});
        assert!(deref(&d, &json!({"$ref": "#/components/schemas/A"})).is_none());
    }

    #[test]
    fn inline_refs_produces_closed_schema() {
        let d = doc();
        let inlined = inline_refs(&json!({"$ref": "#/components/schemas/Pets"}), &d);
        assert_eq!(inlined["items"]["properties"]["id"]["type"], "integer");
        assert!(!inlined.to_string().contains("$ref"));
    }
}
