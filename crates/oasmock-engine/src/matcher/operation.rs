//! Operation selection and request validation against declared parameters and body

use oasmock_core::{Method, Request};
use serde_json::Value;

use crate::refs;
use crate::validation;

/// Parameter location, as declared by `in`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParamLocation {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }
}

/// A dereferenced parameter declaration.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub schema: Value,
    pub required: bool,
}

fn parse_parameter(param: &Value) -> Option<Parameter> {
    let name = param.get("name")?.as_str()?.to_string();
    let location = ParamLocation::parse(param.get("in")?.as_str()?)?;
    let schema = param
        .get("schema")
        .cloned()
        .unwrap_or(serde_json::json!({"type": "string"}));
    let required = param
        .get("required")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Some(Parameter {
        name,
        location,
        schema,
        required,
    })
}

/// The operation declared for `method` on a path item.
#[must_use]
pub fn select_operation<'a>(
    doc: &'a Value,
    path_item: &'a Value,
    method: Method,
) -> Option<&'a Value> {
    path_item
        .get(method.as_str())
        .and_then(|op| refs::deref(doc, op))
}

/// Raw (still possibly `$ref`) parameter objects in scope for an operation.
///
/// Path-level parameters come first; an operation-level parameter with the
/// same `(name, in)` replaces its path-level counterpart.
#[must_use]
pub fn raw_parameters(doc: &Value, path_item: &Value, operation: Option<&Value>) -> Vec<Value> {
    let mut merged: Vec<Value> = Vec::new();
    let sources = [
        path_item.get("parameters"),
        operation.and_then(|op| op.get("parameters")),
    ];
    for source in sources.iter().flatten() {
        let Some(params) = source.as_array() else {
            continue;
        };
        for param in params {
            let key = identity(doc, param);
            let existing = merged
                .iter_mut()
                .find(|p| key.is_some() && identity(doc, p) == key);
            if let Some(existing) = existing {
                *existing = param.clone();
            } else {
                merged.push(param.clone());
            }
        }
    }
    merged
}

fn identity(doc: &Value, param: &Value) -> Option<(String, String)> {
    let p = refs::deref(doc, param)?;
    Some((
        p.get("name")?.as_str()?.to_string(),
        p.get("in")?.as_str()?.to_string(),
    ))
}

/// Dereference and parse parameter objects, dropping unresolvable ones.
#[must_use]
pub fn parameters(doc: &Value, raw: &[Value]) -> Vec<Parameter> {
    raw.iter()
        .filter_map(|p| refs::deref(doc, p))
        .filter_map(parse_parameter)
        .collect()
}

/// Whether every required query/header parameter is present and valid.
#[must_use]
pub fn parameters_satisfied(doc: &Value, params: &[Parameter], request: &Request) -> bool {
    params
        .iter()
        .filter(|p| p.required)
        .all(|p| {
            let raw = match p.location {
                ParamLocation::Query => request.query.get(&p.name).map(String::as_str),
                ParamLocation::Header => request.header(&p.name),
                // Path params are checked by the path pattern; cookies are not modeled.
                ParamLocation::Path | ParamLocation::Cookie => return true,
            };
            let Some(raw) = raw else {
                tracing::debug!(param = %p.name, "required parameter missing");
                return false;
            };
            let value = coerce_param(raw, &p.schema, doc);
            let ok = validation::validates(&p.schema, doc, &value);
            if !ok {
                tracing::debug!(param = %p.name, value = %raw, "parameter does not match its schema");
            }
            ok
        })
}

/// Convert a query/header string to the JSON type its schema declares.
///
/// Values that do not parse stay strings, so validation reports the mismatch.
#[must_use]
pub fn coerce_param(raw: &str, schema: &Value, doc: &Value) -> Value {
    let type_str = refs::deref(doc, schema)
        .and_then(|s| s.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("");
    match type_str {
        "integer" => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        "number" => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        "boolean" => match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        "array" => {
            let item_schema = refs::deref(doc, schema)
                .and_then(|s| s.get("items"))
                .cloned()
                .unwrap_or(Value::Null);
            Value::Array(
                raw.split(',')
                    .map(|part| coerce_param(part, &item_schema, doc))
                    .collect(),
            )
        }
        _ => Value::String(raw.to_string()),
    }
}

/// Whether the request body satisfies the operation's `requestBody`.
///
/// The media type named by the request's `content-type` is preferred, else
/// the first declared one. JSON media types validate the parsed body; others
/// validate the raw string.
#[must_use]
pub fn body_satisfied(doc: &Value, operation: &Value, request: &Request) -> bool {
    let Some(body_decl) = operation
        .get("requestBody")
        .and_then(|rb| refs::deref(doc, rb))
    else {
        return true;
    };
    let required = body_decl
        .get("required")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let Some(raw_body) = request.body.as_deref() else {
        if required {
            tracing::debug!("required request body missing");
        }
        return !required;
    };

    let Some(content) = body_decl.get("content").and_then(Value::as_object) else {
        return true;
    };
    let requested = request
        .header("content-type")
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase());
    let chosen = requested
        .as_deref()
        .and_then(|ct| content.iter().find(|(mt, _)| mt.eq_ignore_ascii_case(ct)))
        .or_else(|| content.iter().next());
    let Some((media_type, media)) = chosen else {
        return true;
    };
    let Some(schema) = media.get("schema") else {
        return true;
    };

    let instance = if is_json_media_type(media_type) {
        match &request.body_as_json {
            Some(v) => v.clone(),
            None => match serde_json::from_str(raw_body) {
                Ok(v) => v,
                Err(_) => {
                    tracing::debug!(media_type = %media_type, "request body is not JSON");
                    return false;
                }
            },
        }
    } else {
        Value::String(raw_body.to_string())
    };

    let ok = validation::validates(schema, doc, &instance);
    if !ok {
        let error = validation::first_error(schema, doc, &instance).unwrap_or_default();
        tracing::debug!(
            media_type = %media_type,
            error = %error,
            "request body does not match its schema"
        );
    }
    ok
}

/// `application/json`, `application/problem+json`, ...
#[must_use]
pub fn is_json_media_type(media_type: &str) -> bool {
    let mt = media_type.to_ascii_lowercase();
    mt == "application/json" || mt.ends_with("+json") || mt.contains("/json")
}
