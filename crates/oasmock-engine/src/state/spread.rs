//! Literal state → schema overrides
//!
//! [`spread`] matches a partial state object against a schema tree. A state
//! key may name a property directly, or something one container further down
//! (`properties`, `items`, `additionalProperties`), so every container is
//! tried and the ones that resolve are merged. Keys that resolve nowhere
//! produce a [`Miss`].
//!
//! Two contexts alternate while walking: a *schema* (whose keys are
//! keywords) and a *properties map* (whose keys are property names). State
//! keys are only ever compared with property names, so a property literally
//! called `properties` and the `properties` keyword never collide.

use indexmap::IndexMap;
use oasmock_core::{Method, Request};
use serde_json::{Map, Value, json};

use super::{SIZE_KEY, State, StateNode};
use crate::refine;
use crate::refs;
use crate::traversal::{self, Address};
use crate::validation;

/// Response extension carrying the remaining `$times` budget.
pub const TIMES_EXTENSION: &str = "x-oasmock-times";

const MAX_DEPTH: usize = 64;

/// A schema rewrite produced by [`spread`], keyed like the schema JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Override {
    Replace(Value),
    Nested(Overrides),
}

pub type Overrides = IndexMap<String, Override>;

/// A state key that could not be matched, and how deep in the state it sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Miss {
    pub key: String,
    pub depth: usize,
}

impl Miss {
    fn at(key: &str, depth: usize) -> Self {
        Self {
            key: key.to_string(),
            depth,
        }
    }

    /// Keep the deeper of two misses; the earlier one wins ties.
    fn deepest(current: Option<Self>, next: Self) -> Option<Self> {
        match current {
            Some(c) if c.depth >= next.depth => Some(c),
            _ => Some(next),
        }
    }
}

/// What [`spread`] resolves against.
#[derive(Debug, Clone, Copy)]
pub struct SpreadContext<'a> {
    pub doc: &'a Value,
    pub request: &'a Request,
}

/// Match `partial` against `schema`.
///
/// # Errors
///
/// Returns the first key (in state order) that resolves nowhere. When a key
/// could resolve through several containers and all fail, the deepest
/// failure among them is returned.
pub fn spread(
    schema: &Value,
    partial: &IndexMap<String, StateNode>,
    ctx: &SpreadContext<'_>,
) -> Result<Overrides, Miss> {
    spread_schema(schema, partial, ctx, 0)
}

fn spread_schema(
    schema: &Value,
    partial: &IndexMap<String, StateNode>,
    ctx: &SpreadContext<'_>,
    depth: usize,
) -> Result<Overrides, Miss> {
    let first_key = || partial.keys().next().map_or("", String::as_str);
    if depth > MAX_DEPTH {
        return Err(Miss::at(first_key(), depth));
    }
    let Some(schema) = refs::deref(ctx.doc, schema) else {
        return Err(Miss::at(first_key(), depth));
    };

    let mut out = Overrides::new();
    for (key, node) in partial {
        let resolved = if key == SIZE_KEY {
            size_override(schema, node, depth)?
        } else {
            indirect(schema, key, node, ctx, depth)?
        };
        merge(&mut out, resolved);
    }
    Ok(out)
}

fn size_override(schema: &Value, node: &StateNode, depth: usize) -> Result<Overrides, Miss> {
    let size = match node {
        StateNode::Literal(v) => v.as_u64(),
        _ => None,
    };
    match size {
        Some(n) if refine::is_array_schema(schema) => Ok(IndexMap::from([
            ("minItems".to_string(), Override::Replace(json!(n))),
            ("maxItems".to_string(), Override::Replace(json!(n))),
        ])),
        _ => Err(Miss::at(SIZE_KEY, depth)),
    }
}

/// Resolve one key through every container of `schema`.
fn indirect(
    schema: &Value,
    key: &str,
    node: &StateNode,
    ctx: &SpreadContext<'_>,
    depth: usize,
) -> Result<Overrides, Miss> {
    let single = IndexMap::from([(key.to_string(), node.clone())]);
    let properties = schema.get("properties").filter(|p| p.is_object());
    let mut candidates = Vec::new();

    if let Some(props) = properties {
        candidates.push(("properties", spread_property(props, key, node, ctx, depth)));
    }
    for container in ["items", "additionalProperties"] {
        if let Some(child) = schema.get(container).filter(|c| c.is_object()) {
            candidates.push((container, spread_schema(child, &single, ctx, depth)));
        }
    }

    // The state may spell the container out: `{"items": {...}}`.
    if let StateNode::Object(inner) = node {
        match key {
            "properties" => {
                if let Some(props) = properties {
                    candidates.push(("properties", spread_properties(props, inner, ctx, depth + 1)));
                }
            }
            "items" | "additionalProperties" => {
                if let Some(child) = schema.get(key).filter(|c| c.is_object()) {
                    let container = if key == "items" { "items" } else { "additionalProperties" };
                    candidates.push((container, spread_schema(child, inner, ctx, depth + 1)));
                }
            }
            _ => {}
        }
    }

    let mut resolved: Option<Overrides> = None;
    let mut deepest: Option<Miss> = None;
    for (container, result) in candidates {
        match result {
            Ok(ov) => {
                let wrapped = IndexMap::from([(container.to_string(), Override::Nested(ov))]);
                merge(resolved.get_or_insert_with(Overrides::new), wrapped);
            }
            Err(miss) => deepest = Miss::deepest(deepest, miss),
        }
    }
    match (resolved, deepest) {
        (Some(ov), _) => Ok(ov),
        (None, Some(miss)) => Err(miss),
        (None, None) => Err(Miss::at(key, depth)),
    }
}

fn spread_properties(
    props: &Value,
    partial: &IndexMap<String, StateNode>,
    ctx: &SpreadContext<'_>,
    depth: usize,
) -> Result<Overrides, Miss> {
    let mut out = Overrides::new();
    for (key, node) in partial {
        merge(&mut out, spread_property(props, key, node, ctx, depth)?);
    }
    Ok(out)
}

/// Resolve one key against a properties map, where keys are property names.
fn spread_property(
    props: &Value,
    key: &str,
    node: &StateNode,
    ctx: &SpreadContext<'_>,
    depth: usize,
) -> Result<Overrides, Miss> {
    let Some(prop) = props.get(key).and_then(|p| refs::deref(ctx.doc, p)) else {
        return Err(Miss::at(key, depth));
    };
    let replaced = match node {
        StateNode::Literal(value) => literal(prop, value, key, ctx, depth)?,
        StateNode::Dynamic(f) => literal(prop, &f(ctx.request), key, ctx, depth)?,
        StateNode::Object(inner) => {
            // an empty schema is a dead end for the key itself
            if prop.as_object().is_some_and(Map::is_empty) {
                return Err(Miss::at(key, depth));
            }
            Override::Nested(spread_schema(prop, inner, ctx, depth + 1)?)
        }
    };
    Ok(IndexMap::from([(key.to_string(), replaced)]))
}

fn literal(
    schema: &Value,
    value: &Value,
    key: &str,
    ctx: &SpreadContext<'_>,
    depth: usize,
) -> Result<Override, Miss> {
    if validation::validates(schema, ctx.doc, value) {
        Ok(Override::Replace(refine::const_schema(value)))
    } else {
        tracing::debug!(key = %key, value = %value, "state value rejected by schema");
        Err(Miss::at(key, depth))
    }
}

fn merge(into: &mut Overrides, from: Overrides) {
    for (key, incoming) in from {
        match incoming {
            Override::Nested(more) => {
                if let Some(Override::Nested(existing)) = into.get_mut(&key) {
                    merge(existing, more);
                } else {
                    into.insert(key, Override::Nested(more));
                }
            }
            replace @ Override::Replace(_) => {
                into.insert(key, replace);
            }
        }
    }
}

/// Rewrite `schema` with `overrides`.
///
/// Nodes on the override path are dereferenced and copied; untouched
/// subtrees keep their `$ref`s. Properties given a value become required.
#[must_use]
pub fn apply(schema: &Value, overrides: &Overrides, doc: &Value) -> Value {
    let mut node = refs::deref(doc, schema).unwrap_or(schema).clone();
    let Some(obj) = node.as_object_mut() else {
        return node;
    };
    for (key, ov) in overrides {
        let new = match ov {
            Override::Replace(v) => v.clone(),
            Override::Nested(sub) => {
                let child = obj.get(key).cloned().unwrap_or_else(|| json!({}));
                if key == "properties" {
                    apply_properties(&child, sub, doc)
                } else {
                    apply(&child, sub, doc)
                }
            }
        };
        obj.insert(key.clone(), new);
    }
    if let Some(Override::Nested(props)) = overrides.get("properties") {
        for name in props.keys() {
            node = refine::required_status(&node, name);
        }
    }
    node
}

fn apply_properties(props: &Value, overrides: &Overrides, doc: &Value) -> Value {
    let mut out = props.clone();
    let Some(obj) = out.as_object_mut() else {
        return out;
    };
    for (name, ov) in overrides {
        let new = match ov {
            Override::Replace(v) => v.clone(),
            Override::Nested(sub) => {
                let child = obj.get(name).cloned().unwrap_or_else(|| json!({}));
                apply(&child, sub, doc)
            }
        };
        obj.insert(name.clone(), new);
    }
    out
}

/// A document narrowed by a literal state.
#[derive(Debug, Clone)]
pub struct Narrowed {
    pub document: Value,
    /// Response codes that survived, in document order.
    pub codes: Vec<String>,
}

/// Narrow the responses of `template`/`method` in `doc` to `state`.
///
/// With `$code`, only that response is kept. Otherwise every response is
/// tried and those whose content cannot hold the state are dropped.
///
/// # Errors
///
/// Returns error if `$code` names an undeclared response, or if no response
/// can hold the state (the deepest miss across responses is reported).
pub fn narrow(
    doc: &Value,
    template: &str,
    method: Method,
    state: &State,
    request: &Request,
) -> Result<Narrowed, NarrowError> {
    let address = Address::new().path(template).method(method);
    let responses = traversal::locate_operations(doc, &address)
        .first()
        .and_then(|site| site.operation.get("responses"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let ctx = SpreadContext { doc, request };

    let mut kept = Map::new();
    if let Some(code) = &state.code {
        let response = responses
            .get(code)
            .ok_or_else(|| NarrowError::UnknownStatusCode(code.clone()))?;
        kept.insert(code.clone(), narrow_response(response, state, &ctx)?);
    } else {
        let mut deepest = None;
        for (code, response) in &responses {
            match narrow_response(response, state, &ctx) {
                Ok(narrowed) => {
                    kept.insert(code.clone(), narrowed);
                }
                Err(miss) => {
                    tracing::debug!(
                        code = %code,
                        key = %miss.key,
                        depth = miss.depth,
                        "response cannot hold state"
                    );
                    deepest = Miss::deepest(deepest, miss);
                }
            }
        }
        if let (true, Some(miss)) = (kept.is_empty(), deepest) {
            return Err(miss.into());
        }
    }

    let codes = kept.keys().cloned().collect();
    let document = traversal::modify_responses(doc, &address, |_| kept.clone());
    Ok(Narrowed { document, codes })
}

fn narrow_response(
    response: &Value,
    state: &State,
    ctx: &SpreadContext<'_>,
) -> Result<Value, Miss> {
    let first_key = state.body.keys().next().map_or("", String::as_str);
    let Some(resolved) = refs::deref(ctx.doc, response) else {
        return Err(Miss::at(first_key, 0));
    };
    let mut out = resolved.clone();

    if state.has_body() {
        let content = resolved
            .get("content")
            .and_then(Value::as_object)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Miss::at(first_key, 0))?;
        let mut narrowed = Map::new();
        let mut deepest = None;
        for (media_type, media) in content {
            let Some(schema) = refs::deref(ctx.doc, media).and_then(|m| m.get("schema")) else {
                continue;
            };
            match spread(schema, &state.body, ctx) {
                Ok(overrides) => {
                    let mut media = refs::deref(ctx.doc, media).unwrap_or(media).clone();
                    media["schema"] = apply(schema, &overrides, ctx.doc);
                    narrowed.insert(media_type.clone(), media);
                }
                Err(miss) => deepest = Miss::deepest(deepest, miss),
            }
        }
        if narrowed.is_empty() {
            return Err(deepest.unwrap_or_else(|| Miss::at(first_key, 0)));
        }
        if let Some(obj) = out.as_object_mut() {
            obj.insert("content".to_string(), Value::Object(narrowed));
        }
    }

    if let (Some(times), Some(obj)) = (state.times, out.as_object_mut()) {
        obj.insert(TIMES_EXTENSION.to_string(), json!(times));
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NarrowError {
    #[error("Can't find response for given status code '{0}'!")]
    UnknownStatusCode(String),
    #[error("Can't find definition for '{key}', or its type is incorrect")]
    Unresolved { key: String, depth: usize },
}

impl From<Miss> for NarrowError {
    fn from(miss: Miss) -> Self {
        Self::Unresolved {
            key: miss.key,
            depth: miss.depth,
        }
    }
}
