//! User-supplied response state
//!
//! A state is either a [`StateTransformer`] (a composed document rewrite) or
//! a literal [`State`]: a partial object describing the response body, with
//! reserved directives `$code` and `$times` at the top level and `$size` at
//! array level.

pub mod spread;
pub mod transform;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use oasmock_core::Request;
use serde_json::{Map, Value};

pub use spread::{
    Miss, NarrowError, Narrowed, Override, Overrides, SpreadContext, TIMES_EXTENSION, apply, narrow,
    spread,
};
pub use transform::{
    ResponseBody, StateTransformer, compose, include_codes, map_default_to_codes, remove_codes,
    response_body,
};

pub const CODE_KEY: &str = "$code";
pub const TIMES_KEY: &str = "$times";
pub const SIZE_KEY: &str = "$size";

/// A state value computed from the incoming request.
pub type StateFn = Arc<dyn Fn(&Request) -> Value + Send + Sync>;

/// One node of a literal state tree.
#[derive(Clone)]
pub enum StateNode {
    Literal(Value),
    Dynamic(StateFn),
    Object(IndexMap<String, StateNode>),
}

impl StateNode {
    fn from_value(value: Value) -> Result<Self, StateError> {
        match value {
            Value::Object(obj) => Ok(Self::Object(parse_body(obj, false)?)),
            other => Ok(Self::Literal(other)),
        }
    }
}

impl fmt::Debug for StateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(<fn>)"),
            Self::Object(map) => f.debug_map().entries(map.iter()).finish(),
        }
    }
}

/// A literal state: directives plus the partial body.
#[derive(Debug, Clone, Default)]
pub struct State {
    /// Status code (`"200"`, `"default"`, ...)
    pub code: Option<String>,
    pub times: Option<u32>,
    pub body: IndexMap<String, StateNode>,
}

impl State {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON state object, checking directive types.
    ///
    /// # Errors
    ///
    /// Returns error if `value` is not an object or a directive is malformed
    /// or misplaced.
    pub fn from_value(value: Value) -> Result<Self, StateError> {
        let Value::Object(mut obj) = value else {
            return Err(StateError::NotAnObject);
        };
        let code = obj.remove(CODE_KEY).map(parse_code).transpose()?;
        let times = obj.remove(TIMES_KEY).map(parse_times).transpose()?;
        let body = parse_body(obj, true)?;
        Ok(Self { code, times, body })
    }

    #[must_use]
    pub fn code(mut self, code: impl ToString) -> Self {
        self.code = Some(code.to_string());
        self
    }

    #[must_use]
    pub fn times(mut self, times: u32) -> Self {
        self.times = Some(times);
        self
    }

    /// Set a literal at a nested key path, creating intermediate objects.
    #[must_use]
    pub fn with(self, path: &[&str], value: Value) -> Self {
        self.with_node(path, StateNode::Literal(value))
    }

    /// Set a value computed from the request at a nested key path.
    #[must_use]
    pub fn with_dynamic(
        self,
        path: &[&str],
        f: impl Fn(&Request) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.with_node(path, StateNode::Dynamic(Arc::new(f)))
    }

    fn with_node(mut self, path: &[&str], node: StateNode) -> Self {
        insert_at(&mut self.body, path, node);
        self
    }

    /// Whether the state constrains the body at all.
    #[must_use]
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }
}

fn insert_at(map: &mut IndexMap<String, StateNode>, path: &[&str], node: StateNode) {
    match path {
        [] => {}
        [last] => {
            map.insert((*last).to_string(), node);
        }
        [first, rest @ ..] => {
            let entry = map
                .entry((*first).to_string())
                .or_insert_with(|| StateNode::Object(IndexMap::new()));
            if !matches!(entry, StateNode::Object(_)) {
                *entry = StateNode::Object(IndexMap::new());
            }
            if let StateNode::Object(next) = entry {
                insert_at(next, rest, node);
            }
        }
    }
}

fn parse_body(
    obj: Map<String, Value>,
    top_level: bool,
) -> Result<IndexMap<String, StateNode>, StateError> {
    let mut body = IndexMap::new();
    for (key, value) in obj {
        match key.as_str() {
            CODE_KEY | TIMES_KEY if !top_level => {
                return Err(StateError::InvalidDirective {
                    key,
                    reason: "only allowed at the top level".into(),
                });
            }
            SIZE_KEY => {
                if value.as_u64().is_none() {
                    return Err(StateError::InvalidDirective {
                        key,
                        reason: format!("expected a non-negative integer, got {value}"),
                    });
                }
                body.insert(key, StateNode::Literal(value));
            }
            _ => {
                body.insert(key, StateNode::from_value(value)?);
            }
        }
    }
    Ok(body)
}

fn parse_code(value: Value) -> Result<String, StateError> {
    match &value {
        Value::String(s) if s == "default" => Ok(s.clone()),
        Value::Number(_) => match value.as_u64() {
            Some(code @ 100..=599) => Ok(code.to_string()),
            _ => Err(invalid(CODE_KEY, format!("{value} is not a status code"))),
        },
        Value::String(s) => match s.parse::<u16>() {
            Ok(code @ 100..=599) => Ok(code.to_string()),
            _ => Err(invalid(CODE_KEY, format!("{value} is not a status code"))),
        },
        _ => Err(invalid(CODE_KEY, format!("{value} is not a status code"))),
    }
}

fn parse_times(value: Value) -> Result<u32, StateError> {
    value
        .as_u64()
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| invalid(TIMES_KEY, format!("expected a positive integer, got {value}")))
}

fn invalid(key: &str, reason: String) -> StateError {
    StateError::InvalidDirective {
        key: key.to_string(),
        reason,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Invalid state directive '{key}': {reason}")]
    InvalidDirective { key: String, reason: String },
    #[error("State must be a JSON object")]
    NotAnObject,
}
