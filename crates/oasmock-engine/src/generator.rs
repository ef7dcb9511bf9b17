//! Matched operation + state → mock response
//!
//! Transformers run first, in order, then literal states. The first response
//! left standing (explicit codes before `default`) is sampled.

use std::collections::BTreeMap;

use oasmock_core::{Method, MockResponse, Request};
use serde_json::Value;

use crate::matcher::MatchedOperation;
use crate::matcher::operation::is_json_media_type;
use crate::refs;
use crate::sampler::SchemaSampler;
use crate::state::{self, NarrowError, State, StateTransformer, TIMES_EXTENSION};

/// Status used for a `default` response.
pub const DEFAULT_STATUS: u16 = 500;

/// One registered piece of state.
#[derive(Debug, Clone)]
pub enum StateInput {
    Transformer(StateTransformer),
    Literal(State),
}

impl From<StateTransformer> for StateInput {
    fn from(t: StateTransformer) -> Self {
        Self::Transformer(t)
    }
}

impl From<State> for StateInput {
    fn from(s: State) -> Self {
        Self::Literal(s)
    }
}

/// Everything [`generate`] decided, for callers that want more than the response.
#[derive(Debug, Clone)]
pub struct Generated {
    pub response: MockResponse,
    /// Winning response code as declared (`"200"`, `"default"`, ...)
    pub code: String,
    /// Ids of literal states whose narrowing kept the winning code
    pub contributors: Vec<u64>,
    /// `$times` counter each contributor left on the winning response
    pub budgets: BTreeMap<u64, u64>,
    /// The document after every state was applied
    pub narrowed: Value,
    /// The closed schema handed to the sampler, if the response has a body
    pub schema: Option<Value>,
}

/// Apply `states` to the matched operation and sample a response.
///
/// # Errors
///
/// Returns error if a literal state cannot be satisfied or no response is
/// left after narrowing.
pub fn generate<S>(
    matched: &MatchedOperation,
    states: &[(u64, StateInput)],
    request: &Request,
    sampler: &S,
) -> Result<Generated, MockError>
where
    S: SchemaSampler + ?Sized,
{
    let mut doc = matched.document.clone();
    for (_, input) in states {
        if let StateInput::Transformer(t) = input {
            doc = t.apply(request, &doc);
        }
    }

    // later literals overwrite the counter, so it is read right after each one
    let mut survivors: Vec<(u64, Vec<(String, Option<u64>)>)> = Vec::new();
    for (id, input) in states {
        if let StateInput::Literal(literal) = input {
            let narrowed = state::narrow(&doc, &matched.template, matched.method, literal, request)?;
            doc = narrowed.document;
            let responses = declared_responses(&doc, matched);
            let codes = narrowed
                .codes
                .into_iter()
                .map(|code| {
                    let times = literal
                        .times
                        .and(responses)
                        .and_then(|r| r.get(&code))
                        .and_then(|r| refs::deref(&doc, r))
                        .and_then(|r| r.get(TIMES_EXTENSION))
                        .and_then(Value::as_u64);
                    (code, times)
                })
                .collect();
            survivors.push((*id, codes));
        }
    }

    let responses = declared_responses(&doc, matched);
    let Some((code, response)) = responses.and_then(|r| {
        r.iter()
            .find(|(code, _)| code.as_str() != "default")
            .or_else(|| r.get_key_value("default"))
    }) else {
        return Err(MockError::NoResponses {
            method: matched.method,
            path: matched.template.clone(),
        });
    };
    let code = code.clone();
    let response = refs::deref(&doc, response).unwrap_or(response);

    let (body, schema, media_type) = sample_body(&doc, response, sampler);
    let mut headers = sample_headers(&doc, response, sampler);
    if let Some(media_type) = media_type {
        headers.insert("content-type".to_string(), media_type);
    }

    let mut contributors = Vec::new();
    let mut budgets = BTreeMap::new();
    for (id, codes) in &survivors {
        if let Some((_, times)) = codes.iter().find(|(c, _)| *c == code) {
            contributors.push(*id);
            if let Some(times) = times {
                budgets.insert(*id, *times);
            }
        }
    }
    tracing::debug!(
        template = %matched.template,
        code = %code,
        "generated response"
    );

    Ok(Generated {
        response: MockResponse {
            status_code: status_code(&code),
            headers,
            body,
        },
        code,
        contributors,
        budgets,
        narrowed: doc.clone(),
        schema,
    })
}

fn declared_responses<'a>(
    doc: &'a Value,
    matched: &MatchedOperation,
) -> Option<&'a serde_json::Map<String, Value>> {
    doc.get("paths")
        .and_then(|p| p.get(&matched.template))
        .and_then(|item| item.get(matched.method.as_str()))
        .and_then(|op| refs::deref(doc, op))
        .and_then(|op| op.get("responses"))
        .and_then(Value::as_object)
}

/// HTTP status for a declared response code. `default` → 500, `4XX` → 400.
#[must_use]
pub fn status_code(code: &str) -> u16 {
    if let Ok(n) = code.parse::<u16>() {
        return n;
    }
    code.chars()
        .next()
        .and_then(|c| c.to_digit(10))
        .filter(|d| (1..=5).contains(d))
        .and_then(|d| u16::try_from(d * 100).ok())
        .unwrap_or(DEFAULT_STATUS)
}

fn sample_body<S>(
    doc: &Value,
    response: &Value,
    sampler: &S,
) -> (Option<String>, Option<Value>, Option<String>)
where
    S: SchemaSampler + ?Sized,
{
    let Some(content) = response.get("content").and_then(Value::as_object) else {
        return (None, None, None);
    };
    let chosen = content
        .iter()
        .find(|(mt, _)| is_json_media_type(mt))
        .or_else(|| content.iter().next());
    let Some((media_type, media)) = chosen else {
        return (None, None, None);
    };
    let Some(schema) = refs::deref(doc, media).and_then(|m| m.get("schema")) else {
        return (None, None, Some(media_type.clone()));
    };

    let closed = refs::inline_refs(schema, doc);
    let value = sampler.sample(&closed);
    let body = match (&value, is_json_media_type(media_type)) {
        (Value::String(s), false) => s.clone(),
        _ => value.to_string(),
    };
    (Some(body), Some(closed), Some(media_type.clone()))
}

fn sample_headers<S>(doc: &Value, response: &Value, sampler: &S) -> BTreeMap<String, String>
where
    S: SchemaSampler + ?Sized,
{
    let Some(declared) = response.get("headers").and_then(Value::as_object) else {
        return BTreeMap::new();
    };
    declared
        .iter()
        .filter_map(|(name, header)| {
            let schema = refs::deref(doc, header)?.get("schema")?;
            let value = match sampler.sample(&refs::inline_refs(schema, doc)) {
                Value::String(s) => s,
                other => other.to_string(),
            };
            Some((name.to_ascii_lowercase(), value))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MockError {
    #[error("Can't find a matcher for this request")]
    NoMatch,
    #[error("No responses left for {method} {path}")]
    NoResponses { method: Method, path: String },
    #[error("Can't find response for given status code '{0}'!")]
    UnknownStatusCode(String),
    #[error("Can't find definition for '{key}', or its type is incorrect")]
    StateValidation { key: String, depth: usize },
    #[error("Unknown service '{0}'")]
    UnknownService(String),
    #[error("Service '{service}' has no operation {method} {template}")]
    UnknownEndpoint {
        service: String,
        template: String,
        method: Method,
    },
}

impl From<NarrowError> for MockError {
    fn from(err: NarrowError) -> Self {
        match err {
            NarrowError::UnknownStatusCode(code) => Self::UnknownStatusCode(code),
            NarrowError::Unresolved { key, depth } => Self::StateValidation { key, depth },
        }
    }
}
