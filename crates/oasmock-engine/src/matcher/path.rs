//! Server URL and path template matching, path parameter extraction

use std::collections::BTreeMap;

use oasmock_core::Protocol;
use regex::Regex;
use serde_json::{Value, json};

use crate::refs;
use crate::validation;

/// Match the request against the document's `servers` list.
///
/// Picks the first server whose scheme and hostname equal the request's and
/// whose base path prefixes the request path. Returns the request path with
/// that base stripped (always starting with `/`).
#[must_use]
pub fn match_server(doc: &Value, protocol: Protocol, host: &str, path: &str) -> Option<String> {
    let servers = doc.get("servers")?.as_array()?;
    servers
        .iter()
        .filter_map(|s| s.get("url").and_then(Value::as_str))
        .find_map(|raw| {
            let url = url::Url::parse(raw).ok()?;
            if url.scheme() != protocol.as_str() {
                return None;
            }
            if !url.host_str()?.eq_ignore_ascii_case(host) {
                return None;
            }
            strip_base(url.path(), path)
        })
}

fn strip_base(base: &str, path: &str) -> Option<String> {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        return Some(path.to_string());
    }
    let rest = path.strip_prefix(base)?;
    if rest.is_empty() {
        Some("/".to_string())
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        // "/v1x" is not under "/v1"
        None
    }
}

/// Whether `template` has the same shape as `request_path`.
///
/// Segments must be equal, or the template segment must hold a `{param}`
/// placeholder, which matches any literal here. Types and patterns are checked
/// later by [`PathPattern`].
#[must_use]
pub fn match_template(request_path: &str, template: &str) -> bool {
    let req: Vec<&str> = request_path.split('/').collect();
    let tpl: Vec<&str> = template.split('/').collect();
    req.len() == tpl.len()
        && req
            .iter()
            .zip(&tpl)
            .all(|(r, t)| r == t || (has_placeholder(t) && !r.is_empty()))
}

/// First template (in document order) matching `request_path`.
#[must_use]
pub fn find_template<'a>(
    request_path: &str,
    templates: impl IntoIterator<Item = &'a str>,
) -> Option<&'a str> {
    templates
        .into_iter()
        .find(|t| match_template(request_path, t))
}

fn has_placeholder(segment: &str) -> bool {
    segment
        .find('{')
        .is_some_and(|open| segment[open..].contains('}'))
}

/// Names of every `{name}` placeholder in a template, in order.
#[must_use]
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        names.push(rest[open + 1..open + close].to_string());
        rest = &rest[open + close + 1..];
    }
    names
}

/// Compiled matcher for one path template.
#[derive(Debug, Clone)]
pub struct PathPattern {
    regex: Regex,
    /// Parameter names, indexed by capture group `p{i}`
    names: Vec<String>,
    /// Patterns the `regex` crate cannot express (look-around, backrefs),
    /// checked on the captured segment with a JSON Schema `pattern` instead.
    checked: BTreeMap<String, Value>,
}

impl PathPattern {
    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.extract_path_params(path).is_some()
    }

    /// Extract path parameter values, or `None` if the path does not match.
    #[must_use]
    pub fn extract_path_params(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let caps = self.regex.captures(path)?;
        let params: BTreeMap<String, String> = self
            .names
            .iter()
            .enumerate()
            .filter_map(|(i, name)| {
                caps.name(&format!("p{i}"))
                    .map(|m| (name.clone(), m.as_str().to_string()))
            })
            .collect();
        let rejected = self.checked.iter().any(|(name, schema)| {
            params
                .get(name)
                .is_some_and(|value| !validation::validates(schema, &Value::Null, &json!(value)))
        });
        (!rejected).then_some(params)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Build the matcher for `template` from its declared parameters.
///
/// `parameters` are the (possibly `$ref`) parameter objects in scope for the
/// template; only `in: path` entries are considered.
///
/// # Errors
///
/// Returns error when the template has placeholders without matching path
/// parameter declarations, or when a declared `pattern` is not a valid regex.
pub fn build_param_pattern(
    template: &str,
    parameters: &[Value],
    doc: &Value,
) -> Result<PathPattern, PathError> {
    let wanted = placeholders(template);
    let declared: BTreeMap<&str, &Value> = parameters
        .iter()
        .filter_map(|p| refs::deref(doc, p))
        .filter(|p| p.get("in").and_then(Value::as_str) == Some("path"))
        .filter_map(|p| Some((p.get("name")?.as_str()?, p)))
        .collect();

    if !wanted.is_empty() && declared.is_empty() {
        return Err(PathError::NoPathParameters(template.to_string()));
    }
    let missing: Vec<String> = wanted
        .iter()
        .filter(|name| !declared.contains_key(name.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(PathError::Undescribed {
            template: template.to_string(),
            names: missing,
        });
    }

    let mut source = String::from("^");
    let mut names = Vec::new();
    let mut checked = BTreeMap::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        source.push_str(&regex::escape(&rest[..open]));
        let name = &rest[open + 1..open + close];
        let declared_pattern = declared
            .get(name)
            .and_then(|p| p.get("schema"))
            .and_then(|s| refs::deref(doc, s))
            .and_then(|s| s.get("pattern"))
            .and_then(Value::as_str);
        let fragment = match declared_pattern {
            None => "[^/]+",
            Some(pattern) => match Regex::new(strip_anchors(pattern)) {
                Ok(_) => strip_anchors(pattern),
                Err(e) => {
                    let schema = json!({"type": "string", "pattern": pattern});
                    if !validation::compiles(&schema) {
                        return Err(PathError::Pattern {
                            template: template.to_string(),
                            message: e.to_string(),
                        });
                    }
                    tracing::debug!(
                        template = %template,
                        parameter = %name,
                        "pattern checked after capture"
                    );
                    checked.insert(name.to_string(), schema);
                    "[^/]+"
                }
            },
        };
        source.push_str(&format!("(?P<p{}>(?:{fragment}))", names.len()));
        names.push(name.to_string());
        rest = &rest[open + close + 1..];
    }
    source.push_str(&regex::escape(rest));
    source.push('$');

    let regex = Regex::new(&source).map_err(|e| PathError::Pattern {
        template: template.to_string(),
        message: e.to_string(),
    })?;
    Ok(PathPattern {
        regex,
        names,
        checked,
    })
}

fn strip_anchors(pattern: &str) -> &str {
    let p = pattern.strip_prefix('^').unwrap_or(pattern);
    match p.strip_suffix('$') {
        Some(stripped) if !stripped.ends_with('\\') => stripped,
        _ => p,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("Path {0} is dynamic, but has no description for path parameters!")]
    NoPathParameters(String),
    #[error("{template}: following path parameters have not been described: {}", names.join(", "))]
    Undescribed { template: String, names: Vec<String> },
    #[error("{template}: invalid path parameter pattern: {message}")]
    Pattern { template: String, message: String },
}
