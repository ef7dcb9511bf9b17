//! Request → operation matching across every registered service
//!
//! Services are tried in registration order, templates in document order.
//! The first operation whose server, path pattern, required parameters and
//! request body all accept the request wins.

pub mod operation;
pub mod path;

use std::collections::BTreeMap;

use oasmock_core::{Method, Request};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::store::{DocumentStore, Service};

/// A request resolved to one operation of one service.
#[derive(Debug, Clone, Serialize)]
pub struct MatchedOperation {
    pub service: String,
    pub template: String,
    pub method: Method,
    pub path_params: BTreeMap<String, String>,
    /// The service document with `paths` pruned to the matched template and
    /// method. Path-level keys (`parameters`, `summary`, ...) are kept.
    #[serde(skip)]
    pub document: Value,
}

impl MatchedOperation {
    /// The matched operation object inside [`Self::document`].
    #[must_use]
    pub fn operation(&self) -> Option<&Value> {
        self.document
            .get("paths")?
            .get(&self.template)?
            .get(self.method.as_str())
    }

    /// Declared response codes, in document order.
    #[must_use]
    pub fn response_codes(&self) -> Vec<String> {
        self.operation()
            .and_then(|op| op.get("responses"))
            .and_then(Value::as_object)
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Result of matching a request against a [`DocumentStore`].
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Matched(MatchedOperation),
    /// Server and path matched, but no operation is declared for the method.
    OperationMissing { service: String, template: String },
    Unmatched,
}

impl MatchOutcome {
    #[must_use]
    pub fn matched(self) -> Option<MatchedOperation> {
        match self {
            Self::Matched(m) => Some(m),
            _ => None,
        }
    }
}

/// Match `request` against every service in `store`.
#[must_use]
pub fn match_request(store: &DocumentStore, request: &Request) -> MatchOutcome {
    let mut missing = None;
    for service in store.iter() {
        match match_service(service, request) {
            MatchOutcome::Matched(m) => {
                tracing::debug!(
                    service = %m.service,
                    template = %m.template,
                    method = %m.method,
                    "request matched"
                );
                return MatchOutcome::Matched(m);
            }
            outcome @ MatchOutcome::OperationMissing { .. } => {
                if missing.is_none() {
                    missing = Some(outcome);
                }
            }
            MatchOutcome::Unmatched => {}
        }
    }
    tracing::debug!(
        method = %request.method,
        host = %request.host,
        pathname = %request.pathname,
        "no operation matched"
    );
    missing.unwrap_or(MatchOutcome::Unmatched)
}

fn match_service(service: &Service, request: &Request) -> MatchOutcome {
    let doc = &service.document;
    let Some(local_path) =
        path::match_server(doc, request.protocol, &request.host, &request.pathname)
    else {
        return MatchOutcome::Unmatched;
    };
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return MatchOutcome::Unmatched;
    };

    let mut missing = MatchOutcome::Unmatched;
    for (template, item) in paths {
        if !path::match_template(&local_path, template) {
            continue;
        }
        let Some(op) = operation::select_operation(doc, item, request.method) else {
            tracing::debug!(service = %service.name, template = %template, "operation missing");
            if matches!(missing, MatchOutcome::Unmatched) {
                missing = MatchOutcome::OperationMissing {
                    service: service.name.clone(),
                    template: template.clone(),
                };
            }
            continue;
        };

        let raw = operation::raw_parameters(doc, item, Some(op));
        let pattern = match path::build_param_pattern(template, &raw, doc) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed template");
                continue;
            }
        };
        let Some(path_params) = pattern.extract_path_params(&local_path) else {
            tracing::debug!(template = %template, "path parameters do not match their patterns");
            continue;
        };
        let params = operation::parameters(doc, &raw);
        if !operation::parameters_satisfied(doc, &params, request)
            || !operation::body_satisfied(doc, op, request)
        {
            continue;
        }

        return MatchOutcome::Matched(MatchedOperation {
            service: service.name.clone(),
            template: template.clone(),
            method: request.method,
            path_params,
            document: prune(doc, template, item, request.method),
        });
    }
    missing
}

/// Copy of `doc` whose `paths` holds only `template`, with every other
/// method entry removed from its path item.
fn prune(doc: &Value, template: &str, item: &Value, method: Method) -> Value {
    let mut pruned_item = item.clone();
    if let Some(obj) = pruned_item.as_object_mut() {
        obj.retain(|key, _| {
            key == method.as_str() || !Method::ALL.iter().any(|m| m.as_str() == key)
        });
    }
    let mut paths = Map::new();
    paths.insert(template.to_string(), pruned_item);

    let mut pruned = doc.clone();
    if let Some(obj) = pruned.as_object_mut() {
        obj.insert("paths".to_string(), Value::Object(paths));
    }
    pruned
}
