//! `$ref`-aware locate-and-rewrite over OpenAPI documents
//!
//! An [`Address`] designates zero or more schemas inside a document: the
//! responses selected by path template, method, status code and media type,
//! then a list of [`PathSegment`]s walked from each response schema. Every
//! step dereferences `$ref`s, so the address reads the same whether a node is
//! inline or a component.
//!
//! Rewrites never touch shared components. A `$ref` crossed on the way to a
//! rewritten site is replaced, at that point in the route, by a copy of its
//! target; everything else keeps pointing at the components.

use std::fmt;

use oasmock_core::Method;
use regex::Regex;
use serde_json::{Map, Value};

use crate::refs;

/// Matches keys (templates, methods, codes, media types) at one address level.
#[derive(Debug, Clone, Default)]
pub enum Selector {
    #[default]
    All,
    Nothing,
    Exact(String),
    AnyOf(Vec<String>),
    /// Unanchored: `2\d\d` matches any code containing it; anchor explicitly if needed.
    Pattern(Regex),
}

impl Selector {
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::All => true,
            Self::Nothing => false,
            Self::Exact(k) => k == key,
            Self::AnyOf(keys) => keys.iter().any(|k| k == key),
            Self::Pattern(re) => re.is_match(key),
        }
    }
}

impl From<bool> for Selector {
    fn from(all: bool) -> Self {
        if all { Self::All } else { Self::Nothing }
    }
}

impl From<&str> for Selector {
    fn from(key: &str) -> Self {
        Self::Exact(key.to_string())
    }
}

impl From<String> for Selector {
    fn from(key: String) -> Self {
        Self::Exact(key)
    }
}

impl From<u16> for Selector {
    fn from(code: u16) -> Self {
        Self::Exact(code.to_string())
    }
}

impl From<Method> for Selector {
    fn from(method: Method) -> Self {
        Self::Exact(method.as_str().to_string())
    }
}

impl From<Regex> for Selector {
    fn from(re: Regex) -> Self {
        Self::Pattern(re)
    }
}

impl From<Vec<String>> for Selector {
    fn from(keys: Vec<String>) -> Self {
        Self::AnyOf(keys)
    }
}

impl From<Vec<&str>> for Selector {
    fn from(keys: Vec<&str>) -> Self {
        Self::AnyOf(keys.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<u16>> for Selector {
    fn from(codes: Vec<u16>) -> Self {
        Self::AnyOf(codes.into_iter().map(|c| c.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Selector {
    fn from(keys: [&str; N]) -> Self {
        Self::AnyOf(keys.iter().map(|k| (*k).to_string()).collect())
    }
}

impl<const N: usize> From<[u16; N]> for Selector {
    fn from(codes: [u16; N]) -> Self {
        Self::AnyOf(codes.iter().map(u16::to_string).collect())
    }
}

/// One step from a schema into a sub-schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// `properties.<name>`
    Property(String),
    /// `items`, when it is a single schema
    ArrayItem,
    /// `additionalProperties`, when it is a schema
    AdditionalProperties,
    /// `items[n]`, when `items` is a list
    TupleIndex(usize),
}

impl PathSegment {
    #[must_use]
    pub fn property(name: &str) -> Self {
        Self::Property(name.to_string())
    }

    fn step<'a>(&self, doc: &'a Value, schema: &'a Value) -> Option<(Vec<Step>, &'a Value)> {
        let (steps, child) = match self {
            Self::Property(name) => (
                vec![Step::key("properties"), Step::key(name)],
                schema.get("properties")?.get(name)?,
            ),
            Self::ArrayItem => {
                let items = schema.get("items")?;
                if items.is_array() {
                    return None;
                }
                (vec![Step::key("items")], items)
            }
            Self::AdditionalProperties => {
                let extra = schema.get("additionalProperties")?;
                if extra.is_boolean() {
                    return None;
                }
                (vec![Step::key("additionalProperties")], extra)
            }
            Self::TupleIndex(n) => (
                vec![Step::key("items"), Step::Index(*n)],
                schema.get("items")?.as_array()?.get(*n)?,
            ),
        };
        Some((steps, refs::deref(doc, child)?))
    }
}

/// Where to look: responses selected level by level, then a schema path.
#[derive(Debug, Clone, Default)]
pub struct Address {
    pub path: Selector,
    pub method: Selector,
    pub code: Selector,
    pub media_type: Selector,
    pub segments: Vec<PathSegment>,
}

impl Address {
    /// Every response schema in the document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn path(mut self, selector: impl Into<Selector>) -> Self {
        self.path = selector.into();
        self
    }

    #[must_use]
    pub fn method(mut self, selector: impl Into<Selector>) -> Self {
        self.method = selector.into();
        self
    }

    #[must_use]
    pub fn code(mut self, selector: impl Into<Selector>) -> Self {
        self.code = selector.into();
        self
    }

    #[must_use]
    pub fn media_type(mut self, selector: impl Into<Selector>) -> Self {
        self.media_type = selector.into();
        self
    }

    #[must_use]
    pub fn segment(mut self, segment: PathSegment) -> Self {
        self.segments.push(segment);
        self
    }

    #[must_use]
    pub fn segments(mut self, segments: impl IntoIterator<Item = PathSegment>) -> Self {
        self.segments.extend(segments);
        self
    }
}

/// One step of a [`Route`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Key(String),
    Index(usize),
}

impl Step {
    fn key(k: &str) -> Self {
        Self::Key(k.to_string())
    }
}

/// Literal location of a node in the document, as written (not dereferenced).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Route(Vec<Step>);

impl Route {
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.0
    }

    fn child(&self, steps: impl IntoIterator<Item = Step>) -> Self {
        let mut next = self.clone();
        next.0.extend(steps);
        next
    }

    /// Replace the node at this route in `out` with `new`.
    ///
    /// Any `$ref` met on the way is first replaced by its target from
    /// `original`. Returns `false` if the route does not exist in `out`.
    pub fn write_into(&self, original: &Value, out: &mut Value, new: Value) -> bool {
        let mut node = out;
        for step in &self.0 {
            inline_here(original, node);
            let next = match (step, node) {
                (Step::Key(k), Value::Object(obj)) => obj.get_mut(k),
                (Step::Index(i), Value::Array(arr)) => arr.get_mut(*i),
                _ => None,
            };
            let Some(next) = next else {
                return false;
            };
            node = next;
        }
        *node = new;
        true
    }
}

impl fmt::Display for Route {
    /// JSON Pointer form, e.g. `/paths/~1pets/get/responses/200`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.0 {
            match step {
                Step::Key(k) => write!(f, "/{}", k.replace('~', "~0").replace('/', "~1"))?,
                Step::Index(i) => write!(f, "/{i}")?,
            }
        }
        Ok(())
    }
}

fn inline_here(original: &Value, node: &mut Value) {
    let Some(ref_str) = refs::ref_of(node).map(str::to_string) else {
        return;
    };
    if let Some(target) =
        refs::resolve_ref(original, &ref_str).and_then(|t| refs::deref(original, t))
    {
        *node = target.clone();
    }
}

/// A located operation.
#[derive(Debug, Clone)]
pub struct OperationSite<'a> {
    pub route: Route,
    pub path: &'a str,
    pub method: Method,
    pub operation: &'a Value,
}

/// A located schema.
#[derive(Debug, Clone)]
pub struct Site<'a> {
    pub route: Route,
    pub path: &'a str,
    pub method: Method,
    pub code: &'a str,
    pub media_type: &'a str,
    /// Dereferenced schema at the site
    pub schema: &'a Value,
}

/// Every operation matched by the address's path and method selectors.
#[must_use]
pub fn locate_operations<'a>(doc: &'a Value, address: &Address) -> Vec<OperationSite<'a>> {
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut sites = Vec::new();
    for (template, item) in paths {
        if !address.path.matches(template) {
            continue;
        }
        let Some(item) = refs::deref(doc, item) else {
            continue;
        };
        for method in Method::ALL {
            if !address.method.matches(method.as_str()) {
                continue;
            }
            let Some(op) = item.get(method.as_str()).and_then(|o| refs::deref(doc, o)) else {
                continue;
            };
            sites.push(OperationSite {
                route: Route(vec![
                    Step::key("paths"),
                    Step::key(template),
                    Step::key(method.as_str()),
                ]),
                path: template,
                method,
                operation: op,
            });
        }
    }
    sites
}

/// Every schema designated by `address`.
#[must_use]
pub fn locate<'a>(doc: &'a Value, address: &Address) -> Vec<Site<'a>> {
    let mut sites = Vec::new();
    for op_site in locate_operations(doc, address) {
        let Some(responses) = op_site.operation.get("responses").and_then(Value::as_object)
        else {
            continue;
        };
        for (code, response) in responses {
            if !address.code.matches(code) {
                continue;
            }
            let Some(content) = refs::deref(doc, response)
                .and_then(|r| r.get("content"))
                .and_then(Value::as_object)
            else {
                continue;
            };
            for (media_type, media) in content {
                if !address.media_type.matches(media_type) {
                    continue;
                }
                let Some(schema) = refs::deref(doc, media)
                    .and_then(|m| m.get("schema"))
                    .and_then(|s| refs::deref(doc, s))
                else {
                    continue;
                };
                let route = op_site.route.child([
                    Step::key("responses"),
                    Step::key(code),
                    Step::key("content"),
                    Step::key(media_type),
                    Step::key("schema"),
                ]);
                if let Some((route, schema)) = walk(doc, route, schema, &address.segments) {
                    sites.push(Site {
                        route,
                        path: op_site.path,
                        method: op_site.method,
                        code,
                        media_type,
                        schema,
                    });
                }
            }
        }
    }
    sites
}

fn walk<'a>(
    doc: &'a Value,
    mut route: Route,
    mut schema: &'a Value,
    segments: &[PathSegment],
) -> Option<(Route, &'a Value)> {
    for segment in segments {
        let (steps, child) = segment.step(doc, schema)?;
        route = route.child(steps);
        schema = child;
    }
    Some((route, schema))
}

/// Apply `f` to every schema the address designates.
///
/// Returns a fresh document; `doc` is returned as-is (cloned) when nothing is
/// located or `f` changes nothing.
pub fn modify(doc: &Value, address: &Address, mut f: impl FnMut(&Value) -> Value) -> Value {
    let updates = locate(doc, address)
        .into_iter()
        .filter_map(|site| {
            let new = f(site.schema);
            (new != *site.schema).then_some((site.route, new))
        })
        .collect();
    write_all(doc, updates)
}

/// Apply `f` to every operation matched by the address's path and method.
pub fn modify_operations(
    doc: &Value,
    address: &Address,
    mut f: impl FnMut(&Value) -> Value,
) -> Value {
    let updates = locate_operations(doc, address)
        .into_iter()
        .filter_map(|site| {
            let new = f(site.operation);
            (new != *site.operation).then_some((site.route, new))
        })
        .collect();
    write_all(doc, updates)
}

/// Apply `f` to the `responses` map of every matched operation.
pub fn modify_responses(
    doc: &Value,
    address: &Address,
    mut f: impl FnMut(&Map<String, Value>) -> Map<String, Value>,
) -> Value {
    let updates = locate_operations(doc, address)
        .into_iter()
        .filter_map(|site| {
            let responses = site.operation.get("responses")?.as_object()?;
            let new = f(responses);
            (new != *responses).then(|| {
                (
                    site.route.child([Step::key("responses")]),
                    Value::Object(new),
                )
            })
        })
        .collect();
    write_all(doc, updates)
}

fn write_all(doc: &Value, updates: Vec<(Route, Value)>) -> Value {
    let mut out = doc.clone();
    for (route, new) in updates {
        if !route.write_into(doc, &mut out, new) {
            tracing::debug!(route = %route, "located site vanished during rewrite");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "paths": {
                "/pets": {
                    "get": {"responses": {
                        "200": {"content": {"application/json": {
                            "schema": {"$ref": "#/components/schemas/Pets"}
                        }}},
                        "default": {"$ref": "#/components/responses/Error"}
                    }},
                    "post": {"responses": {
                        "201": {"content": {"application/json": {
                            "schema": {"$ref": "#/components/schemas/Pet"}
                        }}}
                    }}
                },
                "/owners": {
                    "get": {"responses": {
                        "200": {"content": {"text/plain": {"schema": {"type": "string"}}}}
                    }}
                }
            },
            "components": {
                "schemas": {
                    "Pet": {"type": "object", "required": ["id"], "properties": {
                        "id": {"type": "integer"},
                        "tags": {"type": "array", "items": {"type": "string"}}
                    }},
                    "Pets": {"type": "array", "items": {"$ref": "#/components/schemas/Pet"}},
                    "Error": {"type": "object", "properties": {"code": {"type": "integer"}}}
                },
                "responses": {
                    "Error": {"content": {"application/json": {
                        "schema": {"$ref": "#/components/schemas/Error"}
                    }}}
                }
            }
        })
    }

    #[test]
    fn selectors() {
        assert!(Selector::All.matches("x"));
        assert!(!Selector::Nothing.matches("x"));
        assert!(Selector::from("200").matches("200"));
        assert!(!Selector::from(200u16).matches("201"));
        assert!(Selector::from([200u16, 404]).matches("404"));
        assert!(Selector::from(Regex::new(r"^2\d\d$").unwrap()).matches("201"));
        assert!(Selector::from(Method::Get).matches("get"));
        assert!(!Selector::from(false).matches("get"));
    }

    #[test]
    fn locate_every_response_schema() {
        let d = doc();
        let sites = locate(&d, &Address::new());
        let found: Vec<(&str, &str, &str)> = sites
            .iter()
            .map(|s| (s.path, s.method.as_str(), s.code))
            .collect();
        assert_eq!(
            found,
            vec![
                ("/pets", "get", "200"),
                ("/pets", "get", "default"),
                ("/pets", "post", "201"),
                ("/owners", "get", "200"),
            ]
        );
        assert_eq!(sites[1].schema["properties"]["code"]["type"], "integer");
    }

    #[test]
    fn locate_walks_segments_through_refs() {
        let d = doc();
        let address = Address::new()
            .path("/pets")
            .method(Method::Get)
            .code(200u16)
            .segments([PathSegment::ArrayItem, PathSegment::property("tags")]);
        let sites = locate(&d, &address);
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].schema["type"], "array");
        assert_eq!(
            sites[0].route.to_string(),
            "/paths/~1pets/get/responses/200/content/application~1json/schema/items/properties/tags"
        );
    }

    #[test]
    fn missing_segment_locates_nothing() {
        let d = doc();
        let address = Address::new().segment(PathSegment::property("nope"));
        assert!(locate(&d, &address).is_empty());
        let tuple = Address::new().segment(PathSegment::TupleIndex(0));
        assert!(locate(&d, &tuple).is_empty());
    }

    #[test]
    fn modify_inlines_crossed_refs_only() {
        let d = doc();
        let address = Address::new()
            .path("/pets")
            .method(Method::Get)
            .code(200u16)
            .segments([PathSegment::ArrayItem, PathSegment::property("id")]);
        let out = modify(&d, &address, |_| json!({"type": "integer", "enum": [7]}));

        let schema = &out["paths"]["/pets"]["get"]["responses"]["200"]["content"]
            ["application/json"]["schema"];
        assert_eq!(schema["type"], "array");
        assert_eq!(schema["items"]["properties"]["id"]["enum"], json!([7]));
        // shared components untouched, unrelated refs untouched
        assert_eq!(out["components"], d["components"]);
        assert_eq!(
            out["paths"]["/pets"]["post"]["responses"]["201"],
            d["paths"]["/pets"]["post"]["responses"]["201"]
        );
        // siblings of the inlined node keep their own refs
        assert_eq!(
            out["paths"]["/pets"]["get"]["responses"]["default"],
            json!({"$ref": "#/components/responses/Error"})
        );
    }

    #[test]
    fn modify_through_response_ref() {
        let d = doc();
        let address = Address::new().code("default").segment(PathSegment::property("code"));
        let out = modify(&d, &address, |s| {
            let mut s = s.clone();
            s["minimum"] = json!(400);
            s
        });
        let resp = &out["paths"]["/pets"]["get"]["responses"]["default"];
        assert!(resp.get("$ref").is_none());
        assert_eq!(
            resp["content"]["application/json"]["schema"]["properties"]["code"]["minimum"],
            400
        );
    }

    #[test]
    fn unchanged_when_nothing_located_or_nothing_changes() {
        let d = doc();
        let none = Address::new().path(Selector::Nothing);
        assert_eq!(modify(&d, &none, |_| json!({})), d);
        assert_eq!(modify(&d, &Address::new(), Value::clone), d);
    }

    #[test]
    fn modify_responses_sees_each_operation() {
        let d = doc();
        let out = modify_responses(&d, &Address::new().method(Method::Get), |responses| {
            let mut r = responses.clone();
            r.retain(|code, _| code != "default");
            r
        });
        let codes: Vec<&String> = out["paths"]["/pets"]["get"]["responses"]
            .as_object()
            .unwrap()
            .keys()
            .collect();
        assert_eq!(codes, vec!["200"]);
        assert_eq!(out["paths"]["/pets"]["post"], d["paths"]["/pets"]["post"]);
    }

    #[test]
    fn modify_operations_by_method() {
        let d = doc();
        let out = modify_operations(&d, &Address::new().method(Method::Post), |op| {
            let mut op = op.clone();
            op["deprecated"] = json!(true);
            op
        });
        assert_eq!(out["paths"]["/pets"]["post"]["deprecated"], true);
        assert!(out["paths"]["/pets"]["get"].get("deprecated").is_none());
    }
}
