//! End-to-end scenarios over the petstore fixture
//!
//! Run with: cargo test -p oasmock-engine --test petstore

use std::path::PathBuf;

use oasmock_core::{Method, Request, SamplerConfig};
use oasmock_engine::state::include_codes;
use oasmock_engine::{
    Address, DocumentStore, MatchOutcome, MockEngine, MockError, RandomSampler, State,
    match_request, refine, response_body,
};
use serde_json::{Value, json};

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/petstore.yaml")
}

fn store() -> DocumentStore {
    let mut store = DocumentStore::new();
    store.load(&fixture()).unwrap();
    store
}

fn engine(seed: u64) -> MockEngine {
    MockEngine::with_sampler(store(), RandomSampler::seeded(seed, SamplerConfig::default()))
}

fn get(path: &str) -> Request {
    Request::from_url(Method::Get, &format!("http://petstore.swagger.io/v1{path}")).unwrap()
}

fn body(raw: Option<&str>) -> Value {
    serde_json::from_str(raw.unwrap()).unwrap()
}

fn codes(doc: &Value, template: &str, method: &str) -> Vec<String> {
    doc["paths"][template][method]["responses"]
        .as_object()
        .unwrap()
        .keys()
        .cloned()
        .collect()
}

#[test]
fn fixture_loads_as_one_service() {
    let store = store();
    assert_eq!(store.names(), vec!["petstore"]);
}

#[test]
fn include_codes_leaves_only_the_200_response() {
    let engine = engine(1);
    engine
        .state("petstore")
        .endpoint("/pets")
        .method(Method::Get)
        .set(include_codes("200"))
        .unwrap();

    let out = engine.respond_detailed(&get("/pets")).unwrap();
    assert_eq!(codes(&out.narrowed, "/pets", "get"), vec!["200"]);
    assert_eq!(out.response.status_code, 200);
    assert_eq!(out.response.headers["x-next"], "/pets?page=2");
    assert!(body(out.response.body.as_deref()).is_array());
}

#[test]
fn const_array_of_pets_becomes_a_tuple_of_literals() {
    let MatchOutcome::Matched(matched) = match_request(&store(), &get("/pets")) else {
        panic!("GET /pets should match");
    };
    let pets = json!([
        {"id": 0, "name": "Fluffy"},
        {"id": 1, "name": "Trix", "tags": ["cute", "sad"]}
    ]);
    let address = Address::new().path("/pets").method(Method::Get).code("200");
    let doc = refine::change_to_const(&matched.document, &address, &pets);

    let schema = &doc["paths"]["/pets"]["get"]["responses"]["200"]["content"]["application/json"]
        ["schema"];
    let items = schema["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["required"], json!(["id", "name"]));
    assert_eq!(items[1]["required"], json!(["id", "name", "tags"]));
    assert_eq!(items[0]["properties"]["name"]["enum"], json!(["Fluffy"]));
    assert_eq!(items[1]["properties"]["tags"]["items"][1]["enum"], json!(["sad"]));
    assert_eq!(schema["minItems"], 2);
    assert_eq!(schema["maxItems"], 2);

    // the shared component is untouched
    assert_eq!(doc["components"], matched.document["components"]);
}

#[test]
fn const_that_does_not_validate_changes_nothing() {
    let doc = store().get("petstore").unwrap().document.clone();
    let address = Address::new().path("/pets").method(Method::Get).code("200");
    let out = refine::change_to_const(&doc, &address, &json!([{"id": "zero"}]));
    assert_eq!(out, doc);
}

#[test]
fn one_of_keep_selects_variants_in_order() {
    let doc = store().get("petstore").unwrap().document.clone();
    let address = Address::new()
        .path("/pets/{petId}")
        .method(Method::Get)
        .code("default");
    let out = refine::one_of_keep(&doc, &address, &[0, 3, 4]);

    let variants: Vec<&str> = out["paths"]["/pets/{petId}"]["get"]["responses"]["default"]
        ["content"]["application/json"]["schema"]["oneOf"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v["$ref"].as_str())
        .collect();
    assert_eq!(
        variants,
        vec![
            "#/components/schemas/Error",
            "#/components/schemas/Error4",
            "#/components/schemas/Error5",
        ]
    );
    assert_eq!(
        out["components"]["schemas"]["AnyError"]["oneOf"]
            .as_array()
            .unwrap()
            .len(),
        5
    );
}

fn cat_store(schema: Value) -> DocumentStore {
    let mut store = DocumentStore::new();
    store
        .register(
            "cats",
            json!({
                "servers": [{"url": "https://cats.example.com"}],
                "paths": {"/cat": {"get": {"responses": {"200": {"content": {
                    "application/json": {"schema": schema}
                }}}}}}
            }),
        )
        .unwrap();
    store
}

#[test]
fn literal_properties_property_does_not_collide_with_keyword() {
    let request = Request::from_url(Method::Get, "https://cats.example.com/cat").unwrap();

    // a property literally named `properties`
    let literal = cat_store(json!({"type": "object", "properties": {
        "properties": {"type": "object", "properties": {"isCat": {"type": "boolean"}}},
        "name": {"type": "string"}
    }}));
    let engine = MockEngine::with_sampler(literal, RandomSampler::seeded(7, SamplerConfig::default()));
    engine
        .state("cats")
        .endpoint("/cat")
        .method(Method::Get)
        .set(State::from_value(json!({"properties": {"isCat": true}})).unwrap())
        .unwrap();
    let out = engine.respond_detailed(&request).unwrap();
    let got = body(out.response.body.as_deref());
    assert_eq!(got["properties"]["isCat"], json!(true));
    assert!(got.get("isCat").is_none());

    // only the keyword: the state reaches `isCat` through it
    let keyword = cat_store(json!({"type": "object", "properties": {
        "isCat": {"type": "boolean"}
    }}));
    let engine = MockEngine::with_sampler(keyword, RandomSampler::seeded(7, SamplerConfig::default()));
    engine
        .state("cats")
        .endpoint("/cat")
        .method(Method::Get)
        .set(State::from_value(json!({"properties": {"isCat": true}})).unwrap())
        .unwrap();
    let got = body(engine.respond(&request).unwrap().body.as_deref());
    assert_eq!(got, json!({"isCat": true}));
}

#[test]
fn literal_state_with_times_then_fallback() {
    let engine = engine(3);
    let pet = engine.state("petstore").endpoint("/pets/{petId}").method(Method::Get);
    pet.set(State::from_value(json!({"$code": 200, "$times": 1, "name": "Rex"})).unwrap())
        .unwrap();

    let first = engine.respond_detailed(&get("/pets/42")).unwrap();
    assert_eq!(first.code, "200");
    let got = body(first.response.body.as_deref());
    assert_eq!(got["name"], "Rex");
    assert!(got["id"].is_i64());
    assert!(pet.is_empty());

    let second = engine.respond(&get("/pets/42")).unwrap();
    assert_eq!(second.status_code, 200);
}

#[test]
fn path_parameter_pattern_is_enforced() {
    let engine = engine(0);
    assert_eq!(engine.respond(&get("/pets/abc")).unwrap_err(), MockError::NoMatch);
    assert!(engine.respond(&get("/pets/1")).is_ok());
}

#[test]
fn request_body_must_satisfy_schema() {
    let engine = engine(0);
    let url = "http://petstore.swagger.io/v1/pets";
    let bad = Request::from_url(Method::Post, url)
        .unwrap()
        .with_json_body(json!({"name": 3}));
    assert_eq!(engine.respond(&bad).unwrap_err(), MockError::NoMatch);

    let good = Request::from_url(Method::Post, url)
        .unwrap()
        .with_json_body(json!({"id": 1, "name": "Rex"}));
    let resp = engine.respond(&good).unwrap();
    assert_eq!(resp.status_code, 201);
    assert!(resp.body.is_none());
}

#[test]
fn state_can_force_the_default_response() {
    let engine = engine(5);
    let pets = engine.state("petstore").endpoint("/pets").method(Method::Get);
    pets.set(
        response_body()
            .codes("default")
            .property("message")
            .constant(json!("maintenance")),
    )
    .unwrap();
    pets.set(State::new().code("default")).unwrap();

    let resp = engine.respond(&get("/pets")).unwrap();
    assert_eq!(resp.status_code, 500);
    let got = body(resp.body.as_deref());
    assert_eq!(got["message"], "maintenance");
    assert!(got["code"].is_i64());
}

#[test]
fn unknown_code_in_state_is_reported() {
    let engine = engine(0);
    engine
        .state("petstore")
        .endpoint("/pets")
        .method(Method::Get)
        .set(State::new().code(418))
        .unwrap();
    let err = engine.respond(&get("/pets")).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"Can't find response for given status code '418'!");
}

#[test]
fn same_seed_same_response() {
    let a = engine(42).respond(&get("/pets")).unwrap();
    let b = engine(42).respond(&get("/pets")).unwrap();
    assert_eq!(a, b);
}
