//! Integration test that writes the interchange JSON Schemas
//!
//! Run with: cargo test -p oasmock-core --test generate_schema

use oasmock_core::record::{request_schema, response_schema};

#[test]
fn write_schema_files() {
    let dir = tempfile::tempdir().unwrap();

    for (file, schema, title) in [
        ("request.schema.json", request_schema(), "Request"),
        ("response.schema.json", response_schema(), "MockResponse"),
    ] {
        let path = dir.path().join(file);
        std::fs::write(&path, &schema).expect("failed to write schema file");

        // Verify the file is valid JSON
        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.get("title").and_then(|v| v.as_str()), Some(title));
    }
}

#[test]
fn request_schema_uses_wire_names() {
    let parsed: serde_json::Value = serde_json::from_str(&request_schema()).unwrap();
    let props = parsed["properties"].as_object().unwrap();
    assert!(props.contains_key("bodyAsJson"));
    assert!(props.contains_key("pathname"));
}
