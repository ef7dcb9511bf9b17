//! Interchange records: the request the engine consumes and the response it produces
//!
//! Both records are plain serde data so they can cross a process boundary
//! (the CLI reads requests from JSON files and prints responses as JSON).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// HTTP method of an OpenAPI operation, in the lowercase form used as a `PathItem` key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

impl Method {
    /// Every method, in the order OpenAPI lists them on a `PathItem`.
    pub const ALL: [Method; 8] = [
        Self::Get,
        Self::Put,
        Self::Post,
        Self::Delete,
        Self::Options,
        Self::Head,
        Self::Patch,
        Self::Trace,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Delete => "delete",
            Self::Options => "options",
            Self::Head => "head",
            Self::Patch => "patch",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RecordError::Method(s.to_string()))
    }
}

/// URL scheme of a request or server entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl FromStr for Protocol {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_end_matches(':').to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(RecordError::Protocol(other.to_string())),
        }
    }
}

/// An intercepted request, one per matching attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub protocol: Protocol,
    /// Hostname without port, e.g. "petstore.swagger.io"
    pub host: String,
    pub method: Method,
    /// Path including the query string
    pub path: String,
    /// Path without the query string
    pub pathname: String,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    /// Header names are stored lowercase
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_as_json: Option<serde_json::Value>,
}

impl Request {
    /// Build a request from a method and an absolute URL.
    ///
    /// # Errors
    ///
    /// Returns error if the URL does not parse, has no host, or uses a scheme
    /// other than http/https.
    pub fn from_url(method: Method, raw_url: &str) -> Result<Self, RecordError> {
        let parsed =
            url::Url::parse(raw_url).map_err(|e| RecordError::Url(format!("{raw_url}: {e}")))?;
        let protocol: Protocol = parsed.scheme().parse()?;
        let host = parsed
            .host_str()
            .ok_or_else(|| RecordError::Url(format!("{raw_url}: missing host")))?
            .to_string();
        let pathname = parsed.path().to_string();
        let path = match parsed.query() {
            Some(q) => format!("{pathname}?{q}"),
            None => pathname.clone(),
        };
        let query = parsed.query_pairs().into_owned().collect();

        Ok(Self {
            protocol,
            host,
            method,
            path,
            pathname,
            query,
            headers: BTreeMap::new(),
            body: None,
            body_as_json: None,
        })
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Attach a JSON body; `body` carries its serialized form.
    #[must_use]
    pub fn with_json_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body.to_string());
        self.body_as_json = Some(body);
        self
    }

    /// Attach a raw body. JSON text is also parsed into `body_as_json`.
    #[must_use]
    pub fn with_body(mut self, body: &str) -> Self {
        self.body_as_json = serde_json::from_str(body).ok();
        self.body = Some(body.to_string());
        self
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A generated mock response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MockResponse {
    pub status_code: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl MockResponse {
    /// Parse the body as JSON, if there is one and it is JSON.
    #[must_use]
    pub fn json(&self) -> Option<serde_json::Value> {
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_str(b).ok())
    }
}

/// Generate JSON Schema for the request record.
#[must_use]
pub fn request_schema() -> String {
    let schema = schemars::schema_for!(Request);
    serde_json::to_string_pretty(&schema).expect("schema serialization should not fail")
}

/// Generate JSON Schema for the response record.
#[must_use]
pub fn response_schema() -> String {
    let schema = schemars::schema_for!(MockResponse);
    serde_json::to_string_pretty(&schema).expect("schema serialization should not fail")
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Invalid URL {0}")]
    Url(String),
    #[error("Unsupported protocol '{0}'")]
    Protocol(String),
    #[error("Unknown HTTP method '{0}'")]
    Method(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_url_splits_path_and_query() {
        let req = Request::from_url(Method::Get, "https://api.example.com/v1/pets?limit=10&x=y")
            .unwrap();
        assert_eq!(req.protocol, Protocol::Https);
        assert_eq!(req.host, "api.example.com");
        assert_eq!(req.pathname, "/v1/pets");
        assert_eq!(req.path, "/v1/pets?limit=10&x=y");
        assert_eq!(req.query.get("limit"), Some(&"10".to_string()));
        assert_eq!(req.query.get("x"), Some(&"y".to_string()));
    }

    #[test]
    fn from_url_rejects_other_schemes() {
        let err = Request::from_url(Method::Get, "ftp://example.com/file").unwrap_err();
        assert!(matches!(err, RecordError::Protocol(p) if p == "ftp"));
    }

    #[test]
    fn error_messages() {
        insta::assert_snapshot!(
            "fetch".parse::<Method>().unwrap_err().to_string(),
            @"Unknown HTTP method 'fetch'"
        );
        insta::assert_snapshot!(
            Request::from_url(Method::Get, "ftp://example.com/file").unwrap_err().to_string(),
            @"Unsupported protocol 'ftp'"
        );
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("GET".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("patch".parse::<Method>().unwrap(), Method::Patch);
        assert!("fetch".parse::<Method>().is_err());
    }

    #[test]
    fn headers_are_case_insensitive() {
        let req = Request::from_url(Method::Get, "http://h/a")
            .unwrap()
            .with_header("X-Api-Key", "secret");
        assert_eq!(req.header("x-api-key"), Some("secret"));
        assert_eq!(req.header("X-API-KEY"), Some("secret"));
        assert_eq!(req.header("missing"), None);
    }

    #[test]
    fn with_body_parses_json_when_possible() {
        let req = Request::from_url(Method::Post, "http://h/a")
            .unwrap()
            .with_body(r#"{"name":"Fluffy"}"#);
        assert_eq!(
            req.body_as_json,
            Some(serde_json::json!({"name": "Fluffy"}))
        );

        let raw = Request::from_url(Method::Post, "http://h/a")
            .unwrap()
            .with_body("plain text");
        assert!(raw.body_as_json.is_none());
        assert_eq!(raw.body.as_deref(), Some("plain text"));
    }

    #[test]
    fn deserialize_request_record() {
        let json = r#"{
            "protocol": "http",
            "host": "petstore.swagger.io",
            "method": "post",
            "path": "/v1/pets",
            "pathname": "/v1/pets",
            "headers": {"content-type": "application/json"},
            "body": "{\"id\":1}",
            "bodyAsJson": {"id": 1}
        }"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert_eq!(req.method, Method::Post);
        assert!(req.query.is_empty());
        assert_eq!(req.body_as_json, Some(serde_json::json!({"id": 1})));
    }

    #[test]
    fn response_serializes_camel_case() {
        let resp = MockResponse {
            status_code: 200,
            headers: BTreeMap::new(),
            body: Some("[]".into()),
        };
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["statusCode"], 200);
        assert_eq!(resp.json(), Some(serde_json::json!([])));
    }

    #[test]
    fn schema_generation_produces_valid_json() {
        let parsed: serde_json::Value = serde_json::from_str(&request_schema()).unwrap();
        assert_eq!(
            parsed.get("title").and_then(|v| v.as_str()),
            Some("Request")
        );
        let parsed: serde_json::Value = serde_json::from_str(&response_schema()).unwrap();
        assert_eq!(
            parsed.get("title").and_then(|v| v.as_str()),
            Some("MockResponse")
        );
    }
}
