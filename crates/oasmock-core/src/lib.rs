//! oasmock-core: Interchange records and configuration for OpenAPI-driven mocks
//!
//! This crate provides the request/response records exchanged with the
//! matching engine and the project configuration file format.

pub mod config;
pub mod record;

pub use config::{Config, ConfigError, SamplerConfig};
pub use record::{Method, MockResponse, Protocol, RecordError, Request};
