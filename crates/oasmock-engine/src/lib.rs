//! oasmock-engine: request matching and schema narrowing over OpenAPI documents

pub mod engine;
pub mod generator;
pub mod matcher;
pub mod refine;
pub mod refs;
pub mod sampler;
pub mod state;
pub mod store;
pub mod traversal;
pub mod validation;

pub use engine::{EndpointState, MockEngine, OperationState, ServiceState};
pub use generator::{Generated, MockError, StateInput};
pub use matcher::{MatchOutcome, MatchedOperation, match_request};
pub use sampler::{RandomSampler, SchemaSampler};
pub use state::{State, StateError, StateTransformer, response_body};
pub use store::{DocumentStore, Service, StoreError};
pub use traversal::{Address, PathSegment, Selector};
