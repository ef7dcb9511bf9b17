//! Composable document rewrites
//!
//! A [`StateTransformer`] maps `(request, document) -> document`. The
//! combinators here wrap the refinement operations so tests can write
//!
//! ```ignore
//! let t = include_codes(["200"])
//!     .then(response_body().codes("200").items().property("name").constant(json!("Rex")));
//! ```

use std::fmt;
use std::sync::Arc;

use oasmock_core::Request;
use serde_json::Value;

use crate::refine;
use crate::traversal::{Address, PathSegment, Selector};

type TransformFn = dyn Fn(&Request, &Value) -> Value + Send + Sync;

/// A document rewrite, possibly depending on the request.
#[derive(Clone)]
pub struct StateTransformer(Arc<TransformFn>);

impl StateTransformer {
    pub fn new(f: impl Fn(&Request, &Value) -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// The transformer that changes nothing.
    #[must_use]
    pub fn identity() -> Self {
        Self::new(|_, doc| doc.clone())
    }

    #[must_use]
    pub fn apply(&self, request: &Request, doc: &Value) -> Value {
        (self.0)(request, doc)
    }

    /// Run `self`, then `next` on its output.
    #[must_use]
    pub fn then(self, next: Self) -> Self {
        Self::new(move |req, doc| next.apply(req, &self.apply(req, doc)))
    }
}

impl fmt::Debug for StateTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StateTransformer(<fn>)")
    }
}

impl FromIterator<StateTransformer> for StateTransformer {
    /// Compose in iteration order.
    fn from_iter<I: IntoIterator<Item = StateTransformer>>(iter: I) -> Self {
        iter.into_iter().fold(Self::identity(), Self::then)
    }
}

/// Compose transformers, first to last.
#[must_use]
pub fn compose(transformers: impl IntoIterator<Item = StateTransformer>) -> StateTransformer {
    transformers.into_iter().collect()
}

#[must_use]
pub fn include_codes(codes: impl Into<Selector>) -> StateTransformer {
    let codes = codes.into();
    StateTransformer::new(move |_, doc| refine::include_codes(doc, &Address::new(), codes.clone()))
}

#[must_use]
pub fn remove_codes(codes: impl Into<Selector>) -> StateTransformer {
    let codes = codes.into();
    StateTransformer::new(move |_, doc| refine::remove_codes(doc, &Address::new(), codes.clone()))
}

#[must_use]
pub fn map_default_to_codes<I>(codes: I) -> StateTransformer
where
    I: IntoIterator,
    I::Item: ToString,
{
    let codes: Vec<String> = codes.into_iter().map(|c| c.to_string()).collect();
    StateTransformer::new(move |_, doc| {
        refine::map_default_to_codes(doc, &Address::new(), codes.iter())
    })
}

/// Start addressing response bodies; every code and media type by default.
#[must_use]
pub fn response_body() -> ResponseBody {
    ResponseBody::default()
}

/// Builder selecting schemas inside response bodies.
#[derive(Debug, Clone, Default)]
pub struct ResponseBody {
    address: Address,
}

impl ResponseBody {
    #[must_use]
    pub fn codes(mut self, codes: impl Into<Selector>) -> Self {
        self.address = self.address.code(codes);
        self
    }

    #[must_use]
    pub fn media_types(mut self, media_types: impl Into<Selector>) -> Self {
        self.address = self.address.media_type(media_types);
        self
    }

    #[must_use]
    pub fn at(mut self, segments: impl IntoIterator<Item = PathSegment>) -> Self {
        self.address = self.address.segments(segments);
        self
    }

    #[must_use]
    pub fn property(mut self, name: &str) -> Self {
        self.address = self.address.segment(PathSegment::property(name));
        self
    }

    #[must_use]
    pub fn items(mut self) -> Self {
        self.address = self.address.segment(PathSegment::ArrayItem);
        self
    }

    #[must_use]
    pub fn additional_properties(mut self) -> Self {
        self.address = self.address.segment(PathSegment::AdditionalProperties);
        self
    }

    #[must_use]
    pub fn tuple_index(mut self, n: usize) -> Self {
        self.address = self.address.segment(PathSegment::TupleIndex(n));
        self
    }

    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    fn op(self, f: impl Fn(&Value, &Address) -> Value + Send + Sync + 'static) -> StateTransformer {
        let address = self.address;
        StateTransformer::new(move |_, doc| f(doc, &address))
    }

    #[must_use]
    pub fn min_items(self, n: u64) -> StateTransformer {
        self.op(move |doc, a| refine::change_min_items(doc, a, n))
    }

    #[must_use]
    pub fn max_items(self, n: u64) -> StateTransformer {
        self.op(move |doc, a| refine::change_max_items(doc, a, n))
    }

    #[must_use]
    pub fn required(self, property: &str) -> StateTransformer {
        let property = property.to_string();
        self.op(move |doc, a| refine::change_required_status(doc, a, &property))
    }

    #[must_use]
    pub fn enum_keep(self, values: Vec<Value>) -> StateTransformer {
        self.op(move |doc, a| refine::change_enum(doc, a, &values, true))
    }

    #[must_use]
    pub fn enum_reject(self, values: Vec<Value>) -> StateTransformer {
        self.op(move |doc, a| refine::change_enum(doc, a, &values, false))
    }

    #[must_use]
    pub fn constant(self, value: Value) -> StateTransformer {
        self.op(move |doc, a| refine::change_to_const(doc, a, &value))
    }

    #[must_use]
    pub fn list_to_tuple(self, n: u64) -> StateTransformer {
        self.op(move |doc, a| refine::change_list_to_tuple(doc, a, n))
    }

    #[must_use]
    pub fn one_of_keep(self, indices: Vec<usize>) -> StateTransformer {
        self.op(move |doc, a| refine::one_of_keep(doc, a, &indices))
    }

    #[must_use]
    pub fn one_of_reject(self, indices: Vec<usize>) -> StateTransformer {
        self.op(move |doc, a| refine::one_of_reject(doc, a, &indices))
    }

    #[must_use]
    pub fn any_of_keep(self, indices: Vec<usize>) -> StateTransformer {
        self.op(move |doc, a| refine::any_of_keep(doc, a, &indices))
    }

    #[must_use]
    pub fn any_of_reject(self, indices: Vec<usize>) -> StateTransformer {
        self.op(move |doc, a| refine::any_of_reject(doc, a, &indices))
    }
}
