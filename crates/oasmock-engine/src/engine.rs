//! Mock engine façade
//!
//! Owns the registered documents, the per-operation state and the sampler.
//! `respond` holds the state lock for the whole request so `$times` budgets
//! are consumed exactly once per response.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use oasmock_core::{Config, Method, MockResponse, Request};

use crate::generator::{self, Generated, MockError, StateInput};
use crate::matcher::{self, MatchOutcome};
use crate::sampler::{RandomSampler, SchemaSampler};
use crate::store::{DocumentStore, StoreError};
use crate::traversal::{self, Address};

/// `(service, template, method)`
type EndpointKey = (String, String, Method);

#[derive(Debug, Default)]
struct StateStore {
    next_id: u64,
    entries: BTreeMap<EndpointKey, Vec<(u64, StateInput)>>,
}

impl StateStore {
    fn push(&mut self, key: EndpointKey, input: StateInput) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.entry(key).or_default().push((id, input));
        id
    }

    /// Spend one use of every contributing literal whose counter rode on the
    /// winning response.
    fn consume(&mut self, key: &EndpointKey, budgets: &BTreeMap<u64, u64>) {
        let Some(list) = self.entries.get_mut(key) else {
            return;
        };
        list.retain_mut(|(id, input)| {
            let (Some(carried), StateInput::Literal(literal)) = (budgets.get(&*id), input) else {
                return true;
            };
            let left = u32::try_from(carried.saturating_sub(1)).unwrap_or(u32::MAX);
            literal.times = Some(left);
            tracing::debug!(id = *id, left, "consumed state");
            left > 0
        });
        if list.is_empty() {
            self.entries.remove(key);
        }
    }
}

/// Matches requests against registered documents and answers with sampled
/// responses shaped by the stored state.
pub struct MockEngine<S = RandomSampler> {
    store: DocumentStore,
    states: Mutex<StateStore>,
    sampler: S,
}

impl MockEngine<RandomSampler> {
    #[must_use]
    pub fn new(store: DocumentStore) -> Self {
        Self::with_sampler(store, RandomSampler::new())
    }

    /// Load every configured service and seed the sampler from `config`.
    ///
    /// # Errors
    ///
    /// Returns error if a service location cannot be loaded or registered.
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        let store = DocumentStore::from_config(config)?;
        Ok(Self::with_sampler(store, RandomSampler::from_config(config)))
    }
}

impl<S: SchemaSampler> MockEngine<S> {
    #[must_use]
    pub fn with_sampler(store: DocumentStore, sampler: S) -> Self {
        Self {
            store,
            states: Mutex::new(StateStore::default()),
            sampler,
        }
    }

    #[must_use]
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    #[must_use]
    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    /// Start addressing state for one service.
    #[must_use]
    pub fn state(&self, service: &str) -> ServiceState<'_, S> {
        ServiceState {
            engine: self,
            service: service.to_string(),
        }
    }

    /// Answer `request`.
    ///
    /// # Errors
    ///
    /// Returns error if nothing matches, stored state cannot be satisfied, or
    /// no response is left.
    pub fn respond(&self, request: &Request) -> Result<MockResponse, MockError> {
        self.respond_detailed(request).map(|g| g.response)
    }

    /// Like [`respond`](Self::respond), keeping the winning code, the
    /// contributing state ids and the narrowed document.
    ///
    /// # Errors
    ///
    /// Same as [`respond`](Self::respond).
    pub fn respond_detailed(&self, request: &Request) -> Result<Generated, MockError> {
        let mut states = self.lock();
        let matched = match matcher::match_request(&self.store, request) {
            MatchOutcome::Matched(m) => m,
            MatchOutcome::OperationMissing { service, template } => {
                tracing::debug!(
                    service = %service,
                    template = %template,
                    method = %request.method,
                    "no operation for method"
                );
                return Err(MockError::NoMatch);
            }
            MatchOutcome::Unmatched => return Err(MockError::NoMatch),
        };
        let key = (matched.service.clone(), matched.template.clone(), matched.method);
        let inputs = states.entries.get(&key).map_or(&[][..], Vec::as_slice);
        let generated = generator::generate(&matched, inputs, request, &self.sampler)?;
        states.consume(&key, &generated.budgets);
        Ok(generated)
    }

    /// Drop all stored state.
    pub fn reset(&self) {
        let mut states = self.lock();
        states.entries.clear();
    }

    fn lock(&self) -> MutexGuard<'_, StateStore> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `engine.state(service)`
pub struct ServiceState<'e, S> {
    engine: &'e MockEngine<S>,
    service: String,
}

impl<'e, S> ServiceState<'e, S> {
    #[must_use]
    pub fn endpoint(self, template: &str) -> EndpointState<'e, S> {
        EndpointState {
            engine: self.engine,
            service: self.service,
            template: template.to_string(),
        }
    }
}

/// `engine.state(service).endpoint(template)`
pub struct EndpointState<'e, S> {
    engine: &'e MockEngine<S>,
    service: String,
    template: String,
}

impl<'e, S> EndpointState<'e, S> {
    #[must_use]
    pub fn method(self, method: Method) -> OperationState<'e, S> {
        OperationState {
            engine: self.engine,
            key: (self.service, self.template, method),
        }
    }
}

/// State slot of a single operation.
pub struct OperationState<'e, S> {
    engine: &'e MockEngine<S>,
    key: EndpointKey,
}

impl<S: SchemaSampler> OperationState<'_, S> {
    /// Append `input` to this operation's state and return its id.
    ///
    /// # Errors
    ///
    /// Returns error if the service is not registered or does not declare
    /// the operation.
    pub fn set(&self, input: impl Into<StateInput>) -> Result<u64, MockError> {
        let (service, template, method) = &self.key;
        let registered = self
            .engine
            .store
            .get(service)
            .ok_or_else(|| MockError::UnknownService(service.clone()))?;
        let address = Address::new().path(template.as_str()).method(*method);
        if traversal::locate_operations(&registered.document, &address).is_empty() {
            return Err(MockError::UnknownEndpoint {
                service: service.clone(),
                template: template.clone(),
                method: *method,
            });
        }
        let id = self.engine.lock().push(self.key.clone(), input.into());
        tracing::debug!(service = %service, template = %template, method = %method, id, "state set");
        Ok(id)
    }

    /// Remove this operation's state, returning how many entries were dropped.
    pub fn clear(&self) -> usize {
        self.engine
            .lock()
            .entries
            .remove(&self.key)
            .map_or(0, |list| list.len())
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.engine
            .lock()
            .entries
            .get(&self.key)
            .map_or(0, Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
