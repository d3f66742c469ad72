//! Keyed store of shared policy instances
//!
//! Stateful policies (circuit breakers, bulkheads) only protect anything when
//! every caller uses the same instance. The registry is built once at startup
//! and then resolved by key; every lookup returns a handle to the same
//! instance. Registration happens only through [`PolicyRegistryBuilder`], so a
//! built registry is read-only and needs no locking.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::pipeline::Pipeline;
use super::policy::{Policy, SharedPolicy};

/// Registry lookup and registration failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("policy key '{key}' is already registered")]
    DuplicateKey { key: String },

    #[error("no policy registered under key '{key}'")]
    UnknownKey { key: String },
}

/// Builder collecting keyed policies before the registry is frozen
pub struct PolicyRegistryBuilder<T, E> {
    policies: BTreeMap<String, SharedPolicy<T, E>>,
}

impl<T, E> Default for PolicyRegistryBuilder<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> PolicyRegistryBuilder<T, E> {
    pub fn new() -> Self {
        Self { policies: BTreeMap::new() }
    }

    /// Register a policy under `key`
    ///
    /// Fails with [`RegistryError::DuplicateKey`] if the key is taken.
    pub fn register<P>(
        &mut self,
        key: impl Into<String>,
        policy: P,
    ) -> Result<&mut Self, RegistryError>
    where
        P: Policy<T, E> + 'static,
    {
        self.register_shared(key, Arc::new(policy))
    }

    /// Register an already shared policy under `key`
    pub fn register_shared(
        &mut self,
        key: impl Into<String>,
        policy: SharedPolicy<T, E>,
    ) -> Result<&mut Self, RegistryError> {
        let key = key.into();
        if self.policies.contains_key(&key) {
            return Err(RegistryError::DuplicateKey { key });
        }
        debug!(key = %key, policy = policy.name(), "registering policy");
        self.policies.insert(key, policy);
        Ok(self)
    }

    pub fn build(self) -> PolicyRegistry<T, E> {
        PolicyRegistry { policies: self.policies }
    }
}

impl<T, E> fmt::Debug for PolicyRegistryBuilder<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyRegistryBuilder")
            .field("keys", &self.policies.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Read-only map from key to shared policy
pub struct PolicyRegistry<T, E> {
    policies: BTreeMap<String, SharedPolicy<T, E>>,
}

impl<T, E> PolicyRegistry<T, E> {
    pub fn builder() -> PolicyRegistryBuilder<T, E> {
        PolicyRegistryBuilder::new()
    }

    /// Resolve the policy registered under `key`
    pub fn resolve(&self, key: &str) -> Result<SharedPolicy<T, E>, RegistryError> {
        self.get(key).ok_or_else(|| RegistryError::UnknownKey { key: key.to_string() })
    }

    pub fn get(&self, key: &str) -> Option<SharedPolicy<T, E>> {
        self.policies.get(key).map(Arc::clone)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.policies.contains_key(key)
    }

    /// Registered keys in sorted order
    pub fn keys(&self) -> Vec<&str> {
        self.policies.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Compose the policies registered under `keys`, outermost first
    pub fn pipeline(&self, keys: &[&str]) -> Result<Pipeline<T, E>, RegistryError> {
        let policies = keys.iter().map(|key| self.resolve(key)).collect::<Result<Vec<_>, _>>()?;
        Ok(Pipeline::new(policies))
    }
}

impl<T, E> fmt::Debug for PolicyRegistry<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyRegistry").field("keys", &self.keys()).finish()
    }
}
