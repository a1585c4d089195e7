//! Static model catalogue: one descriptor per servable (name, version).
//!
//! Built once at startup, immutable afterwards. Registration order is
//! preserved so listings stay stable across calls.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::capability::CapabilityProvider;

/// Identifies one servable model version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelKey {
    name: String,
    version: String,
}

impl ModelKey {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

#[derive(Debug, Error)]
#[error("invalid model key {0:?}, expected name:version")]
pub struct ParseKeyError(String);

impl FromStr for ModelKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((name, version)) if !name.is_empty() && !version.is_empty() => {
                Ok(Self::new(name, version))
            }
            _ => Err(ParseKeyError(s.to_string())),
        }
    }
}

impl Serialize for ModelKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModelKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// Broad model family. The runtime never branches on this; it is
/// descriptive metadata for callers. Only the capability behind the
/// descriptor knows what the model actually computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Summarizer,
    Classifier,
    Generator,
    Other,
}

/// A model parameter: numeric or text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Static description of one servable model.
///
/// Created at process start; never mutated. The provider reference is the
/// hook through which the actual computation is plugged in.
#[derive(Clone)]
pub struct ModelDescriptor {
    key: ModelKey,
    kind: ModelKind,
    description: String,
    defaults: BTreeMap<String, ParamValue>,
    provider: Arc<dyn CapabilityProvider>,
}

impl ModelDescriptor {
    pub fn new(key: ModelKey, kind: ModelKind, provider: Arc<dyn CapabilityProvider>) -> Self {
        Self {
            key,
            kind,
            description: String::new(),
            defaults: BTreeMap::new(),
            provider,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_default(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }

    pub fn key(&self) -> &ModelKey {
        &self.key
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn defaults(&self) -> &BTreeMap<String, ParamValue> {
        &self.defaults
    }

    pub fn provider(&self) -> &Arc<dyn CapabilityProvider> {
        &self.provider
    }

    /// Request overrides layered over the descriptor defaults.
    pub fn merged_params(
        &self,
        overrides: &BTreeMap<String, ParamValue>,
    ) -> BTreeMap<String, ParamValue> {
        let mut merged = self.defaults.clone();
        for (name, value) in overrides {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }
}

impl fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("duplicate model key: {0}")]
    DuplicateKey(ModelKey),
}

/// Immutable catalogue of known models. Thread-safe by construction.
pub struct ModelCatalog {
    order: Vec<ModelKey>,
    by_key: HashMap<ModelKey, ModelDescriptor>,
}

impl ModelCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// All descriptors, in registration order.
    pub fn list(&self) -> Vec<&ModelDescriptor> {
        self.order.iter().filter_map(|k| self.by_key.get(k)).collect()
    }

    pub fn get(&self, key: &ModelKey) -> Option<&ModelDescriptor> {
        self.by_key.get(key)
    }

    pub fn contains(&self, key: &ModelKey) -> bool {
        self.by_key.contains_key(key)
    }

    /// Known keys, in registration order.
    pub fn keys(&self) -> &[ModelKey] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl fmt::Debug for ModelCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCatalog")
            .field("keys", &self.order)
            .finish()
    }
}

/// Collects descriptors before the catalogue is frozen.
#[derive(Default)]
pub struct CatalogBuilder {
    order: Vec<ModelKey>,
    by_key: HashMap<ModelKey, ModelDescriptor>,
}

impl CatalogBuilder {
    /// Add a descriptor. Duplicate keys are rejected rather than replaced.
    pub fn register(mut self, descriptor: ModelDescriptor) -> Result<Self, CatalogError> {
        let key = descriptor.key().clone();
        if self.by_key.contains_key(&key) {
            return Err(CatalogError::DuplicateKey(key));
        }
        self.order.push(key.clone());
        self.by_key.insert(key, descriptor);
        Ok(self)
    }

    pub fn build(self) -> ModelCatalog {
        ModelCatalog {
            order: self.order,
            by_key: self.by_key,
        }
    }
}
