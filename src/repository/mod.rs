//! Backing stores for feature definitions.
//!
//! All variants keep their definitions in a [`FeatureStore`]: an immutable
//! snapshot behind a lock that is only ever replaced whole. Readers clone the
//! current `Arc` and evaluate against it, so a refresh that lands mid-request
//! is never observed half-applied.

pub mod file;
pub mod memory;
pub mod remote;

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::RepositoryError;
use crate::evaluation::{FeatureDefinition, FilterConfig};

pub use file::FileFeatureRepository;
pub use memory::InMemoryFeatureRepository;
pub use remote::{AppConfigSettings, RemoteFeatureRepository};

pub type FeatureMap = HashMap<String, Arc<FeatureDefinition>>;

#[async_trait]
pub trait FeatureRepository: Send + Sync {
    /// Human-readable source name for logging.
    fn name(&self) -> &'static str;

    fn get_feature(&self, name: &str) -> Option<Arc<FeatureDefinition>>;

    /// Snapshot of every definition currently known.
    fn get_all_features(&self) -> Arc<FeatureMap>;

    fn add_feature(&self, def: FeatureDefinition) -> Result<(), RepositoryError>;

    /// Reload definitions from the backing source.
    async fn refresh(&self) -> Result<(), RepositoryError>;
}

#[derive(Debug, Default)]
pub struct FeatureStore {
    current: RwLock<Arc<FeatureMap>>,
}

impl FeatureStore {
    pub fn new(features: FeatureMap) -> Self {
        Self {
            current: RwLock::new(Arc::new(features)),
        }
    }

    pub fn snapshot(&self) -> Arc<FeatureMap> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn get(&self, name: &str) -> Option<Arc<FeatureDefinition>> {
        self.snapshot().get(name).cloned()
    }

    /// Publishes a fully built map in a single swap.
    pub fn replace(&self, features: FeatureMap) {
        let next = Arc::new(features);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = next;
    }

    // copy-on-write: readers holding the previous snapshot keep it intact
    pub fn upsert(&self, def: FeatureDefinition) -> Result<(), RepositoryError> {
        validate(&def)?;
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let mut next = FeatureMap::clone(&guard);
        next.insert(def.name.clone(), Arc::new(def));
        *guard = Arc::new(next);
        Ok(())
    }
}

fn validate(def: &FeatureDefinition) -> Result<(), RepositoryError> {
    if def.name.trim().is_empty() {
        return Err(RepositoryError::InvalidDefinition(
            "feature name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

// DOCUMENT FORMAT

/// Root of a feature document:
///
/// ```yaml
/// features:
///   - name: AdminOnlyFeature
///     enabled: true
///     filters:
///       - name: RoleBased
///         parameters:
///           role: admin
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct FeatureDocument {
    #[serde(default)]
    pub features: Vec<FeatureEntry>,
}

#[derive(Debug, Deserialize)]
pub struct FeatureEntry {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

fn default_enabled() -> bool {
    true
}

impl TryFrom<FeatureEntry> for FeatureDefinition {
    type Error = RepositoryError;

    fn try_from(entry: FeatureEntry) -> Result<Self, Self::Error> {
        let def = FeatureDefinition::new(entry.name, entry.enabled, entry.filters);
        validate(&def)?;
        Ok(def)
    }
}

/// Parses a whole document into a map keyed by feature name.
pub fn parse_document(raw: &str) -> Result<FeatureMap, RepositoryError> {
    let document: FeatureDocument = serde_yaml::from_str(raw)?;

    let mut features = FeatureMap::with_capacity(document.features.len());
    for entry in document.features {
        let def = FeatureDefinition::try_from(entry)?;
        if features.contains_key(&def.name) {
            return Err(RepositoryError::DuplicateFeature(def.name));
        }
        features.insert(def.name.clone(), Arc::new(def));
    }
    Ok(features)
}
