use async_trait::async_trait;
use std::sync::Arc;

use super::{FeatureMap, FeatureRepository, FeatureStore};
use crate::error::RepositoryError;
use crate::evaluation::filters::{ALWAYS_ON, ROLE_BASED};
use crate::evaluation::{FeatureDefinition, FilterConfig};

/// Caller-populated repository. Refresh has nothing to reload.
#[derive(Debug, Default)]
pub struct InMemoryFeatureRepository {
    store: FeatureStore,
}

impl InMemoryFeatureRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a small demo set for empty deployments. Nothing relies on these
    /// flags existing.
    pub fn with_demo_features() -> Self {
        let demo = [
            FeatureDefinition::new(
                "AdminFeature",
                true,
                vec![FilterConfig::new(ROLE_BASED).with_param("role", "admin")],
            ),
            FeatureDefinition::new("AlwaysOnFeature", true, vec![FilterConfig::new(ALWAYS_ON)]),
            FeatureDefinition::new("DisabledFeature", false, vec![FilterConfig::new(ALWAYS_ON)]),
        ];

        let features: FeatureMap = demo
            .into_iter()
            .map(|def| (def.name.clone(), Arc::new(def)))
            .collect();

        Self {
            store: FeatureStore::new(features),
        }
    }
}

#[async_trait]
impl FeatureRepository for InMemoryFeatureRepository {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get_feature(&self, name: &str) -> Option<Arc<FeatureDefinition>> {
        self.store.get(name)
    }

    fn get_all_features(&self) -> Arc<FeatureMap> {
        self.store.snapshot()
    }

    fn add_feature(&self, def: FeatureDefinition) -> Result<(), RepositoryError> {
        self.store.upsert(def)
    }

    async fn refresh(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
