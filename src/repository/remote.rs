//! Repository backed by a remote key/value configuration service.
//!
//! Each configured key holds one feature entry. A refresh fetches every key
//! with `GET {endpoint}/kv/{key}?label={label}&api-version=1.0` and decodes the
//! `value` field of the JSON envelope as a YAML/JSON feature entry.
//!
//! A key that fails to fetch keeps the definition from its last successful
//! fetch; it only disappears if it was never fetched successfully. Refresh as
//! a whole never fails because of individual keys.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{FeatureEntry, FeatureMap, FeatureRepository, FeatureStore};
use crate::error::{FetchError, RepositoryError};
use crate::evaluation::FeatureDefinition;

const API_VERSION: &str = "1.0";

#[derive(Debug, Clone)]
pub struct AppConfigSettings {
    pub endpoint: String,
    pub label: String,
    pub keys: Vec<String>,
    pub token: String,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct KeyValueEnvelope {
    value: Option<String>,
}

pub struct RemoteFeatureRepository {
    settings: AppConfigSettings,
    base: Url,
    client: Client,
    store: FeatureStore,
    // last successful definition per key; the lock also serializes refreshes
    fetched: Mutex<HashMap<String, Arc<FeatureDefinition>>>,
}

impl RemoteFeatureRepository {
    /// Builds the client without fetching anything; call `refresh` to load.
    pub fn new(settings: AppConfigSettings) -> Result<Self, RepositoryError> {
        let invalid = |reason: String| RepositoryError::InvalidEndpoint {
            endpoint: settings.endpoint.clone(),
            reason,
        };
        let base = Url::parse(&settings.endpoint).map_err(|e| invalid(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(invalid("not a base URL".to_string()));
        }

        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            settings,
            base,
            client,
            store: FeatureStore::default(),
            fetched: Mutex::new(HashMap::new()),
        })
    }

    // keys go in as a single escaped segment, so `/`, `?` and `#` stay inside it
    fn key_url(&self, key: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("kv").push(key);
        }
        url
    }

    async fn fetch_key(&self, key: &str) -> Result<FeatureDefinition, FetchError> {
        let request = self
            .client
            .get(self.key_url(key))
            .query(&[("label", self.settings.label.as_str()), ("api-version", API_VERSION)])
            .bearer_auth(&self.settings.token)
            .header("Content-Type", "application/json");

        let response = tokio::time::timeout(self.settings.timeout, request.send())
            .await
            .map_err(|_| FetchError::Timeout(key.to_string()))??;

        if response.status() != StatusCode::OK {
            return Err(FetchError::Status {
                key: key.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = tokio::time::timeout(self.settings.timeout, response.text())
            .await
            .map_err(|_| FetchError::Timeout(key.to_string()))??;
        let envelope: KeyValueEnvelope = serde_json::from_str(&body)?;
        let value = envelope
            .value
            .ok_or_else(|| FetchError::MissingValue(key.to_string()))?;

        let entry: FeatureEntry = serde_yaml::from_str(&value)?;
        FeatureDefinition::try_from(entry).map_err(|e| FetchError::InvalidDefinition(e.to_string()))
    }
}

impl std::fmt::Debug for RemoteFeatureRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFeatureRepository")
            .field("endpoint", &self.settings.endpoint)
            .field("label", &self.settings.label)
            .field("keys", &self.settings.keys)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl FeatureRepository for RemoteFeatureRepository {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn get_feature(&self, name: &str) -> Option<Arc<FeatureDefinition>> {
        self.store.get(name)
    }

    fn get_all_features(&self) -> Arc<FeatureMap> {
        self.store.snapshot()
    }

    /// Local additions live until the next refresh rebuilds from the key list.
    fn add_feature(&self, def: FeatureDefinition) -> Result<(), RepositoryError> {
        self.store.upsert(def)
    }

    async fn refresh(&self) -> Result<(), RepositoryError> {
        let mut fetched = self.fetched.lock().await;

        let mut next_by_key = HashMap::with_capacity(self.settings.keys.len());
        let mut failed = 0usize;

        for key in &self.settings.keys {
            match self.fetch_key(key).await {
                Ok(def) => {
                    next_by_key.insert(key.clone(), Arc::new(def));
                }
                Err(e) => {
                    failed += 1;
                    match fetched.get(key) {
                        Some(previous) => {
                            warn!(key = %key, error = %e, "fetch failed, keeping previous definition");
                            next_by_key.insert(key.clone(), Arc::clone(previous));
                        }
                        None => warn!(key = %key, error = %e, "fetch failed, key has no definition"),
                    }
                }
            }
        }

        // walk keys in configured order so the later key wins a name clash
        let mut features = FeatureMap::with_capacity(next_by_key.len());
        for key in &self.settings.keys {
            let Some(def) = next_by_key.get(key) else {
                continue;
            };
            if let Some(existing) = features.insert(def.name.clone(), Arc::clone(def)) {
                warn!(key = %key, feature = %existing.name, "feature defined under more than one key");
            }
        }

        info!(
            fetched = self.settings.keys.len() - failed,
            failed,
            features = features.len(),
            "refreshed remote features"
        );

        self.store.replace(features);
        *fetched = next_by_key;
        Ok(())
    }
}
