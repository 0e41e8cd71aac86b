use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::{parse_document, FeatureMap, FeatureRepository, FeatureStore};
use crate::error::RepositoryError;
use crate::evaluation::FeatureDefinition;

/// Repository backed by a YAML (or JSON) document on disk.
///
/// The document is parsed on construction and on every refresh. A document
/// that is missing or fails to parse is an error; the previous snapshot stays
/// live and nothing from the failed load is adopted.
#[derive(Debug)]
pub struct FileFeatureRepository {
    path: PathBuf,
    store: FeatureStore,
    refresh_lock: Mutex<()>,
}

impl FileFeatureRepository {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let path = path.into();
        let raw = std::fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
        let features = parse_document(&raw)?;
        info!(path = %path.display(), count = features.len(), "loaded feature document");

        Ok(Self {
            path,
            store: FeatureStore::new(features),
            refresh_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn io_error(path: &Path, source: std::io::Error) -> RepositoryError {
    if source.kind() == ErrorKind::NotFound {
        RepositoryError::DocumentNotFound(path.to_path_buf())
    } else {
        RepositoryError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
impl FeatureRepository for FileFeatureRepository {
    fn name(&self) -> &'static str {
        "file"
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
        let _guard = self.refresh_lock.lock().await;

        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;
        let features = parse_document(&raw)?;
        info!(path = %self.path.display(), count = features.len(), "reloaded feature document");

        self.store.replace(features);
        Ok(())
    }
}
