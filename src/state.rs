use std::sync::Arc;

use crate::evaluation::FeatureManager;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<FeatureManager>,
}
