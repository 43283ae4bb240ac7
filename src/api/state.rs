use std::sync::Arc;

use crate::config::AppConfig;
use crate::detect::Detector;

#[derive(Clone)]
pub struct AppState {
    pub detector: Arc<Detector>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(detector: Detector, config: AppConfig) -> Self {
        Self {
            detector: Arc::new(detector),
            config: Arc::new(config),
        }
    }
}
