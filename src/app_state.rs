use std::sync::Arc;

use crate::services::lifecycle::JobManager;
use crate::services::ocr::OcrEngine;
use crate::services::storage::JobStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<JobManager>,
    pub store: Arc<JobStore>,
    pub engine: Arc<dyn OcrEngine>,
}
