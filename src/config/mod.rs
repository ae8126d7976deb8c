use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Root of the mounted data volume for job records and results.
    #[serde(default = "default_data_root")]
    pub data_root: String,

    /// Base URL of the OCR model server.
    pub ocr_url: String,

    /// Comma-separated language codes passed to the engine.
    #[serde(default = "default_ocr_languages")]
    pub ocr_languages: String,

    /// Regions below this confidence are excluded from slip parsing.
    #[serde(default = "default_ocr_min_confidence")]
    pub ocr_min_confidence: f64,

    /// Size of the OCR worker pool.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Per-invocation OCR timeout in seconds.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Retry bound for transient engine failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,

    /// Base backoff between retries, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_data_root() -> String {
    "/data".to_string()
}

fn default_ocr_languages() -> String {
    "en".to_string()
}

fn default_ocr_min_confidence() -> f64 {
    0.3
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

fn default_job_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> i32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn languages(&self) -> Vec<String> {
        self.ocr_languages
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
