use serde::Serialize;

/// Response after submitting a slip image for reading.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: uuid::Uuid,
    pub status: String,
    pub message: String,
}

/// Response for querying job status.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: uuid::Uuid,
    pub status: String,
    pub result: Option<serde_json::Value>,
    pub slip: Option<serde_json::Value>,
    pub error: Option<String>,
}
