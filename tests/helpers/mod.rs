use std::error::Error;
use std::time::Duration;

use serde::Deserialize;

/// Minimal bytes that pass the server's image format sniff (PNG signature
/// plus padding). The mock-friendly e2e flow never decodes pixels.
pub fn tiny_png() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&[0u8; 64]);
    bytes
}

#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: String,
    pub result: Option<serde_json::Value>,
    pub slip: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Upload a slip image for the given user.
pub async fn upload_slip_image(
    client: &reqwest::Client,
    base_url: &str,
    user_id: &str,
    image: Vec<u8>,
) -> Result<SubmitResponse, Box<dyn Error + Send + Sync>> {
    let form = reqwest::multipart::Form::new()
        .text("user_id", user_id.to_string())
        .part(
            "image",
            reqwest::multipart::Part::bytes(image)
                .file_name("slip.png")
                .mime_str("image/png")?,
        );

    let response = client
        .post(format!("{base_url}/api/v1/slips"))
        .multipart(form)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(format!("upload returned {}", response.status()).into());
    }

    Ok(response.json().await?)
}

/// Poll job status until it reaches a terminal state.
pub async fn wait_for_job_completion(
    client: &reqwest::Client,
    base_url: &str,
    job_id: &str,
) -> Result<JobStatusResponse, Box<dyn Error + Send + Sync>> {
    for _ in 0..60 {
        let status: JobStatusResponse = client
            .get(format!("{base_url}/api/v1/slips/{job_id}"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if status.status == "succeeded" || status.status == "failed" {
            return Ok(status);
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    Err("job did not complete in time".into())
}
