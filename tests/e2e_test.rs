//! End-to-end tests against a running server
//!
//! These tests require:
//! 1. The slip-scan server running with a writable DATA_ROOT
//! 2. An OCR model server reachable at the configured OCR_URL
//!
//! Run with: cargo test --test e2e_test -- --ignored --nocapture
//!
//! Set API_BASE_URL to override default (http://localhost:3000)

mod helpers;

use helpers::*;

/// Get base URL from env or default to localhost
fn get_base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

#[tokio::test]
#[ignore] // Requires running server and OCR engine
async fn test_e2e_health_check() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .expect("Health check failed");

    assert!(
        response.status().is_success(),
        "Health check returned non-success status: {}",
        response.status()
    );

    println!("✓ Health check passed");
}

#[tokio::test]
#[ignore] // Requires running server and OCR engine
async fn test_e2e_single_slip_flow() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    // 1. Upload a slip image
    let upload = upload_slip_image(&client, &base_url, "e2e-user-single", tiny_png())
        .await
        .expect("Failed to upload image");

    assert_eq!(upload.status, "queued");
    println!("  ✓ Upload accepted, job_id: {}", upload.job_id);

    // 2. Poll until the job reaches a terminal state
    let status = wait_for_job_completion(&client, &base_url, &upload.job_id)
        .await
        .expect("Failed to wait for job completion");

    println!("  ✓ Job finished with status: {}", status.status);

    // 3. A succeeded job carries its recognition result
    if status.status == "succeeded" {
        let result = status.result.expect("succeeded job should carry a result");
        let full_text = result
            .get("full_text")
            .and_then(|v| v.as_str())
            .expect("result should carry full_text");
        println!("  ✓ Recognized {} characters", full_text.len());
    } else {
        println!("  ⚠ Job failed: {:?}", status.error);
    }
}

#[tokio::test]
#[ignore]
async fn test_e2e_invalid_image_rejected() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    // Random bytes with no image signature
    let form = reqwest::multipart::Form::new()
        .text("user_id", "e2e-user-invalid")
        .part(
            "image",
            reqwest::multipart::Part::bytes(vec![0u8; 100])
                .file_name("fake.png")
                .mime_str("image/png")
                .unwrap(),
        );

    let response = client
        .post(format!("{}/api/v1/slips", base_url))
        .multipart(form)
        .send()
        .await
        .expect("Request failed");

    assert!(
        response.status().is_client_error(),
        "Should reject invalid image format, got status: {}",
        response.status()
    );

    println!("  ✓ Invalid image rejected with status: {}", response.status());
}

#[tokio::test]
#[ignore]
async fn test_e2e_second_upload_while_in_flight_is_rejected() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let first = upload_slip_image(&client, &base_url, "e2e-user-busy", tiny_png())
        .await
        .expect("First upload failed");
    println!("  ✓ First upload accepted: {}", first.job_id);

    // Immediate second upload for the same user
    let form = reqwest::multipart::Form::new()
        .text("user_id", "e2e-user-busy")
        .part(
            "image",
            reqwest::multipart::Part::bytes(tiny_png())
                .file_name("slip.png")
                .mime_str("image/png")
                .unwrap(),
        );

    let response = client
        .post(format!("{}/api/v1/slips", base_url))
        .multipart(form)
        .send()
        .await
        .expect("Second upload request failed");

    // 429 while the first job is in flight; a fast engine may have already
    // finished it, in which case the upload is simply accepted.
    if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
        println!("  ✓ Second upload rejected while in flight");
    } else {
        assert!(
            response.status().is_success(),
            "Unexpected status for second upload: {}",
            response.status()
        );
        println!("  ⚠ First job finished before the second upload; not rejected");
    }

    // Drain the first job so later tests start clean
    let _ = wait_for_job_completion(&client, &base_url, &first.job_id).await;
}

#[tokio::test]
#[ignore]
async fn test_e2e_concurrent_users() {
    let base_url = get_base_url();

    println!("Testing concurrent uploads from 3 users");

    let mut tasks = Vec::new();
    for i in 0..3 {
        let base_url = base_url.clone();
        let task = tokio::spawn(async move {
            let client = reqwest::Client::new();
            let user_id = format!("e2e-user-concurrent-{i}");

            let upload = upload_slip_image(&client, &base_url, &user_id, tiny_png()).await?;
            let status = wait_for_job_completion(&client, &base_url, &upload.job_id).await?;

            Ok::<_, Box<dyn std::error::Error + Send + Sync>>((user_id, status))
        });
        tasks.push(task);
    }

    let results = futures::future::join_all(tasks).await;

    let mut terminal = 0;
    for result in results {
        match result {
            Ok(Ok((user_id, status))) => {
                println!("  ✓ {} finished with status: {}", user_id, status.status);
                terminal += 1;
            }
            Ok(Err(e)) => println!("  ✗ Upload/processing error: {}", e),
            Err(e) => println!("  ✗ Task error: {}", e),
        }
    }

    assert_eq!(terminal, 3, "All concurrent users should reach a terminal state");
}
