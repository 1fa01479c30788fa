//! Uploads a CSV file to a running scoring server and prints the JSON reply.
//!
//! Usage: submit <file.csv> <xgboost|lightgbm> [sample_size]

use std::process::ExitCode;
use std::time::Duration;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (path, model) = match (args.first(), args.get(1)) {
        (Some(p), Some(m)) => (p.clone(), m.clone()),
        _ => {
            eprintln!("usage: submit <file.csv> <xgboost|lightgbm> [sample_size]");
            return ExitCode::from(2);
        }
    };
    let sample_size = args.get(2).cloned().unwrap_or_else(|| "5".to_string());
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());

    match submit(&base_url, &path, &model, &sample_size).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("submit failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the server answered with a success status.
async fn submit(
    base_url: &str,
    path: &str,
    model: &str,
    sample_size: &str,
) -> Result<bool, Box<dyn std::error::Error>> {
    let body = tokio::fs::read(path).await?;

    // Large uploads are scored and committed before the server replies.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(600))
        .build()?;

    let resp = client
        .post(format!("{base_url}/predict"))
        .query(&[("model_type", model), ("sample_size", sample_size)])
        .header(reqwest::header::CONTENT_TYPE, "text/csv")
        .body(body)
        .send()
        .await?;

    let status = resp.status();
    let json: serde_json::Value = resp.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    if !status.is_success() {
        eprintln!("server returned {status}");
    }
    Ok(status.is_success())
}
