use crate::error::{PipelineError, Result};
use crate::resolve::Answer;
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, sleep};

/// Final outcome of a submission: status and body verbatim, plus how many
/// attempts it took.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub status_code: u16,
    pub response_body: String,
    pub attempts: u32,
}

/// POSTs the answer JSON to the submission endpoint.
///
/// The payload keys keep the order of the task's required fields. Network
/// errors and 5xx responses retry with exponential backoff up to
/// `max_attempts`; a 4xx means the payload itself is the problem and fails
/// immediately. The final non-2xx outcome is always surfaced, never
/// swallowed.
pub async fn submit(
    client: &reqwest::Client,
    submission_url: &str,
    answer: &Answer,
    max_attempts: u32,
    backoff: Duration,
) -> Result<SubmissionResult> {
    let max_attempts = max_attempts.max(1);
    let payload = serde_json::Value::Object(answer.field_values.clone());

    for attempt in 1..=max_attempts {
        ::log::info!(
            "submitting answer to {} (attempt {}/{})",
            submission_url,
            attempt,
            max_attempts
        );

        let response = match client.post(submission_url).json(&payload).send().await {
            Ok(response) => response,
            Err(e) => {
                ::log::warn!("submission attempt {} failed to send: {}", attempt, e);
                if attempt < max_attempts {
                    sleep(backoff * 2u32.pow(attempt - 1)).await;
                    continue;
                }
                return Err(PipelineError::SubmissionTransport {
                    url: submission_url.to_string(),
                    attempts: attempt,
                    reason: e.to_string(),
                });
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_else(|e| {
            ::log::warn!("could not read submission response body: {}", e);
            String::new()
        });

        if status.is_success() {
            ::log::info!("submission accepted with status {}", status);
            return Ok(SubmissionResult {
                status_code: status.as_u16(),
                response_body: body,
                attempts: attempt,
            });
        }

        if status.is_server_error() && attempt < max_attempts {
            ::log::warn!("submission attempt {} got status {}, retrying", attempt, status);
            sleep(backoff * 2u32.pow(attempt - 1)).await;
            continue;
        }

        // 4xx, or a 5xx with the retry budget exhausted
        return Err(PipelineError::Submission {
            url: submission_url.to_string(),
            status: status.as_u16(),
            attempts: attempt,
            body,
        });
    }

    unreachable!("submission loop always returns within max_attempts")
}
