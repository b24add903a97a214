use crate::error::{PipelineError, Result};
use crate::fetchers::{FetchMethod, PageSnapshot};
use std::time::SystemTime;

/// Fetches a page over plain HTTP, following redirects.
///
/// The snapshot's final URL is the URL the client ended up on, not the
/// requested one, so later relative-URL resolution uses the right base.
pub async fn fetch_static(client: &reqwest::Client, url: &str) -> Result<PageSnapshot> {
    ::log::debug!("static fetch: {}", url);

    let response = client.get(url).send().await.map_err(|e| PipelineError::Fetch {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let final_url = response.url().to_string();
    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::Fetch {
            url: url.to_string(),
            reason: format!("server returned status {}", status),
        });
    }

    let html = response.text().await.map_err(|e| PipelineError::Fetch {
        url: url.to_string(),
        reason: format!("failed to read body: {}", e),
    })?;

    ::log::debug!("static fetch of {} returned {} bytes", final_url, html.len());

    Ok(PageSnapshot {
        html,
        final_url,
        method: FetchMethod::Static,
        fetched_at: SystemTime::now(),
    })
}
