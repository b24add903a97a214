use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::fetchers::{FetchMethod, PageSnapshot};
use fantoccini::{Client, ClientBuilder};
use std::time::SystemTime;
use tokio::time::{Duration, sleep, timeout};

/// Fetches a page through a WebDriver session, waiting for script-driven
/// rendering to settle before reading the source.
///
/// The session is acquired for this fetch only and closed on every exit
/// path, so concurrent pipeline invocations never share a browser.
pub async fn fetch_dynamic(url: &str, config: &PipelineConfig) -> Result<PageSnapshot> {
    let client = match connect_to_webdriver(&config.webdriver_url).await {
        Some(client) => client,
        None => {
            return Err(PipelineError::Fetch {
                url: url.to_string(),
                reason: "could not connect to any WebDriver endpoint".to_string(),
            });
        }
    };

    let budget = Duration::from_secs(config.request_timeout_secs);
    let result = match timeout(budget, drive(&client, url, config)).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::Fetch {
            url: url.to_string(),
            reason: format!("timed out after {:?} waiting for the page to render", budget),
        }),
    };

    if let Err(e) = client.close().await {
        ::log::warn!("failed to close WebDriver session: {}", e);
    }

    result
}

/// Navigates, waits for readiness, and captures the rendered source
async fn drive(client: &Client, url: &str, config: &PipelineConfig) -> Result<PageSnapshot> {
    client.goto(url).await.map_err(|e| PipelineError::Fetch {
        url: url.to_string(),
        reason: format!("navigation failed: {}", e),
    })?;

    wait_for_ready(client).await;
    sleep(Duration::from_millis(config.settle_ms)).await;

    let html = client.source().await.map_err(|e| PipelineError::Fetch {
        url: url.to_string(),
        reason: format!("failed to read page source: {}", e),
    })?;

    let final_url = match client.current_url().await {
        Ok(current) => current.to_string(),
        Err(e) => {
            ::log::warn!("could not read current URL, keeping requested one: {}", e);
            url.to_string()
        }
    };

    ::log::debug!("dynamic fetch of {} returned {} bytes", final_url, html.len());

    Ok(PageSnapshot {
        html,
        final_url,
        method: FetchMethod::Dynamic,
        fetched_at: SystemTime::now(),
    })
}

/// Polls document.readyState until the document reports complete.
/// Bounded; rendering still gets the settle delay afterwards.
async fn wait_for_ready(client: &Client) {
    for _ in 0..25 {
        match client.execute("return document.readyState;", vec![]).await {
            Ok(state) if state.as_str() == Some("complete") => return,
            Ok(_) => {}
            Err(e) => {
                ::log::debug!("readyState poll failed: {}", e);
                return;
            }
        }
        sleep(Duration::from_millis(200)).await;
    }
}

/// Connects to the WebDriver instance, trying common fallback endpoints
/// when the configured one is unreachable
async fn connect_to_webdriver(webdriver_url: &str) -> Option<Client> {
    match ClientBuilder::native().connect(webdriver_url).await {
        Ok(client) => {
            ::log::debug!("connected to WebDriver at {}", webdriver_url);
            return Some(client);
        }
        Err(e) => {
            ::log::error!("failed to connect to WebDriver at {}: {}", webdriver_url, e);
        }
    }

    let fallback_urls = [
        "http://localhost:9515", // ChromeDriver default
        "http://localhost:4723", // Appium default
        "http://localhost:9222", // Chrome debug port default
        "http://127.0.0.1:4444", // Try with IP instead of localhost
    ];

    for fallback in fallback_urls.iter() {
        if *fallback == webdriver_url {
            continue;
        }

        ::log::info!("trying fallback WebDriver URL: {}", fallback);
        if let Ok(client) = ClientBuilder::native().connect(fallback).await {
            ::log::debug!("connected to fallback WebDriver at {}", fallback);
            return Some(client);
        }
    }

    ::log::error!("failed to connect to any WebDriver server");
    ::log::error!("make sure a WebDriver server is running or set the WEBDRIVER_URL environment variable");
    None
}
