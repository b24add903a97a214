pub mod static_http;
pub mod webdriver;

use crate::FetchMode;
use crate::config::PipelineConfig;
use crate::error::Result;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// How a snapshot was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMethod {
    Static,
    Dynamic,
}

impl fmt::Display for FetchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchMethod::Static => write!(f, "static"),
            FetchMethod::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// Rendered page captured at fetch time. Immutable once captured; the
/// content extractor is its only consumer.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    /// Rendered HTML source
    pub html: String,

    /// Final URL after redirects and navigation
    pub final_url: String,

    pub method: FetchMethod,

    pub fetched_at: SystemTime,
}

/// Fetches a page snapshot using the requested mode.
///
/// `Auto` fetches statically first and re-fetches through the WebDriver
/// when the page looks script-rendered; if the dynamic fetch fails the
/// static snapshot is kept rather than failing the run.
pub async fn fetch(
    url: &str,
    mode: FetchMode,
    config: &PipelineConfig,
    client: &reqwest::Client,
) -> Result<PageSnapshot> {
    match mode {
        FetchMode::Static => static_http::fetch_static(client, url).await,
        FetchMode::Dynamic => webdriver::fetch_dynamic(url, config).await,
        FetchMode::Auto => {
            let snapshot = static_http::fetch_static(client, url).await?;
            if !is_likely_dynamic(&snapshot.html) {
                return Ok(snapshot);
            }
            ::log::info!("page looks script-rendered, re-fetching through WebDriver: {}", url);
            match webdriver::fetch_dynamic(url, config).await {
                Ok(rendered) => Ok(rendered),
                Err(e) => {
                    ::log::warn!("dynamic render failed, keeping static snapshot: {}", e);
                    Ok(snapshot)
                }
            }
        }
    }
}

/// Markers that suggest the page body is produced by script
const DYNAMIC_MARKERS: [&str; 7] = [
    r#"<div[^>]+id=["']root["']"#,
    r#"<div[^>]+id=["']app["']"#,
    r"(?i)react",
    r"(?i)vue",
    r"(?i)angular",
    "__NEXT_DATA__",
    "__NUXT__",
];

/// Heuristic to detect a JavaScript-rendered page: each framework marker
/// scores one point, a near-empty visible body scores two, and a total of
/// two or more classifies the page as dynamic.
pub fn is_likely_dynamic(html: &str) -> bool {
    let mut score = 0usize;

    for marker in DYNAMIC_MARKERS {
        if let Ok(regex) = regex::Regex::new(marker) {
            if regex.is_match(html) {
                score += 1;
            }
        }
    }

    let doc = Html::parse_document(html);
    let body_selector = Selector::parse("body").unwrap();
    let body_text_len = doc
        .select(&body_selector)
        .flat_map(|body| body.text())
        .map(|t| t.trim().len())
        .sum::<usize>();
    if body_text_len < 100 {
        score += 2;
    }

    score >= 2
}
