use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Configuration for a pipeline invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// URL of the WebDriver instance used for dynamic rendering
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Endpoint of the external speech-to-text collaborator.
    /// When unset, discovered audio clips are recorded as failed transcripts.
    #[serde(default)]
    pub transcriber_url: Option<String>,

    /// User-Agent header sent on every HTTP request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout in seconds applied to every network call
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Milliseconds to wait after document.readyState settles before
    /// reading the rendered source
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Regex patterns that classify a link as a submission endpoint
    #[serde(default = "default_submit_patterns")]
    pub submit_patterns: Vec<String>,

    /// Maximum number of submission attempts (network errors and 5xx retry)
    #[serde(default = "default_max_submit_attempts")]
    pub max_submit_attempts: u32,

    /// Base delay in milliseconds for exponential submission backoff
    #[serde(default = "default_submit_backoff_ms")]
    pub submit_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            transcriber_url: None,
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
            settle_ms: default_settle_ms(),
            submit_patterns: default_submit_patterns(),
            max_submit_attempts: default_max_submit_attempts(),
            submit_backoff_ms: default_submit_backoff_ms(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error>> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, Box<dyn Error>> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config)
    }
}

/// Default value for webdriver_url
fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

/// Default browser-like User-Agent
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
}

/// Default network timeout in seconds
fn default_request_timeout_secs() -> u64 {
    30
}

/// Default settle delay after dynamic rendering
fn default_settle_ms() -> u64 {
    2000
}

/// Default patterns identifying submission endpoints
fn default_submit_patterns() -> Vec<String> {
    vec!["submit".to_string(), "receiver".to_string()]
}

/// Default submission retry budget
fn default_max_submit_attempts() -> u32 {
    3
}

/// Default base backoff between submission attempts
fn default_submit_backoff_ms() -> u64 {
    500
}
