// Re-export modules
pub mod audio;
pub mod config;
pub mod decode;
pub mod error;
pub mod extract;
pub mod fetchers;
pub mod interpret;
pub mod report;
pub mod resolve;
pub mod submit;

// Re-export commonly used types for convenience
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use interpret::{TaskDescription, TaskInputs};
pub use report::ContentReport;
pub use resolve::Answer;
pub use submit::SubmissionResult;

use audio::{HttpTranscriber, Transcriber};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::time::Duration;

/// How the target page should be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Fetch statically and re-render through the WebDriver only when the
    /// page looks script-rendered
    Auto,
    /// Plain HTTP fetch
    Static,
    /// Always render through the WebDriver
    Dynamic,
}

/// Everything a run produced, whether or not it got all the way through.
///
/// The content report is present whenever extraction succeeded, even when a
/// later stage failed; the failure then sits in `error` with the stage that
/// produced it.
#[derive(Debug, Serialize)]
pub struct RunOutcome {
    pub report: Option<ContentReport>,

    #[serde(skip)]
    pub report_markdown: Option<String>,

    pub task: Option<TaskDescription>,

    pub answer: Option<Answer>,

    pub submission: Option<SubmissionResult>,

    pub failed_stage: Option<&'static str>,

    pub error: Option<String>,
}

impl RunOutcome {
    fn empty() -> Self {
        Self {
            report: None,
            report_markdown: None,
            task: None,
            answer: None,
            submission: None,
            failed_stage: None,
            error: None,
        }
    }

    fn fail(mut self, error: PipelineError) -> Self {
        self.failed_stage = Some(error.stage());
        self.error = Some(error.to_string());
        self
    }
}

/// Builder for a single extraction-and-interpretation run.
///
/// Each invocation is independent and stateless: the HTTP client and any
/// WebDriver session live only for the duration of `run`.
pub struct Pipeline {
    url: String,
    mode: FetchMode,
    inputs: TaskInputs,
    config: PipelineConfig,
    transcriber: Option<Arc<dyn Transcriber>>,
    dry_run: bool,
}

impl Pipeline {
    /// Create a new pipeline for the given quiz page URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mode: FetchMode::Auto,
            inputs: TaskInputs::default(),
            config: PipelineConfig::default(),
            transcriber: None,
            dry_run: false,
        }
    }

    /// Set the fetch mode
    pub fn with_mode(mut self, mode: FetchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the caller's email parameter
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.inputs.email = Some(email.into());
        self
    }

    /// Set the caller's secret parameter
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.inputs.secret = Some(secret.into());
        self
    }

    /// Apply a configuration
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Load configuration from a JSON file
    pub fn with_config_file(
        mut self,
        path: impl AsRef<Path>,
    ) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        self.config = PipelineConfig::from_file(path)?;
        Ok(self)
    }

    /// Replace the speech-to-text collaborator (mainly for tests)
    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// Stop before the submission stage
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Run the pipeline: fetch, extract, transcribe, decode, interpret,
    /// resolve, submit. Stages run strictly in that order.
    pub async fn run(self) -> RunOutcome {
        let mut config = self.config;

        // Environment override, same as the WEBDRIVER_URL convention used
        // by local WebDriver setups
        if let Ok(webdriver_url) = std::env::var("WEBDRIVER_URL") {
            if !webdriver_url.is_empty() {
                config.webdriver_url = webdriver_url;
            }
        }

        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = match reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(timeout)
            .build()
        {
            Ok(client) => client,
            Err(e) => return RunOutcome::empty().fail(PipelineError::Http(e)),
        };

        ::log::info!("starting pipeline for {}", self.url);

        // Stage 1: fetch
        let snapshot = match fetchers::fetch(&self.url, self.mode, &config, &client).await {
            Ok(snapshot) => snapshot,
            Err(e) => return RunOutcome::empty().fail(e),
        };

        // Stage 1b: extract
        let mut report = extract::extract(&snapshot);

        // Stage 2: audio transcripts
        let transcriber = self.transcriber.clone().or_else(|| {
            config.transcriber_url.as_ref().map(|endpoint| {
                Arc::new(HttpTranscriber::new(endpoint.clone(), client.clone()))
                    as Arc<dyn Transcriber>
            })
        });
        match transcriber {
            Some(transcriber) => {
                audio::resolve_audio(&mut report, transcriber, timeout).await;
            }
            None => audio::mark_transcriber_unavailable(&mut report),
        }

        // Stage 3: encoded content
        decode::decode_embedded(&mut report, &snapshot.html);

        // Stage 7 branches off here for observability
        let markdown = report::to_markdown(&report);

        let mut outcome = RunOutcome::empty();
        outcome.report_markdown = Some(markdown);

        // Stage 4: interpret
        let task = match interpret::interpret(&report, &self.inputs, &config) {
            Ok(task) => task,
            Err(e) => {
                outcome.report = Some(report);
                return outcome.fail(e);
            }
        };

        // Stage 5: resolve
        let answer = match resolve::resolve(&task, &report, &self.inputs, &client).await {
            Ok(answer) => answer,
            Err(e) => {
                outcome.report = Some(report);
                outcome.task = Some(task);
                return outcome.fail(e);
            }
        };

        outcome.report = Some(report);

        if self.dry_run {
            ::log::info!("dry run requested, skipping submission");
            outcome.task = Some(task);
            outcome.answer = Some(answer);
            return outcome;
        }

        // Stage 6: submit
        let submission = submit::submit(
            &client,
            &task.submission_url,
            &answer,
            config.max_submit_attempts,
            Duration::from_millis(config.submit_backoff_ms),
        )
        .await;

        outcome.task = Some(task);
        outcome.answer = Some(answer);
        match submission {
            Ok(result) => {
                outcome.submission = Some(result);
                outcome
            }
            Err(e) => outcome.fail(e),
        }
    }
}
