use crate::error::{PipelineError, Result};
use crate::report::{AudioTranscript, ContentReport, TranscriptStatus};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{Duration, timeout};

/// File extensions recognized as audio clips
pub const AUDIO_EXTENSIONS: [&str; 5] = ["opus", "mp3", "wav", "m4a", "ogg"];

/// Speech-to-text collaborator. Implementations receive the absolute URL of
/// an audio clip and return the transcript text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_url: &str) -> Result<String>;
}

/// Transcriber that downloads the clip and hands the bytes to an external
/// speech-to-text HTTP endpoint returning `{"status": ..., "text": ...}`.
pub struct HttpTranscriber {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTranscriber {
    pub fn new(endpoint: String, client: reqwest::Client) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio_url: &str) -> Result<String> {
        let transcription_error = |reason: String| PipelineError::Transcription {
            url: audio_url.to_string(),
            reason,
        };

        let audio_bytes = self
            .client
            .get(audio_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| transcription_error(format!("audio download failed: {}", e)))?
            .bytes()
            .await
            .map_err(|e| transcription_error(format!("audio download failed: {}", e)))?;

        ::log::debug!("downloaded {} bytes from {}", audio_bytes.len(), audio_url);

        let response: serde_json::Value = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/octet-stream")
            .body(audio_bytes.to_vec())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| transcription_error(format!("transcription request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| transcription_error(format!("malformed transcription response: {}", e)))?;

        let status = response
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or_default();
        if status != "success" {
            return Err(transcription_error(format!(
                "collaborator reported status `{}`",
                status
            )));
        }

        Ok(response
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string())
    }
}

/// Collects the audio clip URLs discovered in a report: links with a
/// recognized audio extension plus embedded audio element sources, in
/// discovery order, duplicates removed.
pub fn audio_candidates(report: &ContentReport) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    let urls = report
        .links
        .iter()
        .map(|l| l.resolved_url.as_str())
        .chain(report.audio_sources.iter().map(|m| m.resolved_url.as_str()));

    for url in urls {
        if is_audio_url(url) && seen.insert(url.to_string()) {
            candidates.push(url.to_string());
        }
    }

    candidates
}

fn is_audio_url(url: &str) -> bool {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.to_lowercase());
    AUDIO_EXTENSIONS
        .iter()
        .any(|ext| path.ends_with(&format!(".{}", ext)))
}

/// Transcribes every discovered clip and appends the results to the report.
///
/// Clips are transcribed concurrently; results are merged in discovery
/// order, so completion order never affects the report. A failed or timed
/// out transcription is recorded with empty text and never aborts the rest
/// of the pipeline.
pub async fn resolve_audio(
    report: &mut ContentReport,
    transcriber: Arc<dyn Transcriber>,
    clip_timeout: Duration,
) {
    let candidates = audio_candidates(report);
    if candidates.is_empty() {
        return;
    }
    ::log::info!("transcribing {} audio clip(s)", candidates.len());

    let mut handles = Vec::with_capacity(candidates.len());
    for url in &candidates {
        let transcriber = Arc::clone(&transcriber);
        let url = url.clone();
        handles.push(tokio::spawn(async move {
            match timeout(clip_timeout, transcriber.transcribe(&url)).await {
                Ok(Ok(text)) => Ok(text),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err("transcription timed out".to_string()),
            }
        }));
    }

    for (url, handle) in candidates.into_iter().zip(handles) {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(format!("transcription task failed: {}", e)),
        };
        match outcome {
            Ok(text) => {
                let truncated = is_truncated(&text);
                if truncated {
                    ::log::warn!("transcript for {} appears cut off mid-sentence", url);
                }
                report.audio_transcripts.push(AudioTranscript {
                    source_url: url,
                    status: TranscriptStatus::Success,
                    text,
                    truncated,
                });
            }
            Err(reason) => {
                ::log::warn!("transcription failed for {}: {}", url, reason);
                report.audio_transcripts.push(AudioTranscript {
                    source_url: url,
                    status: TranscriptStatus::Failed,
                    text: String::new(),
                    truncated: false,
                });
            }
        }
    }
}

/// Records every discovered clip as failed when no speech-to-text
/// collaborator is configured; extraction of the rest of the report
/// proceeds regardless.
pub fn mark_transcriber_unavailable(report: &mut ContentReport) {
    for url in audio_candidates(report) {
        ::log::warn!("no speech-to-text endpoint configured, skipping {}", url);
        report.audio_transcripts.push(AudioTranscript {
            source_url: url,
            status: TranscriptStatus::Failed,
            text: String::new(),
            truncated: false,
        });
    }
}

/// Advisory truncation heuristic: a non-empty transcript is flagged when
/// its final token carries no terminal punctuation and is not a word that
/// commonly ends a sentence. Purely numeric tokens are not flagged since a
/// number cannot be cut mid-word.
pub fn is_truncated(text: &str) -> bool {
    let Some(token) = text.split_whitespace().last() else {
        return false;
    };

    let unquoted = token.trim_end_matches(['"', '\'', ')', ']']);
    if unquoted.ends_with(['.', '!', '?']) {
        return false;
    }

    let word: String = unquoted
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    if word.is_empty() || word.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    !TERMINAL_WORDS.contains(&word.as_str())
}

/// Closed dictionary of common sentence-final words. Membership means the
/// transcript plausibly ends there even without punctuation.
const TERMINAL_WORDS: [&str; 215] = [
    "provided", "value", "values", "cutoff", "file", "files", "data", "column", "columns", "sum",
    "total", "answer", "answers", "code", "codes", "secret", "page", "pages", "website", "site",
    "link", "links", "email", "number", "numbers", "result", "results", "table", "tables", "row",
    "rows", "it", "them", "this", "that", "these", "those", "here", "there", "now", "then",
    "today", "tomorrow", "yesterday", "again", "too", "also", "well", "done", "complete",
    "completed", "finished", "end", "ends", "below", "above", "first", "second", "third", "last",
    "next", "before", "after", "more", "less", "most", "least", "all", "none", "one", "two",
    "three", "four", "five", "six", "seven", "eight", "nine", "ten", "hundred", "thousand",
    "you", "me", "him", "her", "us", "time", "times", "day", "days", "week", "weeks", "month",
    "months", "year", "years", "way", "ways", "thing", "things", "work", "works", "list",
    "item", "items", "field", "fields", "form", "button", "text", "word", "words", "sentence",
    "line", "lines", "point", "points", "step", "steps", "task", "tasks", "question",
    "questions", "instructions", "instruction", "details", "detail", "information", "format",
    "json", "string", "integer", "decimal", "digits", "hash", "submit", "submitted",
    "submission", "server", "endpoint", "request", "response", "output", "input", "browser",
    "audio", "sound", "clip", "message", "note", "example", "sample", "same", "different",
    "correct", "wrong", "true", "false", "yes", "no", "okay", "ok", "right", "left", "up",
    "down", "out", "in", "on", "off", "over", "under", "back", "away", "please", "thanks",
    "so", "anyway", "however", "though", "instead", "together", "everything", "something",
    "nothing", "anything", "everyone", "someone", "anyone", "nobody", "each", "other",
    "others", "itself", "themselves", "yourself", "required", "needed", "given", "shown",
    "listed", "described", "mentioned", "available", "possible", "ready", "set", "go",
    "begin", "start", "started", "stop", "stopped", "continue", "proceed",
];
