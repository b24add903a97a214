use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::report::{ContentReport, TEXT_SEPARATOR, TranscriptStatus};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use url::Url;

/// One field of the task's answer template, in template order. `literal`
/// holds the quoted value exactly as written on the page, when there is one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub literal: Option<String>,
}

/// The task distilled from a content report: what to answer, where to send
/// it, and any parameters the page told us to derive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescription {
    /// Page text plus successful audio transcripts, in report order
    pub instruction_text: String,

    /// True when part of the instruction came from a transcript that looks
    /// cut off. The resolver then executes only literally-stated steps.
    pub incomplete: bool,

    /// Answer fields in the exact order the page template states them
    pub required_fields: Vec<FieldSpec>,

    /// Absolute submission endpoint
    pub submission_url: String,

    /// Parameters the instruction text says to derive, e.g. the cutoff
    pub derived_params: HashMap<String, i64>,
}

/// Extra inputs threaded through from the caller's request
#[derive(Debug, Clone, Default)]
pub struct TaskInputs {
    pub email: Option<String>,
    pub secret: Option<String>,
}

/// Interprets a finished content report into a task description.
///
/// Fails when the page shows no answer template or no submission endpoint;
/// there is no task to solve then. Derived parameters are computed only
/// when the instruction text literally states the computation.
pub fn interpret(
    report: &ContentReport,
    inputs: &TaskInputs,
    config: &PipelineConfig,
) -> Result<TaskDescription> {
    let instruction_text = assemble_instruction_text(report);
    let incomplete = report
        .audio_transcripts
        .iter()
        .any(|t| t.status == TranscriptStatus::Success && t.truncated);
    if incomplete {
        ::log::warn!("instruction text is incomplete, executing literally-stated steps only");
    }

    let required_fields = find_template_fields(&instruction_text).ok_or_else(|| {
        PipelineError::Interpretation(
            "no answer template found in the page instructions".to_string(),
        )
    })?;

    let submission_url = find_submission_url(&instruction_text, report, config)?;

    let mut derived_params = HashMap::new();
    if let Some(cutoff) = derive_cutoff_param(&instruction_text, report, inputs) {
        ::log::info!("derived cutoff parameter: {}", cutoff);
        derived_params.insert("cutoff".to_string(), cutoff);
    }

    Ok(TaskDescription {
        instruction_text,
        incomplete,
        required_fields,
        submission_url,
        derived_params,
    })
}

/// Page text first, then the successful transcripts in discovery order
fn assemble_instruction_text(report: &ContentReport) -> String {
    let mut parts = vec![report.joined_text()];
    for transcript in &report.audio_transcripts {
        if transcript.status == TranscriptStatus::Success && !transcript.text.is_empty() {
            parts.push(transcript.text.clone());
        }
    }
    parts.join(TEXT_SEPARATOR)
}

/// Finds the first balanced `{...}` block containing JSON-shaped
/// `"name": value` pairs and returns the field names in written order.
fn find_template_fields(text: &str) -> Option<Vec<FieldSpec>> {
    let pair_re = Regex::new(r#""([A-Za-z_][A-Za-z0-9_-]*)"\s*:\s*("(?:[^"\\]|\\.)*"|[^,}\n]*)"#)
        .unwrap();

    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        let Some(block) = balanced_block(&text[start..]) else {
            search_from = start + 1;
            continue;
        };

        let mut fields: Vec<FieldSpec> = Vec::new();
        for capture in pair_re.captures_iter(block) {
            let name = capture[1].to_string();
            if fields.iter().any(|f| f.name == name) {
                continue;
            }
            let raw_value = capture[2].trim();
            let literal = raw_value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .map(|v| v.replace("\\\"", "\""));
            fields.push(FieldSpec { name, literal });
        }

        if !fields.is_empty() {
            return Some(fields);
        }
        search_from = start + 1;
    }

    None
}

/// Slice from the opening brace through its matching close brace
fn balanced_block(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, c) in text.char_indices() {
        if in_string {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[..index + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Locates the submission endpoint. An explicit "POST ... to X" statement
/// in the instruction text wins over a link that merely looks like a
/// submission endpoint. Relative targets resolve against the page origin.
fn find_submission_url(
    text: &str,
    report: &ContentReport,
    config: &PipelineConfig,
) -> Result<String> {
    let explicit_re = Regex::new(r#"(?i)\bpost\b[^\n]*?\bto\b\s+([^\s"'<>]+)"#).unwrap();
    let explicit = explicit_re
        .captures(text)
        .map(|c| c[1].trim_end_matches(['.', ',', ';', ':', '!', '?', ')']).to_string())
        .filter(|target| !target.is_empty());

    let candidate = match explicit {
        Some(target) => {
            ::log::debug!("submission endpoint from explicit instruction: {}", target);
            Some(target)
        }
        None => classify_submission_link(report, config),
    };

    let candidate = candidate.ok_or_else(|| {
        PipelineError::Interpretation(
            "no submission endpoint found in instructions or links".to_string(),
        )
    })?;

    resolve_against_origin(&candidate, &report.url).ok_or_else(|| {
        PipelineError::Interpretation(format!(
            "submission endpoint `{}` could not be resolved to an absolute URL",
            candidate
        ))
    })
}

/// First link whose URL path matches a configured submission pattern
fn classify_submission_link(report: &ContentReport, config: &PipelineConfig) -> Option<String> {
    let patterns: Vec<Regex> = config
        .submit_patterns
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect();

    for link in &report.links {
        let path = Url::parse(&link.resolved_url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| link.resolved_url.clone());
        if patterns.iter().any(|re| re.is_match(&path)) {
            ::log::debug!("submission endpoint from link: {}", link.resolved_url);
            return Some(link.resolved_url.clone());
        }
    }

    None
}

fn resolve_against_origin(candidate: &str, page_url: &str) -> Option<String> {
    if let Ok(absolute) = Url::parse(candidate) {
        return Some(absolute.to_string());
    }
    Url::parse(page_url)
        .ok()
        .and_then(|base| base.join(candidate).ok())
        .map(|joined| joined.to_string())
}

/// Computes the cutoff parameter when the instruction text states the
/// computation: a literal "cutoff is N" wins, otherwise a stated SHA-1
/// hex-prefix derivation from the email parameter. Nothing stated means
/// nothing derived.
fn derive_cutoff_param(
    text: &str,
    report: &ContentReport,
    inputs: &TaskInputs,
) -> Option<i64> {
    let literal_re = Regex::new(r"(?i)\bcutoff(?:\s+value)?(?:\s+is|\s*[:=])\s*(\d+)").unwrap();
    if let Some(capture) = literal_re.captures(text) {
        return capture[1].parse().ok();
    }

    let mentions_cutoff = Regex::new(r"(?i)\bcutoff\b").unwrap().is_match(text);
    let mentions_sha1 = Regex::new(r"(?i)\bsha-?1\b").unwrap().is_match(text);
    if !mentions_cutoff || !mentions_sha1 {
        return None;
    }

    let email = report
        .query_params
        .get("email")
        .cloned()
        .or_else(|| inputs.email.clone());
    let Some(email) = email else {
        ::log::warn!("instructions state a cutoff computation but no email parameter is available");
        return None;
    };

    let width_re = Regex::new(r"(?i)first\s+(\d+)\s*(?:hex|char|digit)").unwrap();
    let width = width_re
        .captures(text)
        .and_then(|c| c[1].parse::<usize>().ok())
        .unwrap_or(4)
        .clamp(1, 15);

    Some(hex_prefix_to_int(&sha1_hex(&email), width))
}

fn sha1_hex(input: &str) -> String {
    let digest = Sha1::digest(input.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hex_prefix_to_int(hex: &str, width: usize) -> i64 {
    let prefix = &hex[..width.min(hex.len())];
    i64::from_str_radix(prefix, 16).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetchers::FetchMethod;
    use crate::report::{AudioTranscript, LinkRef};

    fn base_report(text_blocks: Vec<&str>) -> ContentReport {
        ContentReport {
            url: "https://quiz.example.com/demo-scrape?email=student%40example.com".to_string(),
            method: FetchMethod::Static,
            title: None,
            meta_description: None,
            text_blocks: text_blocks.into_iter().map(|s| s.to_string()).collect(),
            headings: Vec::new(),
            links: Vec::new(),
            images: Vec::new(),
            audio_sources: Vec::new(),
            tables: Vec::new(),
            html_length: 0,
            text_length: 0,
            query_params: HashMap::from([(
                "email".to_string(),
                "student@example.com".to_string(),
            )]),
            audio_transcripts: Vec::new(),
        }
    }

    #[test]
    fn test_template_fields_in_written_order() {
        let report = base_report(vec![
            "POST the result back to /submit",
            r#"{ "email": "student@example.com", "secret": "your secret", "url": "...", "answer": "the code" }"#,
        ]);
        let task = interpret(&report, &TaskInputs::default(), &PipelineConfig::default()).unwrap();

        let names: Vec<&str> = task
            .required_fields
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["email", "secret", "url", "answer"]);
        assert_eq!(
            task.required_fields[0].literal.as_deref(),
            Some("student@example.com")
        );
    }

    #[test]
    fn test_explicit_post_target_beats_submission_link() {
        let mut report = base_report(vec![
            "POST your answer to /receiver-two",
            r#"{"answer": "x"}"#,
        ]);
        report.links.push(LinkRef {
            text: "submit here".to_string(),
            href: "/submit".to_string(),
            resolved_url: "https://quiz.example.com/submit".to_string(),
            resolved: true,
        });

        let task = interpret(&report, &TaskInputs::default(), &PipelineConfig::default()).unwrap();
        assert_eq!(task.submission_url, "https://quiz.example.com/receiver-two");
    }

    #[test]
    fn test_submission_link_used_without_explicit_target() {
        let mut report = base_report(vec![r#"{"answer": "x"}"#]);
        report.links.push(LinkRef {
            text: "send".to_string(),
            href: "/submit".to_string(),
            resolved_url: "https://quiz.example.com/submit".to_string(),
            resolved: true,
        });

        let task = interpret(&report, &TaskInputs::default(), &PipelineConfig::default()).unwrap();
        assert_eq!(task.submission_url, "https://quiz.example.com/submit");
    }

    #[test]
    fn test_relative_target_resolves_against_page_origin() {
        let report = base_report(vec![
            "POST the answer to /submit",
            r#"{"answer": "x"}"#,
        ]);
        let task = interpret(&report, &TaskInputs::default(), &PipelineConfig::default()).unwrap();
        assert_eq!(task.submission_url, "https://quiz.example.com/submit");
    }

    #[test]
    fn test_missing_template_is_interpretation_error() {
        let report = base_report(vec!["POST something to /submit", "no template here"]);
        let err = interpret(&report, &TaskInputs::default(), &PipelineConfig::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Interpretation(_)));
    }

    #[test]
    fn test_missing_submission_url_is_interpretation_error() {
        let report = base_report(vec![r#"{"answer": "x"}"#]);
        let err = interpret(&report, &TaskInputs::default(), &PipelineConfig::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Interpretation(_)));
    }

    #[test]
    fn test_cutoff_derivation_is_deterministic() {
        // sha1("23f2003481@ds.study.iitm.ac.in") starts with 5a45
        let mut report = base_report(vec![
            "Compute the cutoff as the first 4 hex characters of the SHA1 hash of your email",
            "POST the answer to /submit",
            r#"{"answer": "x"}"#,
        ]);
        report.query_params.insert(
            "email".to_string(),
            "23f2003481@ds.study.iitm.ac.in".to_string(),
        );

        let inputs = TaskInputs::default();
        let config = PipelineConfig::default();
        let first = interpret(&report, &inputs, &config).unwrap();
        let second = interpret(&report, &inputs, &config).unwrap();

        assert_eq!(first.derived_params.get("cutoff"), Some(&0x5a45));
        assert_eq!(first.derived_params.get("cutoff"), Some(&23109));
        assert_eq!(first.derived_params, second.derived_params);
    }

    #[test]
    fn test_literal_cutoff_statement_wins() {
        let report = base_report(vec![
            "The cutoff is 3. Sum the first column values at or above it.",
            "POST the answer to /submit",
            r#"{"answer": "x"}"#,
        ]);
        let task = interpret(&report, &TaskInputs::default(), &PipelineConfig::default()).unwrap();
        assert_eq!(task.derived_params.get("cutoff"), Some(&3));
    }

    #[test]
    fn test_no_cutoff_derived_without_stated_computation() {
        let report = base_report(vec![
            "POST the answer to /submit",
            r#"{"answer": ..., "url": "https://en.wikipedia.org/wiki/2025_Union_budget_of_India"}"#,
        ]);
        let task = interpret(&report, &TaskInputs::default(), &PipelineConfig::default()).unwrap();
        assert!(task.derived_params.is_empty());
    }

    #[test]
    fn test_truncated_transcript_marks_task_incomplete() {
        let mut report = base_report(vec![
            "POST the answer to /submit",
            r#"{"answer": "x"}"#,
        ]);
        report.audio_transcripts.push(AudioTranscript {
            source_url: "https://quiz.example.com/demo-audio.opus".to_string(),
            status: TranscriptStatus::Success,
            text: "add all values greater than or equal to the cutoff value provid".to_string(),
            truncated: true,
        });

        let task = interpret(&report, &TaskInputs::default(), &PipelineConfig::default()).unwrap();
        assert!(task.incomplete);
        assert!(task.instruction_text.contains("cutoff value provid"));
    }
}
