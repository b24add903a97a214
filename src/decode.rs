use crate::report::ContentReport;
use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use regex::Regex;
use scraper::{Html, Selector};

/// Minimum candidate length; shorter runs of base64 alphabet are far too
/// likely to be ordinary words or identifiers
const MIN_CANDIDATE_LEN: usize = 40;

/// Placeholder token that pages substitute with the email query parameter
pub const EMAIL_PLACEHOLDER: &str = "$EMAIL";

/// Scans the report text and the raw markup's script bodies for base64
/// payloads and merges decoded instruction text back into the report.
///
/// Decoding is speculative: candidates that do not decode to readable text
/// are skipped silently. A decoded block found in a text block is inserted
/// right after its source block; script-body payloads are appended at the
/// end. A report with no valid payload comes back unchanged.
pub fn decode_embedded(report: &mut ContentReport, html: &str) {
    let candidate_re = candidate_regex();
    let email = report.query_params.get("email").cloned();

    // Text-block candidates, in block order so insertion offsets stay stable
    let mut insertions: Vec<(usize, String)> = Vec::new();
    for (index, block) in report.text_blocks.iter().enumerate() {
        for candidate in candidate_re.find_iter(block) {
            if let Some(decoded) = decode_candidate(candidate.as_str()) {
                ::log::info!("decoded base64 payload from text block {}", index);
                insertions.push((index + 1, substitute_params(&decoded, email.as_deref())));
            }
        }
    }

    let inserted_any = !insertions.is_empty();
    for (offset, (index, text)) in insertions.into_iter().enumerate() {
        report.text_blocks.insert(index + offset, text);
    }

    // Script bodies are not part of the visible text, so their decoded
    // payloads go at the end of the report text
    let mut appended_any = false;
    let doc = Html::parse_document(html);
    let script_selector = Selector::parse("script").unwrap();
    for script in doc.select(&script_selector) {
        let body = script.text().collect::<Vec<_>>().join("");
        for candidate in candidate_re.find_iter(&body) {
            if let Some(decoded) = decode_candidate(candidate.as_str()) {
                ::log::info!("decoded base64 payload from script body");
                report
                    .text_blocks
                    .push(substitute_params(&decoded, email.as_deref()));
                appended_any = true;
            }
        }
    }

    if inserted_any || appended_any {
        report.text_length = report.joined_text().len();
    }
}

fn candidate_regex() -> Regex {
    Regex::new(&format!("[A-Za-z0-9+/]{{{},}}={{0,2}}", MIN_CANDIDATE_LEN)).unwrap()
}

/// Attempts to decode one candidate token. Returns None when the token is
/// not valid base64 or the decoded bytes are not readable text.
fn decode_candidate(token: &str) -> Option<String> {
    let trimmed = token.trim_end_matches('=');
    if trimmed.len() < MIN_CANDIDATE_LEN || trimmed.len() % 4 == 1 {
        return None;
    }

    let bytes = STANDARD_NO_PAD.decode(trimmed).ok()?;
    let text = String::from_utf8(bytes).ok()?;

    let readable = text
        .chars()
        .all(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'));
    if readable && !text.trim().is_empty() {
        Some(text)
    } else {
        None
    }
}

/// Substitutes known placeholder tokens with query-parameter values
fn substitute_params(text: &str, email: Option<&str>) -> String {
    match email {
        Some(email) => text.replace(EMAIL_PLACEHOLDER, email),
        None => text.to_string(),
    }
}
