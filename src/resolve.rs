use crate::error::{PipelineError, Result};
use crate::interpret::{FieldSpec, TaskDescription, TaskInputs};
use crate::report::ContentReport;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use url::Url;

/// The resolved answer: one value per required field, keys in the exact
/// order the task template stated them.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub field_values: serde_json::Map<String, Value>,
}

/// The closed set of per-field resolution strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    PassThrough,
    DirectExtraction,
    AggregateComputation,
}

/// Resolves every required field of the task against the report and any
/// auxiliary data the page links to.
///
/// Each field gets exactly one strategy, chosen by matching the instruction
/// keywords. A field no strategy can fill fails the resolution naming that
/// field; a partial or guessed answer is never produced.
pub async fn resolve(
    task: &TaskDescription,
    report: &ContentReport,
    inputs: &TaskInputs,
    client: &reqwest::Client,
) -> Result<Answer> {
    let mut field_values = serde_json::Map::new();
    let mut trace: Vec<String> = Vec::new();

    // The reasoning field reflects the other strategies, so fill it last
    for field in &task.required_fields {
        if field.name == "reasoning" {
            continue;
        }
        let value = resolve_field(field, task, report, inputs, client, &mut trace).await?;
        field_values.insert(field.name.clone(), value);
    }

    if task.required_fields.iter().any(|f| f.name == "reasoning") {
        field_values.insert("reasoning".to_string(), Value::String(trace.join("; ")));
    }

    // Emit in template order
    let mut ordered = serde_json::Map::new();
    for field in &task.required_fields {
        if let Some(value) = field_values.remove(&field.name) {
            ordered.insert(field.name.clone(), value);
        }
    }

    Ok(Answer {
        field_values: ordered,
    })
}

async fn resolve_field(
    field: &FieldSpec,
    task: &TaskDescription,
    report: &ContentReport,
    inputs: &TaskInputs,
    client: &reqwest::Client,
    trace: &mut Vec<String>,
) -> Result<Value> {
    match select_strategy(field, task, report) {
        Strategy::PassThrough => resolve_pass_through(field, report, inputs, trace),
        Strategy::AggregateComputation => {
            resolve_aggregate(field, task, report, client, trace).await
        }
        Strategy::DirectExtraction => resolve_direct(field, task, report, trace),
    }
}

fn select_strategy(field: &FieldSpec, task: &TaskDescription, report: &ContentReport) -> Strategy {
    match field.name.as_str() {
        "email" | "secret" | "url" => Strategy::PassThrough,
        _ if aggregate_requested(&task.instruction_text) && csv_link(report).is_some() => {
            Strategy::AggregateComputation
        }
        _ => Strategy::DirectExtraction,
    }
}

fn aggregate_requested(text: &str) -> bool {
    let sum_re = Regex::new(r"(?i)\b(sum|add)\b").unwrap();
    let cutoff_re = Regex::new(r"(?i)\bcutoff\b").unwrap();
    sum_re.is_match(text) && cutoff_re.is_match(text)
}

fn csv_link(report: &ContentReport) -> Option<&str> {
    report
        .links
        .iter()
        .find(|link| link.resolved_url.to_lowercase().contains(".csv"))
        .map(|link| link.resolved_url.as_str())
}

/// Template literals count only when they look concrete, not like the
/// placeholder prose templates use ("your secret", "the code you scraped")
fn concrete_literal(field: &FieldSpec) -> Option<&str> {
    let literal = field.literal.as_deref()?;
    let lower = literal.to_lowercase();
    if literal.is_empty()
        || literal.contains("...")
        || lower.starts_with("your ")
        || lower.starts_with("the ")
        || lower.starts_with("a ")
        || lower.starts_with("an ")
    {
        return None;
    }
    Some(literal)
}

fn resolve_pass_through(
    field: &FieldSpec,
    report: &ContentReport,
    inputs: &TaskInputs,
    trace: &mut Vec<String>,
) -> Result<Value> {
    let missing = |reason: &str| PipelineError::Resolution {
        field: field.name.clone(),
        reason: reason.to_string(),
    };

    match field.name.as_str() {
        "email" => {
            let email = inputs
                .email
                .clone()
                .or_else(|| report.query_params.get("email").cloned())
                .ok_or_else(|| missing("no email in caller parameters or page query"))?;
            trace.push("email passed through from input parameters".to_string());
            Ok(Value::String(email))
        }
        "secret" => {
            let secret = inputs
                .secret
                .clone()
                .or_else(|| concrete_literal(field).map(|s| s.to_string()))
                .ok_or_else(|| missing("no secret in caller parameters or template"))?;
            trace.push("secret passed through from input parameters".to_string());
            Ok(Value::String(secret))
        }
        "url" => {
            // A concrete absolute URL written in the template wins over the
            // page's own URL
            if let Some(literal) = concrete_literal(field) {
                if Url::parse(literal).is_ok() {
                    trace.push("url taken verbatim from the task template".to_string());
                    return Ok(Value::String(literal.to_string()));
                }
            }
            trace.push("url set to the page's canonical URL".to_string());
            Ok(Value::String(report.url.clone()))
        }
        other => Err(missing(&format!(
            "no pass-through source for field `{}`",
            other
        ))),
    }
}

async fn resolve_aggregate(
    field: &FieldSpec,
    task: &TaskDescription,
    report: &ContentReport,
    client: &reqwest::Client,
    trace: &mut Vec<String>,
) -> Result<Value> {
    let resolution_error = |reason: String| PipelineError::Resolution {
        field: field.name.clone(),
        reason,
    };

    let cutoff = *task.derived_params.get("cutoff").ok_or_else(|| {
        resolution_error("aggregate computation requires a cutoff, none was derived".to_string())
    })?;

    let csv_url = csv_link(report)
        .ok_or_else(|| resolution_error("no CSV resource linked from the page".to_string()))?
        .to_string();

    ::log::info!("fetching auxiliary data from {}", csv_url);
    let csv_text = client
        .get(&csv_url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| resolution_error(format!("failed to fetch {}: {}", csv_url, e)))?
        .text()
        .await
        .map_err(|e| resolution_error(format!("failed to read {}: {}", csv_url, e)))?;

    let sum = sum_first_column_at_or_above(&csv_text, cutoff as f64)
        .ok_or_else(|| resolution_error(format!("no numeric first column in {}", csv_url)))?;

    trace.push(format!(
        "summed first-column values >= cutoff {} from {}",
        cutoff, csv_url
    ));
    Ok(number_value(sum))
}

/// Parses the first CSV column as numbers, skipping non-numeric lines such
/// as a header row, and sums the values at or above the cutoff. Returns
/// None when no line yields a number.
pub fn sum_first_column_at_or_above(csv: &str, cutoff: f64) -> Option<f64> {
    let mut any_numeric = false;
    let mut sum = 0.0;

    for line in csv.lines() {
        let first_cell = line.split(',').next().unwrap_or_default().trim();
        let Ok(value) = first_cell.parse::<f64>() else {
            continue;
        };
        any_numeric = true;
        if value >= cutoff {
            sum += value;
        }
    }

    any_numeric.then_some(sum)
}

fn resolve_direct(
    field: &FieldSpec,
    task: &TaskDescription,
    report: &ContentReport,
    trace: &mut Vec<String>,
) -> Result<Value> {
    if let Some(literal) = concrete_literal(field) {
        trace.push(format!("{} taken verbatim from the task template", field.name));
        return Ok(parse_scalar(literal));
    }

    if let Some(code) = find_stated_value(report) {
        trace.push(format!("{} extracted from a stated value on the page", field.name));
        return Ok(code);
    }

    if wants_maximum(&task.instruction_text) {
        if let Some(max) = maximum_numeric(report) {
            trace.push(format!("{} is the maximum value found in the page text", field.name));
            return Ok(number_value(max));
        }
    }

    Err(PipelineError::Resolution {
        field: field.name.clone(),
        reason: "no extraction strategy produced a value".to_string(),
    })
}

/// Literal statements like "The secret code is 42179" or "answer: ABC123",
/// checked over the full report text including decoded blocks
fn find_stated_value(report: &ContentReport) -> Option<Value> {
    let patterns = [
        r"(?i)(?:secret|code|answer|result|value)\s+is\s+([A-Za-z0-9_-]+)",
        r"(?i)(?:secret|code|answer|result|value)\s*[:=]\s*([A-Za-z0-9_-]+)",
    ];
    let text = report.joined_text();

    for pattern in patterns {
        let re = Regex::new(pattern).unwrap();
        if let Some(capture) = re.captures(&text) {
            return Some(parse_scalar(&capture[1]));
        }
    }

    None
}

fn wants_maximum(text: &str) -> bool {
    Regex::new(r"(?i)\b(maximum|largest|highest|max)\b")
        .unwrap()
        .is_match(text)
}

fn maximum_numeric(report: &ContentReport) -> Option<f64> {
    let number_re = Regex::new(r"-?\d+(?:\.\d+)?").unwrap();
    let text = report.joined_text();
    number_re
        .find_iter(&text)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .fold(None, |best, value| match best {
            Some(current) if current >= value => Some(current),
            _ => Some(value),
        })
}

/// Numbers submit as JSON numbers, everything else as strings
fn parse_scalar(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = raw.parse::<f64>() {
        return Value::from(float);
    }
    Value::String(raw.to_string())
}

fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_skips_header_and_filters_by_cutoff() {
        let csv = "value,name\n1,one\n2,two\n3,three\n100,hundred\n";
        assert_eq!(sum_first_column_at_or_above(csv, 3.0), Some(103.0));
        assert_eq!(sum_first_column_at_or_above(csv, 0.0), Some(106.0));
        assert_eq!(sum_first_column_at_or_above(csv, 1000.0), Some(0.0));
    }

    #[test]
    fn test_sum_none_without_numeric_column() {
        assert_eq!(sum_first_column_at_or_above("name,desc\na,b\n", 1.0), None);
        assert_eq!(sum_first_column_at_or_above("", 1.0), None);
    }

    #[test]
    fn test_parse_scalar_types() {
        assert_eq!(parse_scalar("42179"), Value::from(42179));
        assert_eq!(parse_scalar("3.5"), Value::from(3.5));
        assert_eq!(parse_scalar("ABC123"), Value::String("ABC123".to_string()));
    }

    #[test]
    fn test_concrete_literal_rejects_placeholders() {
        let placeholder = FieldSpec {
            name: "secret".to_string(),
            literal: Some("your secret".to_string()),
        };
        assert!(concrete_literal(&placeholder).is_none());

        let ellipsis = FieldSpec {
            name: "answer".to_string(),
            literal: Some("...".to_string()),
        };
        assert!(concrete_literal(&ellipsis).is_none());

        let concrete = FieldSpec {
            name: "url".to_string(),
            literal: Some("https://en.wikipedia.org/wiki/2025_Union_budget_of_India".to_string()),
        };
        assert_eq!(
            concrete_literal(&concrete),
            Some("https://en.wikipedia.org/wiki/2025_Union_budget_of_India")
        );
    }

    #[test]
    fn test_maximum_numeric() {
        let report = crate::extract::extract(&crate::fetchers::PageSnapshot {
            html: "<html><body><p>Readings: 17, 250 and 42</p></body></html>".to_string(),
            final_url: "https://example.com/".to_string(),
            method: crate::fetchers::FetchMethod::Static,
            fetched_at: std::time::SystemTime::now(),
        });
        assert_eq!(maximum_numeric(&report), Some(250.0));
    }
}
