use quiz_solver::config::PipelineConfig;
use quiz_solver::error::PipelineError;
use quiz_solver::extract::extract;
use quiz_solver::fetchers::{FetchMethod, PageSnapshot};
use quiz_solver::interpret::{TaskInputs, interpret};
use quiz_solver::report::{AudioTranscript, TranscriptStatus};
use quiz_solver::resolve::{Answer, resolve};
use quiz_solver::submit::submit;
use quiz_solver::{FetchMode, Pipeline};
use std::net::SocketAddr;
use std::time::SystemTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::Duration;

/// Serves one canned HTTP response per incoming connection, in order
async fn canned_server(responses: Vec<String>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let mut buffer = [0u8; 8192];
            let _ = stream.read(&mut buffer).await;
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    addr
}

fn http_response(status_line: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        status_line,
        content_type,
        body.len(),
        body
    )
}

fn snapshot(html: &str, url: &str) -> PageSnapshot {
    PageSnapshot {
        html: html.to_string(),
        final_url: url.to_string(),
        method: FetchMethod::Static,
        fetched_at: SystemTime::now(),
    }
}

fn answer_with(fields: &[(&str, serde_json::Value)]) -> Answer {
    let mut field_values = serde_json::Map::new();
    for (name, value) in fields {
        field_values.insert(name.to_string(), value.clone());
    }
    Answer { field_values }
}

// Scenario A: a literal URL in the task template is passed through verbatim
// and no derived parameters are invented.
#[tokio::test]
async fn scenario_a_literal_url_passed_through() {
    let html = r#"<html><body>
        <h1>Demo quiz</h1>
        <p>The secret code is 42179. POST your answer to /submit</p>
        <p>{"answer": ..., "url": "https://en.wikipedia.org/wiki/2025_Union_budget_of_India"}</p>
        <a href="/other">other page</a>
        </body></html>"#;
    let report = extract(&snapshot(html, "https://quiz.example.com/demo-scrape"));

    let inputs = TaskInputs::default();
    let config = PipelineConfig::default();
    let task = interpret(&report, &inputs, &config).unwrap();

    assert!(task.derived_params.is_empty());
    assert_eq!(task.submission_url, "https://quiz.example.com/submit");

    let client = reqwest::Client::new();
    let answer = resolve(&task, &report, &inputs, &client).await.unwrap();

    assert_eq!(
        answer.field_values.get("url").unwrap(),
        "https://en.wikipedia.org/wiki/2025_Union_budget_of_India"
    );
    assert_eq!(
        answer.field_values.get("answer").unwrap(),
        &serde_json::Value::from(42179)
    );
}

// Scenario B: CSV aggregate with a cutoff of 3 over [1, 2, 3, 100] sums to
// 103, with the payload fields in template order.
#[tokio::test]
async fn scenario_b_csv_aggregate_with_cutoff() {
    let csv_addr = canned_server(vec![http_response(
        "200 OK",
        "text/csv",
        "value\n1\n2\n3\n100\n",
    )])
    .await;

    let html = format!(
        r#"<html><body>
        <p>Download the CSV file and sum the first column values greater than
        or equal to the cutoff. The cutoff is 3.</p>
        <p>POST the result to /submit</p>
        <p>{{"email": "...", "secret": "...", "url": "...", "answer": "..."}}</p>
        <a href="http://{}/data.csv">data</a>
        </body></html>"#,
        csv_addr
    );
    let report = extract(&snapshot(&html, "https://quiz.example.com/demo-audio"));

    let inputs = TaskInputs {
        email: Some("student@example.com".to_string()),
        secret: Some("23SHWEBGPT".to_string()),
    };
    let config = PipelineConfig::default();
    let task = interpret(&report, &inputs, &config).unwrap();
    assert_eq!(task.derived_params.get("cutoff"), Some(&3));

    let client = reqwest::Client::new();
    let answer = resolve(&task, &report, &inputs, &client).await.unwrap();

    assert_eq!(
        answer.field_values.get("answer").unwrap(),
        &serde_json::Value::from(103)
    );

    let names: Vec<&str> = answer.field_values.keys().map(|k| k.as_str()).collect();
    assert_eq!(names, vec!["email", "secret", "url", "answer"]);
    assert_eq!(
        answer.field_values.get("url").unwrap(),
        "https://quiz.example.com/demo-audio"
    );
}

// Scenario C: a truncated transcript flags the task incomplete; resolution
// still succeeds when every required field is derivable from the
// unambiguous text.
#[tokio::test]
async fn scenario_c_incomplete_task_with_derivable_fields() {
    let html = r#"<html><body>
        <p>POST your answer to /submit</p>
        <p>{"email": "...", "url": "..."}</p>
        </body></html>"#;
    let mut report = extract(&snapshot(html, "https://quiz.example.com/demo-audio"));
    report.audio_transcripts.push(AudioTranscript {
        source_url: "https://quiz.example.com/demo-audio.opus".to_string(),
        status: TranscriptStatus::Success,
        text: "pick the first column and add all values greater than or equal to the cutoff value provid"
            .to_string(),
        truncated: true,
    });

    let inputs = TaskInputs {
        email: Some("student@example.com".to_string()),
        secret: None,
    };
    let config = PipelineConfig::default();
    let task = interpret(&report, &inputs, &config).unwrap();
    assert!(task.incomplete);

    let client = reqwest::Client::new();
    let answer = resolve(&task, &report, &inputs, &client).await.unwrap();
    assert_eq!(answer.field_values.get("email").unwrap(), "student@example.com");
    assert_eq!(
        answer.field_values.get("url").unwrap(),
        "https://quiz.example.com/demo-audio"
    );
}

// Scenario C, failing half: an unresolvable field raises a resolution error
// naming the field instead of submitting a guess.
#[tokio::test]
async fn scenario_c_unresolvable_field_names_the_field() {
    let html = r#"<html><body>
        <p>POST your answer to /submit</p>
        <p>{"email": "...", "answer": "..."}</p>
        </body></html>"#;
    let mut report = extract(&snapshot(html, "https://quiz.example.com/demo-audio"));
    report.audio_transcripts.push(AudioTranscript {
        source_url: "https://quiz.example.com/demo-audio.opus".to_string(),
        status: TranscriptStatus::Success,
        text: "add all values greater than or equal to the cutoff value provid".to_string(),
        truncated: true,
    });

    let inputs = TaskInputs {
        email: Some("student@example.com".to_string()),
        secret: None,
    };
    let config = PipelineConfig::default();
    let task = interpret(&report, &inputs, &config).unwrap();
    assert!(task.incomplete);

    let client = reqwest::Client::new();
    let error = resolve(&task, &report, &inputs, &client).await.unwrap_err();
    match error {
        PipelineError::Resolution { field, .. } => assert_eq!(field, "answer"),
        other => panic!("expected a resolution error, got {:?}", other),
    }
}

// A forced 503 on attempts 1 and 2 with a 200 on attempt 3 succeeds with
// attempts == 3.
#[tokio::test]
async fn submission_retries_on_server_errors() {
    let addr = canned_server(vec![
        http_response("503 Service Unavailable", "text/plain", ""),
        http_response("503 Service Unavailable", "text/plain", ""),
        http_response("200 OK", "application/json", r#"{"correct":true}"#),
    ])
    .await;

    let client = reqwest::Client::new();
    let answer = answer_with(&[("answer", serde_json::Value::from(103))]);
    let result = submit(
        &client,
        &format!("http://{}/submit", addr),
        &answer,
        3,
        Duration::from_millis(10),
    )
    .await
    .unwrap();

    assert_eq!(result.attempts, 3);
    assert_eq!(result.status_code, 200);
    assert_eq!(result.response_body, r#"{"correct":true}"#);
}

// A 404 fails immediately: the payload is the problem, retrying cannot help.
#[tokio::test]
async fn submission_client_error_fails_without_retry() {
    let addr = canned_server(vec![http_response("404 Not Found", "text/plain", "")]).await;

    let client = reqwest::Client::new();
    let answer = answer_with(&[("answer", serde_json::Value::from(1))]);
    let error = submit(
        &client,
        &format!("http://{}/submit", addr),
        &answer,
        3,
        Duration::from_millis(10),
    )
    .await
    .unwrap_err();

    match error {
        PipelineError::Submission {
            status, attempts, ..
        } => {
            assert_eq!(status, 404);
            assert_eq!(attempts, 1);
        }
        other => panic!("expected a submission error, got {:?}", other),
    }
}

// A 5xx on every attempt exhausts the retry budget and surfaces the final
// status rather than swallowing it.
#[tokio::test]
async fn submission_exhausted_retries_surface_final_status() {
    let addr = canned_server(vec![
        http_response("500 Internal Server Error", "text/plain", "boom"),
        http_response("500 Internal Server Error", "text/plain", "boom"),
        http_response("500 Internal Server Error", "text/plain", "boom"),
    ])
    .await;

    let client = reqwest::Client::new();
    let answer = answer_with(&[("answer", serde_json::Value::from(1))]);
    let error = submit(
        &client,
        &format!("http://{}/submit", addr),
        &answer,
        3,
        Duration::from_millis(10),
    )
    .await
    .unwrap_err();

    match error {
        PipelineError::Submission {
            status,
            attempts,
            body,
            ..
        } => {
            assert_eq!(status, 500);
            assert_eq!(attempts, 3);
            assert_eq!(body, "boom");
        }
        other => panic!("expected a submission error, got {:?}", other),
    }
}

// Full pipeline over a static page: fetch, extract, interpret, resolve,
// submit against the same canned server.
#[tokio::test]
async fn pipeline_end_to_end_static_page() {
    let page_body = r#"<html><head><title>Demo quiz</title></head><body>
        <h1>Demo quiz</h1>
        <p>The secret code is 9021. POST your answer to /submit</p>
        <p>{"email": "...", "secret": "...", "url": "...", "answer": "..."}</p>
        </body></html>"#;
    let addr = canned_server(vec![
        http_response("200 OK", "text/html", page_body),
        http_response("200 OK", "application/json", r#"{"correct":true}"#),
    ])
    .await;

    let outcome = Pipeline::new(format!("http://{}/demo-scrape", addr))
        .with_mode(FetchMode::Static)
        .with_email("student@example.com")
        .with_secret("23SHWEBGPT")
        .run()
        .await;

    assert!(outcome.error.is_none(), "unexpected error: {:?}", outcome.error);

    let report = outcome.report.expect("report present");
    assert_eq!(report.title.as_deref(), Some("Demo quiz"));
    assert!(report.html_length > 0);

    let answer = outcome.answer.expect("answer present");
    assert_eq!(
        answer.field_values.get("answer").unwrap(),
        &serde_json::Value::from(9021)
    );

    let submission = outcome.submission.expect("submission present");
    assert_eq!(submission.status_code, 200);
    assert_eq!(submission.attempts, 1);
    assert_eq!(submission.response_body, r#"{"correct":true}"#);
}

// The report is still produced for audit when interpretation fails.
#[tokio::test]
async fn report_survives_interpretation_failure() {
    let page_body = r#"<html><body><p>Nothing to do here.</p></body></html>"#;
    let addr = canned_server(vec![http_response("200 OK", "text/html", page_body)]).await;

    let outcome = Pipeline::new(format!("http://{}/empty", addr))
        .with_mode(FetchMode::Static)
        .run()
        .await;

    assert_eq!(outcome.failed_stage, Some("interpretation"));
    assert!(outcome.error.is_some());
    let report = outcome.report.expect("report still present for audit");
    assert!(report.joined_text().contains("Nothing to do here."));
    assert!(outcome.report_markdown.is_some());
}
