use clap::Parser;
use quiz_solver::Pipeline;

mod args;
use args::{Args, convert_fetch_mode};

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Parse command-line arguments
    let args = Args::parse();

    ::log::info!("Starting quiz pipeline for URL: {}", args.url);

    let mut pipeline = Pipeline::new(&args.url).with_mode(convert_fetch_mode(args.mode));

    if let Some(email) = &args.email {
        pipeline = pipeline.with_email(email);
    }
    if let Some(secret) = &args.secret {
        pipeline = pipeline.with_secret(secret);
    }
    if let Some(config_path) = &args.config {
        pipeline = match pipeline.with_config_file(config_path) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                ::log::error!("Failed to load configuration {}: {}", config_path, e);
                std::process::exit(2);
            }
        };
    }
    if args.dry_run {
        pipeline = pipeline.dry_run();
    }

    let start_time = std::time::Instant::now();
    let outcome = pipeline.run().await;
    let duration = start_time.elapsed();
    ::log::info!("Pipeline finished in {:.2} seconds", duration.as_secs_f64());

    // The content report is always persisted for audit, even on failure
    if let (Some(path), Some(markdown)) = (&args.report, &outcome.report_markdown) {
        match std::fs::write(path, markdown) {
            Ok(()) => ::log::info!("Wrote content report to {}", path),
            Err(e) => ::log::error!("Failed to write report to {}: {}", path, e),
        }
    }

    match serde_json::to_string_pretty(&outcome) {
        Ok(json) => println!("{}", json),
        Err(e) => ::log::error!("Failed to serialize outcome: {}", e),
    }

    if let Some(error) = &outcome.error {
        ::log::error!("Pipeline failed: {}", error);
        std::process::exit(1);
    }
}
