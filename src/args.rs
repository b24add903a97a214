use clap::{Parser, ValueEnum};
use quiz_solver::FetchMode;

#[derive(Parser, Debug)]
#[command(name = "quiz-solver")]
#[command(about = "Fetches a quiz page, interprets its task, and submits the answer")]
#[command(version)]
pub struct Args {
    /// Quiz page URL to solve
    pub url: String,

    /// Email parameter threaded into the answer payload
    #[arg(short, long)]
    pub email: Option<String>,

    /// Secret parameter threaded into the answer payload
    #[arg(short, long)]
    pub secret: Option<String>,

    /// Fetch mode (auto, static, dynamic)
    #[arg(short, long, value_enum, default_value_t = FetchModeArg::Auto)]
    pub mode: FetchModeArg,

    /// Path to a JSON configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Write the markdown content report to this file
    #[arg(short, long)]
    pub report: Option<String>,

    /// Extract and resolve but skip the submission POST
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum FetchModeArg {
    Auto,
    Static,
    Dynamic,
}

/// Convert from CLI fetch mode to the pipeline fetch mode
pub fn convert_fetch_mode(arg: FetchModeArg) -> FetchMode {
    match arg {
        FetchModeArg::Auto => FetchMode::Auto,
        FetchModeArg::Static => FetchMode::Static,
        FetchModeArg::Dynamic => FetchMode::Dynamic,
    }
}
