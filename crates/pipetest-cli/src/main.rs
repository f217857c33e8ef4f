mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use pipetest_types::TestCategory;

#[derive(Parser)]
#[command(
    name = "pipetest",
    version,
    about = "Run and validate data pipeline unit tests"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Path to the runner configuration file
    #[arg(long, short, default_value = "pipetest.yaml", global = true)]
    config: PathBuf,
}

/// Options shared by every command that selects tests.
#[derive(Args, Debug, Clone, Default)]
pub struct Selection {
    /// Test names to use instead of listing the catalog
    pub tests: Vec<String>,
    /// Only tests of this category (conceptual, development, unit)
    #[arg(long)]
    pub category: Option<TestCategory>,
    /// Only tests referencing this pipeline (file path, object:<id> or repository:<path>)
    #[arg(long)]
    pub pipeline: Option<String>,
    /// JSON-lines file whose rows name the tests to run
    #[arg(long)]
    pub tests_from: Option<PathBuf>,
    /// Field of --tests-from rows holding the test name
    #[arg(long)]
    pub test_field: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// One JSON result record per line
    Jsonl,
}

#[derive(Subcommand)]
enum Commands {
    /// Run unit tests and validate their output against golden data sets
    Run {
        #[command(flatten)]
        selection: Selection,
        /// Stop a pipeline run after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Number of tests to run concurrently
        #[arg(long)]
        parallelism: Option<usize>,
        /// Output format for result records
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// List unit tests in the catalog
    List {
        /// Only tests of this category
        #[arg(long)]
        category: Option<TestCategory>,
        /// Only tests referencing this pipeline
        #[arg(long)]
        pipeline: Option<String>,
        /// Print one JSON object per test
        #[arg(long)]
        json: bool,
    },
    /// Load every selected test and resolve its data sets without running it
    Check {
        #[command(flatten)]
        selection: Selection,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            selection,
            timeout,
            parallelism,
            format,
        } => commands::run::execute(&cli.config, selection, timeout, parallelism, format).await,
        Commands::List {
            category,
            pipeline,
            json,
        } => commands::list::execute(&cli.config, category, pipeline.as_deref(), json),
        Commands::Check { selection } => commands::check::execute(&cli.config, selection).await,
    }
}
