mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "arena-cli")]
#[command(about = "Arena CLI - Judge submissions against test cases from the terminal", long_about = None)]
struct Cli {
    /// Execution engine base URL
    #[arg(long, global = true, env = "ENGINE_URL")]
    engine_url: Option<String>,

    /// Language configuration file
    #[arg(long, global = true, env = "LANGUAGE_CONFIG_PATH")]
    languages: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a source file against a test-case file
    Run {
        /// Language name or alias (e.g., javascript, py, ts)
        #[arg(short, long)]
        language: String,

        /// Source file containing the solution
        #[arg(short, long)]
        source: PathBuf,

        /// JSON file with one test case object or an array of them
        #[arg(short, long)]
        tests: PathBuf,

        /// Per-test-case time limit in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Print the machine-readable result instead of the summary
        #[arg(long, default_value = "false")]
        json: bool,

        /// Show hidden test cases and memory usage
        #[arg(long, default_value = "false")]
        dev: bool,
    },

    /// Run a source file as-is, without test cases
    Exec {
        #[arg(short, long)]
        language: String,

        #[arg(short, long)]
        source: PathBuf,

        /// File whose contents are passed on stdin
        #[arg(long)]
        stdin: Option<PathBuf>,

        /// Time limit in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Print the execution report as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Print the program generated for one test case
    Wrap {
        #[arg(short, long)]
        language: String,

        #[arg(short, long)]
        source: PathBuf,

        #[arg(short, long)]
        tests: PathBuf,

        /// Zero-based test case index
        #[arg(short, long, default_value = "0")]
        index: usize,
    },

    /// List configured languages
    Langs {
        /// Also ask the engine which runtimes are installed
        #[arg(long, default_value = "false")]
        installed: bool,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false) {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let settings = commands::Settings::resolve(cli.engine_url, cli.languages);

    match cli.command {
        Commands::Run {
            language,
            source,
            tests,
            timeout_ms,
            json,
            dev,
        } => {
            let all_passed =
                commands::run_tests(&settings, &language, &source, &tests, timeout_ms, json, dev)
                    .await?;
            if !all_passed {
                std::process::exit(1);
            }
        }
        Commands::Exec {
            language,
            source,
            stdin,
            timeout_ms,
            json,
        } => {
            let success = commands::execute_file(
                &settings,
                &language,
                &source,
                stdin.as_deref(),
                timeout_ms,
                json,
            )
            .await?;
            if !success {
                std::process::exit(1);
            }
        }
        Commands::Wrap {
            language,
            source,
            tests,
            index,
        } => {
            commands::print_harness(&settings, &language, &source, &tests, index)?;
        }
        Commands::Langs { installed } => {
            commands::list_languages(&settings, installed).await?;
        }
    }

    Ok(())
}
