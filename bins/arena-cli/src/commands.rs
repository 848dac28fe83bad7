// CLI commands for judging submissions locally
use anyhow::{bail, Context, Result};
use arena_common::{Config, TestCase};
use arena_judge::{
    summarize, DisplayConfig, HarnessGenerator, LanguageRegistry, PistonClient, RunnerOptions,
    TestRunner,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Environment config with command-line overrides applied
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: Config,
}

impl Settings {
    pub fn resolve(engine_url: Option<String>, languages: Option<PathBuf>) -> Self {
        let mut config = Config::from_env();
        if let Some(url) = engine_url {
            config.engine_url = url;
        }
        if let Some(path) = languages {
            config.language_config_path = path.to_string_lossy().into_owned();
        }
        Self { config }
    }

    fn registry(&self) -> Result<LanguageRegistry> {
        let path = Path::new(&self.config.language_config_path);
        LanguageRegistry::load_or_builtin(path)
            .with_context(|| format!("Failed to load {}", path.display()))
    }
}

/// Load test cases from a JSON file holding one object or an array of them
pub fn load_test_cases(path: &Path) -> Result<Vec<TestCase>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_test_cases(&content).with_context(|| format!("Invalid test cases in {}", path.display()))
}

fn parse_test_cases(content: &str) -> Result<Vec<TestCase>> {
    let value: Value = serde_json::from_str(content).context("Not valid JSON")?;
    let items = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        _ => bail!("Expected a test case object or an array of them"),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value(item)
                .with_context(|| format!("Test case {} must have input and output", i + 1))
        })
        .collect()
}

fn build_runner(settings: &Settings, timeout_ms: Option<u64>) -> Result<TestRunner> {
    let registry = Arc::new(settings.registry()?);
    let client = PistonClient::new(settings.config.engine_url.clone())
        .context("Failed to create execution engine client")?;
    let mut options = RunnerOptions::from_config(&settings.config);
    options.timeout_ms = settings.config.effective_timeout_ms(timeout_ms);
    debug!(?options, engine_url = %settings.config.engine_url, "Runner configured");

    Ok(TestRunner::new(
        registry,
        Arc::new(HarnessGenerator::with_default_strategies()),
        Arc::new(client),
        options,
    ))
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Run a submission and print the result; returns whether every case passed
pub async fn run_tests(
    settings: &Settings,
    language: &str,
    source: &Path,
    tests: &Path,
    timeout_ms: Option<u64>,
    json: bool,
    dev: bool,
) -> Result<bool> {
    let source_code = read_source(source)?;
    let test_cases = load_test_cases(tests)?;
    let runner = build_runner(settings, timeout_ms)?;

    if !json {
        println!("🚀 Running {} test case(s) in {}", test_cases.len(), language);
    }

    let result = runner.run(&source_code, language, &test_cases).await;
    let display = if dev {
        DisplayConfig::development()
    } else {
        DisplayConfig::production()
    };
    let summary = summarize(&result, &display);

    if json {
        let rendered = serde_json::to_string_pretty(&summary.machine_result)
            .context("Failed to serialize result")?;
        println!("{}", rendered);
    } else {
        println!("{}", summary.human_text);
        if result.all_passed() {
            println!("\n✅ Score: {}", result.score);
        } else {
            println!("\n❌ Score: {}", result.score);
        }
    }

    Ok(result.all_passed())
}

/// Run a source file without test cases; returns whether it exited cleanly
pub async fn execute_file(
    settings: &Settings,
    language: &str,
    source: &Path,
    stdin: Option<&Path>,
    timeout_ms: Option<u64>,
    json: bool,
) -> Result<bool> {
    let source_code = read_source(source)?;
    let input = match stdin {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => String::new(),
    };

    let runner = build_runner(settings, timeout_ms)?;
    let report = runner
        .execute_source(&source_code, language, &input)
        .await
        .context("Execution failed")?;

    if json {
        let rendered =
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{}", rendered);
    } else {
        print!("{}", report.stdout);
        if !report.stderr.is_empty() {
            eprint!("{}", report.stderr);
        }
        let exit = report
            .exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "none".to_string());
        if report.timed_out {
            println!("\n⏱️  Time limit exceeded ({}ms)", report.elapsed_ms);
        } else if report.success {
            println!("\n✅ Exit code {} ({}ms)", exit, report.elapsed_ms);
        } else {
            println!("\n❌ Exit code {} ({}ms)", exit, report.elapsed_ms);
        }
    }

    Ok(report.success)
}

/// Print the generated program for one test case without running it
pub fn print_harness(
    settings: &Settings,
    language: &str,
    source: &Path,
    tests: &Path,
    index: usize,
) -> Result<()> {
    let registry = settings.registry()?;
    let spec = registry.resolve(language)?;
    let source_code = read_source(source)?;
    let test_cases = load_test_cases(tests)?;

    let case = match test_cases.get(index) {
        Some(case) => case,
        None => bail!(
            "Test case index {} out of range ({} test cases)",
            index,
            test_cases.len()
        ),
    };

    let program = HarnessGenerator::with_default_strategies().wrap(&source_code, &spec.name, case)?;
    println!("{}", program);
    Ok(())
}

/// Print configured languages, optionally checked against the engine
pub async fn list_languages(settings: &Settings, installed: bool) -> Result<()> {
    let registry = settings.registry()?;
    let harness = HarnessGenerator::with_default_strategies();

    let runtimes = if installed {
        let client = PistonClient::new(settings.config.engine_url.clone())
            .context("Failed to create execution engine client")?;
        Some(
            client
                .runtimes()
                .await
                .context("Failed to fetch runtimes from the execution engine")?,
        )
    } else {
        None
    };

    println!("📋 Configured languages:\n");
    for spec in registry.languages() {
        let mut line = format!("  {:<12} {:<10}", spec.name, spec.engine_version);
        if !spec.aliases.is_empty() {
            line.push_str(&format!(" aliases: {}", spec.aliases.join(", ")));
        }
        if !harness.supports(&spec.name) {
            line.push_str(" (no harness)");
        }
        if let Some(runtimes) = &runtimes {
            let available = runtimes
                .iter()
                .any(|rt| rt.language == spec.engine_language && rt.version == spec.engine_version);
            line.push_str(if available { " ✅" } else { " ❌ not installed" });
        }
        println!("{}", line);
    }
    Ok(())
}
