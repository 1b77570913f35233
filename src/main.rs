//! kritiq — resilient AI code analysis pipeline (CLI).
//!
//! Entry point and error handling boundary. Uses `anyhow` for
//! ergonomic error propagation and user-facing messages.

mod cli;

use kritiq::breaker::CircuitBreaker;
use kritiq::cache::CacheEngine;
use kritiq::config::Config;
use kritiq::constants;
use kritiq::env::Env;
use kritiq::models::{AnalysisRequest, AnalysisResult, BatchEntry};
use kritiq::notify::{NoopNotifier, Notifier, WebhookNotifier};
use kritiq::pipeline::AnalysisPipeline;
use kritiq::store::FileStore;
use kritiq::upstream::rig::RigAnalyzer;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;

use cli::args::{AnalyzeArgs, BatchArgs, Cli, Command, StoreAction};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Analyze(args) => run_analyze(args).await,
        Command::Batch(args) => run_batch(args).await,
        Command::Store { action } => run_store(action),
        Command::Version => run_version(),
    }
}

/// Route `kritiq::*` logs through tracing-subscriber. `RUST_LOG`
/// overrides the level chosen by `--verbose`.
fn init_logging(verbose: bool) {
    let default_filter = if verbose { "kritiq=debug" } else { "kritiq=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Print detailed version and build information.
fn run_version() -> Result<()> {
    println!(
        "{} {}",
        constants::APP_NAME.bold(),
        env!("CARGO_PKG_VERSION").green().bold()
    );
    println!("{}     {}", "target:".dimmed(), env!("TARGET"));
    Ok(())
}

/// Assemble the pipeline from configuration.
fn build_pipeline(config: &Config, use_cache: bool) -> Result<Arc<AnalysisPipeline>> {
    let upstream = RigAnalyzer::new(config.provider.clone())
        .context("upstream analyzer is not configured")?;

    let cache = CacheEngine::new(config.cache.enabled && use_cache, config.cache_ttl());
    let store = match config.store.dir.clone() {
        Some(dir) => FileStore::new_with_dir(dir),
        None => FileStore::new(),
    };
    let breaker = CircuitBreaker::new(config.breaker_config());
    let notifier: Arc<dyn Notifier> = match config.notify.webhook_url.as_deref() {
        Some(url) => Arc::new(WebhookNotifier::new(url)),
        None => Arc::new(NoopNotifier),
    };

    Ok(Arc::new(AnalysisPipeline::new(
        Arc::new(upstream),
        Arc::new(cache),
        Arc::new(store),
        Arc::new(breaker),
        notifier,
        config.pipeline_config(),
    )))
}

fn load_config() -> Result<Config> {
    let cwd = std::env::current_dir().ok();
    Config::load(cwd.as_deref(), &Env::real()).context("failed to load configuration")
}

/// Build an [`AnalysisRequest`] from CLI inputs.
fn build_request(
    path: &Path,
    user: &str,
    options: &[(String, String)],
    capability: Option<&str>,
) -> Result<AnalysisRequest> {
    let code_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut request = AnalysisRequest::new(code_content, path.display().to_string(), user);
    for (key, value) in options {
        // Values that parse as JSON keep their type; the rest are strings.
        let parsed = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.clone()));
        request = request.with_option(key.clone(), parsed);
    }
    if let Some(capability) = capability {
        request = request.with_option("capability", serde_json::Value::String(capability.into()));
    }
    Ok(request)
}

/// Analyze a single file and print the result.
async fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let config = load_config()?;
    let pipeline = build_pipeline(&config, !args.no_cache)?;
    let request = build_request(
        &args.file,
        &args.user,
        &args.options,
        args.capability.as_deref(),
    )?;

    let result = pipeline
        .analyze(request)
        .await
        .context("analysis failed")?;
    print_result(&args.file.display().to_string(), &result);
    Ok(())
}

/// Analyze every file under a path and print the batch summary.
async fn run_batch(args: BatchArgs) -> Result<()> {
    let config = load_config()?;
    let pipeline = build_pipeline(&config, !args.no_cache)?;

    let files = collect_files(&args.path, args.max_files)?;
    if files.is_empty() {
        bail!("no readable files under {}", args.path.display());
    }

    let mut requests = Vec::with_capacity(files.len());
    for file in &files {
        requests.push(build_request(
            file,
            &args.user,
            &[],
            args.capability.as_deref(),
        )?);
    }

    let output = pipeline.analyze_batch(requests).await;

    for (file, entry) in files.iter().zip(&output.results) {
        match entry {
            BatchEntry::Completed(result) => {
                println!(
                    "  {}  {}  score {}{}",
                    status_mark(result),
                    file.display(),
                    score_colored(result.quality_score),
                    provenance_label(result)
                );
            }
            BatchEntry::Failed { file_path, error } => {
                println!("  {}  {} — {}", "✗".red(), file_path, error.red());
            }
        }
    }

    let s = &output.summary;
    println!();
    println!(
        "{} {} analyzed, {} failed, average score {:.1}, {} suggestions",
        "Summary:".bold(),
        s.successful,
        s.failed,
        s.average_quality_score,
        s.total_suggestions
    );

    if s.failed > 0 {
        for (service, stats) in pipeline.error_stats() {
            let state = if stats.circuit_open {
                "open".red().to_string()
            } else {
                "closed".green().to_string()
            };
            println!(
                "  {} {}: {} recent errors, circuit {}",
                "breaker".dimmed(),
                service,
                stats.error_count,
                state
            );
        }
    }
    Ok(())
}

/// Manage the durable analysis store.
fn run_store(action: StoreAction) -> Result<()> {
    let config = load_config()?;
    let store = match config.store.dir {
        Some(dir) => FileStore::new_with_dir(dir),
        None => FileStore::new(),
    };

    match action {
        StoreAction::Clear => {
            let stats = store.clear().context("failed to clear store")?;
            println!(
                "Removed {} records ({}).",
                stats.records,
                stats.human_size()
            );
        }
        StoreAction::Stats => {
            let stats = store.stats().context("failed to read store")?;
            println!("{} records, {}", stats.records, stats.human_size());
        }
        StoreAction::Path => match store.path() {
            Some(path) => println!("{}", path.display()),
            None => bail!("no store directory available"),
        },
    }
    Ok(())
}

/// Collect analyzable files under a path, gitignore-aware, skipping
/// binary (non-UTF-8) content.
fn collect_files(path: &Path, max_files: usize) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("{} is neither a file nor a directory", path.display());
    }

    let mut files = Vec::new();
    for entry in ignore::WalkBuilder::new(path).build() {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if std::fs::read_to_string(entry.path()).is_err() {
            continue;
        }
        files.push(entry.path().to_path_buf());
        if files.len() >= max_files {
            break;
        }
    }
    files.sort();
    Ok(files)
}

fn status_mark(result: &AnalysisResult) -> String {
    if result.is_fallback {
        "~".yellow().to_string()
    } else {
        "✓".green().to_string()
    }
}

fn score_colored(score: u8) -> String {
    let text = score.to_string();
    match score {
        0..=49 => text.red().to_string(),
        50..=79 => text.yellow().to_string(),
        _ => text.green().to_string(),
    }
}

fn provenance_label(result: &AnalysisResult) -> String {
    if result.from_cache {
        "  (cached)".dimmed().to_string()
    } else if result.from_database {
        "  (from store)".dimmed().to_string()
    } else if result.is_fallback {
        "  (fallback)".yellow().dimmed().to_string()
    } else {
        String::new()
    }
}

/// Print one analysis result.
fn print_result(file: &str, result: &AnalysisResult) {
    println!(
        "{}  {}  score {}{}",
        status_mark(result),
        file.bold(),
        score_colored(result.quality_score),
        provenance_label(result)
    );

    if let Some(ref reason) = result.fallback_reason {
        println!("  {} {}", "degraded:".yellow(), reason);
    }

    if !result.patterns.is_empty() {
        println!("  {}  {}", "patterns:".cyan(), result.patterns.join(", "));
    }

    for issue in &result.security_issues {
        let line = issue
            .line
            .map(|l| format!(" (line {l})"))
            .unwrap_or_default();
        println!(
            "  {} {}{}",
            format!("[{}]", issue.severity).red().bold(),
            issue.description,
            line.dimmed()
        );
    }

    for suggestion in &result.suggestions {
        println!(
            "  {} {}:{} {} — {}",
            format!("[{}]", suggestion.severity).yellow(),
            suggestion.line,
            suggestion.column,
            suggestion.kind.to_string().cyan(),
            suggestion.message
        );
        if let Some(ref fix) = suggestion.suggested_fix {
            println!("      {} {}", "fix:".green(), fix);
        }
    }

    let m = &result.metrics;
    if !m.language.is_empty() {
        println!(
            "  {}  {} · complexity {} · maintainability {} · {} lines",
            "metrics:".dimmed(),
            m.language,
            m.complexity,
            m.maintainability_index,
            m.lines_of_code
        );
    }
}
