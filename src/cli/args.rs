//! Clap argument types and validation.

use clap::Parser;
use std::path::PathBuf;

/// Resilient AI code analysis pipeline.
#[derive(Parser, Debug)]
#[command(name = "kritiq", version)]
pub struct Cli {
    /// Enable debug-level logging.
    #[arg(long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Analyze a single file.
    Analyze(AnalyzeArgs),

    /// Analyze every file under a path, concurrently.
    Batch(BatchArgs),

    /// Manage the durable analysis store.
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },

    /// Print version and build information.
    Version,
}

/// Arguments for the `analyze` subcommand.
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// The file to analyze.
    pub file: PathBuf,

    /// User identifier the analysis is attributed to.
    #[arg(long, default_value = "local")]
    pub user: String,

    /// Analysis option as key=value. May be repeated; values parse as
    /// JSON when possible, otherwise as strings.
    #[arg(long = "option", value_parser = parse_option)]
    pub options: Vec<(String, String)>,

    /// Target capability (analysis, commit-message, pr-description,
    /// multimodal, team-analytics).
    #[arg(long)]
    pub capability: Option<String>,

    /// Bypass the result cache for this run.
    #[arg(long, default_value_t = false)]
    pub no_cache: bool,
}

/// Arguments for the `batch` subcommand.
#[derive(Parser, Debug)]
pub struct BatchArgs {
    /// File or directory to analyze. Directories are walked
    /// gitignore-aware.
    pub path: PathBuf,

    /// User identifier the analyses are attributed to.
    #[arg(long, default_value = "local")]
    pub user: String,

    /// Target capability applied to every item.
    #[arg(long)]
    pub capability: Option<String>,

    /// Maximum number of files taken from a directory walk.
    #[arg(long, default_value_t = 50)]
    pub max_files: usize,

    /// Bypass the result cache for this run.
    #[arg(long, default_value_t = false)]
    pub no_cache: bool,
}

/// Store management subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum StoreAction {
    /// Remove all stored analysis records.
    Clear,
    /// Show store statistics (record count and size).
    Stats,
    /// Print the store directory path.
    Path,
}

/// Parse a `key=value` option argument.
fn parse_option(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_option_splits_on_first_equals() {
        assert_eq!(
            parse_option("depth=full").unwrap(),
            ("depth".to_string(), "full".to_string())
        );
        assert_eq!(
            parse_option("expr=a=b").unwrap(),
            ("expr".to_string(), "a=b".to_string())
        );
    }

    #[test]
    fn parse_option_rejects_missing_equals() {
        assert!(parse_option("depth").is_err());
        assert!(parse_option("=value").is_err());
    }

    #[test]
    fn cli_parses_analyze() {
        let cli = Cli::try_parse_from([
            "kritiq",
            "analyze",
            "src/main.rs",
            "--user",
            "u1",
            "--option",
            "depth=full",
            "--capability",
            "analysis",
        ])
        .unwrap();
        match cli.command {
            Command::Analyze(args) => {
                assert_eq!(args.file, PathBuf::from("src/main.rs"));
                assert_eq!(args.user, "u1");
                assert_eq!(args.options.len(), 1);
                assert_eq!(args.capability.as_deref(), Some("analysis"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_batch_with_defaults() {
        let cli = Cli::try_parse_from(["kritiq", "batch", "src"]).unwrap();
        match cli.command {
            Command::Batch(args) => {
                assert_eq!(args.user, "local");
                assert_eq!(args.max_files, 50);
                assert!(!args.no_cache);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_store_actions() {
        for (arg, expected) in [("clear", "Clear"), ("stats", "Stats"), ("path", "Path")] {
            let cli = Cli::try_parse_from(["kritiq", "store", arg]).unwrap();
            match cli.command {
                Command::Store { action } => assert_eq!(format!("{action:?}"), expected),
                other => panic!("unexpected command: {other:?}"),
            }
        }
    }
}
