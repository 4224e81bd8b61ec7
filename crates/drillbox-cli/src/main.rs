//! drillbox - hands-on Linux administration practice in throwaway containers
//!
//! ## Commands
//!
//! - `start`: run one practice session in a fresh sandbox
//! - `list`: list available scenarios
//! - `show`: print one scenario
//! - `lint`: check scenario files for structural problems
//! - `stats`: summarise recorded attempts

mod terminal;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};

use drillbox_core::error::render;
use drillbox_core::scenario::{ValidationCheck, ValidationRules};
use drillbox_core::session::SessionRequest;
use drillbox_core::{
    Category, Difficulty, Distribution, DrillConfig, DrillError, ErrorHandler, ScenarioCatalog,
    SessionOrchestrator,
};
use drillbox_state::{AttemptLedger, AttemptStatistics, BucketStats, SurrealAttemptLedger};

use terminal::TerminalFrontend;

#[derive(Parser)]
#[command(name = "drillbox")]
#[command(author = "Stevedores Org")]
#[command(version = drillbox_core::VERSION)]
#[command(about = "Hands-on Linux administration practice in ephemeral sandboxes", long_about = None)]
struct Cli {
    /// Configuration file (default: ./drillbox.toml when present)
    #[arg(short, long, global = true, env = "DRILLBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a practice session
    Start {
        #[arg(long, value_parser = parse_category)]
        category: Option<Category>,

        #[arg(long, value_parser = parse_difficulty)]
        difficulty: Option<Difficulty>,

        /// Distribution for scenarios that do not pin one
        #[arg(long, value_parser = parse_distribution)]
        distribution: Option<Distribution>,

        /// Run this scenario instead of a random one
        #[arg(long)]
        scenario: Option<String>,
    },

    /// List scenarios
    List {
        #[arg(long, value_parser = parse_category)]
        category: Option<Category>,

        #[arg(long, value_parser = parse_difficulty)]
        difficulty: Option<Difficulty>,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show one scenario
    Show {
        id: String,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Check scenario files without loading them into the catalog
    Lint {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Summarise recorded attempts
    Stats {
        #[arg(long, value_parser = parse_category)]
        category: Option<Category>,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn parse_category(s: &str) -> std::result::Result<Category, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn parse_difficulty(s: &str) -> std::result::Result<Difficulty, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn parse_distribution(s: &str) -> std::result::Result<Distribution, String> {
    s.parse().map_err(|e| format!("{e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    drillbox_core::telemetry::init_tracing(cli.json, level);

    let config = match DrillConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => fail(&ErrorHandler::default(), &err),
    };

    match cli.command {
        Commands::Start {
            category,
            difficulty,
            distribution,
            scenario,
        } => {
            let request = SessionRequest {
                category,
                difficulty,
                distribution,
                scenario_id: scenario,
            };
            cmd_start(&config, request).await
        }
        Commands::List {
            category,
            difficulty,
            format,
        } => cmd_list(&config, category, difficulty, format),
        Commands::Show { id, format } => cmd_show(&config, &id, format),
        Commands::Lint { files } => cmd_lint(&config, &files),
        Commands::Stats { category, format } => cmd_stats(&config, category, format).await,
    }
}

/// Print the handler's explanation of `err` and exit.
fn fail(handler: &ErrorHandler, err: &DrillError) -> ! {
    eprintln!("{}", render(&handler.explain(err)));
    let code = match err {
        DrillError::Interrupted => 130,
        _ => 1,
    };
    std::process::exit(code)
}

async fn open_ledger(config: &DrillConfig) -> Result<Arc<dyn AttemptLedger>> {
    let ledger = match &config.database_path {
        Some(path) => SurrealAttemptLedger::open(path)
            .await
            .with_context(|| format!("Failed to open attempt history at {}", path.display()))?,
        None => SurrealAttemptLedger::in_memory()
            .await
            .context("Failed to start in-memory attempt history")?,
    };
    Ok(Arc::new(ledger))
}

fn catalog(config: &DrillConfig) -> ScenarioCatalog {
    ScenarioCatalog::new(config.scenarios_dir.clone())
}

/// Run one practice session
async fn cmd_start(config: &DrillConfig, request: SessionRequest) -> Result<()> {
    let ledger = open_ledger(config).await?;
    let orchestrator = SessionOrchestrator::from_config(config, ledger);

    let version = match orchestrator.check_runtime().await {
        Ok(version) => version,
        Err(err) => fail(orchestrator.error_handler(), &err),
    };
    info!(runtime_version = %version, "container runtime reachable");

    let frontend = TerminalFrontend::new();
    match orchestrator.start_session(request, &frontend).await {
        Ok(result) => {
            println!();
            println!(
                "{} {} in {}s - score {} (base {} points)",
                result.scenario.id,
                if result.passed { "PASSED" } else { "NOT PASSED" },
                result.duration.as_secs(),
                result.score,
                result.max_score
            );
            if result.attempt_id.is_none() {
                println!("(this attempt could not be saved to your history)");
            }
            Ok(())
        }
        Err(err) => fail(orchestrator.error_handler(), &err),
    }
}

/// List scenarios
fn cmd_list(
    config: &DrillConfig,
    category: Option<Category>,
    difficulty: Option<Difficulty>,
    format: Format,
) -> Result<()> {
    let scenarios = catalog(config).list(category, difficulty)?;

    if format == Format::Json {
        let items: Vec<_> = scenarios.iter().map(|s| s.as_ref()).collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if scenarios.is_empty() {
        println!("No scenarios found in {}", config.scenarios_dir.display());
        return Ok(());
    }

    println!(
        "{:<20} {:<22} {:<8} {:>6}  {}",
        "ID", "CATEGORY", "LEVEL", "POINTS", "DISTRIBUTION"
    );
    for s in &scenarios {
        println!(
            "{:<20} {:<22} {:<8} {:>6}  {}",
            s.id,
            s.category.as_str(),
            s.difficulty.as_str(),
            s.points,
            s.distribution.map_or("any", |d| d.as_str())
        );
    }
    println!();
    println!("{} scenario(s)", scenarios.len());
    Ok(())
}

/// Show one scenario
fn cmd_show(config: &DrillConfig, id: &str, format: Format) -> Result<()> {
    let scenario = catalog(config)
        .get(id)?
        .with_context(|| format!("Scenario not found: {id}"))?;

    if format == Format::Json {
        println!("{}", serde_json::to_string_pretty(scenario.as_ref())?);
        return Ok(());
    }

    println!("id:           {}", scenario.id);
    println!("category:     {}", scenario.category);
    println!("difficulty:   {}", scenario.difficulty);
    println!("points:       {}", scenario.points);
    println!(
        "distribution: {}",
        scenario.distribution.map_or("any", |d| d.as_str())
    );
    if let Some(limit) = scenario.time_limit {
        println!("time limit:   {limit}s");
    }
    if !scenario.tags.is_empty() {
        println!("tags:         {}", scenario.tags.join(", "));
    }
    println!();
    println!("{}", scenario.task.trim_end());
    println!();
    print_checks(&scenario.validation);
    Ok(())
}

fn print_checks(rules: &ValidationRules) {
    println!("Checks:");
    for (i, check) in rules.checks.iter().enumerate() {
        let target = match check {
            ValidationCheck::Command(c) => c.command.as_str(),
            ValidationCheck::File(c) => c.path.as_str(),
            ValidationCheck::Service(c) => c.service_name.as_str(),
            ValidationCheck::Custom(c) => c.script_path.as_str(),
        };
        println!(
            "  {}. [{}] {} ({})",
            i + 1,
            check.kind(),
            check.display_name(i),
            target
        );
    }
}

/// Lint scenario files
fn cmd_lint(config: &DrillConfig, files: &[PathBuf]) -> Result<()> {
    let catalog = catalog(config);
    let mut failed = 0usize;

    for file in files {
        let problems = catalog
            .check_file(file)
            .with_context(|| format!("Failed to lint {}", file.display()))?;
        if problems.is_empty() {
            println!("ok    {}", file.display());
        } else {
            failed += 1;
            println!("FAIL  {}", file.display());
            for problem in problems {
                println!("      {problem}");
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} file(s) have problems", files.len());
    }
    Ok(())
}

/// Summarise recorded attempts
async fn cmd_stats(config: &DrillConfig, category: Option<Category>, format: Format) -> Result<()> {
    let ledger = open_ledger(config).await?;
    let stats = ledger
        .statistics(category.as_ref().map(Category::as_str))
        .await
        .context("Failed to read attempt history")?;

    if format == Format::Json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    print_stats(&stats, config.database_path.as_deref());
    Ok(())
}

fn print_stats(stats: &AttemptStatistics, source: Option<&Path>) {
    if stats.overall.attempts == 0 {
        match source {
            Some(path) => println!("No attempts recorded in {}", path.display()),
            None => println!("No attempts recorded"),
        }
        return;
    }

    let row = |label: &str, b: &BucketStats| {
        println!(
            "{:<24} {:>8} {:>8} {:>9.1}% {:>9.1}",
            label,
            b.attempts,
            b.passed,
            b.pass_rate() * 100.0,
            b.average_score()
        );
    };

    println!(
        "{:<24} {:>8} {:>8} {:>10} {:>9}",
        "", "ATTEMPTS", "PASSED", "PASS RATE", "AVG SCORE"
    );
    row("overall", &stats.overall);
    for (category, bucket) in &stats.by_category {
        row(category, bucket);
    }
    for (difficulty, bucket) in &stats.by_difficulty {
        row(&format!("difficulty: {difficulty}"), bucket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_start_filters() {
        let cli = Cli::try_parse_from([
            "drillbox",
            "--verbose",
            "start",
            "--category",
            "users_groups",
            "--difficulty",
            "hard",
            "--distribution",
            "rocky",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Start {
                category,
                difficulty,
                distribution,
                scenario,
            } => {
                assert_eq!(category, Some(Category::UsersGroups));
                assert_eq!(difficulty, Some(Difficulty::Hard));
                assert_eq!(distribution, Some(Distribution::Rocky));
                assert!(scenario.is_none());
            }
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_category() {
        let err = Cli::try_parse_from(["drillbox", "list", "--category", "cooking"]);
        assert!(err.is_err());
    }

    #[test]
    fn test_lint_requires_files() {
        assert!(Cli::try_parse_from(["drillbox", "lint"]).is_err());
        let cli = Cli::try_parse_from(["drillbox", "lint", "a.yaml", "b.yaml"]).unwrap();
        assert!(matches!(cli.command, Commands::Lint { ref files } if files.len() == 2));
    }
}
