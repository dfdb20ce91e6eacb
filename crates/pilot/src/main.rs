mod logging;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use pilot_engine::backend::Backend;
use pilot_engine::config::{ConfigLoader, LogFormat, PilotConfig};
use pilot_engine::crew::{CrewConfig, CrewManager};
use pilot_engine::formatter;
use pilot_engine::loader;
use pilot_engine::oracle::LlmOracle;
use pilot_engine::planner::Planner;
use pilot_engine::runner::{self, Runner};
use pilot_h::HeadlessBackend;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Conventional exit status for a run stopped by Ctrl-C.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "pilot", version, about = "Scenario-driven browser test runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scenario file, or every scenario in a directory
    Run(RunArgs),
    /// Check a scenario file without running it
    Validate {
        file: PathBuf,
    },
    /// Write an example scenario
    Example {
        #[arg(default_value = "example_scenario.yaml")]
        out: PathBuf,
    },
}

#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// Scenario file or directory
    path: PathBuf,

    /// Write the results as a JSON array
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Config file (defaults to ./pilot.yaml, then ~/.pilot/config.yaml)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    headful: bool,

    #[arg(long)]
    log_level: Option<String>,

    #[arg(long, value_enum)]
    log_format: Option<CliLogFormat>,

    /// Scenarios to run at once when PATH is a directory
    #[arg(long)]
    parallel: Option<usize>,

    /// Disable LLM element selection for smart steps
    #[arg(long)]
    no_oracle: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliLogFormat {
    Text,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Text => LogFormat::Text,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

/// File, then environment, then flags.
async fn resolve_config(args: &RunArgs) -> anyhow::Result<PilotConfig> {
    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from(path)
            .await
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ConfigLoader::load_default()
            .await
            .context("loading default config")?,
    };
    config.apply_env();
    apply_overrides(&mut config, args);
    Ok(config)
}

fn apply_overrides(config: &mut PilotConfig, args: &RunArgs) {
    if args.headful {
        config.browser.headless = false;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.to_lowercase();
    }
    if let Some(format) = args.log_format {
        config.logging.format = format.into();
    }
    if let Some(parallel) = args.parallel {
        config.runner.max_parallel = parallel;
    }
    if args.no_oracle {
        config.oracle.enabled = false;
    }
}

fn build_crew(config: &PilotConfig) -> CrewManager {
    let downloads = config.artifacts.downloads_dir.clone();
    let provider =
        move || -> Box<dyn Backend> { Box::new(HeadlessBackend::new(downloads.clone())) };

    let crew = CrewManager::new(
        Planner::new(config.planner.clone()),
        Arc::new(provider),
        CrewConfig::from_pilot_config(config),
    );
    if !config.oracle.enabled {
        return crew;
    }
    match LlmOracle::new(&config.oracle) {
        Ok(oracle) => crew.with_oracle(Arc::new(oracle)),
        Err(e) => {
            warn!(error = %e, "LLM oracle unavailable, smart steps will fail");
            crew
        }
    }
}

async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let config = resolve_config(&args).await?;
    ConfigLoader::ensure_directories(&config)
        .await
        .context("creating artifact directories")?;
    if let Some(file) = logging::init(&config.logging, &config.artifacts.logs_dir)? {
        eprintln!("Logging to {}", file.display());
    }

    let runner = Runner::new(Arc::new(build_crew(&config)), config.runner.max_parallel);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, closing sessions");
            interrupt.cancel();
        }
    });

    let records = runner.run_path(&args.path, cancel.clone()).await?;

    for record in &records {
        println!("{}", formatter::format_record(record));
    }
    println!("{}", formatter::format_summary(&records));

    if let Some(output) = &args.output {
        runner::write_output(output, &records).await?;
        println!("Results written to {}", output.display());
    }

    if cancel.is_cancelled() || records.iter().any(|r| r.is_cancelled()) {
        return Ok(EXIT_INTERRUPTED);
    }
    Ok(runner::exit_code(&records))
}

async fn validate(file: &Path) -> i32 {
    let report = loader::validate_syntax(file).await;
    println!(
        "{}",
        formatter::format_validation(&file.display().to_string(), &report)
    );
    if report.valid { 0 } else { 1 }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let code = match cli.command {
        Command::Run(args) => run(args).await?,
        Command::Validate { file } => validate(&file).await,
        Command::Example { out } => {
            loader::write_example(&out)
                .await
                .with_context(|| format!("writing {}", out.display()))?;
            info!(path = %out.display(), "Example scenario written");
            println!("Example scenario written to {}", out.display());
            0
        }
    };

    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "pilot",
            "run",
            "scenarios",
            "--output",
            "out.json",
            "--headful",
            "--log-format",
            "json",
            "--parallel",
            "3",
            "--no-oracle",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.path, PathBuf::from("scenarios"));
        assert_eq!(args.output, Some(PathBuf::from("out.json")));
        assert!(args.headful);
        assert!(args.no_oracle);
        assert_eq!(args.parallel, Some(3));
    }

    #[test]
    fn test_cli_rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["pilot", "run", "x", "--log-format", "xml"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = PilotConfig::default();
        let args = RunArgs {
            path: PathBuf::from("x"),
            headful: true,
            log_level: Some("DEBUG".into()),
            log_format: Some(CliLogFormat::Json),
            parallel: Some(4),
            no_oracle: true,
            ..Default::default()
        };
        apply_overrides(&mut config, &args);

        assert!(!config.browser.headless);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.runner.max_parallel, 4);
        assert!(!config.oracle.enabled);
    }

    #[tokio::test]
    async fn test_resolve_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pilot.yaml");
        std::fs::write(&path, "runner:\n  max_parallel: 2\n").unwrap();

        let args = RunArgs {
            path: PathBuf::from("x"),
            config: Some(path),
            ..Default::default()
        };
        let config = resolve_config(&args).await.unwrap();
        assert_eq!(config.runner.max_parallel, 2);
    }

    #[tokio::test]
    async fn test_validate_exit_codes() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.yaml");
        loader::write_example(&good).await.unwrap();
        assert_eq!(validate(&good).await, 0);

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "name: x\n").unwrap();
        assert_eq!(validate(&bad).await, 1);
    }
}
