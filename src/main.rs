use anyhow::{Context, Result};
use deepdive::cli::init::{self, InitConfig, InitResult};
use deepdive::cli::output::Output;
use deepdive::cli::{Cli, Commands, ResearchArgs};
use deepdive::research::{OrchestrationDriver, PersonaCatalog, RunStatus};
use deepdive::utils::toml_config::{ConfigManager, DeepdiveConfig, LogFormat, LoggingConfig};
use owo_colors::OwoColorize;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    match cli.command {
        Commands::Init {
            path,
            force,
            ollama_url,
        } => {
            let result = init::run(
                InitConfig {
                    path,
                    force,
                    ollama_url,
                },
                &output,
            );
            Ok(match result {
                InitResult::Success => ExitCode::SUCCESS,
                InitResult::AlreadyExists | InitResult::Error(_) => ExitCode::FAILURE,
            })
        }
        Commands::Config { validate } => show_config(&cli.config, validate, &output),
        Commands::Personas => {
            let config = DeepdiveConfig::load_or_default(&cli.config)?;
            output.personas(PersonaCatalog::from_config(&config.personas).iter());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Research(args) => research(&cli.config, cli.verbose, args, &output).await,
    }
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    // RUST_LOG wins over the config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    // Logs go to stderr so `--json` output stays parseable
    match logging.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

async fn research(
    config_path: &Path,
    verbose: bool,
    args: ResearchArgs,
    output: &Output,
) -> Result<ExitCode> {
    let manager = ConfigManager::new(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let config = manager.config();
    init_tracing(&config.logging, verbose);

    let driver = OrchestrationDriver::from_config(&config)?;
    let result = driver.run_research(args.to_request()).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        output.report(&result);
    }

    Ok(if result.status == RunStatus::Error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn show_config(path: &Path, validate: bool, output: &Output) -> Result<ExitCode> {
    if validate {
        output.header(&format!("Validating {}", path.display()));
        let config = match DeepdiveConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                output.error(&e.to_string());
                return Ok(ExitCode::FAILURE);
            }
        };
        let warnings = config.validate_with_warnings()?;
        for warning in &warnings {
            output.warning(&warning.message);
        }
        output.success("Configuration is valid");
        return Ok(ExitCode::SUCCESS);
    }

    let config = DeepdiveConfig::load_or_default(path)?;
    output.header("Configuration");
    output.kv("file", &path.display().to_string());
    output.kv("llm", &format!("{} at {}", config.llm.provider().name(), config.llm.base_url));
    output.kv(
        "models",
        &format!(
            "fast={} balanced={} deep={}",
            config.llm.models.fast, config.llm.models.balanced, config.llm.models.deep
        ),
    );
    let mut providers: Vec<&str> = config
        .search
        .providers
        .iter()
        .filter(|(_, p)| p.enabled())
        .map(|(name, _)| name.as_str())
        .collect();
    providers.sort_unstable();
    output.kv("search providers", &providers.join(", "));
    output.kv("default depth", config.research.default_depth.as_str());
    output.kv(
        "time budget",
        &format!("{:.0}s", config.research.default_time_budget_secs),
    );
    output.kv(
        "concurrency",
        &format!(
            "{} agents x {} calls",
            config.research.max_concurrent_agents, config.research.inner_concurrency
        ),
    );
    output.kv(
        "target confidence",
        &format!("{:.2}", config.research.target_confidence),
    );
    Ok(ExitCode::SUCCESS)
}
