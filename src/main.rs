//! Billing CLI entrypoint.
//!
//! This is the main entrypoint for the billing command-line tool.

use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use billing_deploy::cli::{Cli, Commands, LogFormat, OutputFormatter, StrategyArg};
use billing_deploy::codegen::KeyManifestWriter;
use billing_deploy::config::{BillingConfig, ConfigParser, ConfigValidator, find_config_file};
use billing_deploy::deployer::{DeployOptions, Deployer};
use billing_deploy::error::{BillingError, ConfigError, Result};
use billing_deploy::importer::{DEFAULT_IMPORT_FILE, ImportOptions, Importer};
use billing_deploy::provider::{ProviderKind, build_provider};
use billing_deploy::resolver::{FixedStrategy, ImmutableStrategy, StrategyPrompt, TerminalPrompt};
use billing_deploy::services::RetryPolicy;
use billing_deploy::store::{CatalogStore, LocalCatalogStore};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over the verbosity flag.
fn init_logging(verbose: bool, format: LogFormat) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Deploy { dry_run, strategy } => {
            cmd_deploy(cli.config.as_ref(), dry_run, strategy, &formatter).await
        }
        Commands::Import {
            db_only,
            generate_config,
            quiet,
        } => {
            let options = ImportOptions {
                db_only,
                generate_config,
                quiet,
            };
            cmd_import(cli.config.as_ref(), &options, &formatter).await
        }
        Commands::Validate => cmd_validate(cli.config.as_ref(), &formatter),
        Commands::Status => cmd_status(cli.config.as_ref(), &formatter).await,
    }
}

/// Deploy the catalog.
async fn cmd_deploy(
    config_path: Option<&PathBuf>,
    dry_run: bool,
    strategy: Option<StrategyArg>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, base_dir) = load_config(config_path)?;
    let provider = build_provider(&config.provider)?;
    let store = open_store(&config, &base_dir).await?;
    let prompt = strategy_prompt(strategy);
    let manifest = config
        .codegen
        .as_ref()
        .map(|c| KeyManifestWriter::new(base_dir.join(&c.manifest_path)));

    let mut deployer = Deployer::new(&config, provider.as_ref(), &store, prompt.as_ref());
    if let Some(writer) = &manifest {
        deployer = deployer.with_codegen(writer);
    }

    let changes = deployer.deploy(DeployOptions { dry_run }).await?;
    emit(&formatter.format_changes(&changes))
}

/// Import the provider catalog.
async fn cmd_import(
    config_path: Option<&PathBuf>,
    options: &ImportOptions,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, base_dir) = match load_config(config_path) {
        Ok(loaded) => loaded,
        Err(BillingError::Config(ConfigError::FileNotFound { path })) if config_path.is_none() => {
            warn!("No configuration found ({}); using defaults", path.display());
            let parser = ConfigParser::new();
            parser.load_dotenv()?;
            (BillingConfig::default(), PathBuf::from("."))
        }
        Err(e) => return Err(e),
    };

    let provider = build_provider(&config.provider)?;
    let store = open_store(&config, &base_dir).await?;
    let retry = RetryPolicy::from_settings(&config.provider);

    let report = Importer::new(provider.as_ref(), &store, retry)
        .run(options, &base_dir.join(DEFAULT_IMPORT_FILE))
        .await?;
    emit(&formatter.format_import(&report, options.quiet))
}

/// Validate configuration.
fn cmd_validate(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let (config, _) = load_config(config_path)?;

    let result = ConfigValidator::new().validate(&config)?;
    let _: ProviderKind = config.provider.name.parse()?;
    if std::env::var(&config.provider.api_key_env).is_err() {
        warn!("{} is not set; deploy and import will fail", config.provider.api_key_env);
    }

    emit(&formatter.format_validation(&config, &result))
}

/// Show the local catalog.
async fn cmd_status(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let (config, base_dir) = load_config(config_path)?;
    let store = open_store(&config, &base_dir).await?;
    debug!("Reading catalog from {} store", store.backend_type());

    let snapshot = store.snapshot().await?;
    emit(&formatter.format_status(&snapshot))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path.clone()),
        None => find_config_file(std::env::current_dir()?),
    }
}

/// Loads the configuration and returns it with the directory it lives in.
fn load_config(config_path: Option<&PathBuf>) -> Result<(BillingConfig, PathBuf)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let base_dir = config_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let parser = ConfigParser::new().with_base_path(&base_dir);
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;
    Ok((config, base_dir))
}

/// Opens the local catalog store named by the configuration.
async fn open_store(config: &BillingConfig, base_dir: &Path) -> Result<LocalCatalogStore> {
    let path = base_dir.join(&config.store.path);
    info!("Using catalog store at {}", path.display());
    LocalCatalogStore::open(path).await
}

/// Picks how immutable price changes are answered.
///
/// Without a flag the operator is asked when stdin is a terminal; otherwise
/// the run cancels rather than guess.
fn strategy_prompt(strategy: Option<StrategyArg>) -> Box<dyn StrategyPrompt> {
    match strategy {
        Some(arg) => Box::new(FixedStrategy::new(arg.into())),
        None if std::io::stdin().is_terminal() => Box::new(TerminalPrompt),
        None => {
            debug!("Non-interactive session without --strategy; immutable changes cancel the run");
            Box::new(FixedStrategy::new(ImmutableStrategy::Cancel))
        }
    }
}

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{output}")?;
    Ok(())
}
