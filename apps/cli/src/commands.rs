//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bookmark_reorg_core::{
    Categorizer, Mode, OpenAiClient, Pipeline, RunConfig, RunOutcome,
};
use bookmark_reorg_enricher::{Enricher, HttpFetcher};
use bookmark_reorg_shared::{
    AppConfig, CategorizeConfig, EnrichConfig, EnrichMode, ProgressReporter, init_config,
    load_config, load_config_from, validate_api_key,
};
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Fallback model used when neither the flag, the env var nor the config name one.
const DEFAULT_FALLBACK_MODEL: &str = "gpt-4.1-mini";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// bookmark-reorg: reorganize browser bookmarks with live metadata and an LLM.
#[derive(Parser)]
#[command(
    name = "bookmark-reorg",
    version,
    about = "Reorganize a browser bookmark export into a cleaner folder hierarchy.",
    long_about = None,
    args_conflicts_with_subcommands = true,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.bookmark-reorg/bookmark-reorg.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Pipeline flags (used when no subcommand is given).
#[derive(Args, Debug, Default)]
pub(crate) struct RunArgs {
    /// Bookmark export (Netscape HTML).
    #[arg(long, env = "BOOKMARKS_EXPORT_FILE")]
    pub input: Option<PathBuf>,

    /// Record collection JSON [default: bookmarks.json].
    #[arg(long)]
    pub json_output: Option<PathBuf>,

    /// Reorganized bookmark HTML [default: bookmarks_reorganised.html].
    #[arg(long)]
    pub html_output: Option<PathBuf>,

    /// File with free-form categorization instructions.
    #[arg(long)]
    pub instruction_file: Option<PathBuf>,

    /// File with directives appended to the built-in system prompt.
    #[arg(long)]
    pub system_instruction_file: Option<PathBuf>,

    /// LLM model identifier.
    #[arg(long, env = "OPENAI_MODEL")]
    pub model: Option<String>,

    /// Model to switch to when the primary model does not exist.
    #[arg(long, env = "OPENAI_FALLBACK_MODEL")]
    pub fallback_model: Option<String>,

    /// Stages to run.
    #[arg(long, value_enum, default_value_t = RunMode::Llm)]
    pub mode: RunMode,

    /// Which records the metadata stage fetches.
    #[arg(long, value_enum, default_value_t = MetadataMode::OnlyMissing)]
    pub metadata_mode: MetadataMode,

    /// Reuse metadata from the existing JSON collection.
    #[arg(long)]
    pub use_json_cache: bool,

    /// Refetch every page, discarding metadata that cannot be refreshed.
    #[arg(long)]
    pub fresh_scrape: bool,

    /// Concurrent page fetches.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Bookmarks per LLM request.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Maximum folder depth of the reorganized hierarchy.
    #[arg(long)]
    pub max_depth: Option<usize>,
}

impl RunArgs {
    /// Apply flag overrides on top of the loaded config.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(workers) = self.workers {
            config.enrichment.workers = workers;
        }
        if let Some(batch_size) = self.batch_size {
            config.llm.batch_size = batch_size;
        }
        if let Some(depth) = self.max_depth {
            config.defaults.max_folder_depth = depth;
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(fallback) = &self.fallback_model {
            config.llm.fallback_model = Some(fallback.clone());
        } else if config.llm.fallback_model.is_none() {
            config.llm.fallback_model = Some(DEFAULT_FALLBACK_MODEL.into());
        }
    }

    fn run_config(&self, config: &AppConfig) -> RunConfig {
        RunConfig {
            mode: self.mode.into(),
            input: self.input.clone(),
            json_output: self
                .json_output
                .clone()
                .unwrap_or_else(|| PathBuf::from(&config.defaults.json_output)),
            html_output: self
                .html_output
                .clone()
                .unwrap_or_else(|| PathBuf::from(&config.defaults.html_output)),
            enrich_mode: self.metadata_mode.into(),
            use_json_cache: self.use_json_cache,
            fresh_scrape: self.fresh_scrape,
            max_folder_depth: config.defaults.max_folder_depth,
        }
    }
}

/// `--mode` values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum RunMode {
    Parse,
    Metadata,
    #[default]
    Llm,
    Html,
    Compare,
    All,
}

impl From<RunMode> for Mode {
    fn from(mode: RunMode) -> Self {
        match mode {
            RunMode::Parse => Mode::Parse,
            RunMode::Metadata => Mode::Metadata,
            RunMode::Llm => Mode::Llm,
            RunMode::Html => Mode::Html,
            RunMode::Compare => Mode::Compare,
            RunMode::All => Mode::All,
        }
    }
}

/// `--metadata-mode` values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum MetadataMode {
    All,
    #[default]
    OnlyMissing,
}

impl From<MetadataMode> for EnrichMode {
    fn from(mode: MetadataMode) -> Self {
        match mode {
            MetadataMode::All => EnrichMode::All,
            MetadataMode::OnlyMissing => EnrichMode::OnlyMissing,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Environment and tracing setup
// ---------------------------------------------------------------------------

/// Load `KEY=value` pairs from `path`, or from the nearest `.env`, without
/// overriding variables that are already set. Returns the file that was read.
pub(crate) fn load_env_file(path: Option<&Path>) -> Option<PathBuf> {
    match path {
        Some(path) => dotenvy::from_path(path).ok().map(|()| path.to_path_buf()),
        None => dotenvy::dotenv().ok(),
    }
}

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "bookmark_reorg=info",
        1 => "bookmark_reorg=debug",
        _ => "bookmark_reorg=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match cli.config.as_deref() {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Some(Command::Config { action }) => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
        None => cmd_run(&cli.run, config).await,
    }
}

async fn cmd_run(args: &RunArgs, mut config: AppConfig) -> Result<()> {
    args.apply(&mut config);
    let run_config = args.run_config(&config);
    run_config.check()?;

    let enrich_config = EnrichConfig::from(&config);
    let fetcher = HttpFetcher::new(&enrich_config)?;
    let mut pipeline: Pipeline<HttpFetcher, OpenAiClient> =
        Pipeline::new(Enricher::new(fetcher, enrich_config));

    if run_config.mode.needs_llm() {
        // Validate API key before doing anything
        let api_key = validate_api_key(&config)?;
        let client = OpenAiClient::new(
            &api_key,
            &config.llm.base_url,
            Duration::from_secs(config.llm.request_timeout_secs),
        )?;

        let instructions = read_optional(args.instruction_file.as_deref())?;
        let system = read_optional(args.system_instruction_file.as_deref())?;
        let categorizer = Categorizer::new(client, CategorizeConfig::from(&config))
            .with_instructions(instructions.as_deref())
            .with_system_extension(system.as_deref());

        info!(model = categorizer.model(), base_url = %config.llm.base_url, "LLM client ready");
        pipeline = pipeline.with_categorizer(categorizer);
    }

    let progress = CliProgress::new();
    let result = pipeline.run(&run_config, &progress).await;
    progress.finish();
    let outcome = result?;

    print_summary(&outcome);
    Ok(())
}

fn read_optional(path: Option<&Path>) -> Result<Option<String>> {
    path.map(|path| {
        std::fs::read_to_string(path).map_err(|e| eyre!("cannot read '{}': {e}", path.display()))
    })
    .transpose()
}

fn print_summary(outcome: &RunOutcome) {
    println!("Run {} ({})", outcome.run_id, outcome.mode);
    println!("  Records:     {}", outcome.records);

    if outcome.reused_metadata > 0 {
        println!("  From cache:  {}", outcome.reused_metadata);
    }
    if let Some(enrich) = &outcome.enrich {
        println!(
            "  Metadata:    {} enriched, {} empty, {} failed of {} ({} fallbacks)",
            enrich.enriched, enrich.empty, enrich.failed, enrich.selected, enrich.fallback_attempts
        );
    }
    if let Some(categorize) = &outcome.categorize {
        println!(
            "  Categorized: {} records, {} batches committed, {} skipped, {} retries",
            categorize.records_categorized(),
            categorize.committed(),
            categorize.skipped(),
            categorize.total_retries()
        );
    }
    if let Some(path) = &outcome.html_written {
        println!("  HTML:        {}", path.display());
    }
    if let Some(validation) = &outcome.validation {
        if validation.is_ok() {
            println!("  Validation:  passed ({} records)", validation.checked);
        } else {
            println!("  Validation:  {} violation(s)", validation.violations.len());
            for violation in &validation.violations {
                println!("    {violation}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item(&self, current: usize, total: usize, detail: &str) {
        self.spinner.set_message(format!("[{current}/{total}] {detail}"));
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config file created at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
