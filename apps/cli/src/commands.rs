//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use chatlist_harvester::{HarvestEnd, HarvestReport, Harvester, TdGateway};
use chatlist_publisher::{PublishOutcome, PublishReport, Publisher, SpotifyClient};
use chatlist_shared::{
    AppConfig, BatchStatus, HarvestConfig, ProgressReporter, PublishConfig, config_file_path,
    database_path, init_config_at, load_config, load_config_from, resolve_spotify_credentials,
    validate_chat_config, validate_spotify_config,
};
use chatlist_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// chatlist — turn a chat's shared Spotify links into a playlist.
#[derive(Parser)]
#[command(
    name = "chatlist",
    version,
    about = "Harvest Spotify track links from a Telegram chat and publish them as a playlist.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.chatlist/chatlist.toml).
    #[arg(long, global = true, env = "CHATLIST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Scan the configured conversation and store every track link.
    Harvest,

    /// Create a playlist from all stored links.
    Publish,

    /// Harvest, check the stored link count, then publish.
    Run,

    /// Show what is stored: links, publish runs, failed batches.
    Stats {
        /// Number of recent links to list.
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "chatlist=info",
        1 => "chatlist=debug",
        _ => "chatlist=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Harvest => cmd_harvest(config_path).await,
        Command::Publish => cmd_publish(config_path).await,
        Command::Run => cmd_run(config_path).await,
        Command::Stats { limit } => cmd_stats(config_path, limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let path = database_path(config)?;
    info!(path = %path.display(), "opening link database");
    Ok(Storage::open(&path).await?)
}

fn gateway(config: &AppConfig) -> Result<TdGateway> {
    let endpoint = validate_chat_config(config)?;
    Ok(TdGateway::new(endpoint, config.chat.timeout_secs)?)
}

/// Validate the Spotify section, acquire a token, and confirm the account.
async fn spotify_session(config: &AppConfig) -> Result<SpotifyClient> {
    validate_spotify_config(config)?;
    let credentials = resolve_spotify_credentials(&config.spotify)?;
    let client = SpotifyClient::connect(&config.spotify, &credentials).await?;

    let user = client.current_user().await?;
    if user.id != config.spotify.user_id {
        warn!(
            signed_in = %user.id,
            configured = %config.spotify.user_id,
            "token belongs to a different account than spotify.user_id"
        );
    }
    Ok(client)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_harvest(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let source = gateway(&config)?;
    let storage = open_storage(&config).await?;

    let reporter = CliProgress::new();
    reporter.phase("Harvesting chat history");
    let report = Harvester::new(HarvestConfig::from(&config))
        .harvest(&source, &storage, &reporter)
        .await;
    reporter.done();

    print_harvest(&report);
    println!("  Stored: {} links in total", storage.count_links().await?);
    println!();
    Ok(())
}

async fn cmd_publish(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let api = spotify_session(&config).await?;
    let storage = open_storage(&config).await?;

    let reporter = CliProgress::new();
    reporter.phase("Publishing playlist");
    let report = Publisher::new(PublishConfig::from(&config))
        .publish(&api, &storage, &reporter)
        .await;
    reporter.done();

    print_publish(&report?);
    Ok(())
}

async fn cmd_run(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let source = gateway(&config)?;
    let api = spotify_session(&config).await?;
    let storage = open_storage(&config).await?;

    let reporter = CliProgress::new();
    let result =
        chatlist_core::run_pipeline(&config, &source, &api, &storage, &reporter).await;
    reporter.done();
    let report = result?;

    print_harvest(&report.harvest);
    println!("  Stored: {} links in total", report.stored_links);
    match &report.publish {
        Some(publish) => print_publish(publish),
        None => {
            println!();
            println!(
                "  Publish skipped: expected {} links, found {}.",
                config.pipeline.expected_link_count.unwrap_or_default(),
                report.stored_links
            );
        }
    }
    println!("  Total time: {:.1}s", report.elapsed.as_secs_f64());
    println!();
    Ok(())
}

async fn cmd_stats(config_path: Option<&Path>, limit: u32) -> Result<()> {
    let config = resolve_config(config_path)?;
    let path = database_path(&config)?;
    if !path.exists() {
        return Err(eyre!(
            "no database at '{}'. Run `chatlist harvest` first.",
            path.display()
        ));
    }
    let storage = Storage::open_readonly(&path).await?;

    println!();
    println!("  Database: {}", path.display());
    println!("  Links:    {}", storage.count_links().await?);

    let recent = storage.list_links(limit).await?;
    if !recent.is_empty() {
        println!();
        println!("  Most recent links:");
        for link in &recent {
            println!(
                "    {:>12}  {}  {}",
                link.message_id,
                link.posted_at.format("%Y-%m-%d %H:%M"),
                link.link
            );
        }
    }

    let runs = storage.list_publish_runs().await?;
    if !runs.is_empty() {
        println!();
        println!("  Publish runs:");
        for run in &runs {
            println!(
                "    {}  {}  {} ({})",
                run.started_at,
                run.finished_at.as_deref().unwrap_or("unfinished"),
                run.playlist_name,
                run.playlist_id
            );
        }
    }

    let failed = storage.list_failed_batches().await?;
    if !failed.is_empty() {
        println!();
        println!("  Failed batches:");
        for batch in &failed {
            println!(
                "    run {} batch {}: tracks {}-{} after {} attempts: {}",
                batch.run_id,
                batch.batch_index,
                batch.first_track,
                batch.last_track,
                batch.attempts,
                batch.last_error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    println!();
    Ok(())
}

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    if path.exists() {
        return Err(eyre!("config file already exists at '{}'", path.display()));
    }
    init_config_at(&path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

fn print_harvest(report: &HarvestReport) {
    let end = match &report.end {
        HarvestEnd::Exhausted => "reached the start of the history".to_string(),
        HarvestEnd::SourceError(e) => format!("stopped early: {e}"),
        HarvestEnd::Stalled => "stopped: history cursor did not advance".to_string(),
    };

    println!();
    println!("  Harvest finished ({end})");
    println!("  Pages:    {}", report.pages);
    println!("  Messages: {}", report.messages_scanned);
    println!("  Found:    {}", report.links_found);
    println!("  Saved:    {}", report.links_saved);
    println!("  Known:    {}", report.links_ignored);
    if report.row_failures > 0 {
        println!("  Failed:   {}", report.row_failures);
    }
    println!("  Time:     {:.1}s", report.duration.as_secs_f64());
}

fn print_publish(report: &PublishReport) {
    println!();
    match &report.outcome {
        PublishOutcome::Published { playlist, run_id } => {
            println!("  Playlist created: {}", playlist.name);
            println!("  ID:      {}", playlist.id);
            if let Some(url) = &playlist.url {
                println!("  URL:     {url}");
            }
            match run_id {
                Some(run_id) => println!("  Run:     {run_id}"),
                None => println!("  Run:     not recorded (database write failed)"),
            }
        }
        PublishOutcome::NoLinks => {
            println!("  No links stored; nothing to publish.");
            return;
        }
        PublishOutcome::NoValidTracks => {
            println!(
                "  None of the {} stored links is a valid track link; nothing to publish.",
                report.links_read
            );
            return;
        }
    }
    println!("  Links:   {} ({} invalid)", report.links_read, report.invalid_links);
    println!("  Added:   {}", report.tracks_added);
    if report.tracks_failed > 0 {
        println!(
            "  Failed:  {} (see `chatlist stats` for the batches)",
            report.tracks_failed
        );
    }
    println!("  Time:    {:.1}s", report.duration.as_secs_f64());
}

// ---------------------------------------------------------------------------
// CLI progress reporter
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
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn page_scanned(&self, pages: usize, messages: usize, saved: usize) {
        self.spinner.set_message(format!(
            "Scanning history: {pages} pages, {messages} messages, {saved} new links"
        ));
    }

    fn batch_settled(&self, index: usize, total: usize, status: BatchStatus) {
        self.spinner
            .set_message(format!("Adding tracks: batch {}/{total} {status}", index + 1));
    }

    fn done(&self) {
        self.spinner.finish_and_clear();
    }
}
