use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::{Emoji, Term};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use podfetch::{
    FetchOptions, FleetOutcome, LogReporter, NoopReporter, PodcastConfig, PodcastListing,
    ProgressEvent, ProgressReporter, ReqwestClient, Settings, SharedProgressReporter, StateStore,
    list_fleet, run_fleet,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Per-episode allowance for a whole `download` run
const DOWNLOAD_TIMEOUT_PER_EPISODE: Duration = Duration::from_secs(10 * 60);
/// Per-feed allowance for `show`
const SHOW_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetch the newest episodes of your podcasts
#[derive(Parser, Debug)]
#[command(name = "podfetch")]
#[command(about = "Fetch the newest episodes of your podcasts")]
#[command(version)]
struct Cli {
    /// Settings file (default: ~/.podcasts.toml or ~/.podcasts.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Download state file (default: ~/.podcasts-downloaded.json)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Quiet mode - suppress progress output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download new episodes
    Download {
        /// Only this podcast id
        podcast: Option<String>,

        /// Number of newest episodes to consider per podcast
        #[arg(short = 'n', long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
        count: u32,

        /// Maximum number of concurrent downloads per podcast
        #[arg(short = 'c', long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
        concurrent: u32,
    },

    /// List the newest episodes without downloading anything
    Show {
        /// Only this podcast id
        podcast: Option<String>,

        /// Number of newest episodes to list per podcast
        #[arg(short = 'n', long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
        count: u32,
    },
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    podcasts: Mutex<HashMap<String, ProgressBar>>,
    downloads: Mutex<HashMap<(String, usize), ProgressBar>>,
}

impl IndicatifReporter {
    fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            podcasts: Mutex::new(HashMap::new()),
            downloads: Mutex::new(HashMap::new()),
        }
    }

    fn podcast_bar(&self, podcast_id: &str) -> ProgressBar {
        let mut bars = self.podcasts.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(bar) = bars.get(podcast_id) {
            return bar.clone();
        }

        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} {prefix:.bold} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(style);
        bar.set_prefix(podcast_id.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        bars.insert(podcast_id.to_string(), bar.clone());
        bar
    }

    fn download_bar(&self, podcast_id: &str, download_id: usize) -> ProgressBar {
        let mut bars = self.downloads.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (podcast_id.to_string(), download_id);

        if let Some(bar) = bars.get(&key) {
            return bar.clone();
        }

        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .map(|style| style.progress_chars("█▓░"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());

        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(style);
        bars.insert(key, bar.clone());
        bar
    }

    fn finish_download_bar(&self, podcast_id: &str, download_id: usize) {
        let mut bars = self.downloads.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = bars.remove(&(podcast_id.to_string(), download_id)) {
            bar.finish_and_clear();
        }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchingFeed { podcast_id, url } => {
                self.podcast_bar(&podcast_id)
                    .set_message(format!("{SEARCH}Fetching feed: {}", url.cyan()));
            }

            ProgressEvent::FeedParsed {
                podcast_id,
                total_episodes,
                selected,
                to_download,
            } => {
                self.podcast_bar(&podcast_id).set_message(format!(
                    "{HEADPHONES}{} episodes in feed, {} selected, {} new",
                    total_episodes.to_string().cyan(),
                    selected.to_string().cyan(),
                    to_download.to_string().yellow()
                ));
            }

            ProgressEvent::FeedFailed { podcast_id, error } => {
                self.podcast_bar(&podcast_id)
                    .abandon_with_message(format!("{FAILURE}{}", error.red()));
            }

            ProgressEvent::PartialFilesCleanedUp { podcast_id, count } => {
                self.podcast_bar(&podcast_id).set_message(format!(
                    "Removed {} unfinished download(s)",
                    count.to_string().yellow()
                ));
            }

            ProgressEvent::DownloadStarting {
                podcast_id,
                download_id,
                episode_title,
                content_length,
            } => {
                let bar = self.download_bar(&podcast_id, download_id);
                bar.set_length(content_length.unwrap_or(0));
                bar.set_position(0);
                bar.set_message(format!(
                    "{} {}",
                    podcast_id.dimmed(),
                    truncate_title(&episode_title, 40)
                ));
            }

            ProgressEvent::DownloadProgress {
                podcast_id,
                download_id,
                bytes_downloaded,
                total_bytes,
            } => {
                let bar = self.download_bar(&podcast_id, download_id);
                if let Some(total) = total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(bytes_downloaded);
            }

            ProgressEvent::DownloadCompleted {
                podcast_id,
                download_id,
                episode_title,
                bytes_downloaded,
            } => {
                let bar = self.download_bar(&podcast_id, download_id);
                bar.set_position(bytes_downloaded);
                bar.set_message(format!(
                    "{SUCCESS}{}",
                    truncate_title(&episode_title, 40).green()
                ));
                self.finish_download_bar(&podcast_id, download_id);
            }

            ProgressEvent::DownloadFailed {
                podcast_id,
                download_id,
                episode_title,
                error,
            } => {
                let bar = self.download_bar(&podcast_id, download_id);
                bar.abandon_with_message(format!(
                    "{FAILURE}{} - {}",
                    truncate_title(&episode_title, 30).red(),
                    error.red()
                ));
                self.finish_download_bar(&podcast_id, download_id);
            }

            ProgressEvent::PodcastCompleted {
                podcast_id,
                downloaded_count,
                skipped_count,
                failed_count,
            } => {
                self.podcast_bar(&podcast_id).finish_with_message(format!(
                    "{SUCCESS}{} downloaded, {} skipped, {} failed",
                    downloaded_count.to_string().green(),
                    skipped_count.to_string().yellow(),
                    if failed_count > 0 {
                        failed_count.to_string().red().bold()
                    } else {
                        failed_count.to_string().green()
                    }
                ));
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let kept: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn init_logging(cli: &Cli, interactive: bool) {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if interactive {
        "warn"
    } else {
        "info"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load(path),
        None => Settings::discover(),
    };
    settings.context("Failed to load settings")
}

fn select_podcasts(settings: &Settings, podcast: Option<&str>) -> Result<Vec<PodcastConfig>> {
    settings
        .select(podcast)
        .context("Failed to select podcasts")
}

async fn download(
    cli: &Cli,
    podcast: Option<&str>,
    count: u32,
    concurrent: u32,
    reporter: SharedProgressReporter,
) -> Result<ExitCode> {
    let settings = load_settings(cli.settings.as_deref())?;
    let podcasts = select_podcasts(&settings, podcast)?;

    let state_path = match &cli.state {
        Some(path) => path.clone(),
        None => StateStore::default_path()
            .context("Cannot locate the state file: no home directory")?,
    };
    let store = StateStore::new(state_path);

    let client = ReqwestClient::new().context("Failed to create HTTP client")?;

    let options = FetchOptions {
        max_count: count as usize,
        max_concurrent: concurrent as usize,
        timeout: Some(DOWNLOAD_TIMEOUT_PER_EPISODE * count),
    };

    let outcome = run_fleet(
        &client,
        &store,
        &podcasts,
        &settings.media_dir,
        &options,
        reporter,
    )
    .await;

    if !cli.quiet {
        print_fleet_summary(&outcome, &settings.media_dir);
    }

    if let Some(e) = &outcome.save_error {
        eprintln!(
            "{WARNING}{} {}",
            "Downloads kept, but the state file could not be saved:".yellow(),
            e.to_string().dimmed()
        );
    }

    if outcome.timed_out {
        eprintln!(
            "{FAILURE}{}",
            format!(
                "Timed out after {} minutes",
                options.timeout.unwrap_or_default().as_secs() / 60
            )
            .red()
            .bold()
        );
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}

fn print_fleet_summary(outcome: &FleetOutcome, media_dir: &Path) {
    println!(
        "\n{PARTY}{} {} downloaded, {} skipped, {} failed",
        "Fetch complete:".bold().green(),
        outcome.downloaded_count().to_string().green().bold(),
        outcome.skipped_count().to_string().yellow(),
        if outcome.failed_count() > 0 {
            outcome.failed_count().to_string().red().bold()
        } else {
            outcome.failed_count().to_string().green()
        }
    );

    let failures: Vec<_> = outcome
        .results
        .iter()
        .filter(|result| !result.is_success())
        .collect();

    if !failures.is_empty() {
        println!("\n{}", "Failures:".red().bold());
        for result in failures {
            if let Some(error) = &result.feed_error {
                println!("  {}{} - {}", CROSS, result.id.yellow(), error.dimmed());
            }
            for failed in &result.failed {
                println!(
                    "  {}{} / {} - {}",
                    CROSS,
                    result.id.yellow(),
                    failed.episode.title.yellow(),
                    failed.reason.dimmed()
                );
            }
        }
    }

    println!(
        "\n{FOLDER}Output: {}\n",
        media_dir.display().to_string().cyan()
    );
}

async fn show(cli: &Cli, podcast: Option<&str>, count: u32) -> Result<ExitCode> {
    let settings = load_settings(cli.settings.as_deref())?;
    let podcasts = select_podcasts(&settings, podcast)?;

    let client = ReqwestClient::new().context("Failed to create HTTP client")?;

    let listings = list_fleet(&client, &podcasts, count as usize, SHOW_TIMEOUT).await;

    for listing in &listings {
        print_listing(listing);
    }

    Ok(ExitCode::SUCCESS)
}

fn print_listing(listing: &PodcastListing) {
    println!("\n{HEADPHONES}{}", listing.id.bold().green());

    match &listing.episodes {
        Ok(episodes) if episodes.is_empty() => {
            println!("  {}", "No episodes".dimmed());
        }
        Ok(episodes) => {
            for episode in episodes {
                println!(
                    "  {}  {}",
                    episode.published_at.format("%Y-%m-%d").to_string().cyan(),
                    episode.title
                );
            }
        }
        Err(error) => {
            println!("  {}{}", CROSS, error.red());
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let interactive = Term::stdout().is_term();

    init_logging(&cli, interactive);

    if !cli.quiet {
        println!(
            "\n{}{} {}",
            MICROPHONE,
            "podfetch".bold().magenta(),
            "- Podcast Fetcher".dimmed()
        );
    }

    match &cli.command {
        Command::Download {
            podcast,
            count,
            concurrent,
        } => {
            let reporter: SharedProgressReporter = if cli.quiet {
                NoopReporter::shared()
            } else if interactive {
                Arc::new(IndicatifReporter::new())
            } else {
                LogReporter::shared()
            };

            download(&cli, podcast.as_deref(), *count, *concurrent, reporter).await
        }
        Command::Show { podcast, count } => show(&cli, podcast.as_deref(), *count).await,
    }
}
