//! insights - command line front end for the event pipeline
//!
//! Commands:
//! - `status`: configuration and queued events per index
//! - `flush`: one flush across every index with queued events
//! - `run`: recurring flush until Ctrl-C
//! - `track`: enqueue a single event
//!
//! Uses XDG Base Directory specification for file locations:
//! - Queue: $XDG_DATA_HOME/insights/events.db (~/.local/share/insights/events.db)
//! - Logs: $XDG_STATE_HOME/insights/insights.log.YYYY-MM-DD (rotated daily, UTC)
//! - Config: $XDG_CONFIG_HOME/insights/config.toml (~/.config/insights/config.toml)

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use insights_core::event::{codec, now_millis};
use insights_core::uploader::UploadOutcome;
use insights_core::{
    Config, Database, Event, EventInternal, EventKind, EventObjects, Insights, WorkResult,
};
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "insights")]
#[command(about = "Queue and deliver user interaction events")]
#[command(version)]
struct Args {
    /// Verbose output (also writes the log file)
    #[arg(short, long)]
    verbose: bool,

    /// Config file (default: $XDG_CONFIG_HOME/insights/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show configuration and queued events
    Status,

    /// Upload every queued event once
    Flush,

    /// Flush on the configured schedule until interrupted
    Run,

    /// Enqueue one event
    Track {
        /// Target index
        index: String,

        /// click, conversion or view
        kind: EventKind,

        /// Event name
        name: String,

        /// Object ID (repeatable)
        #[arg(long = "object-id", conflicts_with = "filters")]
        object_ids: Vec<String>,

        /// Filter expression, e.g. brand:apple (repeatable)
        #[arg(long = "filter")]
        filters: Vec<String>,

        /// User token (default: a random token)
        #[arg(long)]
        user_token: Option<String>,

        /// Query ID of the search this event follows
        #[arg(long)]
        query_id: Option<String>,

        /// Click position of each object (repeatable, clicks only)
        #[arg(long = "position", requires = "query_id")]
        positions: Vec<u32>,

        /// Flush right after queueing
        #[arg(long)]
        flush: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    // The scheduler always logs; one-shot commands only when asked
    let _log_guard = if args.verbose || matches!(args.command, Command::Run) {
        Some(insights_core::logging::init(&config.logging).context("failed to initialize logging")?)
    } else {
        None
    };

    match args.command {
        Command::Status => cmd_status(&config),
        Command::Flush => cmd_flush(config).await,
        Command::Run => cmd_run(config).await,
        Command::Track {
            index,
            kind,
            name,
            object_ids,
            filters,
            user_token,
            query_id,
            positions,
            flush,
        } => {
            let objects = if filters.is_empty() {
                EventObjects::ObjectIds(object_ids)
            } else {
                EventObjects::Filters(filters)
            };
            let draft = Draft {
                kind,
                name,
                objects,
                user_token,
                query_id,
                positions,
            };
            cmd_track(config, &index, draft, flush, args.verbose).await
        }
    }
}

fn mask(secret: Option<&str>) -> String {
    match secret {
        None | Some("") => "<not set>".to_string(),
        Some(s) if s.chars().count() <= 4 => "****".to_string(),
        Some(s) => format!("{}****", s.chars().take(4).collect::<String>()),
    }
}

fn cmd_status(config: &Config) -> Result<ExitCode> {
    println!("Insights Configuration");
    println!("======================");
    println!();

    let ingestion = &config.ingestion;
    println!("Endpoint:        {}", ingestion.endpoint);
    println!(
        "App ID:          {}",
        ingestion.app_id.as_deref().unwrap_or("<not set>")
    );
    println!("API Key:         {}", mask(ingestion.api_key.as_deref()));
    println!("Connect Timeout: {}ms", ingestion.connect_timeout_ms);
    println!("Read Timeout:    {}ms", ingestion.read_timeout_ms);
    println!("Min Batch Size:  {}", config.tracker.min_batch_size);
    println!("Tracking:        {}", if config.tracker.enabled { "enabled" } else { "disabled" });
    println!("Flush Interval:  {}s", config.scheduler.flush_interval_secs);

    println!();
    match config.validate() {
        Ok(()) => println!("Status: Ready to upload"),
        Err(e) => println!("Status: Not ready ({})", e),
    }

    let db_path = config.database_path();
    println!();
    println!("Queue: {}", db_path.display());
    if !db_path.exists() {
        println!("  (not created yet)");
        return Ok(ExitCode::SUCCESS);
    }

    let db = Database::open(&db_path).context("failed to open queue database")?;
    db.migrate().context("failed to run database migrations")?;
    let counts = db.pending_counts()?;
    if counts.is_empty() {
        println!("  No queued events");
    }
    for (index, count) in counts {
        println!("  {:<24} {} event(s)", index, count);
    }

    Ok(ExitCode::SUCCESS)
}

async fn cmd_flush(config: Config) -> Result<ExitCode> {
    let insights = Insights::open(config).context("failed to open pipeline")?;

    if insights.registry().is_empty() {
        println!("No queued events to flush.");
        return Ok(ExitCode::SUCCESS);
    }

    let report = insights.flush_task().run_report().await;
    print_report(&report.outcomes);

    match report.result() {
        WorkResult::Success => {
            println!();
            println!("Flushed {} event(s)", report.delivered());
            Ok(ExitCode::SUCCESS)
        }
        WorkResult::Retry => {
            println!();
            println!("Some indices failed; events stay queued for the next flush.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_report(outcomes: &[(String, UploadOutcome)]) {
    for (index, outcome) in outcomes {
        let line = match outcome {
            UploadOutcome::Idle => "nothing queued".to_string(),
            UploadOutcome::Delivered { count } => format!("delivered {}", count),
            UploadOutcome::Rejected {
                status,
                message,
                unacknowledged,
            } => format!(
                "rejected {} event(s): status {}{}",
                unacknowledged.len(),
                status,
                message
                    .as_deref()
                    .map(|m| format!(" ({})", m))
                    .unwrap_or_default()
            ),
            UploadOutcome::StoreUnavailable(e) => format!("queue unavailable: {}", e),
        };
        println!("  {:<24} {}", index, line);
    }
}

async fn cmd_run(config: Config) -> Result<ExitCode> {
    let insights = Insights::open(config).context("failed to open pipeline")?;
    let scheduler = insights.scheduler();

    let (stop, shutdown) = watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = stop.send(true);
    })
    .context("failed to install Ctrl-C handler")?;

    println!(
        "Flushing every {}s, press Ctrl-C to stop.",
        insights.config().scheduler.flush_interval_secs
    );
    tracing::info!(indices = ?insights.registry().indices(), "insights run starting");

    scheduler.run(shutdown).await;

    println!("Stopped.");
    Ok(ExitCode::SUCCESS)
}

struct Draft {
    kind: EventKind,
    name: String,
    objects: EventObjects,
    user_token: Option<String>,
    query_id: Option<String>,
    positions: Vec<u32>,
}

impl Draft {
    fn build(self, default_token: String) -> insights_core::Result<Event> {
        let user_token = self.user_token.unwrap_or(default_token);
        let timestamp = now_millis();
        match self.kind {
            EventKind::Click => match self.query_id {
                Some(query_id) if !self.positions.is_empty() => Event::click_after_search(
                    self.name,
                    user_token,
                    timestamp,
                    self.objects,
                    query_id,
                    self.positions,
                ),
                Some(query_id) => {
                    let mut event = Event::click(self.name, user_token, timestamp, self.objects)?;
                    if let Event::Click(click) = &mut event {
                        click.query_id = Some(query_id);
                    }
                    event.validate()?;
                    Ok(event)
                }
                None => Event::click(self.name, user_token, timestamp, self.objects),
            },
            EventKind::Conversion => {
                Event::conversion(self.name, user_token, timestamp, self.objects, self.query_id)
            }
            EventKind::View => {
                Event::view(self.name, user_token, timestamp, self.objects, self.query_id)
            }
        }
    }
}

async fn cmd_track(
    config: Config,
    index: &str,
    draft: Draft,
    flush: bool,
    verbose: bool,
) -> Result<ExitCode> {
    let insights = Insights::open(config).context("failed to open pipeline")?;
    let tracker = insights.tracker(index)?;

    if !tracker.enabled() {
        println!("Tracking is disabled in the configuration; nothing queued.");
        return Ok(ExitCode::SUCCESS);
    }

    let event = draft
        .build(tracker.user_token())
        .context("invalid event")?;
    if verbose {
        println!(
            "{}",
            codec::to_json_string(&EventInternal::new(index, event.clone()))
        );
    }
    tracker.track(event);
    // a threshold upload runs in the background; let it finish before exit
    insights.drain().await;

    let queued = tracker.store().count()?;
    println!("Queued for {} ({} pending)", index, queued);

    if flush {
        let report = insights.flush_task().run_report().await;
        print_report(&report.outcomes);
        if report.result() == WorkResult::Retry {
            return Ok(ExitCode::FAILURE);
        }
    }

    Ok(ExitCode::SUCCESS)
}
