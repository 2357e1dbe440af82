//! Scout CLI - event-driven dashboard runtime

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;

use scout::bus::EventBus;
use scout::definition::DashboardDefinition;
use scout::error::{FixSuggestion, ScoutError};
use scout::event::Event;
use scout::middleware::LoggingMiddleware;
use scout::source::create_source;

#[derive(Parser)]
#[command(name = "scout")]
#[command(about = "Scout - event-driven dashboard runtime")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a dashboard definition: build, refresh every zone, report
    Run {
        /// Path to .scout.yaml file
        file: String,

        /// Data source backend (mock, http)
        #[arg(short, long, default_value = "mock")]
        source: String,

        /// Base URL for the http source
        #[arg(short, long)]
        base_url: Option<String>,

        /// Record emitted events to this file (JSON)
        #[arg(short, long)]
        record: Option<PathBuf>,
    },

    /// Validate a dashboard definition (parse only)
    Validate {
        /// Path to .scout.yaml file
        file: String,
    },

    /// Replay a recorded event file
    Replay {
        /// Path to a recording produced by run --record
        file: String,

        /// Replay speed multiplier (2.0 = twice as fast)
        #[arg(short, long, default_value_t = 1.0)]
        speed: f64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            file,
            source,
            base_url,
            record,
        } => run_dashboard(&file, &source, base_url.as_deref(), record).await,
        Commands::Validate { file } => validate_definition(&file),
        Commands::Replay { file, speed } => replay_recording(&file, speed).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

async fn run_dashboard(
    file: &str,
    source_name: &str,
    base_url: Option<&str>,
    record: Option<PathBuf>,
) -> Result<(), ScoutError> {
    let yaml = tokio::fs::read_to_string(file).await?;
    let definition = DashboardDefinition::from_yaml(&yaml)?;
    let source = create_source(source_name, base_url)?;

    println!(
        "{} Dashboard '{}' | source: {}",
        "→".cyan(),
        definition.id.cyan().bold(),
        source.name().cyan()
    );

    let bus = EventBus::new();
    bus.use_middleware(Arc::new(LoggingMiddleware));
    if record.is_some() {
        bus.start_recording();
    }

    let dashboard = definition.build(Arc::clone(&bus), source)?;
    let refreshed = dashboard.refresh_all().await;

    println!(
        "{} Refreshed {}/{} zones",
        "✓".green(),
        refreshed,
        dashboard.zone_count()
    );
    for id in dashboard.zone_ids() {
        let zone = dashboard.zone(&id).ok_or(ScoutError::ZoneNotFound {
            zone_id: id.clone(),
        })?;
        let rows = zone.data().map_or(0, |d| d.row_count);
        let state = zone.state().to_string();
        let state = match state.as_str() {
            "ready" => state.green(),
            "error" => state.red(),
            _ => state.normal(),
        };
        println!("  {} [{}] {} - {} rows", id.bold(), zone.zone_type(), state, rows);
        if let Some(error) = zone.error() {
            println!("    {} {}", "!".red(), error);
        }
    }

    if let Some(path) = record {
        let events = bus.stop_recording();
        let json = serde_json::to_string_pretty(&events)?;
        tokio::fs::write(&path, json).await?;
        println!(
            "{} Recorded {} events to {}",
            "✓".green(),
            events.len(),
            path.display()
        );
    }

    dashboard.teardown()?;
    Ok(())
}

fn validate_definition(file: &str) -> Result<(), ScoutError> {
    let definition = DashboardDefinition::load(file)?;

    println!("{} Definition '{}' is valid", "✓".green(), file);
    println!("  Dashboard: {}", definition.id);
    println!("  Zones: {}", definition.zones.len());
    for zone in &definition.zones {
        println!("    {} [{}]", zone.id, zone.zone_type);
    }
    println!("  Parameters: {}", definition.parameters.len());
    println!("  Filters: {}", definition.filters.len());

    Ok(())
}

async fn replay_recording(file: &str, speed: f64) -> Result<(), ScoutError> {
    let json = tokio::fs::read_to_string(file).await?;
    let events: Vec<Event> = serde_json::from_str(&json)?;

    let bus = EventBus::new();
    bus.on_any(|event| {
        println!(
            "  {:>6}ms {} {} (from {})",
            event.timestamp_ms,
            "·".cyan(),
            event.name().to_string().bold(),
            event.source
        );
        Ok(())
    });

    println!(
        "{} Replaying {} events at {}x",
        "→".cyan(),
        events.len(),
        speed
    );
    let replayed = bus.replay(&events, speed).await?;

    let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
    for event in &events {
        *by_category.entry(event.category().to_string()).or_default() += 1;
    }
    println!("{} Replayed {} events", "✓".green(), replayed);
    for (category, count) in by_category {
        println!("  {category}: {count}");
    }
    Ok(())
}
