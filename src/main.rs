use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;

use sleep_tracker_lib::{
    default_data_dir,
    format::{format_elapsed, format_timestamp, quality_label},
    utils::logging,
    AppState,
};

#[derive(Parser)]
#[command(name = "sleep-tracker")]
#[command(about = "Track nightly sleep sessions", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Directory holding the database and settings.json
    #[arg(long, global = true, env = "SLEEP_TRACKER_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Show the night currently being tracked (default)
    Status,
    /// Start tracking a new night
    Start,
    /// Stop tracking tonight and rate it
    Stop {
        /// 0 = very bad ... 5 = excellent
        #[arg(short, long, default_value_t = 3, value_parser = clap::value_parser!(i32).range(0..=5))]
        quality: i32,
    },
    /// Print every stored night
    History,
    /// Delete every stored night
    Clear,
    /// Show display settings, optionally changing the UTC offset
    Config {
        /// Offset from UTC, in minutes, used for displayed times
        #[arg(long, allow_hyphen_values = true)]
        utc_offset_minutes: Option<i32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    let app = AppState::open(&data_dir)?;
    let resources = app.settings.resources()?;

    match cli.command.unwrap_or(Command::Status) {
        Command::Status => {
            let tracker = app.tracker()?;
            tracker.wait_idle().await;
            match tracker.tonight().get() {
                Some(night) => println!(
                    "Tracking since {}",
                    format_timestamp(&night.start_time, &resources)
                ),
                None => println!("No night in progress"),
            }
            tracker.clear();
        }
        Command::Start => {
            let tracker = app.tracker()?;
            tracker.wait_idle().await;
            tracker.start_tracking().await??;
            if let Some(night) = tracker.tonight().get() {
                println!(
                    "Started tracking at {}",
                    format_timestamp(&night.start_time, &resources)
                );
            }
            tracker.clear();
        }
        Command::Stop { quality } => match app.finish_tonight(quality).await? {
            Some(night) => println!(
                "Slept {} ({})",
                format_elapsed(night.duration_ms()),
                quality_label(night.sleep_quality, &resources)
            ),
            None => println!("No night in progress"),
        },
        Command::History => {
            let tracker = app.tracker()?;
            tracker.wait_idle().await;
            println!("{}", tracker.night_string().get());
            tracker.clear();
        }
        Command::Clear => {
            let removed = app.db.clear().await?;
            info!("cleared {removed} nights");
            println!("Removed {removed} nights");
        }
        Command::Config { utc_offset_minutes } => {
            let display = match utc_offset_minutes {
                Some(minutes) => app.set_utc_offset(minutes)?,
                None => app.settings.display(),
            };
            println!("{}", serde_json::to_string_pretty(&display)?);
        }
    }

    Ok(())
}
