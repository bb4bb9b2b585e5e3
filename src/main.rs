use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pulsecam::camera::{SyntheticCamera, SyntheticConfig};
use pulsecam::conf::{Settings, config_path};
use pulsecam::monitor::Monitor;
use pulsecam::session::{Phase, Telemetry};
use pulsecam::store::{DailyStore, JsonFileStore, MemoryStore};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "pulsecam")]
#[command(about = "Fingertip camera heart-rate measurement")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one measurement against the simulated camera
    Measure {
        /// Simulated pulse rate
        #[arg(long, default_value = "70")]
        bpm: f64,

        /// Simulated camera frame rate
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Lift the simulated finger this many seconds into the capture
        #[arg(long)]
        lift_at: Option<u64>,

        /// How long the finger stays lifted, in seconds
        #[arg(long, default_value = "3")]
        lift_for: u64,

        /// Do not archive the result
        #[arg(long)]
        no_persist: bool,
    },

    /// Show archived daily averages
    History {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the configuration file path and effective settings
    Config {
        /// Write the effective settings to the config file
        #[arg(long)]
        write: bool,
    },
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum OutputFormat {
    Text,
    Json,
}

fn open_store(settings: &Settings) -> Result<JsonFileStore> {
    let path = settings
        .store
        .resolve_path()
        .context("Failed to resolve history location")?;
    Ok(JsonFileStore::new(path))
}

fn print_progress(telemetry: &Telemetry) {
    let bpm = if telemetry.bpm_visible {
        telemetry.current_bpm.to_string()
    } else {
        "--".to_string()
    };
    println!(
        "[{:>2}s] {:<10} bpm={:<4} {}",
        telemetry.elapsed_seconds,
        telemetry.phase.as_str(),
        bpm,
        telemetry.status
    );
}

async fn measure(
    settings: Settings,
    camera: SyntheticConfig,
    persist: bool,
) -> Result<Telemetry> {
    let store: Arc<dyn DailyStore> = if persist {
        Arc::new(open_store(&settings)?)
    } else {
        Arc::new(MemoryStore::new())
    };

    let (handle, task) = Monitor::spawn(SyntheticCamera::new(camera), store, &settings);
    let mut updates = handle.subscribe();
    handle.start()?;

    let mut last_printed: Option<(u32, Phase)> = None;
    let outcome = loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break handle.telemetry();
                }
                let telemetry = *updates.borrow_and_update();
                let key = (telemetry.elapsed_seconds, telemetry.phase);
                if last_printed != Some(key) {
                    print_progress(&telemetry);
                    last_printed = Some(key);
                }
                if matches!(telemetry.phase, Phase::Completed | Phase::Failed) {
                    break telemetry;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, stopping measurement");
                handle.stop()?;
                break handle.telemetry();
            }
        }
    };

    handle.shutdown()?;
    task.await.context("Monitor task failed")?;
    Ok(outcome)
}

fn history(settings: &Settings, format: OutputFormat) -> Result<()> {
    let store = open_store(settings)?;
    let averages = store.all_daily_averages()?;
    let weekly = store.weekly_average()?;

    match format {
        OutputFormat::Text => {
            if averages.is_empty() {
                println!("No measurements recorded yet ({})", store.path().display());
                return Ok(());
            }
            println!("{:<12} Average BPM", "Day");
            println!("{}", "-".repeat(24));
            for average in &averages {
                println!("{:<12} {}", average.day.to_string(), average.average_bpm);
            }
            println!();
            println!("Weekly average: {}", weekly);
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "daily": averages,
                "weekly_average": weekly,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = Settings::load();

    match cli.command {
        Commands::Measure {
            bpm,
            fps,
            lift_at,
            lift_for,
            no_persist,
        } => {
            let finger_off = lift_at
                .map(|at| {
                    let start = Duration::from_secs(at);
                    vec![start..start + Duration::from_secs(lift_for)]
                })
                .unwrap_or_default();
            let camera = SyntheticConfig {
                bpm,
                fps,
                finger_off,
                ..SyntheticConfig::default()
            };

            let telemetry = measure(settings, camera, !no_persist).await?;
            match telemetry.phase {
                Phase::Completed => println!("Result: {} BPM", telemetry.current_bpm),
                Phase::Failed => eprintln!("{}", telemetry.status),
                _ => println!("Measurement cancelled"),
            }
        }

        Commands::History { format } => history(&settings, format)?,

        Commands::Config { write } => {
            match config_path() {
                Some(path) => println!("Config file: {}", path.display()),
                None => println!("Config file: <no config directory>"),
            }
            let toml = toml::to_string_pretty(&settings).context("Failed to render settings")?;
            println!();
            print!("{}", toml);

            if write {
                settings.save()?;
            }
        }
    }

    Ok(())
}
