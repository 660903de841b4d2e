use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use water_dispenser_sim::config::{load_config, load_config_from};
use water_dispenser_sim::constants::FULL_LEVEL;
use water_dispenser_sim::invariants;
use water_dispenser_sim::notifier::TracingNotifier;
use water_dispenser_sim::service;
use water_dispenser_sim::settings::{load_settings, save_settings, FileStore};
use water_dispenser_sim::simulator;
use water_dispenser_sim::types::State;

#[derive(Parser, Debug)]
#[command(about = "Smart water dispenser simulator")]
struct Cli {
    /// Config file; defaults to ./dispenser.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory holding persisted settings.
    #[arg(long)]
    store_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Explore random traces and check every invariant.
    Simulate {
        #[arg(long, default_value_t = 50)]
        max_steps: usize,
        #[arg(long, default_value_t = 10000)]
        max_samples: usize,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(short, long)]
        verbose: bool,
    },
    /// Dispense in real time for a while, then print the resulting state.
    Run {
        #[arg(long, default_value_t = 5)]
        seconds: u64,
        #[arg(long, default_value_t = FULL_LEVEL)]
        level: u8,
    },
    /// Inspect or change persisted settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    Set {
        #[arg(long)]
        threshold: Option<u8>,
        #[arg(long)]
        speed_ms: Option<u64>,
        #[arg(long)]
        volume_ml: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config(),
    };
    if let Some(dir) = cli.store_dir {
        config.store_dir = dir;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .init();

    match cli.command {
        Command::Simulate {
            max_steps,
            max_samples,
            seed,
            verbose,
        } => {
            let seed = seed.unwrap_or_else(|| {
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos() as u64
            });

            println!(
                "Running {} traces of {} steps each (seed: {})",
                max_samples, max_steps, seed
            );
            println!("Checking invariants:");
            for (name, _) in invariants::ALL_INVARIANTS {
                println!("  - {}", name);
            }

            let result = simulator::run_simulation(max_steps, max_samples, seed, verbose);
            println!("{}", result);
            if result.violation.is_some() {
                anyhow::bail!("invariant violated");
            }
        }
        Command::Run { seconds, level } => {
            let store = FileStore::new(&config.store_dir);
            let (handle, task) = service::spawn(State::with_level(level), store, TracingNotifier);

            if !handle.start().await? {
                info!(level, "nothing to dispense");
            }
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            handle.stop().await?;

            let snapshot = handle.snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);

            handle.shutdown().await?;
            task.await?;
        }
        Command::Settings { action } => {
            let mut store = FileStore::new(&config.store_dir);
            let mut settings = load_settings(&store);

            if let SettingsAction::Set {
                threshold,
                speed_ms,
                volume_ml,
            } = action
            {
                if let Some(v) = threshold {
                    settings.low_water_threshold = v;
                }
                if let Some(v) = speed_ms {
                    settings.dispensing_speed = v;
                }
                if let Some(v) = volume_ml {
                    settings.dispensing_volume = v;
                }
                save_settings(&mut store, &settings)?;
                info!(dir = %store.dir().display(), "settings saved");
            }

            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }

    Ok(())
}
