use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use planewatch::config::{PlanewatchConfig, config_path};
use planewatch::geometry::{GeoPoint, SectorPolicy};
use planewatch::tracking::TrackingMode;

mod commands;

use commands::{TrackOptions, handle_bearing, handle_phrase, handle_track};

#[derive(Parser, Debug)]
#[command(
    name = "planewatch",
    version,
    about = "Spot aircraft overhead and speak their direction"
)]
struct Cli {
    /// Config file (defaults to $PLANEWATCH_CONFIG or ./planewatch.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the tracker until Ctrl-C
    Track {
        /// Data source: live or synthetic
        #[arg(long, default_value = "synthetic")]
        mode: TrackingMode,
        /// User latitude in degrees
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        /// User longitude in degrees
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
        /// Stop after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,
        /// Seed for the synthetic generator
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Distance, bearing and phrases between two points
    Bearing {
        #[arg(allow_hyphen_values = true)]
        lat1: f64,
        #[arg(allow_hyphen_values = true)]
        lon1: f64,
        #[arg(allow_hyphen_values = true)]
        lat2: f64,
        #[arg(allow_hyphen_values = true)]
        lon2: f64,
    },
    /// Token sequence spoken for a bearing
    Phrase {
        #[arg(allow_hyphen_values = true)]
        degrees: f64,
        /// compound or named
        #[arg(long, default_value = "compound")]
        policy: SectorPolicy,
    },
}

fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("planewatch=info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Track {
            mode,
            lat,
            lon,
            duration_secs,
            seed,
        } => {
            let path = cli.config.unwrap_or_else(config_path);
            let config = PlanewatchConfig::load_or_default(&path)?;
            let options = TrackOptions {
                mode,
                position: lat.zip(lon).map(|(lat, lon)| GeoPoint::new(lat, lon)),
                duration: duration_secs.map(Duration::from_secs),
                seed,
            };
            handle_track(options, config).await
        }
        Commands::Bearing {
            lat1,
            lon1,
            lat2,
            lon2,
        } => handle_bearing((lat1, lon1), (lat2, lon2)),
        Commands::Phrase { degrees, policy } => handle_phrase(degrees, policy),
    }
}
