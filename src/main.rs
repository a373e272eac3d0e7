use anyhow::Result;
use clap::{Parser, Subcommand};
use solarsentinel::api::state::AppState;
use solarsentinel::config::{LoggingConfig, SentinelConfig};
use solarsentinel::detect::{Anomaly, Sensitivity};
use solarsentinel::telemetry::{SqliteTelemetry, TelemetryBundle};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "solarsentinel",
    about = "Anomaly detection and root-cause analysis for solar PV plants",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides storage.database_path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Bind address (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run anomaly detection for a plant over the last N hours
    Detect {
        /// Plant identifier
        #[arg(long)]
        plant: String,

        /// Look-back window in hours
        #[arg(long)]
        hours: Option<u32>,

        /// Statistical sensitivity: low, medium or high
        #[arg(long)]
        sensitivity: Option<Sensitivity>,

        /// Skip the statistical detector
        #[arg(long)]
        no_statistical: bool,

        /// Skip the digital-twin detector
        #[arg(long)]
        no_digital_twin: bool,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Run root-cause analysis for a stored anomaly
    Analyze {
        /// Anomaly id (UUID)
        #[arg(long)]
        anomaly: String,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List stored anomalies for a plant, newest first
    Anomalies {
        /// Plant identifier
        #[arg(long)]
        plant: String,

        /// Maximum number of rows
        #[arg(long, default_value = "20")]
        limit: usize,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Load a JSON telemetry file ({readings, performance_gaps}) into the database
    Import {
        /// Telemetry file path
        #[arg(long)]
        file: PathBuf,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The configured subscriber depends on the config itself, so resolution
    // logs through a plain stderr subscriber.
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    let mut config = tracing::subscriber::with_default(bootstrap, || {
        SentinelConfig::resolve(cli.config.as_deref())
    })?;
    if let Some(db) = cli.db {
        config.storage.database_path = db;
    }
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting SolarSentinel daemon");
            solarsentinel::serve(&config).await?;
        }
        Commands::Detect {
            plant,
            hours,
            sensitivity,
            no_statistical,
            no_digital_twin,
            json,
        } => {
            let state = open_state(&config)?;
            let mut detection = state.engine.settings().default_config;
            if let Some(sensitivity) = sensitivity {
                detection.sensitivity = sensitivity;
            }
            detection.statistical_enabled &= !no_statistical;
            detection.digital_twin_enabled &= !no_digital_twin;

            let report = state.engine.detect(&plant, hours, Some(detection)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nSolarSentinel Detection Report");
                println!("Plant:      {}", report.plant_id);
                println!("Window:     {} .. {}", report.window_start, report.window_end);
                println!(
                    "Anomalies:  {} ({} new)",
                    report.anomalies_detected, report.anomalies_new
                );
                if !report.failed_detectors.is_empty() {
                    println!("Failed:     {}", report.failed_detectors.join(", "));
                }
                print_anomalies(&report.anomalies);
            }
        }
        Commands::Analyze { anomaly, json } => {
            let state = open_state(&config)?;
            let outcome = state.analyzer.analyze(&anomaly).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                let rca = &outcome.rca;
                println!("\n=== Root-Cause Analysis ===");
                println!("Anomaly:  {}", rca.anomaly_id);
                println!("Plant:    {}", rca.plant_id);
                println!("Analysis: {}", rca.id);
                println!("\nProbable causes:");
                if rca.probable_causes.is_empty() {
                    println!(" (none identified)");
                }
                for cause in &rca.probable_causes {
                    println!(
                        " - {} ({:.0}%, impact {:.1} kWh): {}",
                        cause.cause,
                        cause.confidence * 100.0,
                        cause.estimated_impact,
                        cause.evidence
                    );
                }
                println!("\nRecommended actions:");
                if rca.recommended_actions.is_empty() {
                    println!(" (none)");
                }
                for action in &rca.recommended_actions {
                    println!(
                        " - [{:?}] {} (~{}h, ${:.0})",
                        action.priority,
                        action.action,
                        action.estimated_time_hours,
                        action.estimated_cost
                    );
                }
                for warning in &outcome.warnings {
                    println!("\nWarning: {warning}");
                }
                println!("===========================\n");
            }
        }
        Commands::Anomalies { plant, limit, json } => {
            let state = open_state(&config)?;
            let anomalies = state.anomalies.list_for_plant(&plant, limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&anomalies)?);
            } else if anomalies.is_empty() {
                println!("No anomalies found for plant '{plant}'.");
            } else {
                print_anomalies(&anomalies);
            }
        }
        Commands::Import { file } => {
            let pool = open_db(&config)?;
            let bundle = TelemetryBundle::load(&file)?;
            let (readings, gaps) = bundle.import_into(&SqliteTelemetry::new(pool))?;
            tracing::info!(file = %file.display(), readings, gaps, "Telemetry imported");
            println!("Imported {readings} readings and {gaps} performance gaps.");
        }
    }

    Ok(())
}

fn open_db(config: &SentinelConfig) -> Result<solarsentinel::storage::Pool> {
    let db_path = config.storage.database_path.display().to_string();
    tracing::debug!(%db_path, "Opening database");
    solarsentinel::storage::open_pool(&db_path)
}

fn open_state(config: &SentinelConfig) -> Result<AppState> {
    Ok(AppState::from_pool(open_db(config)?, &config.detection))
}

fn print_anomalies(anomalies: &[Anomaly]) {
    if anomalies.is_empty() {
        return;
    }
    println!(
        "\n{:<25} | {:<18} | {:<8} | {:<12} | {:>10} | {:>10} | {:>8}",
        "Timestamp", "Type", "Severity", "Detector", "Actual", "Expected", "Dev %"
    );
    println!(
        "{:-<25}-|-{:-<18}-|-{:-<8}-|-{:-<12}-|-{:-<10}-|-{:-<10}-|-{:-<8}",
        "", "", "", "", "", "", ""
    );
    for a in anomalies {
        println!(
            "{:<25} | {:<18} | {:<8} | {:<12} | {:>10.2} | {:>10.2} | {:>8.1}",
            a.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            a.anomaly_type.as_str(),
            a.severity.as_str(),
            a.detected_by.as_str(),
            a.actual_value,
            a.expected_value,
            a.deviation_percent
        );
        println!("{:<25} |   id {}", "", a.id);
    }
    println!();
}
