use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use surgewatch::config::{AppConfig, LoggingConfig};
use surgewatch::simulate::{self, Scenario};

#[derive(Parser)]
#[command(
    name = "surgewatch",
    about = "Real-time request-traffic anomaly detection",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (overrides SURGEWATCH_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (HTTP API + traffic detector)
    Serve {
        /// Bind address (overrides the config file)
        #[arg(long, env = "SURGEWATCH_BIND")]
        bind: Option<String>,
    },

    /// Replay a synthetic traffic scenario against a fresh detector
    Simulate {
        /// Scenario to replay
        #[arg(long, value_enum, default_value = "flood")]
        scenario: Scenario,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,

    /// Load and validate a config file
    Check {
        /// Config file to check
        #[arg(long)]
        path: PathBuf,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    // stderr keeps `--json` output on stdout machine-readable.
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

    let mut config = AppConfig::resolve(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting surgewatch daemon");
            surgewatch::serve(config).await?;
        }
        Commands::Simulate { scenario, json } => {
            let report = simulate::run(scenario, config.detector, chrono::Utc::now())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let snap = &report.snapshot;
                println!("\n=== surgewatch simulation: {:?} ===", report.scenario);
                println!("Events replayed: {}", report.events);
                println!("Level:           {} ({})", snap.level, snap.label);
                println!("Requests/min:    {}", snap.requests_per_minute);
                println!("Burst window:    {}", snap.requests_last_burst_window);
                println!("Unique keys:     {}", snap.unique_keys);
                println!("Baseline:        {:.1}", snap.baseline_rate);
                println!("Relative change: {:.2}", snap.relative_change);

                println!("\n{:<20} | {:>8} | {:>7}", "Top key", "Requests", "Share");
                println!("{:-<20}-|-{:->8}-|-{:->7}", "", "", "");
                for k in &snap.top_keys {
                    println!("{:<20} | {:>8} | {:>6.1}%", k.key, k.count, k.percent);
                }

                println!("\nAlerts ({}):", report.alerts.len());
                for alert in &report.alerts {
                    println!(
                        " - [{}] {}: {} ({} req/min)",
                        alert.triggered_at.to_rfc3339(),
                        alert.label,
                        alert.message,
                        alert.requests_per_minute
                    );
                }
                println!();
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                print!("{}", config.to_toml()?);
            }
            ConfigAction::Check { path } => {
                let cfg = AppConfig::load(&path)?;
                println!("{}: ok", path.display());
                println!(
                    "window {} ms, high {} rpm, critical {} rpm, alert gap {} ms",
                    cfg.detector.window_ms,
                    cfg.detector.high_threshold_rpm,
                    cfg.detector.critical_threshold_rpm,
                    cfg.detector.min_alert_gap_ms
                );
            }
        },
    }

    Ok(())
}
