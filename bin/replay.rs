//! # Scenario Replay
//!
//! Replays a JSON scenario against simulated collaborators and prints a per-step
//! report (or the full report as JSON).
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin replay -- scenarios/defi.json
//! cargo run --bin replay -- scenarios/defi.json --config Config.toml --json
//! ```

use anyhow::Result;
use chrono::{TimeZone, Utc};
use clap::Parser;
use colored::Colorize;
use ethers::types::{Address, U256};
use index_controller_sdk::{
    events::ControllerEvent,
    scenario::{run_scenario, ReplayReport, Scenario},
    settings::Settings,
    types::conversions::{address_to_string, denorm_to_percent, fraction_to_decimal, string_to_address, u256_to_decimal},
    Uq112x112,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "replay")]
#[command(version, about = "Replay an index controller scenario")]
struct Cli {
    /// Scenario file (JSON)
    scenario: PathBuf,

    /// Settings file (defaults to ./Config.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,

    /// Controller owner, overriding the settings file
    #[arg(long, value_parser = parse_address)]
    owner: Option<Address>,

    /// Exit with status 1 when any step failed
    #[arg(long)]
    strict: bool,

    /// Expose Prometheus metrics on this address while replaying
    #[cfg(feature = "observability")]
    #[arg(long)]
    metrics_addr: Option<std::net::SocketAddr>,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let mut settings = match &cli.config {
        Some(path) => Settings::from_path(path)?,
        None => Settings::new()?,
    };
    if let Some(owner) = cli.owner {
        settings.controller.owner = owner;
    }
    init_logging(&settings);

    #[cfg(feature = "observability")]
    if let Some(addr) = cli.metrics_addr {
        index_controller_sdk::metrics::install_prometheus_exporter(addr)?;
    }

    let scenario = Scenario::from_path(&cli.scenario)?;
    log::info!("Replaying {} ({} steps)", cli.scenario.display(), scenario.steps.len());
    let report = run_scenario(&scenario, &settings)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_listings(&scenario);
        print_report(&report);
    }

    if cli.strict && report.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(feature = "observability")]
fn init_logging(settings: &Settings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(not(feature = "observability"))]
fn init_logging(settings: &Settings) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(settings.log.level.as_str())).init();
}

fn parse_address(s: &str) -> Result<Address, String> {
    string_to_address(s).map_err(|e| e.to_string())
}

/// Amounts carry 18 decimals throughout the scenarios.
fn format_amount(amount: U256) -> String {
    u256_to_decimal(amount, 18)
        .map(|d| d.to_string())
        .unwrap_or_else(|_| amount.to_string())
}

fn print_listings(scenario: &Scenario) {
    println!("🪙 Listed tokens");
    for listing in &scenario.tokens {
        let price = Uq112x112::fraction(listing.price_numerator, listing.price_denominator)
            .ok()
            .and_then(|price| fraction_to_decimal(price).ok())
            .map(|price| price.to_string())
            .unwrap_or_else(|| "invalid".to_string());
        println!(
            "  {}  price {}  supply {}",
            address_to_string(listing.address),
            price,
            format_amount(listing.total_supply)
        );
    }
    println!();
}

fn format_time(at: u64) -> String {
    i64::try_from(at)
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| at.to_string())
}

fn print_report(report: &ReplayReport) {
    let title = if report.scenario.is_empty() {
        "scenario".to_string()
    } else {
        report.scenario.clone()
    };
    println!("📼 {}", title.bold());
    println!("═══════════════════════════════════════════════════════════════════");

    for step in &report.steps {
        let status = if step.ok { "ok".green() } else { "FAIL".red().bold() };
        print!("{:>3}  {}  {:<28} {}", step.index, format_time(step.at), step.action, status);
        if let Some(error) = &step.error {
            let class = step.error_class.as_deref().unwrap_or("-");
            print!("  [{}] {}", class.yellow(), error);
        }
        println!();
    }

    println!();
    println!("Events ({}):", report.events.len());
    for event in &report.events {
        match event {
            ControllerEvent::PoolReindexed { pool, update_index, tokens, denorms, minimum_balances, .. } => {
                println!("  {} {} #{}", event.name().cyan(), address_to_string(*pool), update_index);
                for ((token, denorm), minimum) in tokens.iter().zip(denorms).zip(minimum_balances) {
                    println!(
                        "      {}  {}  min {}",
                        address_to_string(*token),
                        format_share(*denorm),
                        format_amount(*minimum)
                    );
                }
            }
            ControllerEvent::PoolReweighed { pool, update_index, tokens, denorms, .. } => {
                println!("  {} {} #{}", event.name().cyan(), address_to_string(*pool), update_index);
                for (token, denorm) in tokens.iter().zip(denorms) {
                    println!("      {}  {}", address_to_string(*token), format_share(*denorm));
                }
            }
            other => println!("  {}", other.name().cyan()),
        }
    }

    println!();
    let summary = format!("{} ok, {} failed", report.succeeded, report.failed);
    if report.failed == 0 {
        println!("✅ {}", summary.green());
    } else {
        println!("❌ {}", summary.red());
    }
}

fn format_share(denorm: u128) -> String {
    denorm_to_percent(denorm)
        .map(|pct| format!("{}%", pct.round_dp(4)))
        .unwrap_or_else(|_| denorm.to_string())
}
