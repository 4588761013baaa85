//! ACTUS Engine CLI
//!
//! Command-line interface for simulating contract cash flows

use actus_engine::{
    projection::{EngineConfig, EventRow},
    scenario::{ScenarioRunner, SimulationContext},
    terms::{load_terms, parse_datetime, to_contracts},
};
use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDateTime;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "actus-engine", version, about = "Simulate ACTUS contract cash flows")]
struct Args {
    /// Contract terms as a JSON object or array
    #[arg(long)]
    terms: PathBuf,

    /// Directory of `<market object code>.csv` series (date,value)
    #[arg(long)]
    market_dir: Option<PathBuf>,

    /// Query horizon (YYYY-MM-DD); contracts run to maturity when omitted
    #[arg(long, value_parser = parse_horizon)]
    to: Option<NaiveDateTime>,

    /// Scenario id reported in diagnostics
    #[arg(long, default_value = "base")]
    scenario: String,

    /// Output CSV of evaluated events
    #[arg(long, default_value = "events_output.csv")]
    output: PathBuf,
}

fn parse_horizon(text: &str) -> std::result::Result<NaiveDateTime, String> {
    parse_datetime(text).ok_or_else(|| format!("invalid date `{text}`"))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!("ACTUS Engine v{}", env!("CARGO_PKG_VERSION"));
    println!("==================\n");

    let raw = load_terms(&args.terms)
        .map_err(|e| anyhow!("{e}"))
        .with_context(|| format!("reading terms from {}", args.terms.display()))?;
    let contracts = to_contracts(&raw).context("converting contract terms")?;
    println!("Loaded {} contract(s) from {}", contracts.len(), args.terms.display());

    let context = match &args.market_dir {
        Some(dir) => SimulationContext::from_market_dir(args.scenario.clone(), dir)
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("loading market data from {}", dir.display()))?,
        None => SimulationContext::new(args.scenario.clone()),
    };
    let config = EngineConfig { horizon: args.to };
    let runner = ScenarioRunner::new(context);

    let results = runner.run_batch(&contracts, &config);

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let mut failures = 0;

    println!(
        "\n{:<16} {:<6} {:>6} {:>14} {:>14} {:>14} {:>14}",
        "Contract", "Type", "Events", "Inflow", "Outflow", "Interest", "Final NT"
    );
    println!("{}", "-".repeat(90));

    for (contract, result) in contracts.iter().zip(&results) {
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                failures += 1;
                eprintln!("{:<16} failed: {}", contract.contract_id(), e);
                continue;
            }
        };
        for row in result.events.iter().map(EventRow::from) {
            writer.serialize(row)?;
        }
        let summary = result.summary();
        println!(
            "{:<16} {:<6} {:>6} {:>14.2} {:>14.2} {:>14.2} {:>14.2}",
            summary.contract_id,
            format!("{:?}", summary.contract_type),
            summary.total_events,
            summary.total_inflow,
            summary.total_outflow,
            summary.total_interest,
            summary.final_notional,
        );
    }
    writer.flush()?;

    println!("\nEvents written to: {}", args.output.display());
    if failures > 0 {
        bail!("{} of {} contract(s) failed", failures, contracts.len());
    }
    Ok(())
}
