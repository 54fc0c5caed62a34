// EII report binary
//
// Purpose: Score a layer table and print EII statistics
// Usage: cargo run --features cli --bin eii_report -- <layers.csv|parquet> <percentiles.json> [settings.json]
//
// Layer table columns: row, col, actual_npp, potential_npp, hmi, bii
// Optional columns: observed_std + natural_std (seasonality),
//                   kpi_biodiversity + kpi_soil + kpi_water (NC modulation),
//                   zone (per-zone statistics)
//
// Environment: EII_STATS (default "mean"), EII_PERCENTILES (e.g. "10,90"),
//              EII_OUTPUT ("dict" or "table")

use anyhow::{Context, Result};
use eii_scorer_rust::components::{BiiSeries, FunctionalInputs};
use eii_scorer_rust::{
    EiiInputs, EiiScorer, EiiSettings, KpiSource, LayerStack, OutputFormat, Region, ReportOutput,
    StatRequest,
};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eii_scorer_rust=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        anyhow::bail!(
            "Usage: {} <layers.csv|parquet> <percentiles.json> [settings.json]",
            args.first().map(String::as_str).unwrap_or("eii_report")
        );
    }
    let layers_path = PathBuf::from(&args[1]);
    let percentiles_path = PathBuf::from(&args[2]);

    let settings = match args.get(3) {
        Some(path) => EiiSettings::load(&PathBuf::from(path))?,
        None => EiiSettings::default(),
    };

    let output = match std::env::var("EII_OUTPUT").as_deref() {
        Ok("table") => OutputFormat::Table,
        _ => OutputFormat::Dict,
    };
    let request = stat_request_from_env()?;

    let scorer = EiiScorer::new(settings, output)?;
    let stack = LayerStack::load(&layers_path)?;

    let inputs = EiiInputs {
        functional: FunctionalInputs {
            actual_npp: stack.require("actual_npp")?.clone(),
            potential_npp: stack.require("potential_npp")?.clone(),
            observed_std: stack.get("observed_std").cloned(),
            natural_std: stack.get("natural_std").cloned(),
        },
        hmi: stack.require("hmi")?.clone(),
        bii: BiiSeries::new().with_year(
            scorer.settings().compositional.year,
            stack.require("bii")?.clone(),
        ),
    };

    let layers = scorer.calculate_eii_from_path(&inputs, &percentiles_path)?;

    let modulation = match stack.kpi_layers()? {
        Some(kpis) => {
            let modulated = scorer.modulate(&layers.eii, &KpiSource::Layers(kpis))?;
            Some(scorer.modulation_report(&modulated)?)
        }
        None => None,
    };

    match scorer.region_report(&layers, &Region::All, &request, true)? {
        ReportOutput::Dict(value) => {
            let mut out = json!({ "report": value });
            if let Some(ReportOutput::Dict(nc)) = modulation {
                out["natural_capital"] = nc;
            }
            if let Some(zones) = stack.get("zone") {
                if let ReportOutput::Dict(zonal) = scorer.zonal_report(&layers, zones, &request)? {
                    out["zonal"] = zonal;
                }
            }
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        ReportOutput::Table(df) => {
            println!("{}", df);
            if let Some(ReportOutput::Table(nc)) = modulation {
                println!("{}", nc);
            }
            if let Some(zones) = stack.get("zone") {
                if let ReportOutput::Table(zonal) = scorer.zonal_report(&layers, zones, &request)? {
                    println!("{}", zonal);
                }
            }
        }
    }

    Ok(())
}

fn stat_request_from_env() -> Result<StatRequest> {
    let stats = std::env::var("EII_STATS").ok();
    let names: Option<Vec<&str>> = stats
        .as_deref()
        .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).collect());

    let percentiles = match std::env::var("EII_PERCENTILES") {
        Ok(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|p| p.parse::<i64>().with_context(|| format!("Invalid percentile: {}", p)))
            .collect::<Result<Vec<_>>>()?,
        Err(_) => Vec::new(),
    };

    Ok(StatRequest::new(names.as_deref(), &percentiles)?)
}
