pub mod types;
pub mod config;
pub mod data;
pub mod join;
pub mod risk;
pub mod render;
pub mod stats;

use anyhow::{Result, anyhow};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::AppConfig;
use data::DataCache;
use risk::RiskScorer;
use types::{Indicator, Level, RegionRecord, RiskProfile, WaterSource};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join malnutrition rates to boundaries and write the choropleth GeoJSON
    Map {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long, value_enum, default_value_t = Level::District)]
        level: Level,
    },
    /// Print the rate table and per-indicator averages for a level
    Summary {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long, value_enum, default_value_t = Level::District)]
        level: Level,
    },
    /// Estimate malnutrition risk for a household profile
    Simulate {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[command(flatten)]
        profile: ProfileArgs,
    },
}

// The simulator's input-collection boundary: value ranges are enforced
// here, so the scorer itself never sees an out-of-range profile.
#[derive(Args)]
struct ProfileArgs {
    /// Mid-upper-arm circumference in millimetres
    #[arg(long, value_parser = clap::value_parser!(u32).range(80..=200))]
    muac_mm: u32,
    /// Child age in months
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=59))]
    child_age_months: u32,
    /// Child eats fortified porridge (true/false)
    #[arg(long, action = ArgAction::Set)]
    fortified_porridge: bool,
    /// Child received vitamin A supplementation (true/false)
    #[arg(long, action = ArgAction::Set)]
    vitamin_a: bool,
    /// Household water source
    #[arg(long, value_enum)]
    water_source: WaterSource,
    /// Recent mouth illness affecting feeding (true/false)
    #[arg(long, action = ArgAction::Set)]
    mouth_illness: bool,
    /// Solid-food meals per day
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=5))]
    solid_food_meals_per_day: u32,
    /// Hands washed before meals (true/false)
    #[arg(long, action = ArgAction::Set)]
    handwash_before_meals: bool,
    /// Household wealth index, 1.0 (poorest) to 5.0 (wealthiest)
    #[arg(long, value_parser = parse_wealth_index)]
    wealth_index: f64,
    /// Person with a disability in the household (true/false)
    #[arg(long, action = ArgAction::Set)]
    disability_in_household: bool,
    /// Mother completed primary education (true/false)
    #[arg(long, action = ArgAction::Set)]
    maternal_education_primary: Option<bool>,
    /// Number of people in the household
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=20))]
    household_size: Option<u32>,
}

fn parse_wealth_index(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|_| format!("'{raw}' is not a number"))?;
    if (1.0..=5.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("wealth index must be between 1.0 and 5.0, got {value}"))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Map { config, level } => run_map(&config, level),
        Commands::Summary { config, level } => run_summary(&config, level),
        Commands::Simulate { config, profile } => run_simulate(&config, profile),
    }
}

fn run_map(config: &Path, level: Level) -> Result<()> {
    let app_config = AppConfig::load_from_file(config)?;
    let mut cache = DataCache::new();

    // 1. Load Data
    let source = app_config.input.source(level);
    let geometry = cache.geometry(&source.geojson, &source.feature_key)?;
    let rates = load_level_rates(&app_config, &mut cache, level)?;

    // 2. Join rates to boundaries
    let outcome = join::join(&rates, &geometry, level);
    println!(
        "Joined {} regions ({} rate rows without a boundary, {} boundaries without data)",
        outcome.joined.len(),
        outcome.unmatched_rates.len(),
        outcome.unmatched_geometry.len()
    );

    // 3. Write the choropleth feature collection
    let out_path = app_config.output.dir
        .join(format!("{}_choropleth.geojson", level.as_str().to_lowercase()));
    render::write_choropleth(&out_path, &outcome)?;
    println!("Wrote {:?}", out_path);

    Ok(())
}

fn run_summary(config: &Path, level: Level) -> Result<()> {
    let app_config = AppConfig::load_from_file(config)?;
    let mut cache = DataCache::new();

    let rates = load_level_rates(&app_config, &mut cache, level)?;
    let rows: Vec<RegionRecord> =
        if level == Level::Province && rates.iter().any(|r| r.level == Level::District) {
            join::rollup_to_provinces(&rates)
        } else {
            rates.to_vec()
        };

    println!("{} malnutrition rates", level);
    for record in &rows {
        let cells: Vec<String> = Indicator::ALL.iter()
            .map(|ind| match record.rates.get(ind) {
                Some(v) if !v.missing => format!("{:.1}", v.value),
                _ => "n/a".to_string(),
            })
            .collect();
        println!(
            "  {:<22} stunting {:>6}  wasting {:>6}  underweight {:>6}",
            record.name, cells[0], cells[1], cells[2]
        );
    }

    println!("Total {}s: {}", level, rows.len());
    for summary in stats::summarize(&rows) {
        match summary.mean {
            Some(mean) => println!(
                "Average {}: {:.2}% ({} measured)",
                summary.indicator.column_name(), mean, summary.measured
            ),
            None => println!("Average {}: no measured values", summary.indicator.column_name()),
        }
    }

    Ok(())
}

fn run_simulate(config: &Path, args: ProfileArgs) -> Result<()> {
    let app_config = AppConfig::load_from_file(config)?;

    let profile = RiskProfile {
        muac_mm: args.muac_mm,
        child_age_months: args.child_age_months,
        fortified_porridge: args.fortified_porridge,
        vitamin_a: args.vitamin_a,
        water_source: args.water_source,
        mouth_illness: args.mouth_illness,
        solid_food_meals_per_day: args.solid_food_meals_per_day,
        handwash_before_meals: args.handwash_before_meals,
        wealth_index: args.wealth_index,
        disability_in_household: args.disability_in_household,
        maternal_education_primary: args.maternal_education_primary,
        household_size: args.household_size,
    };

    let scorer = RiskScorer::new(app_config.risk);
    let result = scorer.score(&profile);

    println!(
        "Estimated malnutrition risk: {:.1}% ({})",
        result.score_percent,
        result.band.as_str()
    );

    Ok(())
}

/// Rates for the requested level. A province map without its own rates CSV
/// falls back to the district table; the joiner rolls those rows up.
fn load_level_rates(
    app_config: &AppConfig,
    cache: &mut DataCache,
    level: Level,
) -> Result<Arc<Vec<RegionRecord>>> {
    let source = app_config.input.source(level);
    if let Some(rates_config) = &source.rates {
        return cache.rates(rates_config, level);
    }

    match level {
        Level::Province => {
            let district = app_config.input.district.rates.as_ref()
                .ok_or_else(|| anyhow!("config has neither province nor district rates CSV"))?;
            cache.rates(district, Level::District)
        }
        Level::District => Err(anyhow!("config has no district rates CSV")),
    }
}
