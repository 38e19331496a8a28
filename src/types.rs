use clap::ValueEnum;
use geo::MultiPolygon;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Level {
    Province,
    District,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Province => "Province",
            Level::District => "District",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Indicator {
    Stunting,
    Wasting,
    Underweight,
}

impl Indicator {
    pub const ALL: [Indicator; 3] = [Indicator::Stunting, Indicator::Wasting, Indicator::Underweight];

    /// Canonical CSV column header for this indicator.
    pub fn column_name(&self) -> &'static str {
        match self {
            Indicator::Stunting => "Stunting Rate (%)",
            Indicator::Wasting => "Wasting Rate (%)",
            Indicator::Underweight => "Underweight Rate (%)",
        }
    }
}

/// An indicator value after coercion. `missing` marks rows where the source
/// held nothing usable; the 0.0 stand-in must not render as a measured zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateValue {
    pub value: f64,
    pub missing: bool,
}

impl RateValue {
    pub fn measured(value: f64) -> Self {
        RateValue { value, missing: false }
    }

    pub fn absent() -> Self {
        RateValue { value: 0.0, missing: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionRecord {
    pub name: String,
    pub level: Level,
    // Parent province for district rows, when the CSV carries one
    pub province: Option<String>,
    pub rates: BTreeMap<Indicator, RateValue>,
    // Extra numeric columns (wealth index, dietary diversity, ...), tooltip-only
    pub covariates: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeometryUnit {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

/// A rate record paired with its boundary, ready for choropleth rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRegion {
    pub record: RegionRecord,
    pub geometry: GeometryUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WaterSource {
    Piped,
    Protected,
    Unprotected,
    Far,
}

/// Simulator input vector, collected and range-checked by the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskProfile {
    pub muac_mm: u32,
    pub child_age_months: u32,
    pub fortified_porridge: bool,
    pub vitamin_a: bool,
    pub water_source: WaterSource,
    pub mouth_illness: bool,
    pub solid_food_meals_per_day: u32,
    pub handwash_before_meals: bool,
    pub wealth_index: f64,
    pub disability_in_household: bool,
    pub maternal_education_primary: Option<bool>,
    pub household_size: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskBand {
    Low,
    Moderate,
    High,
}

impl RiskBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskBand::Low => "Low",
            RiskBand::Moderate => "Moderate",
            RiskBand::High => "High",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskResult {
    pub score_percent: f64,
    pub band: RiskBand,
}
