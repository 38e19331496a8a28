//! Household malnutrition risk heuristic.
//!
//! An additive rule table, not a trained model. The increments live in
//! [`RiskWeights`] so they can be re-tuned from the `[risk]` config section
//! without touching the evaluation itself.

use crate::types::{RiskBand, RiskProfile, RiskResult, WaterSource};
use serde::Deserialize;

// Trigger thresholds for the rule table.
const MUAC_CUTOFF_MM: u32 = 125;
const MIN_SOLID_MEALS_PER_DAY: u32 = 2;
const LOW_WEALTH_CUTOFF: f64 = 2.0;
const INFANT_AGE_MONTHS: u32 = 12;
const LARGE_HOUSEHOLD_SIZE: u32 = 8;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub base: f64,
    pub low_muac: f64,
    pub no_fortified_porridge: f64,
    pub no_vitamin_a: f64,
    pub unsafe_water: f64,
    pub mouth_illness: f64,
    pub few_solid_meals: f64,
    pub no_handwashing: f64,
    pub low_wealth: f64,
    pub disability_in_household: f64,
    pub infant: f64,
    pub no_maternal_education: f64,
    pub large_household: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        RiskWeights {
            base: 0.10,
            low_muac: 0.25,
            no_fortified_porridge: 0.15,
            no_vitamin_a: 0.10,
            unsafe_water: 0.10,
            mouth_illness: 0.10,
            few_solid_meals: 0.10,
            no_handwashing: 0.05,
            low_wealth: 0.15,
            disability_in_household: 0.05,
            infant: 0.05,
            no_maternal_education: 0.10,
            large_household: 0.05,
        }
    }
}

pub struct RiskScorer {
    weights: RiskWeights,
}

impl RiskScorer {
    pub fn new(weights: RiskWeights) -> Self {
        RiskScorer { weights }
    }

    /// Sum the triggered increments on top of the base risk, clamp to
    /// [0, 1], and express as a percentage. Pure and deterministic; the
    /// CLI boundary has already range-checked the profile.
    pub fn score(&self, profile: &RiskProfile) -> RiskResult {
        let w = &self.weights;
        let mut risk = w.base;

        if profile.muac_mm < MUAC_CUTOFF_MM {
            risk += w.low_muac;
        }
        if !profile.fortified_porridge {
            risk += w.no_fortified_porridge;
        }
        if !profile.vitamin_a {
            risk += w.no_vitamin_a;
        }
        if matches!(profile.water_source, WaterSource::Unprotected | WaterSource::Far) {
            risk += w.unsafe_water;
        }
        if profile.mouth_illness {
            risk += w.mouth_illness;
        }
        if profile.solid_food_meals_per_day < MIN_SOLID_MEALS_PER_DAY {
            risk += w.few_solid_meals;
        }
        if !profile.handwash_before_meals {
            risk += w.no_handwashing;
        }
        if profile.wealth_index <= LOW_WEALTH_CUTOFF {
            risk += w.low_wealth;
        }
        if profile.disability_in_household {
            risk += w.disability_in_household;
        }
        if profile.child_age_months < INFANT_AGE_MONTHS {
            risk += w.infant;
        }
        if profile.maternal_education_primary == Some(false) {
            risk += w.no_maternal_education;
        }
        if profile.household_size.is_some_and(|n| n >= LARGE_HOUSEHOLD_SIZE) {
            risk += w.large_household;
        }

        // Scores resolve to tenths of a percent, so summed increments land
        // exactly on the band boundaries.
        let score_percent = (risk.clamp(0.0, 1.0) * 1000.0).round() / 10.0;
        RiskResult { score_percent, band: assign_band(score_percent) }
    }
}

/// 50.0 sits in Moderate, 30.0 in Low.
pub fn assign_band(score_percent: f64) -> RiskBand {
    if score_percent > 50.0 {
        RiskBand::High
    } else if score_percent > 30.0 {
        RiskBand::Moderate
    } else {
        RiskBand::Low
    }
}
