//! The rates × boundaries join and the district→province rollup.
//!
//! Pure over its inputs: same tables in, same outcome out, no caching.
//! Unmatched rows on either side are surfaced in the outcome and logged,
//! never silently dropped.

use crate::data::normalize_name;
use crate::types::{GeometryUnit, Indicator, JoinedRegion, Level, RateValue, RegionRecord};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JoinOutcome {
    /// One entry per rate record with a matching boundary, in rate-input order.
    pub joined: Vec<JoinedRegion>,
    /// Rate records with no boundary; kept for tabular views.
    pub unmatched_rates: Vec<RegionRecord>,
    /// Boundaries with no rate record; rendered with a neutral no-data fill.
    pub unmatched_geometry: Vec<GeometryUnit>,
}

pub fn join(rates: &[RegionRecord], geometry: &[GeometryUnit], level: Level) -> JoinOutcome {
    // Province map from district-only rates: roll the districts up first.
    let rolled;
    let rates = if level == Level::Province && rates.iter().any(|r| r.level == Level::District) {
        rolled = rollup_to_provinces(rates);
        rolled.as_slice()
    } else {
        rates
    };

    let mut by_name: HashMap<String, usize> = HashMap::new();
    for (i, unit) in geometry.iter().enumerate() {
        // first feature wins on duplicate names
        by_name.entry(normalize_name(&unit.name)).or_insert(i);
    }

    let mut matched = vec![false; geometry.len()];
    let mut joined = Vec::new();
    let mut unmatched_rates = Vec::new();

    for record in rates {
        match by_name.get(&normalize_name(&record.name)) {
            Some(&i) => {
                matched[i] = true;
                joined.push(JoinedRegion {
                    record: record.clone(),
                    geometry: geometry[i].clone(),
                });
            }
            None => {
                warn!(region = %record.name, "no boundary feature matches this rate record");
                unmatched_rates.push(record.clone());
            }
        }
    }

    let unmatched_geometry: Vec<GeometryUnit> = geometry.iter().enumerate()
        .filter(|(i, _)| !matched[*i])
        .map(|(_, unit)| unit.clone())
        .collect();
    for unit in &unmatched_geometry {
        warn!(region = %unit.name, "no rate record matches this boundary feature");
    }

    JoinOutcome { joined, unmatched_rates, unmatched_geometry }
}

/// Unweighted arithmetic mean per province across its districts. Missing
/// values stay out of both the sum and the divisor; a province where every
/// district is missing an indicator keeps the missing flag. Provinces come
/// out in first-appearance order of the district rows.
pub fn rollup_to_provinces(districts: &[RegionRecord]) -> Vec<RegionRecord> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, (String, Vec<&RegionRecord>)> = HashMap::new();

    for record in districts {
        let Some(province) = record.province.as_deref() else {
            warn!(district = %record.name, "district row has no province assignment, excluded from rollup");
            continue;
        };
        let key = normalize_name(province);
        groups.entry(key.clone())
            .or_insert_with(|| {
                order.push(key.clone());
                (province.trim().to_string(), Vec::new())
            })
            .1
            .push(record);
    }

    order.iter()
        .map(|key| {
            let (display_name, members) = &groups[key];

            let mut rates = BTreeMap::new();
            for indicator in Indicator::ALL {
                let measured: Vec<f64> = members.iter()
                    .filter_map(|r| r.rates.get(&indicator).filter(|v| !v.missing).map(|v| v.value))
                    .collect();
                let value = if measured.is_empty() {
                    RateValue::absent()
                } else {
                    RateValue::measured(measured.iter().sum::<f64>() / measured.len() as f64)
                };
                rates.insert(indicator, value);
            }

            let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
            for member in members {
                for (column, v) in &member.covariates {
                    let entry = sums.entry(column.clone()).or_insert((0.0, 0));
                    entry.0 += v;
                    entry.1 += 1;
                }
            }
            let covariates = sums.into_iter()
                .map(|(column, (sum, n))| (column, sum / n as f64))
                .collect();

            RegionRecord {
                name: display_name.clone(),
                level: Level::Province,
                province: None,
                rates,
                covariates,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{MultiPolygon, polygon};

    fn unit(name: &str) -> GeometryUnit {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        GeometryUnit { name: name.to_string(), geometry: MultiPolygon::new(vec![poly]) }
    }

    fn district(name: &str, province: &str, stunting: RateValue) -> RegionRecord {
        let mut rates = BTreeMap::new();
        rates.insert(Indicator::Stunting, stunting);
        rates.insert(Indicator::Wasting, RateValue::measured(2.0));
        rates.insert(Indicator::Underweight, RateValue::measured(8.0));
        RegionRecord {
            name: name.to_string(),
            level: Level::District,
            province: Some(province.to_string()),
            rates,
            covariates: BTreeMap::new(),
        }
    }

    #[test]
    fn joins_on_normalized_names_preserving_rate_order() {
        let rates = vec![
            district("  nyarugenge ", "Kigali City", RateValue::measured(20.0)),
            district("GASABO", "Kigali City", RateValue::measured(28.4)),
        ];
        let geometry = vec![unit("Gasabo"), unit("Nyarugenge")];

        let outcome = join(&rates, &geometry, Level::District);
        assert_eq!(outcome.joined.len(), 2);
        assert_eq!(outcome.joined[0].record.name.trim(), "nyarugenge");
        assert_eq!(outcome.joined[0].geometry.name, "Nyarugenge");
        assert_eq!(outcome.joined[1].geometry.name, "Gasabo");
        assert!(outcome.unmatched_rates.is_empty());
        assert!(outcome.unmatched_geometry.is_empty());
    }

    #[test]
    fn surfaces_unmatched_rows_on_both_sides() {
        let rates = vec![
            district("Gasabo", "Kigali City", RateValue::measured(28.4)),
            district("Atlantis", "Kigali City", RateValue::measured(1.0)),
        ];
        let geometry = vec![unit("Gasabo"), unit("Rubavu")];

        let outcome = join(&rates, &geometry, Level::District);
        assert_eq!(outcome.joined.len(), 1);
        assert_eq!(outcome.unmatched_rates.len(), 1);
        assert_eq!(outcome.unmatched_rates[0].name, "Atlantis");
        assert_eq!(outcome.unmatched_geometry.len(), 1);
        assert_eq!(outcome.unmatched_geometry[0].name, "Rubavu");
    }

    #[test]
    fn join_is_idempotent() {
        let rates = vec![
            district("Gasabo", "Kigali City", RateValue::measured(28.4)),
            district("Atlantis", "Kigali City", RateValue::measured(1.0)),
        ];
        let geometry = vec![unit("Gasabo"), unit("Rubavu")];

        let first = join(&rates, &geometry, Level::District);
        let second = join(&rates, &geometry, Level::District);
        assert_eq!(first, second);
    }

    #[test]
    fn rollup_averages_measured_values_only() {
        let districts = vec![
            district("Gasabo", "Kigali City", RateValue::measured(30.0)),
            district("Nyarugenge", "Kigali City", RateValue::absent()),
            district("Kicukiro", "Kigali City", RateValue::measured(20.0)),
        ];
        let provinces = rollup_to_provinces(&districts);
        assert_eq!(provinces.len(), 1);
        assert_eq!(provinces[0].name, "Kigali City");
        assert_eq!(provinces[0].level, Level::Province);
        // missing row excluded from sum and divisor
        assert_eq!(provinces[0].rates[&Indicator::Stunting], RateValue::measured(25.0));
    }

    #[test]
    fn rollup_keeps_missing_flag_when_no_district_measured() {
        let districts = vec![
            district("Gasabo", "Kigali City", RateValue::absent()),
            district("Nyarugenge", "Kigali City", RateValue::absent()),
        ];
        let provinces = rollup_to_provinces(&districts);
        assert_eq!(provinces[0].rates[&Indicator::Stunting], RateValue::absent());
    }

    #[test]
    fn rollup_preserves_first_appearance_order_and_skips_orphans() {
        let mut orphan = district("Nowhere", "Kigali City", RateValue::measured(1.0));
        orphan.province = None;
        let districts = vec![
            district("Musanze", "Northern Province", RateValue::measured(40.0)),
            orphan,
            district("Gasabo", "Kigali City", RateValue::measured(28.0)),
            district("Burera", "northern province", RateValue::measured(50.0)),
        ];
        let provinces = rollup_to_provinces(&districts);
        assert_eq!(provinces.len(), 2);
        assert_eq!(provinces[0].name, "Northern Province");
        assert_eq!(provinces[0].rates[&Indicator::Stunting], RateValue::measured(45.0));
        assert_eq!(provinces[1].name, "Kigali City");
    }

    #[test]
    fn province_join_rolls_up_district_rates() {
        let districts = vec![
            district("Gasabo", "Kigali City", RateValue::measured(30.0)),
            district("Nyarugenge", "Kigali City", RateValue::measured(20.0)),
            district("Musanze", "Northern Province", RateValue::measured(44.0)),
        ];
        let geometry = vec![unit("Kigali City"), unit("Northern Province")];

        let outcome = join(&districts, &geometry, Level::Province);
        assert_eq!(outcome.joined.len(), 2);
        assert_eq!(outcome.joined[0].record.name, "Kigali City");
        assert_eq!(outcome.joined[0].record.rates[&Indicator::Stunting], RateValue::measured(25.0));
        assert_eq!(outcome.joined[1].record.rates[&Indicator::Stunting], RateValue::measured(44.0));
    }

    #[test]
    fn rollup_averages_covariates_across_districts() {
        let mut a = district("Gasabo", "Kigali City", RateValue::measured(30.0));
        a.covariates.insert("Wealth Index".to_string(), 3.0);
        let mut b = district("Nyarugenge", "Kigali City", RateValue::measured(20.0));
        b.covariates.insert("Wealth Index".to_string(), 4.0);

        let provinces = rollup_to_provinces(&[a, b]);
        assert_eq!(provinces[0].covariates["Wealth Index"], 3.5);
    }
}
