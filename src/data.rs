//! Source-table ingestion: rates CSVs and boundary GeoJSON.
//!
//! All file reads happen here, before the pure join/score passes run.
//! Loaded tables are shared through [`DataCache`], which loads each path
//! once per process and never invalidates.

use crate::config::RatesConfig;
use crate::types::{GeometryUnit, Indicator, Level, RateValue, RegionRecord};
use anyhow::{Context, Result, anyhow};
use csv::ReaderBuilder;
use geo::MultiPolygon;
use geojson::GeoJson;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Join keys are compared after trimming, collapsing inner whitespace and
/// case-folding, on both the CSV and the GeoJSON side.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Coerce a raw CSV cell into a rate. Anything absent, non-numeric,
/// non-finite or outside [0, 100] becomes 0.0 with the missing flag set.
pub fn coerce_rate(raw: Option<&str>) -> RateValue {
    match raw.map(str::trim).filter(|s| !s.is_empty()).and_then(|s| s.parse::<f64>().ok()) {
        Some(v) if v.is_finite() && (0.0..=100.0).contains(&v) => RateValue::measured(v),
        _ => RateValue::absent(),
    }
}

pub fn load_rates(config: &RatesConfig, level: Level) -> Result<Vec<RegionRecord>> {
    let file = File::open(&config.csv)
        .with_context(|| format!("Failed to open CSV file: {:?}", config.csv))?;
    read_rates(file, config, level)
}

fn read_rates<R: Read>(reader: R, config: &RatesConfig, level: Level) -> Result<Vec<RegionRecord>> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();

    let key_idx = headers.iter().position(|h| h == config.key_column)
        .ok_or_else(|| anyhow!("Join column '{}' not found in CSV", config.key_column))?;

    let province_idx = match &config.province_column {
        Some(column) => Some(
            headers.iter().position(|h| h == column.as_str())
                .ok_or_else(|| anyhow!("Province column '{}' not found in CSV", column))?,
        ),
        None => None,
    };

    // Indicator columns may be absent entirely; every row then carries the
    // missing flag for that indicator.
    let indicator_idx: Vec<(Indicator, Option<usize>)> = Indicator::ALL.iter()
        .map(|ind| (*ind, headers.iter().position(|h| h == ind.column_name())))
        .collect();

    let covariate_idx: Vec<(String, usize)> = headers.iter().enumerate()
        .filter(|(i, h)| {
            *i != key_idx
                && Some(*i) != province_idx
                && !Indicator::ALL.iter().any(|ind| ind.column_name() == *h)
                && !h.is_empty()
        })
        .map(|(i, h)| (h.to_string(), i))
        .collect();

    let mut records = Vec::new();

    for result in rdr.records() {
        let record = result?;
        let name = record.get(key_idx).unwrap_or("").trim().to_string();
        if name.is_empty() {
            continue;
        }

        let province = province_idx
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        let mut rates = BTreeMap::new();
        for (indicator, idx) in &indicator_idx {
            rates.insert(*indicator, coerce_rate(idx.and_then(|i| record.get(i))));
        }

        let mut covariates = BTreeMap::new();
        for (column, i) in &covariate_idx {
            if let Some(v) = record.get(*i).map(str::trim).and_then(|s| s.parse::<f64>().ok()) {
                if v.is_finite() {
                    covariates.insert(column.clone(), v);
                }
            }
        }

        records.push(RegionRecord { name, level, province, rates, covariates });
    }

    Ok(records)
}

pub fn load_geometry(path: &Path, feature_key: &str) -> Result<Vec<GeometryUnit>> {
    println!("Loading GeoJSON from {:?}...", path);
    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    read_geometry(BufReader::new(file), feature_key)
}

fn read_geometry<R: Read>(reader: R, feature_key: &str) -> Result<Vec<GeometryUnit>> {
    // Parse the GeoJSON. warning: this loads the whole file into memory.
    let geojson = GeoJson::from_reader(reader).context("Failed to parse GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut units = Vec::new();

    for feature in collection.features {
        let name_val = feature.properties.as_ref().and_then(|props| props.get(feature_key));

        let name = match name_val {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                warn!(feature_key, "feature carries no join key, skipping");
                continue;
            }
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let valid_geo: geo::Geometry<f64> = geom.value.try_into()
                    .map_err(|e| anyhow!("Failed to convert geometry for '{}': {:?}", name, e))?;

                match valid_geo {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue, // points/lines are not mappable units
                }
            }
            None => continue,
        };

        units.push(GeometryUnit { name, geometry });
    }

    Ok(units)
}

/// Load-once cache for the source tables, keyed by path. Repeated renders
/// of the same level reuse the already-parsed tables instead of re-reading
/// the files; the joiner itself never caches its output.
#[derive(Default)]
pub struct DataCache {
    rates: HashMap<PathBuf, Arc<Vec<RegionRecord>>>,
    geometry: HashMap<PathBuf, Arc<Vec<GeometryUnit>>>,
}

impl DataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rates(&mut self, config: &RatesConfig, level: Level) -> Result<Arc<Vec<RegionRecord>>> {
        if let Some(cached) = self.rates.get(&config.csv) {
            return Ok(Arc::clone(cached));
        }
        let loaded = Arc::new(load_rates(config, level)?);
        self.rates.insert(config.csv.clone(), Arc::clone(&loaded));
        Ok(loaded)
    }

    pub fn geometry(&mut self, path: &Path, feature_key: &str) -> Result<Arc<Vec<GeometryUnit>>> {
        if let Some(cached) = self.geometry.get(path) {
            return Ok(Arc::clone(cached));
        }
        let loaded = Arc::new(load_geometry(path, feature_key)?);
        self.geometry.insert(path.to_path_buf(), Arc::clone(&loaded));
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn district_rates_config() -> RatesConfig {
        RatesConfig {
            csv: PathBuf::from("unused.csv"),
            key_column: "District".to_string(),
            province_column: Some("Province".to_string()),
        }
    }

    #[test]
    fn normalizes_whitespace_and_case() {
        assert_eq!(normalize_name("  Northern   Province "), "northern province");
        assert_eq!(normalize_name("GASABO"), normalize_name("Gasabo"));
    }

    #[test]
    fn coerces_unusable_values_to_flagged_zero() {
        assert_eq!(coerce_rate(Some("37.9")), RateValue::measured(37.9));
        assert_eq!(coerce_rate(Some(" 0 ")), RateValue::measured(0.0));
        assert_eq!(coerce_rate(Some("n/a")), RateValue::absent());
        assert_eq!(coerce_rate(Some("")), RateValue::absent());
        assert_eq!(coerce_rate(Some("-3.0")), RateValue::absent());
        assert_eq!(coerce_rate(Some("250")), RateValue::absent());
        assert_eq!(coerce_rate(Some("NaN")), RateValue::absent());
        assert_eq!(coerce_rate(None), RateValue::absent());
    }

    #[test]
    fn reads_rates_with_covariates_and_missing_cells() {
        let csv = "District,Province,Stunting Rate (%),Wasting Rate (%),Underweight Rate (%),Wealth Index\n\
                   Gasabo,Kigali City,28.4,1.9,7.2,3.4\n\
                   Nyarugenge,Kigali City,,2.1,bad,2.9\n\
                   ,Kigali City,10.0,1.0,1.0,1.0\n";
        let records = read_rates(csv.as_bytes(), &district_rates_config(), Level::District).unwrap();

        // the row with an empty key is dropped
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Gasabo");
        assert_eq!(records[0].province.as_deref(), Some("Kigali City"));
        assert_eq!(records[0].rates[&Indicator::Stunting], RateValue::measured(28.4));
        assert_eq!(records[0].covariates["Wealth Index"], 3.4);

        assert_eq!(records[1].rates[&Indicator::Stunting], RateValue::absent());
        assert_eq!(records[1].rates[&Indicator::Wasting], RateValue::measured(2.1));
        assert_eq!(records[1].rates[&Indicator::Underweight], RateValue::absent());
    }

    #[test]
    fn missing_indicator_column_flags_every_row() {
        let csv = "District,Stunting Rate (%)\nGasabo,28.4\n";
        let config = RatesConfig {
            csv: PathBuf::from("unused.csv"),
            key_column: "District".to_string(),
            province_column: None,
        };
        let records = read_rates(csv.as_bytes(), &config, Level::District).unwrap();
        assert_eq!(records[0].rates[&Indicator::Wasting], RateValue::absent());
        assert_eq!(records[0].rates[&Indicator::Underweight], RateValue::absent());
    }

    #[test]
    fn unknown_join_column_is_a_hard_error() {
        let csv = "Name,Stunting Rate (%)\nGasabo,28.4\n";
        let err = read_rates(csv.as_bytes(), &district_rates_config(), Level::District).unwrap_err();
        assert!(err.to_string().contains("District"));
    }

    #[test]
    fn reads_geometry_with_configured_feature_key() {
        let raw = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"District": "Gasabo"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[30.0, -1.9], [30.2, -1.9], [30.2, -1.7], [30.0, -1.9]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {"other": 1},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[29.0, -2.0], [29.2, -2.0], [29.2, -1.8], [29.0, -2.0]]]
                    }
                }
            ]
        }"#;
        let units = read_geometry(raw.as_bytes(), "District").unwrap();
        // the keyless feature is skipped with a warning
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "Gasabo");
        assert_eq!(units[0].geometry.0.len(), 1);
    }

    #[test]
    fn cache_loads_each_path_once() {
        let dir = std::env::temp_dir();
        let path = dir.join("hidden_hunger_cache_test.csv");
        std::fs::write(
            &path,
            "District,Stunting Rate (%),Wasting Rate (%),Underweight Rate (%)\nGasabo,28.4,1.9,7.2\n",
        )
        .unwrap();

        let config = RatesConfig {
            csv: path.clone(),
            key_column: "District".to_string(),
            province_column: None,
        };
        let mut cache = DataCache::new();
        let first = cache.rates(&config, Level::District).unwrap();
        let second = cache.rates(&config, Level::District).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        std::fs::remove_file(&path).ok();
    }
}
