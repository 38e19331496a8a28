use crate::join::JoinOutcome;
use crate::types::{GeometryUnit, JoinedRegion};
use anyhow::{Context, Result};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};
use serde_json::json;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

pub fn write_choropleth(path: &Path, outcome: &JoinOutcome) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }

    let collection = feature_collection(outcome);
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {:?}", path))?;
    serde_json::to_writer(BufWriter::new(file), &GeoJson::FeatureCollection(collection))
        .context("Failed to write choropleth GeoJSON")?;

    Ok(())
}

/// Joined regions first, in join order, then the boundaries that matched no
/// rate record; those carry `no_data = true` so the map layer can give them
/// a neutral fill instead of the zero-rate color.
pub fn feature_collection(outcome: &JoinOutcome) -> FeatureCollection {
    let mut features: Vec<Feature> = outcome.joined.iter().map(region_feature).collect();
    features.extend(outcome.unmatched_geometry.iter().map(no_data_feature));

    FeatureCollection { bbox: None, features, foreign_members: None }
}

fn region_feature(region: &JoinedRegion) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("name".to_string(), json!(region.record.name));
    properties.insert("no_data".to_string(), json!(false));

    let mut missing = Vec::new();
    for (indicator, rate) in &region.record.rates {
        properties.insert(indicator.column_name().to_string(), json!(rate.value));
        if rate.missing {
            missing.push(indicator.column_name());
        }
    }
    properties.insert("missing_indicators".to_string(), json!(missing));

    // tooltip extras
    for (column, value) in &region.record.covariates {
        properties.insert(column.clone(), json!(value));
    }

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::from(&region.geometry.geometry))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn no_data_feature(unit: &GeometryUnit) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("name".to_string(), json!(unit.name));
    properties.insert("no_data".to_string(), json!(true));

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::from(&unit.geometry))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}
