use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use serde_json::{json, Number};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{EtlError, Result};

pub const WGS84: &str = "EPSG:4326";

// Largest integer an f64 holds exactly.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

pub fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(EtlError::MissingFile(path.to_path_buf()))
    }
}

/// Loads a GeoJSON file that must hold a FeatureCollection.
pub fn load_feature_collection(path: &Path) -> Result<FeatureCollection> {
    ensure_exists(path)?;
    info!("Loading file: {}", path.display());
    let reader = BufReader::new(File::open(path)?);

    match GeoJson::from_reader(reader)? {
        GeoJson::FeatureCollection(fc) => {
            info!("Found {} features in file", fc.features.len());
            Ok(fc)
        }
        _ => Err(EtlError::NotAFeatureCollection(path.to_path_buf())),
    }
}

/// Writes `fc` to `path` through a temporary file in the same directory,
/// renamed over the target once fully written.
pub fn save_feature_collection(fc: &FeatureCollection, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, fc)?;
        writer.flush()?;
    }
    debug!("Wrote {} features to {}", fc.features.len(), tmp.path().display());
    tmp.persist(path)?;

    info!("Written {} features to {}", fc.features.len(), path.display());
    Ok(())
}

/// Fails with `MalformedColumn` unless every feature carries each column,
/// null values included.
pub fn require_feature_columns(fc: &FeatureCollection, columns: &[&str], table: &str) -> Result<()> {
    for column in columns {
        let missing = fc.features.iter().any(|feature| {
            feature
                .properties
                .as_ref()
                .map_or(true, |props| !props.contains_key(*column))
        });
        if missing {
            return Err(EtlError::MalformedColumn {
                column: column.to_string(),
                table: table.to_string(),
            });
        }
    }
    Ok(())
}

pub fn property<'a>(feature: &'a Feature, column: &str) -> Option<&'a JsonValue> {
    feature.properties.as_ref().and_then(|props| props.get(column))
}

pub fn set_property(feature: &mut Feature, column: &str, value: JsonValue) {
    feature
        .properties
        .get_or_insert_with(JsonObject::new)
        .insert(column.to_string(), value);
}

pub fn optional_string(value: Option<&JsonValue>, column: &str, row: usize) -> Result<Option<String>> {
    match value {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(EtlError::invalid(column, row, format!("expected text, found {}", other))),
    }
}

/// Reads a non-negative integer. Integral floats such as `12345.0` count.
pub fn optional_count(value: Option<&JsonValue>, column: &str, row: usize) -> Result<Option<u64>> {
    match value {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Number(n)) => {
            if let Some(v) = n.as_u64() {
                return Ok(Some(v));
            }
            let v = n.as_f64().unwrap_or(f64::NAN);
            if v < 0.0 {
                Err(EtlError::invalid(column, row, format!("negative value {}", n)))
            } else if v.fract() != 0.0 || v > MAX_EXACT_INTEGER {
                Err(EtlError::invalid(column, row, format!("expected a whole number, found {}", n)))
            } else {
                Ok(Some(v as u64))
            }
        }
        Some(other) => Err(EtlError::invalid(column, row, format!("expected a number, found {}", other))),
    }
}

pub fn optional_f64(value: Option<&JsonValue>, column: &str, row: usize) -> Result<Option<f64>> {
    match value {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Number(n)) => Ok(n.as_f64()),
        Some(other) => Err(EtlError::invalid(column, row, format!("expected a number, found {}", other))),
    }
}

/// JSON number for a source float, written as an integer when it is one.
pub fn number_value(v: f64) -> JsonValue {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < MAX_EXACT_INTEGER {
        JsonValue::from(v as i64)
    } else {
        Number::from_f64(v).map_or(JsonValue::Null, JsonValue::Number)
    }
}

/// Name of `crs` as written into a named-CRS `crs` member.
pub fn crs_urn(crs: &str) -> String {
    match crs.to_ascii_uppercase().strip_prefix("EPSG:") {
        Some("4326") => "urn:ogc:def:crs:OGC:1.3:CRS84".to_string(),
        Some(code) => format!("urn:ogc:def:crs:EPSG::{}", code),
        None => crs.to_string(),
    }
}

pub fn tag_crs(fc: &mut FeatureCollection, crs: &str) {
    fc.foreign_members.get_or_insert_with(JsonObject::new).insert(
        "crs".to_string(),
        json!({ "type": "name", "properties": { "name": crs_urn(crs) } }),
    );
}

pub fn feature_collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
