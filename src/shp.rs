use std::fs;
use std::path::Path;

use geo::{Coord, Geometry, MapCoords};
use geojson::{Feature, FeatureCollection, Geometry as GeoJsonGeometry, JsonObject, JsonValue};
use proj::Proj;
use shapefile::dbase::{FieldValue, Record};
use shapefile::{Reader, Shape};
use tracing::{debug, info};

use crate::error::{EtlError, Result};
use crate::table;

/// Loads shapes and their dBASE attributes as features. Coordinates are left
/// in the shapefile's own CRS.
pub fn load_shapefile(path: &Path) -> Result<FeatureCollection> {
    table::ensure_exists(path)?;
    info!("Loading file: {}", path.display());

    let mut reader = Reader::from_path(path)?;
    let mut features = Vec::new();

    for (feature_count, shape_record) in reader.iter_shapes_and_records().enumerate() {
        if (feature_count + 1) % 1000 == 0 {
            debug!("Processing feature {}", feature_count + 1);
        }
        let (shape, record) = shape_record?;
        features.push(Feature {
            bbox: None,
            geometry: shape_geometry(shape)?,
            id: None,
            properties: Some(record_properties(record)),
            foreign_members: None,
        });
    }

    info!("Loaded {} features from file", features.len());
    Ok(table::feature_collection(features))
}

/// The explicit CRS if given, otherwise the WKT in the sidecar `.prj`.
pub fn source_crs(path: &Path, explicit: Option<&str>) -> Result<String> {
    if let Some(crs) = explicit {
        return Ok(crs.to_string());
    }
    let prj = path.with_extension("prj");
    match fs::read_to_string(&prj) {
        Ok(wkt) if !wkt.trim().is_empty() => {
            debug!("Read CRS from {}", prj.display());
            Ok(wkt.trim().to_string())
        }
        _ => Err(EtlError::MissingCrs(path.to_path_buf())),
    }
}

/// Transforms every coordinate of every feature from `from` to `to` and tags
/// the collection with `to`.
pub fn reproject(fc: &mut FeatureCollection, from: &str, to: &str) -> Result<()> {
    let proj = Proj::new_known_crs(from, to, None)?;
    info!("Reprojecting {} features to {}", fc.features.len(), to);

    for feature in fc.features.iter_mut() {
        if let Some(geometry) = feature.geometry.take() {
            let geometry: Geometry<f64> = Geometry::try_from(geometry)?;
            let projected = geometry.try_map_coords(|coord| {
                proj.convert((coord.x, coord.y)).map(|(x, y)| Coord { x, y })
            })?;
            feature.geometry = Some(GeoJsonGeometry::new(geojson::Value::from(&projected)));
        }
    }

    table::tag_crs(fc, to);
    Ok(())
}

fn shape_geometry(shape: Shape) -> Result<Option<GeoJsonGeometry>> {
    if let Shape::NullShape = shape {
        return Ok(None);
    }
    let geometry = Geometry::<f64>::try_from(shape).map_err(|e| EtlError::Geometry(e.to_string()))?;
    Ok(Some(GeoJsonGeometry::new(geojson::Value::from(&geometry))))
}

fn record_properties(record: Record) -> JsonObject {
    record
        .into_iter()
        .map(|(name, value)| (name, field_value(value)))
        .collect()
}

fn field_value(value: FieldValue) -> JsonValue {
    match value {
        FieldValue::Character(s) => s.map_or(JsonValue::Null, JsonValue::String),
        FieldValue::Memo(s) => JsonValue::String(s),
        FieldValue::Numeric(n) => n.map_or(JsonValue::Null, table::number_value),
        FieldValue::Float(f) => f.map_or(JsonValue::Null, |f| table::number_value(f as f64)),
        FieldValue::Double(d) | FieldValue::Currency(d) => table::number_value(d),
        FieldValue::Integer(i) => JsonValue::from(i),
        FieldValue::Logical(b) => b.map_or(JsonValue::Null, JsonValue::Bool),
        FieldValue::Date(d) => d.map_or(JsonValue::Null, |d| {
            JsonValue::String(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
        }),
        other => JsonValue::String(format!("{:?}", other)),
    }
}
