use std::collections::{HashMap, HashSet};
use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use geo::Point;
use geojson::{Feature, FeatureCollection, Geometry as GeoJsonGeometry, JsonObject, JsonValue};
use tracing::{debug, info};

use crate::error::{EtlError, Result};
use crate::table;

pub const LONGITUDE: &str = "GEO_LONGITUDE";
pub const LATITUDE: &str = "GEO_LATITUDE";

/// First worksheet of a workbook: the header row, then one property map per
/// data row keyed by header. Blank rows are dropped, so row numbers in errors
/// count non-blank data rows from 0. Repeated header names get a `.N` suffix
/// (`X`, `X.1`, `X.2`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<JsonObject>,
}

impl Sheet {
    pub fn from_range(range: &Range<Data>) -> Sheet {
        let mut rows = range.rows();
        let headers = rows
            .next()
            .map(|cells| dedupe_headers(cells.iter().enumerate().map(|(i, cell)| header_name(cell, i))))
            .unwrap_or_default();

        let rows = rows
            .filter(|cells| cells.iter().any(|cell| !matches!(cell, Data::Empty)))
            .map(|cells| {
                headers
                    .iter()
                    .enumerate()
                    .map(|(i, header)| (header.clone(), cells.get(i).map_or(JsonValue::Null, cell_value)))
                    .collect()
            })
            .collect();

        Sheet { headers, rows }
    }

    pub fn require_columns(&self, columns: &[&str], table: &str) -> Result<()> {
        match columns.iter().find(|column| !self.headers.iter().any(|h| h == *column)) {
            Some(column) => Err(EtlError::MalformedColumn {
                column: column.to_string(),
                table: table.to_string(),
            }),
            None => Ok(()),
        }
    }
}

pub fn load_sheet(path: &Path) -> Result<Sheet> {
    table::ensure_exists(path)?;
    info!("Loading workbook: {}", path.display());

    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| EtlError::EmptyWorkbook(path.to_path_buf()))??;

    let sheet = Sheet::from_range(&range);
    info!("Found {} rows with {} columns", sheet.rows.len(), sheet.headers.len());
    Ok(sheet)
}

/// Builds one point feature per row from the longitude/latitude columns.
/// Every column, coordinates included, is kept as a property. Rows missing
/// either coordinate get no geometry.
pub fn points_from_xy(sheet: &Sheet, longitude: &str, latitude: &str) -> Result<FeatureCollection> {
    sheet.require_columns(&[longitude, latitude], "spreadsheet")?;

    let mut features = Vec::with_capacity(sheet.rows.len());
    let mut without_location = 0;
    for (row, props) in sheet.rows.iter().enumerate() {
        let x = table::optional_f64(props.get(longitude), longitude, row)?;
        let y = table::optional_f64(props.get(latitude), latitude, row)?;

        let geometry = match (x, y) {
            (Some(x), Some(y)) => {
                let point = Point::new(x, y);
                Some(GeoJsonGeometry::new(geojson::Value::from(&point)))
            }
            _ => {
                without_location += 1;
                None
            }
        };

        features.push(Feature {
            bbox: None,
            geometry,
            id: None,
            properties: Some(props.clone()),
            foreign_members: None,
        });
    }

    if without_location > 0 {
        debug!("{} rows have no coordinates", without_location);
    }
    let mut fc = table::feature_collection(features);
    table::tag_crs(&mut fc, table::WGS84);
    Ok(fc)
}

fn header_name(cell: &Data, index: usize) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Empty => format!("Unnamed: {}", index),
        other => other.to_string(),
    }
}

fn dedupe_headers(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut suffixes: HashMap<String, usize> = HashMap::new();
    let mut headers = Vec::new();

    for name in names {
        let mut header = name.clone();
        while seen.contains(&header) {
            let suffix = suffixes.entry(name.clone()).or_insert(0);
            *suffix += 1;
            header = format!("{}.{}", name, suffix);
        }
        seen.insert(header.clone());
        headers.push(header);
    }
    headers
}

fn cell_value(cell: &Data) -> JsonValue {
    match cell {
        Data::Int(i) => JsonValue::from(*i),
        Data::Float(f) => table::number_value(*f),
        Data::String(s) => JsonValue::String(s.clone()),
        Data::Bool(b) => JsonValue::Bool(*b),
        Data::DateTime(_) | Data::DateTimeIso(_) | Data::DurationIso(_) => JsonValue::String(cell.to_string()),
        Data::Error(_) | Data::Empty => JsonValue::Null,
    }
}
