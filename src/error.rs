use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EtlError>;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("File not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Unknown region '{region}' at row {row}: no region table entry with that name")]
    UnknownRegion { region: String, row: usize },

    #[error("Region '{region}' has zero population")]
    DivisionByZero { region: String },

    #[error("Column '{column}' is missing from {table}")]
    MalformedColumn { column: String, table: String },

    #[error("Invalid value in column '{column}' at row {row}: {reason}")]
    InvalidValue {
        column: String,
        row: usize,
        reason: String,
    },

    #[error("Expected a GeoJSON FeatureCollection in {}", .0.display())]
    NotAFeatureCollection(PathBuf),

    #[error("Workbook {} has no worksheets", .0.display())]
    EmptyWorkbook(PathBuf),

    #[error("No coordinate reference system for {}: pass one explicitly or add a .prj file", .0.display())]
    MissingCrs(PathBuf),

    #[error("Geometry conversion failed: {0}")]
    Geometry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Shapefile error: {0}")]
    Shapefile(#[from] shapefile::Error),

    #[error("CRS mismatch or invalid CRS definition: {0}")]
    ProjCreate(#[from] proj::ProjCreateError),

    #[error("Reprojection failed: {0}")]
    Projection(#[from] proj::ProjError),

    #[error("Could not replace output file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl EtlError {
    pub(crate) fn invalid(column: &str, row: usize, reason: impl Into<String>) -> Self {
        EtlError::InvalidValue {
            column: column.to_string(),
            row,
            reason: reason.into(),
        }
    }
}
