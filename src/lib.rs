use tracing::info;

pub mod aggregate;
pub mod config;
pub mod error;
pub mod ids;
pub mod shp;
pub mod spreadsheet;
pub mod table;

pub use aggregate::{AccumulateSummary, ProviderRecord, RegionAccumulator, RegionRecord, TableAggregator, UnknownRegionPolicy};
pub use config::{AggregateJob, DataPaths, NormalizeJob, ShapefileJob, SpreadsheetJob};
pub use error::{EtlError, Result};
pub use ids::NormalizeOutcome;

/// Shapefile to GeoJSON, reprojected to the job's target CRS.
pub fn convert_shapefile(job: &ShapefileJob) -> Result<()> {
    let crs = shp::source_crs(&job.input, job.source_crs.as_deref())?;
    let mut regions = shp::load_shapefile(&job.input)?;
    shp::reproject(&mut regions, &crs, &job.target_crs)?;
    table::save_feature_collection(&regions, &job.output)
}

/// First worksheet to a GeoJSON collection of points.
pub fn convert_spreadsheet(job: &SpreadsheetJob) -> Result<()> {
    let sheet = spreadsheet::load_sheet(&job.input)?;
    let clinics = spreadsheet::points_from_xy(&sheet, &job.longitude_column, &job.latitude_column)?;
    table::save_feature_collection(&clinics, &job.output)
}

/// Adds `NUM_PHYS` and `PHYS_CAPITA` to every region.
pub fn aggregate_physicians(job: &AggregateJob) -> Result<AccumulateSummary> {
    let mut regions = table::load_feature_collection(&job.regions)?;
    let clinics = spreadsheet::load_sheet(&job.providers)?;
    clinics.require_columns(&[aggregate::PROVIDER_REGION, aggregate::PROVIDER_COUNT], "clinic list")?;

    let summary = aggregate::aggregate_feature_collection(&mut regions, &clinics.rows, job.policy)?;
    table::save_feature_collection(&regions, job.output_path())?;
    Ok(summary)
}

/// Strips the trailing `_segment` from the job's identifier column. Nothing is
/// written when the file was already normalized.
pub fn normalize_identifiers(job: &NormalizeJob) -> Result<NormalizeOutcome> {
    let mut layer = table::load_feature_collection(&job.input)?;
    let outcome = ids::normalize_ids(&mut layer, &job.column)?;
    if let NormalizeOutcome::Normalized(_) = outcome {
        table::save_feature_collection(&layer, job.output_path())?;
    }
    Ok(outcome)
}

/// Shapefile conversion, then clinic list conversion, then aggregation.
pub fn run_pipeline(paths: &DataPaths, policy: UnknownRegionPolicy) -> Result<AccumulateSummary> {
    info!("=== Converting shapefile ===");
    convert_shapefile(&paths.shapefile_job())?;

    info!("=== Converting clinic list ===");
    convert_spreadsheet(&paths.spreadsheet_job())?;

    info!("=== Aggregating physicians ===");
    let job = AggregateJob {
        policy,
        ..paths.aggregate_job()
    };
    aggregate_physicians(&job)
}
