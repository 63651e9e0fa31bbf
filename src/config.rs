use std::path::{Path, PathBuf};

use crate::aggregate::UnknownRegionPolicy;
use crate::ids::ID_COLUMN;
use crate::spreadsheet::{LATITUDE, LONGITUDE};
use crate::table::WGS84;

pub const DEFAULT_DATA_DIR: &str = "../data";

/// Default file layout of the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub data_dir: PathBuf,
}

impl Default for DataPaths {
    fn default() -> Self {
        DataPaths::new(DEFAULT_DATA_DIR)
    }
}

impl DataPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        DataPaths {
            data_dir: data_dir.into(),
        }
    }

    pub fn chsa_shapefile(&self) -> PathBuf {
        self.data_dir.join("chsa_2018").join("CHSA_2018.shp")
    }

    pub fn chsa_geojson(&self) -> PathBuf {
        self.data_dir.join("CHSA_2018.geojson")
    }

    pub fn clinic_workbook(&self) -> PathBuf {
        self.data_dir.join("clinic_list.xlsx")
    }

    pub fn clinic_geojson(&self) -> PathBuf {
        self.data_dir.join("clinic_list.geojson")
    }

    pub fn layer_geojson(&self) -> PathBuf {
        self.data_dir.join("V2_Layer2_Data.geojson")
    }

    pub fn shapefile_job(&self) -> ShapefileJob {
        ShapefileJob {
            input: self.chsa_shapefile(),
            output: self.chsa_geojson(),
            source_crs: None,
            target_crs: WGS84.to_string(),
        }
    }

    pub fn spreadsheet_job(&self) -> SpreadsheetJob {
        SpreadsheetJob {
            input: self.clinic_workbook(),
            output: self.clinic_geojson(),
            longitude_column: LONGITUDE.to_string(),
            latitude_column: LATITUDE.to_string(),
        }
    }

    pub fn aggregate_job(&self) -> AggregateJob {
        AggregateJob {
            regions: self.chsa_geojson(),
            providers: self.clinic_workbook(),
            output: None,
            policy: UnknownRegionPolicy::Fail,
        }
    }

    pub fn normalize_job(&self) -> NormalizeJob {
        NormalizeJob {
            input: self.layer_geojson(),
            output: None,
            column: ID_COLUMN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapefileJob {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Overrides the CRS read from the `.prj` sidecar.
    pub source_crs: Option<String>,
    pub target_crs: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub longitude_column: String,
    pub latitude_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateJob {
    pub regions: PathBuf,
    pub providers: PathBuf,
    /// Written in place over `regions` when unset.
    pub output: Option<PathBuf>,
    pub policy: UnknownRegionPolicy,
}

impl AggregateJob {
    pub fn output_path(&self) -> &Path {
        self.output.as_deref().unwrap_or(&self.regions)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeJob {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub column: String,
}

impl NormalizeJob {
    pub fn output_path(&self) -> &Path {
        self.output.as_deref().unwrap_or(&self.input)
    }
}
