//! Physicians per health service area.
//!
//! Provider counts from the clinic list are summed per region name and
//! divided by the region population, giving physicians per 100 000 people.

use std::collections::HashMap;

use geojson::{FeatureCollection, JsonObject, JsonValue};
use serde_json::Number;
use tracing::{debug, info, warn};

use crate::error::{EtlError, Result};
use crate::table;

pub const REGION_NAME: &str = "CHSA_Name";
pub const REGION_POPULATION: &str = "CHSA_Pop16";
pub const PROVIDER_REGION: &str = "CHSA_NAME";
pub const PROVIDER_COUNT: &str = "NUM_PHYSICIANS";
pub const PHYS_CAPITA: &str = "PHYS_CAPITA";
pub const NUM_PHYS: &str = "NUM_PHYS";

const PER_CAPITA_SCALE: f64 = 100_000.0;

/// One region feature. `num_phys` and `phys_capita` stay `None` until
/// [`TableAggregator::apply`] fills them, and stay `None` for unnamed regions.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionRecord {
    pub name: Option<String>,
    pub population: Option<u64>,
    pub num_phys: Option<u64>,
    pub phys_capita: Option<f64>,
}

impl RegionRecord {
    pub fn new(name: impl Into<String>, population: u64) -> Self {
        RegionRecord {
            name: Some(name.into()),
            population: Some(population),
            num_phys: None,
            phys_capita: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRecord {
    pub region: Option<String>,
    pub count: u64,
}

impl ProviderRecord {
    pub fn new(region: Option<&str>, count: u64) -> Self {
        ProviderRecord {
            region: region.map(str::to_string),
            count,
        }
    }
}

/// What to do with a provider row whose region is not in the region table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownRegionPolicy {
    #[default]
    Fail,
    SkipAndWarn,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccumulateSummary {
    pub applied: usize,
    pub without_region: usize,
    pub skipped_unknown: Vec<String>,
}

/// Running provider totals keyed by region name.
#[derive(Debug, Clone, Default)]
pub struct RegionAccumulator {
    totals: HashMap<String, u64>,
}

impl RegionAccumulator {
    pub fn total(&self, region: &str) -> Option<u64> {
        self.totals.get(region).copied()
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TableAggregator {
    policy: UnknownRegionPolicy,
}

impl TableAggregator {
    pub fn new(policy: UnknownRegionPolicy) -> Self {
        TableAggregator { policy }
    }

    pub fn build_accumulator<I, S>(&self, regions: I) -> RegionAccumulator
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let totals = regions.into_iter().map(|name| (name.into(), 0)).collect();
        RegionAccumulator { totals }
    }

    pub fn accumulate(
        &self,
        acc: &mut RegionAccumulator,
        providers: &[ProviderRecord],
    ) -> Result<AccumulateSummary> {
        let mut summary = AccumulateSummary::default();

        for (row, provider) in providers.iter().enumerate() {
            let Some(region) = provider.region.as_deref() else {
                summary.without_region += 1;
                continue;
            };

            match acc.totals.get_mut(region) {
                Some(total) => {
                    *total = total
                        .checked_add(provider.count)
                        .ok_or_else(|| EtlError::invalid(PROVIDER_COUNT, row, "physician total overflows"))?;
                    summary.applied += 1;
                }
                None => match self.policy {
                    UnknownRegionPolicy::Fail => {
                        return Err(EtlError::UnknownRegion {
                            region: region.to_string(),
                            row,
                        });
                    }
                    UnknownRegionPolicy::SkipAndWarn => {
                        warn!(row, region, count = provider.count, "Skipping provider row with unknown region");
                        summary.skipped_unknown.push(region.to_string());
                    }
                },
            }
        }

        debug!(
            applied = summary.applied,
            without_region = summary.without_region,
            skipped = summary.skipped_unknown.len(),
            "Accumulated provider rows"
        );
        Ok(summary)
    }

    pub fn apply(&self, regions: &mut [RegionRecord], acc: &RegionAccumulator) -> Result<()> {
        for (row, region) in regions.iter_mut().enumerate() {
            let Some(name) = region.name.as_deref() else {
                continue;
            };

            let count = acc.total(name).ok_or_else(|| EtlError::UnknownRegion {
                region: name.to_string(),
                row,
            })?;
            let population = region.population.unwrap_or(0);
            if population == 0 {
                return Err(EtlError::DivisionByZero {
                    region: name.to_string(),
                });
            }

            let capita = count as f64 / population as f64 * PER_CAPITA_SCALE;
            region.num_phys = Some(count);
            region.phys_capita = Some(round_to_cents(capita));
        }
        Ok(())
    }

    /// Runs all three steps over in-memory records.
    pub fn run(&self, regions: &mut [RegionRecord], providers: &[ProviderRecord]) -> Result<AccumulateSummary> {
        let names = regions.iter().filter_map(|r| r.name.clone());
        let mut acc = self.build_accumulator(names);
        let summary = self.accumulate(&mut acc, providers)?;
        self.apply(regions, &acc)?;
        Ok(summary)
    }
}

/// Rounds to two decimals, ties to even.
pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Reads the region table out of a feature collection. Named regions must
/// carry a population.
pub fn region_records(fc: &FeatureCollection) -> Result<Vec<RegionRecord>> {
    table::require_feature_columns(fc, &[REGION_NAME, REGION_POPULATION], "region table")?;

    fc.features
        .iter()
        .enumerate()
        .map(|(row, feature)| {
            let name = table::optional_string(table::property(feature, REGION_NAME), REGION_NAME, row)?;
            // Unnamed regions are never aggregated, their population is not read.
            let population = match name {
                Some(_) => {
                    let value = table::property(feature, REGION_POPULATION);
                    let population = table::optional_count(value, REGION_POPULATION, row)?.ok_or_else(|| {
                        EtlError::invalid(REGION_POPULATION, row, "named region without population")
                    })?;
                    Some(population)
                }
                None => None,
            };
            Ok(RegionRecord {
                name,
                population,
                num_phys: None,
                phys_capita: None,
            })
        })
        .collect()
}

/// Reads provider rows. A row with a region must carry a count; rows without
/// one are kept with a zero count, their count cell unread.
pub fn provider_records(rows: &[JsonObject]) -> Result<Vec<ProviderRecord>> {
    rows.iter()
        .enumerate()
        .map(|(row, props)| {
            let region = table::optional_string(props.get(PROVIDER_REGION), PROVIDER_REGION, row)?;
            let count = match region {
                Some(_) => table::optional_count(props.get(PROVIDER_COUNT), PROVIDER_COUNT, row)?
                    .ok_or_else(|| EtlError::invalid(PROVIDER_COUNT, row, "missing physician count"))?,
                None => 0,
            };
            Ok(ProviderRecord { region, count })
        })
        .collect()
}

/// Writes `NUM_PHYS` and `PHYS_CAPITA` onto every feature, null where unset.
pub fn write_region_records(fc: &mut FeatureCollection, records: &[RegionRecord]) {
    for (feature, record) in fc.features.iter_mut().zip(records) {
        let capita = record
            .phys_capita
            .and_then(Number::from_f64)
            .map_or(JsonValue::Null, JsonValue::Number);
        let count = record.num_phys.map_or(JsonValue::Null, JsonValue::from);
        table::set_property(feature, PHYS_CAPITA, capita);
        table::set_property(feature, NUM_PHYS, count);
    }
}

/// Adds physician counts and rates to the region collection in place.
pub fn aggregate_feature_collection(
    regions: &mut FeatureCollection,
    provider_rows: &[JsonObject],
    policy: UnknownRegionPolicy,
) -> Result<AccumulateSummary> {
    let mut records = region_records(regions)?;
    let providers = provider_records(provider_rows)?;
    info!(
        "Aggregating {} provider rows across {} regions",
        providers.len(),
        records.len()
    );

    let summary = TableAggregator::new(policy).run(&mut records, &providers)?;
    write_region_records(regions, &records);

    info!(
        "Applied {} provider rows ({} without region, {} with unknown region)",
        summary.applied,
        summary.without_region,
        summary.skipped_unknown.len()
    );
    Ok(summary)
}
