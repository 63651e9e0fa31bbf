use geojson::{FeatureCollection, JsonObject, JsonValue};
use tracing::info;

use crate::error::{EtlError, Result};
use crate::table;

pub const ID_COLUMN: &str = "ID";

// Collection member listing the columns already normalized.
const NORMALIZED_MEMBER: &str = "normalized_columns";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeOutcome {
    Normalized(usize),
    AlreadyNormalized,
}

/// Drops the last underscore-delimited segment: `clinic_123_4` -> `clinic_123`.
pub fn normalize_id(id: &str) -> &str {
    id.rsplit_once('_').map_or(id, |(head, _)| head)
}

pub fn is_normalized(fc: &FeatureCollection, column: &str) -> bool {
    fc.foreign_members
        .as_ref()
        .and_then(|members| members.get(NORMALIZED_MEMBER))
        .and_then(JsonValue::as_array)
        .is_some_and(|columns| columns.iter().any(|c| c.as_str() == Some(column)))
}

/// Rewrites `column` in place on every feature. The collection remembers the
/// column, so running this again leaves it untouched.
pub fn normalize_ids(fc: &mut FeatureCollection, column: &str) -> Result<NormalizeOutcome> {
    if is_normalized(fc, column) {
        info!("Column {} is already normalized", column);
        return Ok(NormalizeOutcome::AlreadyNormalized);
    }
    table::require_feature_columns(fc, &[column], "feature table")?;

    // Validate every row before touching any of them.
    let mut normalized = Vec::with_capacity(fc.features.len());
    for (row, feature) in fc.features.iter().enumerate() {
        let id = table::optional_string(table::property(feature, column), column, row)?
            .ok_or_else(|| EtlError::invalid(column, row, "missing identifier"))?;
        normalized.push(normalize_id(&id).to_string());
    }

    let count = normalized.len();
    for (feature, id) in fc.features.iter_mut().zip(normalized) {
        table::set_property(feature, column, JsonValue::String(id));
    }

    let members = fc.foreign_members.get_or_insert_with(JsonObject::new);
    match members.get_mut(NORMALIZED_MEMBER).and_then(JsonValue::as_array_mut) {
        Some(columns) => columns.push(JsonValue::from(column)),
        None => {
            members.insert(NORMALIZED_MEMBER.to_string(), JsonValue::from(vec![column]));
        }
    }

    info!("Normalized {} identifiers in column {}", count, column);
    Ok(NormalizeOutcome::Normalized(count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layer(ids: &[JsonValue]) -> FeatureCollection {
        let features: Vec<JsonValue> = ids
            .iter()
            .map(|id| json!({ "type": "Feature", "geometry": null, "properties": { "ID": id } }))
            .collect();
        serde_json::from_value(json!({ "type": "FeatureCollection", "features": features })).unwrap()
    }

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id("clinic_123_4"), "clinic_123");
        assert_eq!(normalize_id("clinic"), "clinic");
        assert_eq!(normalize_id("_4"), "");
        assert_eq!(normalize_id(""), "");
    }

    #[test]
    fn test_normalize_ids_rewrites_column() {
        let mut fc = layer(&[json!("clinic_123_4"), json!("hospital_9_1")]);
        let outcome = normalize_ids(&mut fc, ID_COLUMN).unwrap();
        assert_eq!(outcome, NormalizeOutcome::Normalized(2));
        assert_eq!(table::property(&fc.features[0], ID_COLUMN), Some(&json!("clinic_123")));
        assert_eq!(table::property(&fc.features[1], ID_COLUMN), Some(&json!("hospital_9")));
    }

    #[test]
    fn test_second_run_is_identical() {
        let mut fc = layer(&[json!("clinic_123_4"), json!("plain")]);
        normalize_ids(&mut fc, ID_COLUMN).unwrap();
        let once = serde_json::to_string(&fc).unwrap();

        let outcome = normalize_ids(&mut fc, ID_COLUMN).unwrap();
        assert_eq!(outcome, NormalizeOutcome::AlreadyNormalized);
        assert_eq!(serde_json::to_string(&fc).unwrap(), once);
        assert_eq!(table::property(&fc.features[0], ID_COLUMN), Some(&json!("clinic_123")));
    }

    #[test]
    fn test_non_string_id_leaves_collection_untouched() {
        let mut fc = layer(&[json!("clinic_1_2"), json!(42)]);
        let before = serde_json::to_string(&fc).unwrap();
        let err = normalize_ids(&mut fc, ID_COLUMN).unwrap_err();
        assert!(matches!(err, EtlError::InvalidValue { row: 1, .. }));
        assert_eq!(serde_json::to_string(&fc).unwrap(), before);
    }

    #[test]
    fn test_missing_column() {
        let mut fc = layer(&[json!("a_b")]);
        let err = normalize_ids(&mut fc, "CLINIC_ID").unwrap_err();
        assert!(matches!(err, EtlError::MalformedColumn { .. }));
    }
}
