use std::fs;
use std::path::Path;

use chsa_etl::aggregate::{aggregate_feature_collection, NUM_PHYS, PHYS_CAPITA};
use chsa_etl::table::{load_feature_collection, property, save_feature_collection};
use chsa_etl::{normalize_identifiers, AggregateJob, DataPaths, EtlError, NormalizeOutcome, UnknownRegionPolicy};
use geojson::JsonObject;
use serde_json::{json, Value};

const CHSA: &str = r#"{
  "type": "FeatureCollection",
  "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:OGC:1.3:CRS84" } },
  "features": [
    { "type": "Feature",
      "properties": { "CHSA_Name": "Downtown", "CHSA_Pop16": 100000 },
      "geometry": { "type": "Polygon", "coordinates": [[[-123.2, 49.2], [-123.1, 49.2], [-123.1, 49.3], [-123.2, 49.2]]] } },
    { "type": "Feature",
      "properties": { "CHSA_Name": "Kitsilano", "CHSA_Pop16": 50000.0 },
      "geometry": { "type": "Polygon", "coordinates": [[[-123.3, 49.2], [-123.2, 49.2], [-123.2, 49.3], [-123.3, 49.2]]] } },
    { "type": "Feature",
      "properties": { "CHSA_Name": null, "CHSA_Pop16": null },
      "geometry": null }
  ]
}"#;

fn clinic_rows(rows: Value) -> Vec<JsonObject> {
    rows.as_array()
        .unwrap()
        .iter()
        .map(|row| row.as_object().cloned().unwrap())
        .collect()
}

fn write(path: &Path, contents: &str) {
    fs::write(path, contents).unwrap();
}

#[test]
fn test_aggregate_round_trip_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("CHSA_2018.geojson");
    write(&path, CHSA);

    let mut regions = load_feature_collection(&path).unwrap();
    let rows = clinic_rows(json!([
        { "CLINIC": "A", "CHSA_NAME": "Downtown", "NUM_PHYSICIANS": 3 },
        { "CLINIC": "B", "CHSA_NAME": "Kitsilano", "NUM_PHYSICIANS": 1 },
        { "CLINIC": "C", "CHSA_NAME": null, "NUM_PHYSICIANS": 12 },
        { "CLINIC": "D", "CHSA_NAME": "Downtown", "NUM_PHYSICIANS": 2 }
    ]));
    let summary = aggregate_feature_collection(&mut regions, &rows, UnknownRegionPolicy::Fail).unwrap();
    assert_eq!(summary.applied, 3);
    assert_eq!(summary.without_region, 1);
    save_feature_collection(&regions, &path).unwrap();

    let saved = load_feature_collection(&path).unwrap();
    let downtown = &saved.features[0];
    assert_eq!(property(downtown, NUM_PHYS), Some(&json!(5)));
    assert_eq!(property(downtown, PHYS_CAPITA), Some(&json!(5.0)));
    let kitsilano = &saved.features[1];
    assert_eq!(property(kitsilano, NUM_PHYS), Some(&json!(1)));
    assert_eq!(property(kitsilano, PHYS_CAPITA), Some(&json!(2.0)));
    let unnamed = &saved.features[2];
    assert_eq!(property(unnamed, NUM_PHYS), Some(&Value::Null));
    assert_eq!(property(unnamed, PHYS_CAPITA), Some(&Value::Null));

    // geometry and CRS pass through
    assert_eq!(saved.features[0].geometry, regions.features[0].geometry);
    assert!(saved.foreign_members.unwrap().contains_key("crs"));
}

#[test]
fn test_unknown_region_aborts_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("CHSA_2018.geojson");
    write(&path, CHSA);

    let mut regions = load_feature_collection(&path).unwrap();
    let rows = clinic_rows(json!([{ "CHSA_NAME": "Atlantis", "NUM_PHYSICIANS": 3 }]));
    let err = aggregate_feature_collection(&mut regions, &rows, UnknownRegionPolicy::Fail).unwrap_err();
    assert!(matches!(err, EtlError::UnknownRegion { ref region, .. } if region == "Atlantis"));
    assert_eq!(fs::read_to_string(&path).unwrap(), CHSA);
}

#[test]
fn test_aggregate_job_reports_missing_workbook() {
    let dir = tempfile::tempdir().unwrap();
    let paths = DataPaths::new(dir.path());
    write(&paths.chsa_geojson(), CHSA);

    let job = AggregateJob {
        policy: UnknownRegionPolicy::SkipAndWarn,
        ..paths.aggregate_job()
    };
    let err = chsa_etl::aggregate_physicians(&job).unwrap_err();
    assert!(matches!(err, EtlError::MissingFile(ref p) if p == &paths.clinic_workbook()));
    assert_eq!(fs::read_to_string(paths.chsa_geojson()).unwrap(), CHSA);
}

#[test]
fn test_normalize_identifiers_twice_is_bit_for_bit() {
    let dir = tempfile::tempdir().unwrap();
    let paths = DataPaths::new(dir.path());
    write(
        &paths.layer_geojson(),
        r#"{ "type": "FeatureCollection", "features": [
            { "type": "Feature", "properties": { "ID": "clinic_123_4" },
              "geometry": { "type": "Point", "coordinates": [-123.1, 49.2] } },
            { "type": "Feature", "properties": { "ID": "clinic" }, "geometry": null }
        ] }"#,
    );
    let job = paths.normalize_job();

    assert_eq!(normalize_identifiers(&job).unwrap(), NormalizeOutcome::Normalized(2));
    let once = fs::read(paths.layer_geojson()).unwrap();

    assert_eq!(normalize_identifiers(&job).unwrap(), NormalizeOutcome::AlreadyNormalized);
    let twice = fs::read(paths.layer_geojson()).unwrap();
    assert_eq!(once, twice);

    let layer = load_feature_collection(&paths.layer_geojson()).unwrap();
    assert_eq!(property(&layer.features[0], "ID"), Some(&json!("clinic_123")));
    assert_eq!(property(&layer.features[1], "ID"), Some(&json!("clinic")));
}

#[test]
fn test_normalize_identifiers_to_separate_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("layer.geojson");
    let output = dir.path().join("out").join("layer.geojson");
    let source = r#"{ "type": "FeatureCollection", "features": [
        { "type": "Feature", "properties": { "ID": "a_b_c" }, "geometry": null } ] }"#;
    write(&input, source);

    let job = chsa_etl::NormalizeJob {
        input: input.clone(),
        output: Some(output.clone()),
        column: "ID".to_string(),
    };
    normalize_identifiers(&job).unwrap();

    assert_eq!(fs::read_to_string(&input).unwrap(), source);
    let layer = load_feature_collection(&output).unwrap();
    assert_eq!(property(&layer.features[0], "ID"), Some(&json!("a_b")));
}
