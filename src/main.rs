use std::path::PathBuf;

use chsa_etl::{
    aggregate_physicians, convert_shapefile, convert_spreadsheet, normalize_identifiers, run_pipeline, DataPaths,
    EtlError, NormalizeOutcome, UnknownRegionPolicy,
};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let data_dir = Arg::new("data-dir")
        .long("data-dir")
        .global(true)
        .default_value(chsa_etl::config::DEFAULT_DATA_DIR)
        .help("Directory holding the CHSA and clinic data files");
    let input = Arg::new("input")
        .short('i')
        .long("input")
        .num_args(1)
        .help("Input file (defaults to the data directory layout)");
    let output = Arg::new("output")
        .short('o')
        .long("output")
        .num_args(1)
        .help("Output file (defaults to the data directory layout)");
    let skip_unknown = Arg::new("skip-unknown-regions")
        .long("skip-unknown-regions")
        .action(ArgAction::SetTrue)
        .help("Warn about and skip clinic rows whose CHSA is not in the region file");

    Command::new("CHSA ETL")
        .version("1.0")
        .author("Jesper Fjellin")
        .about("Converts CHSA boundaries and clinic lists to GeoJSON and computes physicians per capita")
        .subcommand_required(true)
        .arg(data_dir)
        .subcommand(
            Command::new("shp-to-geojson")
                .about("Convert a shapefile to GeoJSON in EPSG:4326")
                .arg(input.clone())
                .arg(output.clone())
                .arg(
                    Arg::new("source-crs")
                        .long("source-crs")
                        .num_args(1)
                        .help("CRS of the shapefile (read from the .prj file if omitted)"),
                )
                .arg(
                    Arg::new("target-crs")
                        .long("target-crs")
                        .num_args(1)
                        .help("CRS to write (default EPSG:4326)"),
                ),
        )
        .subcommand(
            Command::new("excel-to-geojson")
                .about("Convert the first sheet of a workbook to GeoJSON points")
                .arg(input.clone())
                .arg(output.clone())
                .arg(Arg::new("lon-column").long("lon-column").num_args(1).help("Longitude column"))
                .arg(Arg::new("lat-column").long("lat-column").num_args(1).help("Latitude column")),
        )
        .subcommand(
            Command::new("aggregate")
                .about("Add NUM_PHYS and PHYS_CAPITA to every CHSA")
                .arg(Arg::new("regions").long("regions").num_args(1).help("CHSA GeoJSON file"))
                .arg(Arg::new("clinics").long("clinics").num_args(1).help("Clinic list workbook"))
                .arg(output.clone())
                .arg(skip_unknown.clone()),
        )
        .subcommand(
            Command::new("normalize-ids")
                .about("Strip the trailing _segment from every feature ID")
                .arg(input)
                .arg(output)
                .arg(Arg::new("column").long("column").num_args(1).help("Identifier column (default ID)")),
        )
        .subcommand(
            Command::new("pipeline")
                .about("Run shp-to-geojson, excel-to-geojson and aggregate in order")
                .arg(skip_unknown),
        )
}

fn path_arg(matches: &ArgMatches, name: &str) -> Option<PathBuf> {
    matches.get_one::<String>(name).map(PathBuf::from)
}

fn string_arg(matches: &ArgMatches, name: &str) -> Option<String> {
    matches.get_one::<String>(name).cloned()
}

fn policy(matches: &ArgMatches) -> UnknownRegionPolicy {
    if matches.get_flag("skip-unknown-regions") {
        UnknownRegionPolicy::SkipAndWarn
    } else {
        UnknownRegionPolicy::Fail
    }
}

fn run(matches: &ArgMatches) -> Result<(), EtlError> {
    let paths = DataPaths::new(
        matches
            .get_one::<String>("data-dir")
            .map(String::as_str)
            .unwrap_or(chsa_etl::config::DEFAULT_DATA_DIR),
    );

    match matches.subcommand() {
        Some(("shp-to-geojson", sub)) => {
            let mut job = paths.shapefile_job();
            job.input = path_arg(sub, "input").unwrap_or(job.input);
            job.output = path_arg(sub, "output").unwrap_or(job.output);
            job.source_crs = string_arg(sub, "source-crs");
            job.target_crs = string_arg(sub, "target-crs").unwrap_or(job.target_crs);
            convert_shapefile(&job)
        }
        Some(("excel-to-geojson", sub)) => {
            let mut job = paths.spreadsheet_job();
            job.input = path_arg(sub, "input").unwrap_or(job.input);
            job.output = path_arg(sub, "output").unwrap_or(job.output);
            job.longitude_column = string_arg(sub, "lon-column").unwrap_or(job.longitude_column);
            job.latitude_column = string_arg(sub, "lat-column").unwrap_or(job.latitude_column);
            convert_spreadsheet(&job)
        }
        Some(("aggregate", sub)) => {
            let mut job = paths.aggregate_job();
            job.regions = path_arg(sub, "regions").unwrap_or(job.regions);
            job.providers = path_arg(sub, "clinics").unwrap_or(job.providers);
            job.output = path_arg(sub, "output");
            job.policy = policy(sub);
            let summary = aggregate_physicians(&job)?;
            if !summary.skipped_unknown.is_empty() {
                info!("Skipped unknown regions: {}", summary.skipped_unknown.join(", "));
            }
            Ok(())
        }
        Some(("normalize-ids", sub)) => {
            let mut job = paths.normalize_job();
            job.input = path_arg(sub, "input").unwrap_or(job.input);
            job.output = path_arg(sub, "output");
            job.column = string_arg(sub, "column").unwrap_or(job.column);
            if normalize_identifiers(&job)? == NormalizeOutcome::AlreadyNormalized {
                info!("Nothing to do for {}", job.input.display());
            }
            Ok(())
        }
        Some(("pipeline", sub)) => run_pipeline(&paths, policy(sub)).map(|_| ()),
        _ => unreachable!("a subcommand is required"),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();

    match run(&matches) {
        Ok(()) => info!("Processing completed successfully"),
        Err(e) => {
            error!("Error processing files: {}", e);
            if let EtlError::ProjCreate(_) = e {
                eprintln!("Please check the source CRS (--source-crs or the .prj file).");
            }
            std::process::exit(1);
        }
    }
}
