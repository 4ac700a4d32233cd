use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use volume_forecast::*;

use crate::pipeline::config_reader::*;

pub mod config_reader;
pub mod io_actuals;
pub mod io_common;
pub mod io_extract;
pub mod io_membership;
pub mod schema;
pub mod xlsx_out;

/// Sheet holding the aggregated actuals table.
pub const STATE_SUMMARY_SHEET: &str = "State Summary";
/// Sheet holding the chart source data and the chart itself.
pub const CHART_SHEET: &str = "Summary";
/// Sheet holding the annotated forecast table.
pub const FORECAST_SHEET: &str = "State Forecast";

#[derive(Debug, Snafu)]
pub enum PipelineError {
    #[snafu(display("Error opening workbook {path}"))]
    OpeningWorkbook {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Workbook {path} has no usable sheet"))]
    EmptyWorkbook { path: String },
    #[snafu(display("Sheet {sheet} is missing from {path}"))]
    MissingSheet { sheet: String, path: String },
    #[snafu(display("Required columns missing in {path}"))]
    MalformedExtract { path: String },
    #[snafu(display("No Total row found in membership reference {path}"))]
    MissingTotalRow { path: String },
    #[snafu(display(
        "Actuals artifact not found at {path}; run the actuals stage first"
    ))]
    MissingActuals { path: String },
    #[snafu(display("Error reading source directory {path}"))]
    ReadingSourceDir {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening configuration {path}"))]
    OpeningConfig {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing configuration {path}"))]
    ParsingConfig {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Invalid month {value} in configuration, expected YYYY-MM"))]
    InvalidPeriod { value: String },
    #[snafu(display("Error creating output directory {path}"))]
    CreatingOutputDir {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing artifact {path}"))]
    WritingArtifact {
        source: rust_xlsxwriter::XlsxError,
        path: String,
    },
    #[snafu(display("Error writing summary {path}"))]
    WritingSummary {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error reading reference summary {path}"))]
    OpeningSummary {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing summary JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Forecast engine failed"))]
    Engine { source: ForecastErrors },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// What the aggregation stage did, for the closing summary.
#[derive(Debug, Clone)]
pub struct ActualsReport {
    pub files_processed: usize,
    pub regions: usize,
    pub months: usize,
    pub output_file: PathBuf,
}

/// What the forecast stage did, for the closing summary.
#[derive(Debug, Clone)]
pub struct ForecastReport {
    pub latest_actual: Period,
    pub forecast_months: usize,
    pub skipped_months: usize,
    pub output_file: PathBuf,
}

/// Aggregation stage: scans the source directories for monthly extracts,
/// sums chart counts per state, attaches the membership reference and
/// writes the actuals artifact.
pub fn run_actuals(config: &PipelineConfig) -> PipelineResult<ActualsReport> {
    let (start, end) = config.period_range()?;
    let all_periods = Period::sequence(start, end);
    let mut builder = MatrixBuilder::new(start, end);

    let mut files_processed = 0usize;
    for dir in &config.source_dirs {
        let dir_path = Path::new(dir);
        if !dir_path.exists() {
            warn!("source directory not found: {}", dir);
            continue;
        }
        info!("processing files in {}", dir);
        let mut processed_here = 0usize;
        let entries = fs::read_dir(dir_path).context(ReadingSourceDirSnafu { path: dir.clone() })?;
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("unreadable entry in {}: {}", dir, e);
                    continue;
                }
            };
            let file_name = entry.file_name().to_string_lossy().to_string();
            let period = match extract_period(&file_name) {
                Some(p) if p >= start && p <= end => p,
                _ => continue,
            };
            let path = entry.path().display().to_string();
            match io_extract::read_extract(&path) {
                Ok(sums) => {
                    for (region, count) in sums {
                        builder.add_volume(&region, period, count);
                    }
                    processed_here += 1;
                }
                Err(e) => warn!("skipping {}: {}", path, e),
            }
        }
        info!("processed {} files from {}", processed_here, dir);
        files_processed += processed_here;
    }

    match io_membership::read_membership(&config.membership_file, &all_periods) {
        Ok(mem) => {
            for (period, value) in mem {
                builder.set_membership(period, value);
            }
        }
        Err(e) => {
            warn!(
                "membership reference unavailable ({}), using a zero-filled stand-in",
                e
            );
            for &period in &all_periods {
                builder.set_membership(period, 0.0);
            }
        }
    }

    let matrix = builder.build();
    fs::create_dir_all(&config.output_dir).context(CreatingOutputDirSnafu {
        path: config.output_dir.clone(),
    })?;
    let output_file = config.actuals_path();
    xlsx_out::write_actuals(&matrix, config.cycle_start_month(), &output_file)?;
    info!("actuals artifact written to {}", output_file.display());

    Ok(ActualsReport {
        files_processed,
        regions: matrix.regions().len(),
        months: matrix.periods().len(),
        output_file,
    })
}

/// Forecast stage: reads the actuals artifact back, classifies the months,
/// runs the engine and writes the annotated forecast artifact. With a
/// reference summary, the computed summary is checked against it.
pub fn run_forecast(
    config: &PipelineConfig,
    summary_out: Option<&Path>,
    reference: Option<&Path>,
) -> PipelineResult<ForecastReport> {
    let input = config.actuals_path();
    if !input.exists() {
        return Err(PipelineError::MissingActuals {
            path: input.display().to_string(),
        });
    }
    info!("reading actuals artifact {}", input.display());
    let mut matrix = io_actuals::read_actuals(&input)?;
    info!(
        "read {} regions over {} months",
        matrix.regions().len(),
        matrix.periods().len()
    );

    let rules = config.forecast_rules()?;
    let outcome = run_forecast_stats(&mut matrix, &rules).context(EngineSnafu {})?;
    for s in &outcome.skipped {
        let missing: Vec<String> = s.missing.iter().map(|p| p.to_string()).collect();
        warn!(
            "month {} left unforecast, reference months outside the known range: {}",
            s.period,
            missing.join(", ")
        );
    }

    fs::create_dir_all(&config.output_dir).context(CreatingOutputDirSnafu {
        path: config.output_dir.clone(),
    })?;
    let output_file = config.forecast_path();
    xlsx_out::write_forecast(&matrix, &outcome, rules.new_cycle_start, &output_file)?;
    info!("forecast artifact written to {}", output_file.display());

    let summary = build_summary_js(&matrix, &outcome);
    let pretty_summary = serde_json::to_string_pretty(&summary).context(ParsingJsonSnafu {})?;
    debug!("forecast summary: {}", pretty_summary);
    if let Some(out_path) = summary_out {
        fs::write(out_path, &pretty_summary).context(WritingSummarySnafu {
            path: out_path.display().to_string(),
        })?;
        info!("summary written to {}", out_path.display());
    }

    // The reference summary, if provided for comparison.
    if let Some(reference_path) = reference {
        let contents = fs::read_to_string(reference_path).context(OpeningSummarySnafu {
            path: reference_path.display().to_string(),
        })?;
        let reference_js: JSValue =
            serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
        let pretty_reference =
            serde_json::to_string_pretty(&reference_js).context(ParsingJsonSnafu {})?;
        if pretty_reference != pretty_summary {
            warn!("Found differences with the reference summary");
            print_diff(pretty_reference.as_str(), pretty_summary.as_ref(), "\n");
            whatever!("Difference detected between calculated summary and reference summary");
        }
    }

    Ok(ForecastReport {
        latest_actual: outcome.partition.latest_actual,
        forecast_months: outcome.forecasted.len(),
        skipped_months: outcome.skipped.len(),
        output_file,
    })
}

// The leading YYYY-MM of a monthly extract file name, if it has one.
fn extract_period(file_name: &str) -> Option<Period> {
    if !file_name.ends_with(".xlsx") {
        return None;
    }
    file_name.get(..7).and_then(Period::parse)
}

// Assembles the machine-readable run summary. Values are stringified so
// the reference comparison is not sensitive to float formatting.
fn build_summary_js(matrix: &VolumeMatrix, outcome: &ForecastOutcome) -> JSValue {
    let mut totals: JSMap<String, JSValue> = JSMap::new();
    for &period in matrix.periods() {
        let total = matrix.total(period).unwrap_or(0.0);
        totals.insert(period.to_string(), json!(total.to_string()));
    }
    let actual: Vec<String> = outcome
        .partition
        .actual
        .iter()
        .map(|p| p.to_string())
        .collect();
    let forecast: Vec<String> = outcome
        .forecasted
        .iter()
        .map(|f| f.period.to_string())
        .collect();
    let skipped: Vec<String> = outcome
        .skipped
        .iter()
        .map(|s| s.period.to_string())
        .collect();
    json!({
        "latestActual": outcome.partition.latest_actual.to_string(),
        "actualMonths": actual,
        "forecastMonths": forecast,
        "skippedMonths": skipped,
        "totals": totals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_xlsxwriter::Workbook;
    use tempfile::TempDir;

    fn p(s: &str) -> Period {
        Period::parse(s).unwrap()
    }

    fn test_config(root: &Path) -> PipelineConfig {
        let source_dir = root.join("Project2025");
        let config_js = json!({
            "sourceDirs": [source_dir.display().to_string()],
            "startPeriod": "2024-08",
            "endPeriod": "2025-10",
            "membershipFile": root.join("MEM_REF.xlsx").display().to_string(),
            "outputDir": root.join("output").display().to_string(),
            "newCycleStart": "2025-08",
            "cycleStartMonth": 8,
            "sampleRegions": ["TX"],
        });
        serde_json::from_value(config_js).unwrap()
    }

    // One monthly extract with the loosely named columns seen in the wild.
    fn write_extract(path: &Path, rows: &[(&str, &str, f64)]) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write(0, 0, "Ret_Vendor").unwrap();
        sheet.write(0, 1, "Chart Count").unwrap();
        sheet.write(0, 2, "State").unwrap();
        for (idx, (vendor, state, count)) in rows.iter().enumerate() {
            let row = (idx + 1) as u32;
            sheet.write(row, 0, *vendor).unwrap();
            sheet.write(row, 1, *count).unwrap();
            sheet.write(row, 2, *state).unwrap();
        }
        workbook.save(path).unwrap();
    }

    fn write_membership(path: &Path, cells: &[(&str, f64)]) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write(0, 0, "Category").unwrap();
        for (idx, (code, _)) in cells.iter().enumerate() {
            sheet.write(0, (idx + 1) as u16, *code).unwrap();
        }
        sheet.write(1, 0, "Total").unwrap();
        for (idx, (_, value)) in cells.iter().enumerate() {
            sheet.write(1, (idx + 1) as u16, *value).unwrap();
        }
        workbook.save(path).unwrap();
    }

    fn seed_sources(root: &Path) {
        let source_dir = root.join("Project2025");
        fs::create_dir_all(&source_dir).unwrap();
        write_extract(
            &source_dir.join("2024-08_charts.xlsx"),
            &[
                ("VendorA", "TX", 120.0),
                ("VendorB", "TX", 80.0),
                ("VendorA", "AL", 50.0),
            ],
        );
        write_extract(
            &source_dir.join("2025-07_charts.xlsx"),
            &[("VendorA", "TX", 150.0), ("VendorA", "AL", 60.0)],
        );
        // A file with an unrecognizable shape is skipped, not fatal.
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write(0, 0, "Nothing useful").unwrap();
        workbook.save(source_dir.join("2025-06_other.xlsx")).unwrap();

        write_membership(
            &root.join("MEM_REF.xlsx"),
            &[("2024M08", 1000.0), ("2025M07", 1100.0)],
        );
    }

    #[test]
    fn extract_period_matches_file_names() {
        assert_eq!(extract_period("2025-01_charts.xlsx"), Some(p("2025-01")));
        assert_eq!(extract_period("2025-01.xlsx"), Some(p("2025-01")));
        assert_eq!(extract_period("notes-2025.xlsx"), None);
        assert_eq!(extract_period("2025-01_charts.csv"), None);
    }

    #[test]
    fn actuals_stage_aggregates_and_degrades() {
        let tmp = TempDir::new().unwrap();
        seed_sources(tmp.path());
        let config = test_config(tmp.path());

        let report = run_actuals(&config).unwrap();
        // The malformed extract is skipped with a warning.
        assert_eq!(report.files_processed, 2);
        assert_eq!(report.regions, 2);
        assert_eq!(report.months, 15);
        assert!(report.output_file.exists());

        let matrix = io_actuals::read_actuals(&report.output_file).unwrap();
        assert_eq!(matrix.volume("TX", p("2024-08")), Some(200.0));
        assert_eq!(matrix.volume("AL", p("2024-08")), Some(50.0));
        assert_eq!(matrix.total(p("2024-08")), Some(250.0));
        assert_eq!(matrix.membership(p("2025-07")), Some(1100.0));
    }

    #[test]
    fn actuals_stage_without_membership_reference() {
        let tmp = TempDir::new().unwrap();
        seed_sources(tmp.path());
        fs::remove_file(tmp.path().join("MEM_REF.xlsx")).unwrap();
        let config = test_config(tmp.path());

        let report = run_actuals(&config).unwrap();
        assert!(report.output_file.exists());

        let matrix = io_actuals::read_actuals(&report.output_file).unwrap();
        // The stand-in membership row is written as zeros.
        assert_eq!(matrix.membership(p("2025-07")), Some(0.0));
    }

    #[test]
    fn forecast_stage_fills_the_new_cycle_month() {
        let tmp = TempDir::new().unwrap();
        seed_sources(tmp.path());
        let config = test_config(tmp.path());

        run_actuals(&config).unwrap();
        let summary_path = tmp.path().join("summary.json");
        let report = run_forecast(&config, Some(&summary_path), None).unwrap();

        assert_eq!(report.latest_actual, p("2025-07"));
        assert!(report.output_file.exists());

        let matrix = io_actuals::read_forecast(&report.output_file).unwrap();
        // New cycle month: 200 * (1100 / 1000) = 220 for TX, 55 for AL.
        assert_eq!(matrix.volume("TX", p("2025-08")), Some(220.0));
        assert_eq!(matrix.volume("AL", p("2025-08")), Some(55.0));
        assert_eq!(matrix.total(p("2025-08")), Some(275.0));

        let summary: JSValue =
            serde_json::from_str(&fs::read_to_string(&summary_path).unwrap()).unwrap();
        assert_eq!(summary["latestActual"], json!("2025-07"));
        assert!(summary["forecastMonths"]
            .as_array()
            .unwrap()
            .contains(&json!("2025-08")));
    }

    #[test]
    fn forecast_stage_is_idempotent_over_the_artifact() {
        let tmp = TempDir::new().unwrap();
        seed_sources(tmp.path());
        let config = test_config(tmp.path());

        run_actuals(&config).unwrap();
        let first = run_forecast(&config, None, None).unwrap();
        assert!(first.forecast_months > 0);

        // Run the engine again over the artifact the first run produced.
        let mut matrix = io_actuals::read_forecast(&first.output_file).unwrap();
        let rules = config.forecast_rules().unwrap();
        let snapshot = matrix.clone();
        let second = run_forecast_stats(&mut matrix, &rules).unwrap();

        assert_eq!(matrix, snapshot);
        assert!(second.partition.actual.contains(&p("2025-08")));
    }

    #[test]
    fn forecast_stage_requires_the_actuals_artifact() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        let res = run_forecast(&config, None, None);
        assert!(matches!(res, Err(PipelineError::MissingActuals { .. })));
    }

    #[test]
    fn reference_check_passes_on_own_summary() {
        let tmp = TempDir::new().unwrap();
        seed_sources(tmp.path());
        let config = test_config(tmp.path());

        run_actuals(&config).unwrap();
        let summary_path = tmp.path().join("summary.json");
        run_forecast(&config, Some(&summary_path), None).unwrap();
        // A second run checked against the first run's summary must agree.
        run_forecast(&config, None, Some(&summary_path)).unwrap();
    }
}
