use crate::pipeline::*;

use log::debug;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

const DEFAULT_ACTUALS_FILE: &str = "Market_Volume_Actuals.xlsx";
const DEFAULT_FORECAST_FILE: &str = "Market_Volume_Forecast.xlsx";

// The first month of an annual cycle when the configuration says nothing.
const DEFAULT_CYCLE_START_MONTH: u32 = 8;

/// One run's configuration, read from a JSON file. Month fields are kept
/// as strings and validated through the accessors.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(rename = "sourceDirs")]
    pub source_dirs: Vec<String>,
    #[serde(rename = "startPeriod")]
    _start_period: String,
    #[serde(rename = "endPeriod")]
    _end_period: String,
    #[serde(rename = "membershipFile")]
    pub membership_file: String,
    #[serde(rename = "outputDir")]
    pub output_dir: String,
    #[serde(rename = "actualsFile")]
    pub actuals_file: Option<String>,
    #[serde(rename = "forecastFile")]
    pub forecast_file: Option<String>,
    #[serde(rename = "newCycleStart")]
    _new_cycle_start: Option<String>,
    #[serde(rename = "cycleStartMonth")]
    _cycle_start_month: Option<u32>,
    #[serde(rename = "sampleRegions")]
    pub sample_regions: Option<Vec<String>>,
}

impl PipelineConfig {
    /// The configured month range, validated.
    pub fn period_range(&self) -> PipelineResult<(Period, Period)> {
        let start = parse_period(&self._start_period)?;
        let end = parse_period(&self._end_period)?;
        if end < start {
            whatever!(
                "endPeriod {} precedes startPeriod {}",
                self._end_period,
                self._start_period
            );
        }
        Ok((start, end))
    }

    pub fn new_cycle_start(&self) -> PipelineResult<Option<Period>> {
        match &self._new_cycle_start {
            Some(s) => Ok(Some(parse_period(s)?)),
            None => Ok(None),
        }
    }

    /// The month that opens each annual cycle, used for color banding.
    pub fn cycle_start_month(&self) -> u32 {
        self._cycle_start_month.unwrap_or(DEFAULT_CYCLE_START_MONTH)
    }

    pub fn forecast_rules(&self) -> PipelineResult<ForecastRules> {
        Ok(ForecastRules {
            new_cycle_start: self.new_cycle_start()?,
            sample_regions: self.sample_regions.clone().unwrap_or_default(),
        })
    }

    pub fn actuals_path(&self) -> PathBuf {
        let name = self
            .actuals_file
            .clone()
            .unwrap_or_else(|| DEFAULT_ACTUALS_FILE.to_string());
        Path::new(&self.output_dir).join(name)
    }

    pub fn forecast_path(&self) -> PathBuf {
        let name = self
            .forecast_file
            .clone()
            .unwrap_or_else(|| DEFAULT_FORECAST_FILE.to_string());
        Path::new(&self.output_dir).join(name)
    }
}

pub fn read_config(path: &str) -> PipelineResult<PipelineConfig> {
    let contents = fs::read_to_string(path).context(OpeningConfigSnafu {
        path: path.to_string(),
    })?;
    let config: PipelineConfig = serde_json::from_str(contents.as_str())
        .context(ParsingConfigSnafu {
            path: path.to_string(),
        })?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

fn parse_period(s: &str) -> PipelineResult<Period> {
    Period::parse(s).context(InvalidPeriodSnafu {
        value: s.to_string(),
    })
}
