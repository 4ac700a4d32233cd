// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

use chrono::{Datelike, Months, NaiveDate};

/// Reserved row label: the sum of all ordinary regions for a month.
pub const TOTAL_ROW: &str = "TOTAL";

/// Reserved row label: externally supplied membership counts. Used only as
/// a ratio input, never forecast.
pub const MEMBERSHIP_ROW: &str = "MEMBERSHIP";

/// A calendar month, the time axis of the volume matrix.
///
/// Internally pinned to the first day of the month so that the usual date
/// ordering and month arithmetic apply.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct Period(NaiveDate);

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Period> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Period)
    }

    /// Parses the `YYYY-MM` form used in file names and column headers.
    pub fn parse(s: &str) -> Option<Period> {
        let (y, m) = s.split_once('-')?;
        Period::new(y.trim().parse().ok()?, m.trim().parse().ok()?)
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn prev(&self) -> Option<Period> {
        self.months_back(1)
    }

    pub fn next(&self) -> Option<Period> {
        self.0.checked_add_months(Months::new(1)).map(Period)
    }

    pub fn months_back(&self, months: u32) -> Option<Period> {
        self.0.checked_sub_months(Months::new(months)).map(Period)
    }

    /// The same month one year earlier.
    pub fn year_ago(&self) -> Option<Period> {
        self.months_back(12)
    }

    /// All months from `start` to `end`, inclusive, in chronological order.
    pub fn sequence(start: Period, end: Period) -> Vec<Period> {
        let mut res: Vec<Period> = Vec::new();
        let mut cur = start;
        while cur <= end {
            res.push(cur);
            match cur.next() {
                Some(n) => cur = n,
                None => break,
            }
        }
        res
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}", self.0.year(), self.0.month())
    }
}

// ******** Output data structures *********

/// The chronological partition of the matrix columns, derived from the
/// TOTAL row: a month with an absent or zero total needs forecasting.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PeriodPartition {
    pub actual: Vec<Period>,
    pub to_forecast: Vec<Period>,
    /// The last month backed by source data.
    pub latest_actual: Period,
}

/// Which projection formula filled a month.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ForecastPolicy {
    /// Previous month plus last year's month-over-month change, scaled by
    /// membership growth.
    Standard,
    /// Same month last year scaled by membership growth. Applied only to
    /// the configured start of a new annual cycle, which has no usable
    /// predecessor month in the new cycle.
    NewCycle,
}

/// One month filled by the engine.
#[derive(PartialEq, Debug, Clone)]
pub struct PeriodForecast {
    pub period: Period,
    pub policy: ForecastPolicy,
    pub membership_ratio: f64,
}

/// A month left untouched because some of its reference months fall outside
/// the known period range.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SkippedPeriod {
    pub period: Period,
    pub missing: Vec<Period>,
}

/// Everything a single engine run produced. This is the only channel for
/// per-run state; the engine keeps nothing global between runs.
#[derive(PartialEq, Debug, Clone)]
pub struct ForecastOutcome {
    pub partition: PeriodPartition,
    pub forecasted: Vec<PeriodForecast>,
    pub skipped: Vec<SkippedPeriod>,
}

/// Errors that prevent a forecast run from completing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ForecastErrors {
    EmptyMatrix,
    NoBaseline,
}

impl Error for ForecastErrors {}

impl Display for ForecastErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForecastErrors::EmptyMatrix => write!(f, "the volume matrix has no month columns"),
            ForecastErrors::NoBaseline => {
                write!(f, "no month with actual data to extrapolate from")
            }
        }
    }
}

// ********* Configuration **********

/// The rules that govern one forecast run.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ForecastRules {
    /// The single month that starts a new annual cycle and is projected
    /// with [ForecastPolicy::NewCycle]. None disables the special case.
    pub new_cycle_start: Option<Period>,
    /// Regions whose per-cell arithmetic is logged at info level.
    pub sample_regions: Vec<String>,
}

impl ForecastRules {
    pub const DEFAULT_RULES: ForecastRules = ForecastRules {
        new_cycle_start: None,
        sample_regions: Vec::new(),
    };
}
