pub mod builder;
mod config;

use log::{debug, info, warn};

use std::collections::BTreeMap;

pub use crate::builder::MatrixBuilder;
pub use crate::config::*;

// **** Central data structure ****

/// Per-region monthly chart volumes, plus the reserved TOTAL and
/// MEMBERSHIP rows.
///
/// A cell that was never written is distinct from a cell holding zero.
/// Invariant: after any mutation of an ordinary region's cell, the total
/// for that month equals the sum of all ordinary regions for that month.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct VolumeMatrix {
    // Chronologically sorted, no duplicates.
    periods: Vec<Period>,
    // Ordinary regions only. The map is ordered so that iteration over
    // regions is deterministic.
    volumes: BTreeMap<String, BTreeMap<Period, f64>>,
    totals: BTreeMap<Period, f64>,
    membership: BTreeMap<Period, f64>,
}

impl VolumeMatrix {
    pub fn new() -> VolumeMatrix {
        VolumeMatrix::default()
    }

    pub fn with_periods(periods: &[Period]) -> VolumeMatrix {
        let mut m = VolumeMatrix::new();
        for &p in periods {
            m.ensure_period(p);
        }
        m
    }

    /// The known month columns, chronologically sorted.
    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    /// The ordinary regions discovered so far, in sorted order.
    pub fn regions(&self) -> Vec<String> {
        self.volumes.keys().cloned().collect()
    }

    pub fn has_period(&self, period: Period) -> bool {
        self.periods.binary_search(&period).is_ok()
    }

    /// Adds a month column if it is not already known, keeping the column
    /// set sorted. Idempotent.
    pub fn ensure_period(&mut self, period: Period) {
        if let Err(pos) = self.periods.binary_search(&period) {
            self.periods.insert(pos, period);
        }
    }

    pub fn volume(&self, region: &str, period: Period) -> Option<f64> {
        self.volumes.get(region).and_then(|r| r.get(&period)).copied()
    }

    /// Writes an ordinary region's cell and restores the total for that
    /// month. Creates the region row and the month column as needed.
    pub fn set_volume(&mut self, region: &str, period: Period, value: f64) {
        self.ensure_period(period);
        self.volumes
            .entry(region.to_string())
            .or_default()
            .insert(period, value);
        self.recompute_total(period);
    }

    pub fn total(&self, period: Period) -> Option<f64> {
        self.totals.get(&period).copied()
    }

    pub fn membership(&self, period: Period) -> Option<f64> {
        self.membership.get(&period).copied()
    }

    pub fn set_membership(&mut self, period: Period, value: f64) {
        self.ensure_period(period);
        self.membership.insert(period, value);
    }

    /// Recomputes the total for one month as the sum over ordinary
    /// regions, treating absent cells as zero.
    pub(crate) fn recompute_total(&mut self, period: Period) -> f64 {
        let total: f64 = self
            .volumes
            .values()
            .filter_map(|r| r.get(&period))
            .sum();
        self.totals.insert(period, total);
        total
    }
}

// **** Month classification ****

/// Partitions the matrix columns into actual months and months that need
/// forecasting, using the TOTAL row as the source of truth. A month whose
/// total is absent or exactly zero needs forecasting.
pub fn classify_periods(matrix: &VolumeMatrix) -> Result<PeriodPartition, ForecastErrors> {
    if matrix.periods().is_empty() {
        return Err(ForecastErrors::EmptyMatrix);
    }
    let mut actual: Vec<Period> = Vec::new();
    let mut to_forecast: Vec<Period> = Vec::new();
    for &period in matrix.periods() {
        match matrix.total(period) {
            Some(t) if t != 0.0 => actual.push(period),
            _ => to_forecast.push(period),
        }
    }
    let latest_actual = match actual.last() {
        Some(p) => *p,
        None => return Err(ForecastErrors::NoBaseline),
    };
    info!(
        "classify_periods: latest month with actual data: {}",
        latest_actual
    );
    info!(
        "classify_periods: {} months to forecast",
        to_forecast.len()
    );
    Ok(PeriodPartition {
        actual,
        to_forecast,
        latest_actual,
    })
}

// **** Forecast engine ****

/// Runs the forecast engine over the matrix with the given rules.
///
/// Months that need forecasting are processed in chronological order, so a
/// later month can read values that an earlier month just produced. After
/// each month is filled for every region, its total is restored before the
/// next month is processed.
///
/// Arguments:
/// * `matrix` the actuals matrix; filled in place
/// * `rules` the rules that govern this run
pub fn run_forecast_stats(
    matrix: &mut VolumeMatrix,
    rules: &ForecastRules,
) -> Result<ForecastOutcome, ForecastErrors> {
    let partition = classify_periods(matrix)?;
    info!(
        "run_forecast_stats: processing {} months over {} regions",
        partition.to_forecast.len(),
        matrix.regions().len()
    );

    let mut forecasted: Vec<PeriodForecast> = Vec::new();
    let mut skipped: Vec<SkippedPeriod> = Vec::new();
    for &target in partition.to_forecast.iter() {
        let res = if rules.new_cycle_start == Some(target) {
            forecast_new_cycle(matrix, target, partition.latest_actual, &rules.sample_regions)
        } else {
            forecast_standard(matrix, target, &rules.sample_regions)
        };
        match res {
            Ok(pf) => {
                info!(
                    "run_forecast_stats: total forecast for {}: {}",
                    target,
                    matrix.total(target).unwrap_or(0.0)
                );
                forecasted.push(pf);
            }
            Err(missing) => {
                warn!(
                    "run_forecast_stats: missing reference months for {}, skipping",
                    target
                );
                skipped.push(SkippedPeriod {
                    period: target,
                    missing,
                });
            }
        }
    }
    Ok(ForecastOutcome {
        partition,
        forecasted,
        skipped,
    })
}

// Resolves a reference month relative to the target. A month that exists
// on the calendar but not in the matrix's known range is recorded in
// `missing` so the caller can report why the target was skipped.
fn resolve_reference(
    matrix: &VolumeMatrix,
    target: Period,
    months_back: u32,
    missing: &mut Vec<Period>,
) -> Option<Period> {
    match target.months_back(months_back) {
        Some(p) if matrix.has_period(p) => Some(p),
        Some(p) => {
            missing.push(p);
            None
        }
        None => None,
    }
}

// Membership growth ratio between two months. An absent or zero
// denominator yields 1.0 (no adjustment); an absent numerator counts as
// zero, like any other missing cell.
fn membership_ratio(matrix: &VolumeMatrix, numerator: Period, denominator: Period) -> f64 {
    let d = matrix.membership(denominator).unwrap_or(0.0);
    if d == 0.0 {
        return 1.0;
    }
    matrix.membership(numerator).unwrap_or(0.0) / d
}

// Standard policy: previous month plus last year's month-over-month
// change, scaled by membership growth. Needs three reference months; if
// any of them is outside the known range the whole month is skipped.
fn forecast_standard(
    matrix: &mut VolumeMatrix,
    target: Period,
    sample_regions: &[String],
) -> Result<PeriodForecast, Vec<Period>> {
    let mut missing: Vec<Period> = Vec::new();
    let prev = resolve_reference(matrix, target, 1, &mut missing);
    let same_month_last_year = resolve_reference(matrix, target, 12, &mut missing);
    let prev_of_last_year = resolve_reference(matrix, target, 13, &mut missing);
    let (prev, same_month_last_year, prev_of_last_year) =
        match (prev, same_month_last_year, prev_of_last_year) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => return Err(missing),
        };

    let ratio = membership_ratio(matrix, prev, same_month_last_year);
    info!(
        "forecasting {} from {}, {} and {} with membership ratio {:.4}",
        target, prev, same_month_last_year, prev_of_last_year, ratio
    );

    for region in matrix.regions() {
        let current = matrix.volume(&region, prev);
        let last_year = matrix.volume(&region, same_month_last_year);
        let last_year_prev = matrix.volume(&region, prev_of_last_year);
        let value = match (current, last_year, last_year_prev) {
            (Some(cur), Some(ly), Some(lyp)) => {
                let last_year_change = ly - lyp;
                (cur + last_year_change * ratio).max(0.0).round()
            }
            _ => {
                debug!("missing cell for {} in {}, using zero", region, target);
                0.0
            }
        };
        if sample_regions.iter().any(|s| s == &region) {
            info!(
                "{} {}: {:?} + ({:?} - {:?}) * {:.4} = {}",
                region, target, current, last_year, last_year_prev, ratio, value
            );
        }
        matrix.set_volume(&region, target, value);
    }
    Ok(PeriodForecast {
        period: target,
        policy: ForecastPolicy::Standard,
        membership_ratio: ratio,
    })
}

// New-cycle policy: the first month of a new annual cycle has no usable
// predecessor in the new cycle, so it is projected from the same month one
// year earlier, scaled by the membership growth observed up to the latest
// actual month.
fn forecast_new_cycle(
    matrix: &mut VolumeMatrix,
    target: Period,
    latest_actual: Period,
    sample_regions: &[String],
) -> Result<PeriodForecast, Vec<Period>> {
    let mut missing: Vec<Period> = Vec::new();
    let same_month_last_year = match resolve_reference(matrix, target, 12, &mut missing) {
        Some(p) => p,
        None => return Err(missing),
    };

    let ratio = membership_ratio(matrix, latest_actual, same_month_last_year);
    info!(
        "new cycle: forecasting {} from {} with membership adjustment {:.4}",
        target, same_month_last_year, ratio
    );

    for region in matrix.regions() {
        let value = match matrix.volume(&region, same_month_last_year) {
            Some(base) => (base * ratio).max(0.0).round(),
            None => {
                debug!("missing cell for {} in {}, using zero", region, target);
                0.0
            }
        };
        if sample_regions.iter().any(|s| s == &region) {
            info!(
                "{} {}: {:?} * {:.4} = {}",
                region,
                target,
                matrix.volume(&region, same_month_last_year),
                ratio,
                value
            );
        }
        matrix.set_volume(&region, target, value);
    }
    Ok(PeriodForecast {
        period: target,
        policy: ForecastPolicy::NewCycle,
        membership_ratio: ratio,
    })
}
