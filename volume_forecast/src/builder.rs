pub use crate::config::*;
use crate::VolumeMatrix;

use std::collections::BTreeMap;

/// Incremental construction of a volume matrix during aggregation.
///
/// Volumes accumulate, since several source directories may contribute to
/// the same region and month.
///
/// ```
/// pub use volume_forecast::builder::MatrixBuilder;
/// pub use volume_forecast::Period;
///
/// let start = Period::parse("2024-01").unwrap();
/// let end = Period::parse("2024-03").unwrap();
/// let jan = Period::parse("2024-01").unwrap();
///
/// let mut builder = MatrixBuilder::new(start, end);
/// builder.add_volume("TX", jan, 80.0);
/// builder.add_volume("TX", jan, 40.0);
/// builder.set_membership(jan, 1000.0);
///
/// let matrix = builder.build();
/// assert_eq!(matrix.total(jan), Some(120.0));
/// ```
pub struct MatrixBuilder {
    periods: Vec<Period>,
    volumes: BTreeMap<String, BTreeMap<Period, f64>>,
    membership: BTreeMap<Period, f64>,
}

impl MatrixBuilder {
    /// A builder covering the full configured month range. Every month in
    /// the range becomes a column of the built matrix, filled or not.
    pub fn new(start: Period, end: Period) -> MatrixBuilder {
        MatrixBuilder {
            periods: Period::sequence(start, end),
            volumes: BTreeMap::new(),
            membership: BTreeMap::new(),
        }
    }

    /// Adds counts for one region and month, accumulating with anything
    /// already recorded for that cell.
    pub fn add_volume(&mut self, region: &str, period: Period, count: f64) {
        *self
            .volumes
            .entry(region.to_string())
            .or_default()
            .entry(period)
            .or_insert(0.0) += count;
    }

    pub fn set_membership(&mut self, period: Period, value: f64) {
        self.membership.insert(period, value);
    }

    /// Builds the matrix, with a total computed for every month of the
    /// configured range. Months nothing was recorded for get a zero total.
    pub fn build(self) -> VolumeMatrix {
        let mut matrix = VolumeMatrix::with_periods(&self.periods);
        for (region, cells) in self.volumes {
            for (period, value) in cells {
                matrix.set_volume(&region, period, value);
            }
        }
        for (period, value) in self.membership {
            matrix.set_membership(period, value);
        }
        for period in matrix.periods().to_vec() {
            if matrix.total(period).is_none() {
                matrix.recompute_total(period);
            }
        }
        matrix
    }
}
