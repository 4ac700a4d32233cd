use crate::pipeline::io_common::numeric_cell;
use crate::pipeline::*;

use calamine::{open_workbook, DataType, Reader, Xlsx};
use log::{debug, warn};
use snafu::prelude::*;

/// Reads the membership reference workbook. The sheet is keyed by category
/// in the first column, with a single `Total` row carrying the aggregate
/// and month columns in the compact `2023M08` code form. Only months
/// inside the configured range are returned.
pub fn read_membership(path: &str, periods: &[Period]) -> PipelineResult<Vec<(Period, f64)>> {
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningWorkbookSnafu {
        path: path.to_string(),
    })?;
    let wrange = workbook
        .worksheet_range_at(0)
        .context(EmptyWorkbookSnafu {
            path: path.to_string(),
        })?
        .context(OpeningWorkbookSnafu {
            path: path.to_string(),
        })?;
    let mut rows = wrange.rows();
    let header = rows.next().context(EmptyWorkbookSnafu {
        path: path.to_string(),
    })?;

    let mut month_columns: Vec<(usize, Period)> = Vec::new();
    for (idx, cell) in header.iter().enumerate().skip(1) {
        if let DataType::String(s) = cell {
            match parse_month_code(s) {
                Some(period) => month_columns.push((idx, period)),
                None => warn!("read_membership: unrecognized month code {:?}", s),
            }
        }
    }
    debug!("read_membership: {} month columns", month_columns.len());

    let total_row = rows
        .find(|row| {
            matches!(row.first(),
                Some(DataType::String(s)) if s.trim().eq_ignore_ascii_case("total"))
        })
        .context(MissingTotalRowSnafu {
            path: path.to_string(),
        })?;

    let mut res: Vec<(Period, f64)> = Vec::new();
    for (idx, period) in month_columns {
        if !periods.contains(&period) {
            continue;
        }
        if let Some(cell) = total_row.get(idx) {
            res.push((period, numeric_cell(cell)));
        }
    }
    Ok(res)
}

// Month codes like `2023M08`.
fn parse_month_code(s: &str) -> Option<Period> {
    let (year, month) = s.trim().split_once(['M', 'm'])?;
    Period::new(year.parse().ok()?, month.parse().ok()?)
}
