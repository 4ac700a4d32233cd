use crate::pipeline::io_common::optional_numeric;
use crate::pipeline::*;

use calamine::{open_workbook, DataType, Range, Reader, Xlsx};
use log::debug;
use snafu::prelude::*;

/// Reads the actuals artifact back into a volume matrix.
pub fn read_actuals(path: &Path) -> PipelineResult<VolumeMatrix> {
    read_matrix_sheet(path, STATE_SUMMARY_SHEET)
}

/// Reads the forecast artifact back into a volume matrix.
pub fn read_forecast(path: &Path) -> PipelineResult<VolumeMatrix> {
    read_matrix_sheet(path, FORECAST_SHEET)
}

// Both artifacts share the same tabular layout: a region label column
// followed by one `YYYY-MM` column per month, with the reserved TOTAL and
// MEMBERSHIP rows at the bottom. The stored TOTAL row is not trusted; the
// totals are recomputed from the region rows as they are read.
fn read_matrix_sheet(path: &Path, sheet: &str) -> PipelineResult<VolumeMatrix> {
    let path_s = path.display().to_string();
    let mut workbook: Xlsx<_> =
        open_workbook(path).context(OpeningWorkbookSnafu { path: path_s.clone() })?;
    let wrange: Range<DataType> = workbook
        .worksheet_range(sheet)
        .context(MissingSheetSnafu {
            sheet: sheet.to_string(),
            path: path_s.clone(),
        })?
        .context(OpeningWorkbookSnafu { path: path_s })?;

    let mut rows = wrange.rows();
    let header = rows.next().context(EmptyWorkbookSnafu {
        path: path.display().to_string(),
    })?;
    let mut month_columns: Vec<(usize, Period)> = Vec::new();
    for (idx, cell) in header.iter().enumerate().skip(1) {
        if let DataType::String(s) = cell {
            if let Some(period) = Period::parse(s.trim()) {
                month_columns.push((idx, period));
            }
        }
    }
    debug!(
        "read_matrix_sheet: {} month columns in sheet {}",
        month_columns.len(),
        sheet
    );

    let all_periods: Vec<Period> = month_columns.iter().map(|(_, p)| *p).collect();
    let mut matrix = VolumeMatrix::with_periods(&all_periods);
    for row in rows {
        let label = match row.first() {
            Some(DataType::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => continue,
        };
        // Rows below the table (legend, methodology notes) carry no
        // numeric month cells and are ignored by the same filter.
        for (idx, period) in &month_columns {
            let value = row.get(*idx).and_then(optional_numeric);
            match label.as_str() {
                TOTAL_ROW => {}
                MEMBERSHIP_ROW => {
                    if let Some(v) = value {
                        matrix.set_membership(*period, v);
                    }
                }
                _ => {
                    if let Some(v) = value {
                        matrix.set_volume(&label, *period, v);
                    }
                }
            }
        }
    }
    Ok(matrix)
}
