use crate::pipeline::*;

use chrono::Local;
use snafu::prelude::*;
use rust_xlsxwriter::{
    Chart, ChartLine, ChartType, Color, Format, FormatBorder, Workbook, XlsxError,
};

// Fills for the annual-cycle banding on the actuals sheet, reused in
// rotation, one per cycle year.
const CYCLE_FILLS: &[u32] = &[0xFFF2CC, 0xD9EAD3, 0xD0E0E3, 0xF4CCCC];

const HEADER_FILL: u32 = 0xD9E1F2;
const MEMBERSHIP_FILL: u32 = 0xEEEEEE;
const ACTUAL_FILL: u32 = 0xD9EAD3;
const FORECAST_FILL: u32 = 0xFCE4D6;
const NEW_CYCLE_FILL: u32 = 0xD0E0E3;
const TOTAL_ACTUAL_FILL: u32 = 0xB6D7A8;
const TOTAL_FORECAST_FILL: u32 = 0xF9CB9C;
const TOTAL_NEW_CYCLE_FILL: u32 = 0x9FC5E8;

const LABEL_COLUMN_WIDTH: f64 = 20.0;
const MONTH_COLUMN_WIDTH: f64 = 12.0;

/// Writes the actuals artifact: the aggregated table banded by annual
/// cycle, plus a sheet charting total volume over time.
pub fn write_actuals(
    matrix: &VolumeMatrix,
    cycle_start_month: u32,
    path: &Path,
) -> PipelineResult<()> {
    let path_s = path.display().to_string();
    let mut workbook = Workbook::new();
    write_summary_sheet(&mut workbook, matrix, cycle_start_month)
        .context(WritingArtifactSnafu {
            path: path_s.clone(),
        })?;
    write_chart_sheet(&mut workbook, matrix).context(WritingArtifactSnafu {
        path: path_s.clone(),
    })?;
    workbook
        .save(path)
        .context(WritingArtifactSnafu { path: path_s })?;
    Ok(())
}

/// Writes the forecast artifact: the same table annotated so that actual,
/// forecast and new-cycle cells are visually distinct, with a legend and a
/// description of the formulas used.
pub fn write_forecast(
    matrix: &VolumeMatrix,
    outcome: &ForecastOutcome,
    new_cycle_start: Option<Period>,
    path: &Path,
) -> PipelineResult<()> {
    let path_s = path.display().to_string();
    let mut workbook = Workbook::new();
    write_forecast_sheet(&mut workbook, matrix, outcome, new_cycle_start).context(
        WritingArtifactSnafu {
            path: path_s.clone(),
        },
    )?;
    workbook
        .save(path)
        .context(WritingArtifactSnafu { path: path_s })?;
    Ok(())
}

fn month_format(fill: u32) -> Format {
    Format::new().set_background_color(fill).set_num_format("#,##0")
}

fn write_summary_sheet(
    workbook: &mut Workbook,
    matrix: &VolumeMatrix,
    cycle_start_month: u32,
) -> Result<(), XlsxError> {
    let sheet = workbook.add_worksheet();
    sheet.set_name(STATE_SUMMARY_SHEET)?;

    let header_format = Format::new().set_bold().set_background_color(HEADER_FILL);
    let membership_format = Format::new()
        .set_italic()
        .set_bold()
        .set_background_color(MEMBERSHIP_FILL)
        .set_num_format("#,##0");

    let periods = matrix.periods();
    sheet.write_with_format(0, 0, "State", &header_format)?;
    for (idx, &period) in periods.iter().enumerate() {
        sheet.write_with_format(0, (idx + 1) as u16, period.to_string(), &header_format)?;
    }

    let month_formats: Vec<(Format, Format)> = periods
        .iter()
        .map(|&p| {
            let fill = cycle_fill(p, cycle_start_month);
            (month_format(fill), month_format(fill).set_bold())
        })
        .collect();

    let mut row: u32 = 1;
    for region in matrix.regions() {
        sheet.write(row, 0, region.as_str())?;
        for (idx, &period) in periods.iter().enumerate() {
            let col = (idx + 1) as u16;
            let format = &month_formats[idx].0;
            match matrix.volume(&region, period) {
                Some(v) => sheet.write_with_format(row, col, v, format)?,
                None => sheet.write_with_format(row, col, "", format)?,
            };
        }
        row += 1;
    }

    sheet.write(row, 0, TOTAL_ROW)?;
    for (idx, &period) in periods.iter().enumerate() {
        let total = matrix.total(period).unwrap_or(0.0);
        sheet.write_with_format(row, (idx + 1) as u16, total, &month_formats[idx].1)?;
    }
    row += 1;

    sheet.write(row, 0, MEMBERSHIP_ROW)?;
    for (idx, &period) in periods.iter().enumerate() {
        let col = (idx + 1) as u16;
        match matrix.membership(period) {
            Some(v) => sheet.write_with_format(row, col, v, &membership_format)?,
            None => sheet.write_with_format(row, col, "", &membership_format)?,
        };
    }

    sheet.set_freeze_panes(1, 1)?;
    sheet.set_column_width(0, LABEL_COLUMN_WIDTH)?;
    for idx in 0..periods.len() {
        sheet.set_column_width((idx + 1) as u16, MONTH_COLUMN_WIDTH)?;
    }
    Ok(())
}

fn write_chart_sheet(workbook: &mut Workbook, matrix: &VolumeMatrix) -> Result<(), XlsxError> {
    let sheet = workbook.add_worksheet();
    sheet.set_name(CHART_SHEET)?;

    let periods = matrix.periods();
    for (idx, &period) in periods.iter().enumerate() {
        sheet.write(idx as u32, 0, period.to_string())?;
        sheet.write(idx as u32, 1, matrix.total(period).unwrap_or(0.0))?;
    }
    if periods.is_empty() {
        return Ok(());
    }

    let last_row = (periods.len() - 1) as u32;
    let mut chart = Chart::new(ChartType::Line);
    chart
        .add_series()
        .set_name("Total Chart Volumes")
        .set_categories((CHART_SHEET, 0, 0, last_row, 0))
        .set_values((CHART_SHEET, 0, 1, last_row, 1))
        .set_format(ChartLine::new().set_color(Color::Blue));
    chart.title().set_name("Total Chart Volumes Over Time");
    chart.x_axis().set_name("Month");
    chart.y_axis().set_name("Chart Count");
    sheet.insert_chart(1, 3, &chart)?;
    Ok(())
}

fn write_forecast_sheet(
    workbook: &mut Workbook,
    matrix: &VolumeMatrix,
    outcome: &ForecastOutcome,
    new_cycle_start: Option<Period>,
) -> Result<(), XlsxError> {
    let sheet = workbook.add_worksheet();
    sheet.set_name(FORECAST_SHEET)?;

    let bordered = |f: Format| f.set_border(FormatBorder::Thin);
    let header_format = bordered(Format::new().set_bold().set_background_color(HEADER_FILL));
    let actual_format = bordered(month_format(ACTUAL_FILL));
    let forecast_format = bordered(month_format(FORECAST_FILL));
    let new_cycle_format = bordered(month_format(NEW_CYCLE_FILL));
    let total_actual_format = bordered(month_format(TOTAL_ACTUAL_FILL).set_bold());
    let total_forecast_format = bordered(month_format(TOTAL_FORECAST_FILL).set_bold());
    let total_new_cycle_format = bordered(month_format(TOTAL_NEW_CYCLE_FILL).set_bold());
    let membership_format = bordered(
        Format::new()
            .set_italic()
            .set_bold()
            .set_background_color(MEMBERSHIP_FILL)
            .set_num_format("#,##0"),
    );
    let bold = Format::new().set_bold();
    let bold_italic = Format::new().set_bold().set_italic();
    let italic = Format::new().set_italic();
    let plain = Format::new();

    let periods = matrix.periods();
    sheet.write_with_format(0, 0, "State", &header_format)?;
    for (idx, &period) in periods.iter().enumerate() {
        sheet.write_with_format(0, (idx + 1) as u16, period.to_string(), &header_format)?;
    }

    let is_actual = |p: Period| outcome.partition.actual.contains(&p);
    let pick = |p: Period, actual: &Format, new_cycle: &Format, forecast: &Format| -> Format {
        if is_actual(p) {
            actual.clone()
        } else if new_cycle_start == Some(p) {
            new_cycle.clone()
        } else {
            forecast.clone()
        }
    };

    let regions = matrix.regions();
    let mut row: u32 = 1;
    for region in &regions {
        sheet.write(row, 0, region.as_str())?;
        for (idx, &period) in periods.iter().enumerate() {
            let col = (idx + 1) as u16;
            let format = pick(period, &actual_format, &new_cycle_format, &forecast_format);
            match matrix.volume(region, period) {
                Some(v) => sheet.write_with_format(row, col, v, &format)?,
                None => sheet.write_with_format(row, col, "N/A", &format)?,
            };
        }
        row += 1;
    }

    sheet.write(row, 0, TOTAL_ROW)?;
    for (idx, &period) in periods.iter().enumerate() {
        let col = (idx + 1) as u16;
        let format = pick(
            period,
            &total_actual_format,
            &total_new_cycle_format,
            &total_forecast_format,
        );
        match matrix.total(period) {
            Some(v) => sheet.write_with_format(row, col, v, &format)?,
            None => sheet.write_with_format(row, col, "N/A", &format)?,
        };
    }
    row += 1;

    sheet.write(row, 0, MEMBERSHIP_ROW)?;
    for (idx, &period) in periods.iter().enumerate() {
        let col = (idx + 1) as u16;
        match matrix.membership(period) {
            Some(v) => sheet.write_with_format(row, col, v, &membership_format)?,
            None => sheet.write_with_format(row, col, "N/A", &membership_format)?,
        };
    }

    let table_rows = row;
    sheet.autofilter(0, 0, table_rows, periods.len() as u16)?;
    sheet.set_freeze_panes(1, 1)?;
    sheet.set_column_width(0, LABEL_COLUMN_WIDTH)?;
    for idx in 0..periods.len() {
        sheet.set_column_width((idx + 1) as u16, MONTH_COLUMN_WIDTH)?;
    }

    // Color legend below the table.
    let mut row_pos = table_rows + 3;
    sheet.write_with_format(row_pos, 0, "Legend:", &bold)?;
    sheet.write_with_format(row_pos + 1, 0, "Actual Data", &actual_format)?;
    sheet.write_with_format(row_pos + 1, 1, "Standard Forecast", &forecast_format)?;
    if let Some(p) = new_cycle_start {
        sheet.write_with_format(
            row_pos + 1,
            2,
            format!("New Project Year ({})", p),
            &new_cycle_format,
        )?;
    }

    // How the numbers were produced, in words.
    row_pos += 3;
    sheet.merge_range(row_pos, 0, row_pos, 3, "Forecasting Methodology:", &bold)?;
    row_pos += 1;
    sheet.merge_range(
        row_pos,
        0,
        row_pos,
        5,
        "Standard forecast (most months):",
        &bold_italic,
    )?;
    row_pos += 1;
    sheet.merge_range(
        row_pos,
        0,
        row_pos,
        5,
        "Current Value + (Last Year's Change * Membership Ratio)",
        &bold,
    )?;
    row_pos += 1;
    sheet.merge_range(row_pos, 0, row_pos, 5, "Where:", &italic)?;
    row_pos += 1;
    sheet.merge_range(
        row_pos,
        0,
        row_pos,
        5,
        "- Current Value = Value from previous month",
        &plain,
    )?;
    row_pos += 1;
    sheet.merge_range(
        row_pos,
        0,
        row_pos,
        5,
        "- Last Year's Change = Same month previous year minus its previous month",
        &plain,
    )?;
    row_pos += 1;
    sheet.merge_range(
        row_pos,
        0,
        row_pos,
        5,
        "- Membership Ratio = Current membership / Previous year's membership",
        &plain,
    )?;
    if let Some(p) = new_cycle_start {
        row_pos += 2;
        sheet.merge_range(
            row_pos,
            0,
            row_pos,
            5,
            format!("Special forecast for {} (new project year):", p).as_str(),
            &bold_italic,
        )?;
        row_pos += 1;
        sheet.merge_range(
            row_pos,
            0,
            row_pos,
            5,
            "Previous Year's Same Month * Membership Adjustment",
            &bold,
        )?;
        row_pos += 1;
        sheet.merge_range(
            row_pos,
            0,
            row_pos,
            5,
            "Where Membership Adjustment = Estimated future membership / Previous year's membership",
            &plain,
        )?;
    }

    row_pos += 2;
    sheet.write(
        row_pos,
        0,
        format!("Generated: {}", Local::now().format("%Y-%m-%d %H:%M")),
    )?;
    Ok(())
}

// One fill per cycle year. A month before the cycle start month belongs to
// the cycle that began the year before.
fn cycle_fill(period: Period, cycle_start_month: u32) -> u32 {
    let cycle_year = if period.month() >= cycle_start_month {
        period.year()
    } else {
        period.year() - 1
    };
    CYCLE_FILLS[cycle_year.rem_euclid(CYCLE_FILLS.len() as i32) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Period {
        Period::parse(s).unwrap()
    }

    #[test]
    fn cycle_fill_bands_by_cycle_year() {
        // August starts a new cycle: July belongs to the previous band.
        assert_eq!(cycle_fill(p("2024-08"), 8), cycle_fill(p("2025-07"), 8));
        assert_ne!(cycle_fill(p("2025-07"), 8), cycle_fill(p("2025-08"), 8));
        assert_eq!(cycle_fill(p("2025-08"), 8), cycle_fill(p("2026-07"), 8));
    }

    #[test]
    fn cycle_fill_rotates_through_the_palette() {
        let fills: Vec<u32> = (2023..2027)
            .map(|year| cycle_fill(Period::new(year, 9).unwrap(), 8))
            .collect();
        for pair in fills.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }
}
