use crate::pipeline::io_common::{cell_text, numeric_cell};
use crate::pipeline::schema;
use crate::pipeline::*;

use calamine::{open_workbook, DataType, Reader, Xlsx};
use log::debug;
use snafu::prelude::*;

use std::collections::BTreeMap;

/// Reads one monthly source extract and returns the summed chart count per
/// region. The vendor column is required by the shape check but carries no
/// data of its own here; rows are grouped by region only.
pub fn read_extract(path: &str) -> PipelineResult<BTreeMap<String, f64>> {
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
    debug!("read_extract: header: {:?}", header);

    let headers: Vec<String> = header.iter().map(cell_text).collect();
    let columns = schema::infer_columns(&headers).context(MalformedExtractSnafu {
        path: path.to_string(),
    })?;
    debug!("read_extract: columns: {:?}", columns);

    let mut sums: BTreeMap<String, f64> = BTreeMap::new();
    for row in rows {
        let region = match row.get(columns.region) {
            Some(DataType::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => continue,
        };
        let count = row.get(columns.chart_count).map(numeric_cell).unwrap_or(0.0);
        *sums.entry(region).or_insert(0.0) += count;
    }
    Ok(sums)
}
