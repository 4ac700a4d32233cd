// Primitives shared by the workbook readers.

use calamine::DataType;

/// Header cells as text; anything that is not text reads as empty.
pub fn cell_text(cell: &DataType) -> String {
    match cell {
        DataType::String(s) => s.clone(),
        DataType::Float(f) => f.to_string(),
        DataType::Int(i) => i.to_string(),
        _ => String::new(),
    }
}

/// A measure cell coerced to a number; unusable content counts as zero.
pub fn numeric_cell(cell: &DataType) -> f64 {
    match cell {
        DataType::Float(f) => *f,
        DataType::Int(i) => *i as f64,
        DataType::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// A value cell where blank and non-numeric content mean "no value",
/// as opposed to a recorded zero.
pub fn optional_numeric(cell: &DataType) -> Option<f64> {
    match cell {
        DataType::Float(f) => Some(*f),
        DataType::Int(i) => Some(*i as f64),
        DataType::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
