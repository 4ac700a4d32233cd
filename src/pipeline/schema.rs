//! Column layout inference for the monthly source extracts.
//!
//! Extracts come from several vendors and never agree on exact header
//! names, so matching is a rule set over lower-cased header text rather
//! than a fixed schema.

/// The columns an extract must expose to be usable.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ExtractField {
    Vendor,
    ChartCount,
    Region,
}

// A field matches a header cell when every fragment appears in the
// lower-cased header text.
struct ColumnRule {
    field: ExtractField,
    fragments: &'static [&'static str],
}

const COLUMN_RULES: &[ColumnRule] = &[
    ColumnRule {
        field: ExtractField::Vendor,
        fragments: &["vendor"],
    },
    ColumnRule {
        field: ExtractField::ChartCount,
        fragments: &["chart", "count"],
    },
    ColumnRule {
        field: ExtractField::Region,
        fragments: &["state"],
    },
];

/// Positions of the required columns in an extract header row.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ExtractColumns {
    pub vendor: usize,
    pub chart_count: usize,
    pub region: usize,
}

/// The field a single header cell maps to, if any.
pub fn match_field(header: &str) -> Option<ExtractField> {
    let lower = header.trim().to_lowercase();
    COLUMN_RULES
        .iter()
        .find(|rule| rule.fragments.iter().all(|f| lower.contains(f)))
        .map(|rule| rule.field)
}

/// Resolves the full header row. The first header matching a field wins;
/// all three fields must be found.
pub fn infer_columns(headers: &[String]) -> Option<ExtractColumns> {
    let mut vendor: Option<usize> = None;
    let mut chart_count: Option<usize> = None;
    let mut region: Option<usize> = None;
    for (idx, header) in headers.iter().enumerate() {
        match match_field(header) {
            Some(ExtractField::Vendor) if vendor.is_none() => vendor = Some(idx),
            Some(ExtractField::ChartCount) if chart_count.is_none() => chart_count = Some(idx),
            Some(ExtractField::Region) if region.is_none() => region = Some(idx),
            _ => {}
        }
    }
    Some(ExtractColumns {
        vendor: vendor?,
        chart_count: chart_count?,
        region: region?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(hs: &[&str]) -> Vec<String> {
        hs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn matches_the_names_seen_in_the_wild() {
        assert_eq!(match_field("Ret_Vendor"), Some(ExtractField::Vendor));
        assert_eq!(match_field("Chartcount"), Some(ExtractField::ChartCount));
        assert_eq!(match_field(" Chart Count "), Some(ExtractField::ChartCount));
        assert_eq!(match_field("STATE"), Some(ExtractField::Region));
        assert_eq!(match_field("Count"), None);
        assert_eq!(match_field("Notes"), None);
    }

    #[test]
    fn resolves_a_full_header_row() {
        let cols = infer_columns(&headers(&["State", "Ret_Vendor", "Chart count", "Notes"]))
            .unwrap();
        assert_eq!(
            cols,
            ExtractColumns {
                vendor: 1,
                chart_count: 2,
                region: 0,
            }
        );
    }

    #[test]
    fn first_matching_header_wins() {
        let cols =
            infer_columns(&headers(&["Vendor", "Vendor Name", "chart_count", "state"])).unwrap();
        assert_eq!(cols.vendor, 0);
    }

    #[test]
    fn incomplete_headers_are_rejected() {
        assert_eq!(infer_columns(&headers(&["Vendor", "State"])), None);
        assert_eq!(infer_columns(&headers(&[])), None);
    }
}
