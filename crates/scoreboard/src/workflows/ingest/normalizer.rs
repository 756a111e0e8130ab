/// Canonical header form: invisible characters stripped, whitespace collapsed, uppercased.
pub(crate) fn normalize_header(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.to_uppercase()
}

/// Parses a count cell. Blank cells count as zero; `None` means the cell is not a number.
pub(crate) fn parse_count(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }

    let without_separators = trimmed.replace(',', "");
    without_separators
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
}
