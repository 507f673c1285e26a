//! Lenient cell-value coercion
//!
//! Uploaded spreadsheets come from hand-edited files, so coercion is
//! forgiving: recognized variants map to canonical values and anything
//! unrecognized falls back to a safe default instead of failing the row.
//! Hard validation (required fields, ownership) lives with the row
//! processors, not here.

/// Boolean cells accept yes/no, true/false, y/n and 1/0 in any case.
pub fn parse_bool(raw: &str, default: bool) -> bool {
    match raw.trim().to_lowercase().as_str() {
        "yes" | "true" | "y" | "1" => true,
        "no" | "false" | "n" | "0" => false,
        _ => default,
    }
}

/// Return policy defaults to returnable when the cell is blank or garbage.
pub fn parse_return_policy(raw: &str) -> bool {
    parse_bool(raw, true)
}

/// Prices tolerate currency symbols and thousands separators; blank or
/// unparseable cells become 0.0 so a template with an empty price column
/// still imports.
pub fn parse_price(raw: &str) -> f64 {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse::<f64>().unwrap_or(0.0)
}

/// Physical dimensions (weight, length, width, height). Blank means absent.
pub fn parse_dimension(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Whole-unit quantities. Accepts float-formatted cells ("10.0") because
/// workbook exports render integers that way.
pub fn parse_quantity(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(n);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|f| f.fract() == 0.0)
        .map(|f| f as i64)
}

/// Product status is an enum of published/draft/archived; anything else is
/// treated as draft so a bad cell never publishes a record by accident.
pub fn parse_product_status(raw: &str) -> String {
    match raw.trim().to_lowercase().as_str() {
        s @ ("published" | "draft" | "archived") => s.to_string(),
        "active" => "published".to_string(),
        _ => "draft".to_string(),
    }
}

/// Product type defaults to simple.
pub fn parse_product_type(raw: &str) -> String {
    match raw.trim().to_lowercase().as_str() {
        s @ ("simple" | "variable" | "digital") => s.to_string(),
        _ => "simple".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("Yes", false));
        assert!(parse_bool("TRUE", false));
        assert!(parse_bool("1", false));
        assert!(parse_bool("y", false));
        assert!(!parse_bool("No", true));
        assert!(!parse_bool("false", true));
        assert!(!parse_bool("0", true));
    }

    #[test]
    fn test_parse_bool_falls_back_to_default() {
        assert!(parse_bool("", true));
        assert!(!parse_bool("maybe", false));
    }

    #[test]
    fn test_return_policy_defaults_returnable() {
        assert!(parse_return_policy(""));
        assert!(!parse_return_policy("no"));
    }

    #[test]
    fn test_parse_price_strips_currency_noise() {
        assert_eq!(parse_price("$1,299.95"), 1299.95);
        assert_eq!(parse_price("  9.99 "), 9.99);
        assert_eq!(parse_price(""), 0.0);
        assert_eq!(parse_price("free"), 0.0);
    }

    #[test]
    fn test_parse_dimension() {
        assert_eq!(parse_dimension("2.5"), Some(2.5));
        assert_eq!(parse_dimension(""), None);
        assert_eq!(parse_dimension("heavy"), None);
    }

    #[test]
    fn test_parse_quantity_accepts_float_rendering() {
        assert_eq!(parse_quantity("10"), Some(10));
        assert_eq!(parse_quantity("10.0"), Some(10));
        assert_eq!(parse_quantity("10.5"), None);
        assert_eq!(parse_quantity(""), None);
        assert_eq!(parse_quantity("-3"), Some(-3));
    }

    #[test]
    fn test_parse_product_status() {
        assert_eq!(parse_product_status("Published"), "published");
        assert_eq!(parse_product_status("active"), "published");
        assert_eq!(parse_product_status("ARCHIVED"), "archived");
        assert_eq!(parse_product_status(""), "draft");
        assert_eq!(parse_product_status("whatever"), "draft");
    }

    #[test]
    fn test_parse_product_type() {
        assert_eq!(parse_product_type("Variable"), "variable");
        assert_eq!(parse_product_type(""), "simple");
    }
}
