//! Waste-to-wealth economics: lenient quantity parsing and the fixed
//! per-crop residue rates.

/// Tons of CO2 saved per ton of residue not burned.
pub const CARBON_FACTOR: f64 = 1.46;

/// Base residue price per ton, matched on a crop-name substring.
pub fn rate_per_ton(crop: &str) -> f64 {
    let crop = crop.to_lowercase();
    if crop.contains("paddy") {
        1800.0
    } else if crop.contains("wheat") {
        1500.0
    } else {
        0.0
    }
}

/// Parse a free-text quantity: strip unit words, accept a comma decimal
/// separator, and fall back to 1.0 on anything unparseable. The flow must
/// never dead-end on malformed numeric text.
pub fn parse_quantity(input: &str) -> f64 {
    let cleaned = input
        .trim()
        .to_lowercase()
        .replace("tons", "")
        .replace("ton", "")
        .replace("quintals", "")
        .replace("quintal", "")
        .replace(',', ".");
    cleaned.trim().parse().unwrap_or(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_numbers() {
        assert_eq!(parse_quantity("2"), 2.0);
        assert_eq!(parse_quantity("2.5"), 2.5);
    }

    #[test]
    fn strips_unit_words() {
        assert_eq!(parse_quantity("5 tons"), 5.0);
        assert_eq!(parse_quantity("1 ton"), 1.0);
        assert_eq!(parse_quantity("4 quintals"), 4.0);
    }

    #[test]
    fn accepts_comma_decimal_separator() {
        assert_eq!(parse_quantity("3,5 quintal"), 3.5);
    }

    #[test]
    fn unparseable_input_defaults_to_one() {
        assert_eq!(parse_quantity("banana"), 1.0);
        assert_eq!(parse_quantity(""), 1.0);
    }

    #[test]
    fn rates_match_crop_substring() {
        assert_eq!(rate_per_ton("Paddy Stubble"), 1800.0);
        assert_eq!(rate_per_ton("wheat straw"), 1500.0);
        assert_eq!(rate_per_ton("Sugarcane"), 0.0);
    }
}
