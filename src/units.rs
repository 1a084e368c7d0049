//! Wei / whole-unit conversions
//!
//! Chain reads return 18-decimal fixed-point integers. Rates are computed on
//! whole units and balances are served as decimal strings.

/// Number of wei in one whole native unit (10^18)
pub const WEI_PER_UNIT: u128 = 1_000_000_000_000_000_000;

/// Convert a wei amount to whole units, rounding half up
pub fn to_whole_units(wei: u128) -> u128 {
    let whole = wei / WEI_PER_UNIT;
    if wei % WEI_PER_UNIT >= WEI_PER_UNIT / 2 {
        whole + 1
    } else {
        whole
    }
}

/// Format a fixed-point integer as a decimal string with trailing zeros trimmed
///
/// `format_units(1_500_000_000_000_000_000, 18)` → `"1.5"`
pub fn format_units(value: u128, decimals: u32) -> String {
    if decimals == 0 {
        return value.to_string();
    }

    let scale = 10u128.pow(decimals);
    let whole = value / scale;
    let fraction = value % scale;

    if fraction == 0 {
        return whole.to_string();
    }

    let fraction = format!("{:0width$}", fraction, width = decimals as usize);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}

/// Round a float to a fixed number of decimals
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
