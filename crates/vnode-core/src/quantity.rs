//! Parsing and formatting of Kubernetes quantity strings.
//!
//! Capacity quantities cross the node boundary as strings such as `"2"`,
//! `"500m"`, `"2Gi"` or `"129M"`. This module converts them into the
//! canonical integer units used by the aggregate (CPU in milli-cores,
//! memory and storage in bytes) and back. Parsing is integer-only; values
//! that do not land exactly on a canonical unit are rounded to the nearest
//! integer (half up).
//!
//! Supported suffixes: `m` (milli), the decimal SI suffixes `k M G T P E`,
//! and the binary suffixes `Ki Mi Gi Ti Pi Ei`. Anything else is rejected
//! with [`CoreError::InvalidQuantity`].

use crate::error::{CoreError, Result};

/// Parse a CPU quantity into milli-cores.
///
/// `"2"` parses to `2000`, `"500m"` to `500`, `"0.5"` to `500`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidQuantity`] if the string is malformed,
/// negative, or does not fit in a `u64` after scaling.
pub fn parse_cpu_millis(s: &str) -> Result<u64> {
    parse_scaled(s, 1000)
}

/// Parse a memory or storage quantity into bytes.
///
/// `"2Gi"` parses to `2_147_483_648`, `"129M"` to `129_000_000`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidQuantity`] if the string is malformed,
/// negative, or does not fit in a `u64`.
pub fn parse_bytes(s: &str) -> Result<u64> {
    parse_scaled(s, 1)
}

/// Parse a bare count, such as a node's pod capacity.
///
/// # Errors
///
/// Returns [`CoreError::InvalidQuantity`] if the string is malformed or
/// negative.
pub fn parse_count(s: &str) -> Result<u64> {
    parse_scaled(s, 1)
}

/// Format milli-cores as a CPU quantity string (`1500` -> `"1500m"`).
#[must_use]
pub fn format_cpu_millis(millis: u64) -> String {
    format!("{millis}m")
}

/// Format a byte count as a quantity string (plain decimal bytes).
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    bytes.to_string()
}

/// Format a bare count as a quantity string.
#[must_use]
pub fn format_count(count: u64) -> String {
    count.to_string()
}

/// Multiplier and divisor for a quantity suffix.
fn suffix_factors(suffix: &str) -> Option<(u128, u128)> {
    Some(match suffix {
        "" => (1, 1),
        "m" => (1, 1000),
        "k" => (1_000, 1),
        "M" => (1_000_000, 1),
        "G" => (1_000_000_000, 1),
        "T" => (1_000_000_000_000, 1),
        "P" => (1_000_000_000_000_000, 1),
        "E" => (1_000_000_000_000_000_000, 1),
        "Ki" => (1 << 10, 1),
        "Mi" => (1 << 20, 1),
        "Gi" => (1 << 30, 1),
        "Ti" => (1 << 40, 1),
        "Pi" => (1 << 50, 1),
        "Ei" => (1 << 60, 1),
        _ => return None,
    })
}

// Digit limits keep the u128 intermediates from overflowing even with the
// largest suffix multiplier.
const MAX_INT_DIGITS: usize = 20;
const MAX_FRAC_DIGITS: usize = 9;

/// Parse `s` and scale the result by `unit_scale` (1000 for milli-core
/// targets, 1 for bytes/counts), rounding half up.
fn parse_scaled(s: &str, unit_scale: u128) -> Result<u64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(CoreError::invalid(s, "empty quantity"));
    }
    if trimmed.starts_with('-') {
        return Err(CoreError::invalid(s, "negative quantity"));
    }

    let split_at = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split_at);

    let (mul, div) =
        suffix_factors(suffix).ok_or_else(|| CoreError::invalid(s, "unknown suffix"))?;

    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, f),
        None => (number, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(CoreError::invalid(s, "missing digits"));
    }
    if frac_part.contains('.') {
        return Err(CoreError::invalid(s, "multiple decimal points"));
    }
    if int_part.len() > MAX_INT_DIGITS || frac_part.len() > MAX_FRAC_DIGITS {
        return Err(CoreError::invalid(s, "too many digits"));
    }

    let int: u128 = if int_part.is_empty() {
        0
    } else {
        int_part
            .parse()
            .map_err(|_| CoreError::invalid(s, "invalid integer part"))?
    };
    let frac: u128 = if frac_part.is_empty() {
        0
    } else {
        frac_part
            .parse()
            .map_err(|_| CoreError::invalid(s, "invalid fractional part"))?
    };

    let frac_scale = 10u128.pow(u32::try_from(frac_part.len()).unwrap_or(0));
    let denominator = frac_scale * div;
    let numerator = int
        .checked_mul(frac_scale)
        .and_then(|v| v.checked_add(frac))
        .and_then(|v| v.checked_mul(mul))
        .and_then(|v| v.checked_mul(unit_scale))
        .ok_or_else(|| CoreError::invalid(s, "quantity out of range"))?;

    let rounded = (numerator + denominator / 2) / denominator;
    u64::try_from(rounded).map_err(|_| CoreError::invalid(s, "quantity out of range"))
}
