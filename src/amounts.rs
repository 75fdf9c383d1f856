//! Fixed-point token amount helpers
//!
//! Amounts travel through the engine as `u64` base units. Human decimal
//! strings and random draws are converted here, never with float scaling.

use crate::errors::{SwapError, SwapResult};

/// Fractional digits kept from a random draw
pub const DRAW_PRECISION: u32 = 4;

fn pow10(exp: u32) -> SwapResult<u128> {
    10u128
        .checked_pow(exp)
        .ok_or_else(|| SwapError::AmountOverflow(format!("10^{} does not fit", exp)))
}

fn narrow(value: u128) -> SwapResult<u64> {
    u64::try_from(value)
        .map_err(|_| SwapError::AmountOverflow(format!("{} exceeds u64 base units", value)))
}

/// Converts a draw to base units: round to 4 decimals, then scale by
/// `10^decimals`. With fewer than 4 token decimals the extra digits are
/// truncated.
pub fn draw_to_base_units(value: f64, decimals: u8) -> SwapResult<u64> {
    if !value.is_finite() || value < 0.0 {
        return Err(SwapError::invalid(
            "amount",
            format!("{} is not a non-negative finite number", value),
        ));
    }

    let ticks = (value * 10f64.powi(DRAW_PRECISION as i32)).round();
    if ticks > u64::MAX as f64 {
        return Err(SwapError::AmountOverflow(format!("{} is too large", value)));
    }
    let ticks = ticks as u128;

    let decimals = u32::from(decimals);
    let scaled = if decimals >= DRAW_PRECISION {
        ticks
            .checked_mul(pow10(decimals - DRAW_PRECISION)?)
            .ok_or_else(|| SwapError::AmountOverflow(format!("{} overflows", value)))?
    } else {
        ticks / pow10(DRAW_PRECISION - decimals)?
    };
    narrow(scaled)
}

/// Parses a human decimal string ("12.5") into base units.
///
/// Fractional digits beyond `decimals` must be zero.
pub fn parse_units(text: &str, decimals: u8) -> SwapResult<u64> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SwapError::invalid("amount", "empty amount"));
    }

    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, f),
        None => (text, ""),
    };
    let valid_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty())
        || !valid_digits(int_part)
        || !valid_digits(frac_part)
    {
        return Err(SwapError::invalid(
            "amount",
            format!("'{}' is not an unsigned decimal number", text),
        ));
    }

    let decimals = usize::from(decimals);
    let frac_trimmed = frac_part.trim_end_matches('0');
    if frac_trimmed.len() > decimals {
        return Err(SwapError::invalid(
            "amount",
            format!("'{}' has more than {} decimal places", text, decimals),
        ));
    }

    let mut digits = String::with_capacity(int_part.len() + decimals);
    digits.push_str(int_part);
    digits.push_str(frac_trimmed);
    for _ in frac_trimmed.len()..decimals {
        digits.push('0');
    }
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }

    let value: u128 = digits
        .parse()
        .map_err(|_| SwapError::AmountOverflow(format!("'{}' is too large", text)))?;
    narrow(value)
}

/// Formats base units as a human decimal string without trailing zeros
pub fn format_units(amount: i128, decimals: u8) -> String {
    let negative = amount < 0;
    let magnitude = amount.unsigned_abs();
    let (int_part, frac_part) = match 10u128.checked_pow(u32::from(decimals)) {
        Some(scale) => (magnitude / scale, magnitude % scale),
        // Past 38 decimals every magnitude is below one whole unit
        None => (0, magnitude),
    };

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&int_part.to_string());
    if frac_part > 0 {
        let frac = format!("{:0width$}", frac_part, width = usize::from(decimals));
        out.push('.');
        out.push_str(frac.trim_end_matches('0'));
    }
    out
}
