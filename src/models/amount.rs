//! Exact decimal handling for token amounts. Everything is integer arithmetic on
//! `U256`; amounts never pass through floating point.

use alloy_primitives::U256;
use thiserror::Error;

/// `min_price` is quoted with this many implied decimals.
pub const MIN_PRICE_DECIMALS: u32 = 8;

/// Estimates are always rendered with this many decimals.
pub const ESTIMATE_DECIMALS: u32 = 18;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmountError {
    #[error("Invalid decimal amount: {0:?}")]
    InvalidDecimal(String),

    #[error("Invalid integer: {0:?}")]
    InvalidInteger(String),

    #[error("Amount overflow while computing estimate")]
    Overflow,
}

fn pow10(exp: u32) -> Option<U256> {
    U256::from(10u8).checked_pow(U256::from(exp))
}

/// Renders native integer units as a minimal decimal string: no trailing zeros in
/// the fraction, no fraction at all for whole values, never scientific notation.
pub fn format_units(value: U256, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }

    // 10^decimals beyond U256 means every representable value is below one unit.
    let (whole, fraction) = match pow10(decimals as u32) {
        Some(divisor) => (value / divisor, value % divisor),
        None => (U256::ZERO, value),
    };

    if fraction.is_zero() {
        return whole.to_string();
    }

    let digits = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

/// Parses a plain non-negative decimal (`"1"`, `"0.95"`, `".5"`) into
/// `(mantissa, scale)` such that the value is `mantissa / 10^scale`.
pub fn parse_decimal(input: &str) -> Result<(U256, u32), AmountError> {
    let invalid = || AmountError::InvalidDecimal(input.to_string());
    let trimmed = input.trim();

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let digits = format!("{whole}{fraction}");
    let mantissa = digits.parse::<U256>().map_err(|_| invalid())?;
    let scale = u32::try_from(fraction.len()).map_err(|_| invalid())?;

    Ok((mantissa, scale))
}

pub fn parse_integer(input: &str) -> Result<U256, AmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(AmountError::InvalidInteger(input.to_string()));
    }
    trimmed
        .parse::<U256>()
        .map_err(|_| AmountError::InvalidInteger(input.to_string()))
}

/// `amount * min_price / 10^8` with exactly 18 decimals (truncated).
///
/// A zero `min_price` yields `None`: the request carries no usable quote.
pub fn estimate_withdrawal(amount: &str, min_price: &str) -> Result<Option<String>, AmountError> {
    let (mantissa, scale) = parse_decimal(amount)?;
    let price = parse_integer(min_price)?;

    if price.is_zero() {
        return Ok(None);
    }

    let product = mantissa.checked_mul(price).ok_or(AmountError::Overflow)?;

    // product / 10^(scale + 8) expressed in units of 10^-18
    let shift = scale + MIN_PRICE_DECIMALS;
    let scaled = if shift <= ESTIMATE_DECIMALS {
        let factor = pow10(ESTIMATE_DECIMALS - shift).ok_or(AmountError::Overflow)?;
        product.checked_mul(factor).ok_or(AmountError::Overflow)?
    } else {
        match pow10(shift - ESTIMATE_DECIMALS) {
            Some(divisor) => product / divisor,
            None => U256::ZERO,
        }
    };

    let unit = pow10(ESTIMATE_DECIMALS).ok_or(AmountError::Overflow)?;
    let whole = scaled / unit;
    let fraction = format!(
        "{:0>width$}",
        (scaled % unit).to_string(),
        width = ESTIMATE_DECIMALS as usize
    );

    Ok(Some(format!("{whole}.{fraction}")))
}
