//! tests/amount_tests.rs - unit conversion and withdrawal estimates

#[cfg(test)]
mod tests {
    use crate::models::amount::{estimate_withdrawal, format_units, parse_decimal, AmountError};
    use alloy_primitives::U256;

    #[test]
    fn test_format_units_whole_values_have_no_fraction() {
        assert_eq!(format_units(U256::from(100_000_000u64), 8), "1");
        assert_eq!(format_units(U256::from(2_500_000_000u64), 8), "25");
        assert_eq!(format_units(U256::ZERO, 8), "0");
    }

    #[test]
    fn test_format_units_trims_trailing_zeros() {
        assert_eq!(format_units(U256::from(150_000_000u64), 8), "1.5");
        assert_eq!(format_units(U256::from(1u64), 8), "0.00000001");
        assert_eq!(format_units(U256::from(123_456_789u64), 8), "1.23456789");
    }

    #[test]
    fn test_format_units_large_values_stay_exact() {
        let value = U256::from(10u8).pow(U256::from(30u8)) + U256::from(1u8);
        assert_eq!(format_units(value, 18), "1000000000000.000000000000000001");
        assert_eq!(format_units(U256::from(42u8), 0), "42");
    }

    #[test]
    fn test_parse_decimal_forms() {
        assert_eq!(parse_decimal("1").unwrap(), (U256::from(1u8), 0));
        assert_eq!(parse_decimal("0.95").unwrap(), (U256::from(95u8), 2));
        assert_eq!(parse_decimal(".5").unwrap(), (U256::from(5u8), 1));
        assert!(matches!(parse_decimal("1e8"), Err(AmountError::InvalidDecimal(_))));
        assert!(matches!(parse_decimal("-1"), Err(AmountError::InvalidDecimal(_))));
        assert!(matches!(parse_decimal("."), Err(AmountError::InvalidDecimal(_))));
    }

    #[test]
    fn test_estimate_has_eighteen_decimals() {
        assert_eq!(
            estimate_withdrawal("1", "95000000").unwrap().as_deref(),
            Some("0.950000000000000000")
        );
        assert_eq!(
            estimate_withdrawal("0.5", "200000000").unwrap().as_deref(),
            Some("1.000000000000000000")
        );
        assert_eq!(
            estimate_withdrawal("0.00000001", "1").unwrap().as_deref(),
            Some("0.000000000000000100")
        );
    }

    #[test]
    fn test_estimate_truncates_below_precision() {
        assert_eq!(
            estimate_withdrawal("0.000000000000000001", "1").unwrap().as_deref(),
            Some("0.000000000000000000")
        );
    }

    #[test]
    fn test_estimate_zero_price_has_no_estimate() {
        assert_eq!(estimate_withdrawal("1", "0").unwrap(), None);
    }

    #[test]
    fn test_estimate_rejects_bad_inputs() {
        assert!(matches!(
            estimate_withdrawal("abc", "95000000"),
            Err(AmountError::InvalidDecimal(_))
        ));
        assert!(matches!(
            estimate_withdrawal("1", "0.95"),
            Err(AmountError::InvalidInteger(_))
        ));
    }
}
