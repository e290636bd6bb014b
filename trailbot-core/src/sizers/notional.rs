//! Fractional sizer with a minimum-notional floor.
//!
//! Spend `target_fraction` of the free balance. If that is worth less than the
//! exchange minimum order value, buy exactly the minimum instead, even though
//! that overshoots the fraction.

use super::{NoTrade, SizeDecision, Sizer, SizingError};

/// Quantity for `target_fraction` of `balance` at `price`, floored at `min_notional`.
///
/// # Formula
/// ```text
/// nominal = balance * target_fraction / price
/// quantity = nominal               if nominal * price >= min_notional
///          = min_notional / price  otherwise
/// result = max(quantity, 0)
/// ```
/// A result of `0.0` means "do not trade".
///
/// # Example
/// ```
/// use trailbot_core::sizers::size;
///
/// // 10% of 10 USDT at price 5 is worth 1 USDT, below the 3 USDT minimum.
/// let qty = size(10.0, 5.0, 0.1, 3.0).unwrap();
/// assert!((qty - 0.6).abs() < 1e-12);
/// ```
pub fn size(
    balance: f64,
    price: f64,
    target_fraction: f64,
    min_notional: f64,
) -> Result<f64, SizingError> {
    if !(price.is_finite() && price > 0.0) {
        return Err(SizingError::NonPositivePrice(price));
    }

    let mut quantity = (balance * target_fraction) / price;
    if quantity * price < min_notional {
        quantity = min_notional / price;
    }

    // A NaN or infinite balance also means "do not trade".
    if !quantity.is_finite() {
        return Ok(0.0);
    }
    Ok(quantity.max(0.0))
}

/// Sizer spending a fixed fraction of the free balance per entry.
#[derive(Debug, Clone)]
pub struct NotionalSizer {
    /// Fraction of free balance per trade (e.g., 0.1 = 10%).
    pub target_fraction: f64,
    /// Minimum order value in quote currency.
    pub min_notional: f64,
}

impl NotionalSizer {
    pub fn new(target_fraction: f64, min_notional: f64) -> Self {
        assert!(
            target_fraction > 0.0 && target_fraction <= 1.0,
            "target_fraction must be in (0, 1]"
        );
        assert!(min_notional >= 0.0, "min_notional must be >= 0");
        Self {
            target_fraction,
            min_notional,
        }
    }
}

impl Sizer for NotionalSizer {
    fn plan(&self, balance: f64, price: f64) -> Result<SizeDecision, SizingError> {
        let quantity = size(balance, price, self.target_fraction, self.min_notional)?;
        if quantity <= 0.0 {
            return Ok(SizeDecision::DoNotTrade(NoTrade::ZeroSize));
        }

        let notional = quantity * price;
        let floored = balance * self.target_fraction < self.min_notional;

        // The floor can push the order above what the balance covers. The
        // tolerance absorbs rounding in quantity * price when the fraction is 1.
        if notional > balance * (1.0 + 1e-9) {
            return Ok(SizeDecision::DoNotTrade(NoTrade::Unaffordable {
                required: notional,
                balance,
            }));
        }

        Ok(SizeDecision::Order {
            quantity,
            notional,
            floored,
        })
    }

    fn name(&self) -> &str {
        "notional_fraction"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominal_size_above_floor() {
        let qty = size(1000.0, 0.01, 0.1, 3.0).unwrap();
        assert!((qty - 10_000.0).abs() < 1e-6);
    }

    #[test]
    fn floor_forces_minimum_notional() {
        let qty = size(10.0, 5.0, 0.1, 3.0).unwrap();
        assert!((qty - 0.6).abs() < 1e-12);
    }

    #[test]
    fn zero_balance_still_floored() {
        // Affordability is not this function's concern.
        let qty = size(0.0, 2.0, 0.1, 3.0).unwrap();
        assert!((qty - 1.5).abs() < 1e-12);
    }

    #[test]
    fn zero_balance_without_floor_is_zero() {
        assert_eq!(size(0.0, 2.0, 0.1, 0.0).unwrap(), 0.0);
    }

    #[test]
    fn negative_balance_clamps_to_zero() {
        assert_eq!(size(-50.0, 2.0, 0.1, 0.0).unwrap(), 0.0);
    }

    #[test]
    fn rejects_non_positive_price() {
        assert_eq!(
            size(100.0, 0.0, 0.1, 3.0),
            Err(SizingError::NonPositivePrice(0.0))
        );
        assert!(size(100.0, -1.0, 0.1, 3.0).is_err());
        assert!(size(100.0, f64::NAN, 0.1, 3.0).is_err());
    }

    #[test]
    fn plan_orders_target_fraction() {
        let sizer = NotionalSizer::new(0.1, 3.0);
        match sizer.plan(1000.0, 2.0).unwrap() {
            SizeDecision::Order {
                quantity,
                notional,
                floored,
            } => {
                assert!((quantity - 50.0).abs() < 1e-12);
                assert!((notional - 100.0).abs() < 1e-12);
                assert!(!floored);
            }
            other => panic!("expected order, got {other:?}"),
        }
    }

    #[test]
    fn plan_marks_floored_orders() {
        let sizer = NotionalSizer::new(0.1, 3.0);
        match sizer.plan(10.0, 5.0).unwrap() {
            SizeDecision::Order {
                quantity, floored, ..
            } => {
                assert!((quantity - 0.6).abs() < 1e-12);
                assert!(floored);
            }
            other => panic!("expected order, got {other:?}"),
        }
    }

    #[test]
    fn plan_rejects_unaffordable_floor() {
        let sizer = NotionalSizer::new(0.1, 3.0);
        let decision = sizer.plan(2.0, 5.0).unwrap();
        assert!(matches!(
            decision,
            SizeDecision::DoNotTrade(NoTrade::Unaffordable { .. })
        ));
    }

    #[test]
    fn plan_zero_size() {
        let sizer = NotionalSizer::new(0.1, 0.0);
        assert_eq!(
            sizer.plan(0.0, 5.0).unwrap(),
            SizeDecision::DoNotTrade(NoTrade::ZeroSize)
        );
    }

    #[test]
    fn non_finite_balance_never_orders() {
        assert_eq!(size(f64::INFINITY, 2.0, 0.1, 3.0).unwrap(), 0.0);
        assert_eq!(size(f64::NAN, 2.0, 0.1, 0.0).unwrap(), 0.0);
        let sizer = NotionalSizer::new(0.1, 3.0);
        assert_eq!(
            sizer.plan(f64::INFINITY, 5.0).unwrap(),
            SizeDecision::DoNotTrade(NoTrade::ZeroSize)
        );
    }

    #[test]
    fn plan_propagates_price_error() {
        let sizer = NotionalSizer::new(0.1, 3.0);
        assert!(sizer.plan(100.0, 0.0).is_err());
    }

    #[test]
    #[should_panic(expected = "target_fraction must be in (0, 1]")]
    fn rejects_bad_fraction() {
        NotionalSizer::new(1.5, 3.0);
    }
}
