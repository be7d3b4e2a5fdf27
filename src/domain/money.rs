use crate::error::RentalError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A signed monetary value: earnings, payouts and the balance between them.
///
/// Wraps `rust_decimal::Decimal` so fee and ledger arithmetic stays exact.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

/// A strictly positive monetary amount, as carried by a payout.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, RentalError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(RentalError::validation("Amount must be positive"))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = RentalError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl FromStr for Amount {
    type Err = RentalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|_| RentalError::validation(format!("'{s}' is not a valid amount")))?;
        Self::new(value)
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Fails with `ValidationError` instead of overflowing.
    pub fn checked_add(self, rhs: Self) -> Result<Self, RentalError> {
        self.0.checked_add(rhs.0).map(Self).ok_or_else(overflow)
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self, RentalError> {
        self.0.checked_sub(rhs.0).map(Self).ok_or_else(overflow)
    }

    pub fn try_sum(values: impl IntoIterator<Item = Self>) -> Result<Self, RentalError> {
        values
            .into_iter()
            .try_fold(Self::ZERO, |total, value| total.checked_add(value))
    }
}

fn overflow() -> RentalError {
    RentalError::validation("Amount is out of range")
}

impl std::fmt::Display for Balance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// Price of one hour of rental. Never negative.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct HourlyRate(Decimal);

impl HourlyRate {
    pub fn new(value: Decimal) -> Result<Self, RentalError> {
        if value >= Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(RentalError::validation("Hourly rate must not be negative"))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn fee_for(&self, hours: Hours) -> Result<Balance, RentalError> {
        self.0.checked_mul(hours.value()).map(Balance).ok_or_else(|| {
            RentalError::validation(format!("Fee for {} hours is out of range", hours.value()))
        })
    }
}

impl FromStr for HourlyRate {
    type Err = RentalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|_| RentalError::validation(format!("'{s}' is not a valid hourly rate")))?;
        Self::new(value)
    }
}

/// Billed duration of a rental, in hours. Fractions allowed, negatives not.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Hours(Decimal);

impl Hours {
    pub fn new(value: Decimal) -> Result<Self, RentalError> {
        if value >= Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(RentalError::validation("Rental duration must not be negative"))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl FromStr for Hours {
    type Err = RentalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|_| RentalError::validation(format!("'{s}' is not a valid duration")))?;
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_arithmetic() {
        let b1 = Balance::new(dec!(10.0));
        let b2 = Balance::new(dec!(15.0));
        assert_eq!(b1.checked_add(b2).unwrap(), Balance::new(dec!(25.0)));
        assert_eq!(b1.checked_sub(b2).unwrap(), Balance::new(dec!(-5.0)));
        assert_eq!(Balance::try_sum([b1, b2]).unwrap(), Balance::new(dec!(25.0)));
        assert_eq!(Balance::try_sum([]).unwrap(), Balance::ZERO);
    }

    #[test]
    fn test_balance_overflow_is_rejected() {
        let max = Balance::new(Decimal::MAX);
        assert!(matches!(
            max.checked_add(Balance::new(dec!(1))),
            Err(RentalError::ValidationError(_))
        ));
        assert!(matches!(
            Balance::new(Decimal::MIN).checked_sub(Balance::new(dec!(1))),
            Err(RentalError::ValidationError(_))
        ));
        assert!(Balance::try_sum([max, max]).is_err());
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(RentalError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(RentalError::ValidationError(_))
        ));
    }

    #[test]
    fn test_amount_parsing() {
        assert_eq!("5.5".parse::<Amount>().unwrap().value(), dec!(5.5));
        assert!(matches!(
            "five".parse::<Amount>(),
            Err(RentalError::ValidationError(_))
        ));
        assert!(matches!(
            "-3".parse::<Amount>(),
            Err(RentalError::ValidationError(_))
        ));
    }

    #[test]
    fn test_fee_is_rate_times_hours() {
        let rate = HourlyRate::new(dec!(10.0)).unwrap();
        let hours = Hours::new(dec!(2)).unwrap();
        assert_eq!(rate.fee_for(hours).unwrap(), Balance::new(dec!(20.0)));

        let half = Hours::new(dec!(0.5)).unwrap();
        assert_eq!(rate.fee_for(half).unwrap(), Balance::new(dec!(5.0)));
    }

    #[test]
    fn test_fee_overflow_is_rejected() {
        let rate = HourlyRate::new(dec!(10.0)).unwrap();
        let forever = "79228162514264337593543950335".parse::<Hours>().unwrap();
        assert!(matches!(
            rate.fee_for(forever),
            Err(RentalError::ValidationError(_))
        ));
    }

    #[test]
    fn test_rate_and_hours_reject_negatives() {
        assert!(HourlyRate::new(dec!(0)).is_ok());
        assert!(HourlyRate::new(dec!(-0.01)).is_err());
        assert!(Hours::new(dec!(-1)).is_err());
        assert!("abc".parse::<Hours>().is_err());
    }

    #[test]
    fn test_balance_display_is_normalized() {
        assert_eq!(Balance::new(dec!(30.00)).to_string(), "30");
        assert_eq!(Balance::new(dec!(2.50)).to_string(), "2.5");
    }
}
