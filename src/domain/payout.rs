use super::money::{Amount, Balance};
use super::rental::Rental;
use super::user::UserId;
use crate::error::RentalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type PayoutId = u64;

/// Funds disbursed to a partner. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payout {
    pub id: PayoutId,
    pub partner: UserId,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

/// Fees accrued by a partner's bikes, with the rentals they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Earnings {
    pub total: Balance,
    pub rentals: Vec<Rental>,
}

impl Earnings {
    pub fn from_rentals(rentals: Vec<Rental>) -> Result<Self, RentalError> {
        let total = Balance::try_sum(rentals.iter().map(|r| r.fee))?;
        Ok(Self { total, rentals })
    }
}

/// Derived ledger view. `balance` goes negative when a partner is paid ahead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PartnerBalance {
    pub earned: Balance,
    pub paid: Balance,
    pub balance: Balance,
}

impl PartnerBalance {
    pub fn new(earned: Balance, payouts: &[Payout]) -> Result<Self, RentalError> {
        let paid = Balance::try_sum(payouts.iter().map(|p| Balance::from(p.amount)))?;
        Ok(Self {
            earned,
            paid,
            balance: earned.checked_sub(paid)?,
        })
    }
}
