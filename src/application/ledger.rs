use crate::domain::money::{Amount, Balance};
use crate::domain::payout::{Earnings, PartnerBalance, Payout};
use crate::domain::ports::{PayoutStoreRef, RentalStoreRef};
use crate::domain::user::UserId;
use crate::error::Result;
use chrono::Utc;
use tracing::{info, instrument};

/// Partner earnings, payouts and the balance derived from both.
///
/// Nothing here is stored except payouts; earnings and balance are always
/// recomputed from rentals and payouts.
#[derive(Clone)]
pub struct Ledger {
    rentals: RentalStoreRef,
    payouts: PayoutStoreRef,
}

impl Ledger {
    pub fn new(rentals: RentalStoreRef, payouts: PayoutStoreRef) -> Self {
        Self { rentals, payouts }
    }

    /// Sum of fees over every rental of the partner's bikes. Open rentals
    /// carry a zero fee, so this is earnings from closed rentals to date.
    #[instrument(skip(self))]
    pub async fn partner_earnings(&self, partner: UserId) -> Result<Earnings> {
        let rentals = self.rentals.for_owner(partner).await?;
        Earnings::from_rentals(rentals)
    }

    /// Appends a payout. Paying more than was earned is allowed.
    #[instrument(skip(self, amount), fields(amount = %amount))]
    pub async fn record_payout(&self, partner: UserId, amount: Amount) -> Result<Payout> {
        let payout = self.payouts.append(partner, amount, Utc::now()).await?;
        info!(payout_id = payout.id, "Payout recorded");
        Ok(payout)
    }

    pub async fn partner_payouts(&self, partner: UserId) -> Result<Vec<Payout>> {
        self.payouts.for_partner(partner).await
    }

    #[instrument(skip(self))]
    pub async fn balance(&self, partner: UserId) -> Result<PartnerBalance> {
        let earned: Balance = self.partner_earnings(partner).await?.total;
        let payouts = self.payouts.for_partner(partner).await?;
        PartnerBalance::new(earned, &payouts)
    }
}
