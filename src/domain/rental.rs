use super::money::{Balance, Hours, HourlyRate};
use super::resource::ResourceId;
use super::user::UserId;
use crate::error::RentalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type RentalId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentalStatus {
    /// Open, waiting for an administrator to bind a bike.
    Pending,
    /// Open with a bike bound.
    Assigned,
    /// End time and fee written. Terminal.
    Closed,
}

impl std::fmt::Display for RentalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Closed => "closed",
        })
    }
}

/// One lease of one bike by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rental {
    pub id: RentalId,
    pub user: UserId,
    pub resource: Option<ResourceId>,
    pub started_at: DateTime<Utc>,
    /// `None` while the rental is open.
    pub ended_at: Option<DateTime<Utc>>,
    /// Zero until the rental is closed.
    pub fee: Balance,
}

impl Rental {
    pub fn new(
        id: RentalId,
        user: UserId,
        resource: Option<ResourceId>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user,
            resource,
            started_at,
            ended_at: None,
            fee: Balance::ZERO,
        }
    }

    pub fn status(&self) -> RentalStatus {
        match (self.ended_at, self.resource) {
            (Some(_), _) => RentalStatus::Closed,
            (None, Some(_)) => RentalStatus::Assigned,
            (None, None) => RentalStatus::Pending,
        }
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Checks that a bike may be bound to this rental.
    pub fn ensure_bindable(&self) -> Result<(), RentalError> {
        match self.status() {
            RentalStatus::Pending => Ok(()),
            RentalStatus::Assigned => Err(RentalError::conflict(format!(
                "Rental {} already has a bike",
                self.id
            ))),
            RentalStatus::Closed => Err(RentalError::conflict(format!(
                "Rental {} is closed",
                self.id
            ))),
        }
    }

    pub fn bind(&mut self, resource: ResourceId) -> Result<(), RentalError> {
        self.ensure_bindable()?;
        self.resource = Some(resource);
        Ok(())
    }

    /// Writes end time and fee. A missing rate bills nothing.
    pub fn close(
        &mut self,
        rate: Option<HourlyRate>,
        hours: Hours,
        at: DateTime<Utc>,
    ) -> Result<(), RentalError> {
        if !self.is_open() {
            return Err(RentalError::conflict(format!(
                "Rental {} is already closed",
                self.id
            )));
        }
        self.fee = match rate {
            Some(rate) => rate.fee_for(hours)?,
            None => Balance::ZERO,
        };
        self.ended_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn hours(h: rust_decimal::Decimal) -> Hours {
        Hours::new(h).unwrap()
    }

    #[test]
    fn test_status_transitions() {
        let mut rental = Rental::new(1, 10, None, Utc::now());
        assert_eq!(rental.status(), RentalStatus::Pending);

        rental.bind(3).unwrap();
        assert_eq!(rental.status(), RentalStatus::Assigned);
        assert!(matches!(rental.bind(4), Err(RentalError::Conflict(_))));

        rental.close(None, hours(dec!(1)), Utc::now()).unwrap();
        assert_eq!(rental.status(), RentalStatus::Closed);
        assert!(matches!(rental.bind(4), Err(RentalError::Conflict(_))));
    }

    #[test]
    fn test_close_computes_fee() {
        let mut rental = Rental::new(1, 10, Some(3), Utc::now());
        let rate = HourlyRate::new(dec!(10.0)).unwrap();
        rental.close(Some(rate), hours(dec!(2)), Utc::now()).unwrap();
        assert_eq!(rental.fee, Balance::new(dec!(20.0)));
        assert!(rental.ended_at.is_some());
    }

    #[test]
    fn test_close_without_rate_is_free() {
        let mut rental = Rental::new(1, 10, Some(3), Utc::now());
        rental.close(None, hours(dec!(5)), Utc::now()).unwrap();
        assert_eq!(rental.fee, Balance::ZERO);
    }

    #[test]
    fn test_close_is_written_once() {
        let mut rental = Rental::new(1, 10, Some(3), Utc::now());
        let rate = HourlyRate::new(dec!(10.0)).unwrap();
        rental.close(Some(rate), hours(dec!(1)), Utc::now()).unwrap();
        let first = rental.clone();

        assert!(matches!(
            rental.close(Some(rate), hours(dec!(9)), Utc::now()),
            Err(RentalError::Conflict(_))
        ));
        assert_eq!(rental, first);
    }

    #[test]
    fn test_close_with_overflowing_fee_stays_open() {
        let mut rental = Rental::new(1, 10, Some(3), Utc::now());
        let rate = HourlyRate::new(dec!(10.0)).unwrap();
        let forever = Hours::new(rust_decimal::Decimal::MAX).unwrap();

        assert!(matches!(
            rental.close(Some(rate), forever, Utc::now()),
            Err(RentalError::ValidationError(_))
        ));
        assert!(rental.is_open());
        assert_eq!(rental.fee, Balance::ZERO);
    }
}
