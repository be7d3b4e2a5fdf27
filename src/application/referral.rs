use crate::domain::ports::UserStoreRef;
use crate::domain::user::{ReferralCode, User, UserId};
use crate::error::{RentalError, Result};
use tracing::{debug, info, instrument};

/// Why an attribution attempt changed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    AlreadyReferred,
    SelfReferral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    Linked { referrer: UserId },
    NoOp(NoOpReason),
}

/// First-touch-wins referral attribution.
#[derive(Clone)]
pub struct ReferralService {
    users: UserStoreRef,
}

impl ReferralService {
    pub fn new(users: UserStoreRef) -> Self {
        Self { users }
    }

    /// The code is a pure function of the user id, so re-issuing it is harmless.
    pub fn issue_code(user: &User) -> ReferralCode {
        ReferralCode::issue(user.id)
    }

    /// Records the owner of `code` as `user`'s referrer unless one is already
    /// set. Replays and self-referrals are no-ops.
    #[instrument(skip(self, code), fields(code = %code))]
    pub async fn attribute(&self, user: UserId, code: &ReferralCode) -> Result<Attribution> {
        let current = self
            .users
            .get(user)
            .await?
            .ok_or_else(|| RentalError::not_found(format!("User {user}")))?;
        if current.referrer.is_some() {
            debug!("User already has a referrer");
            return Ok(Attribution::NoOp(NoOpReason::AlreadyReferred));
        }
        let referrer = self
            .users
            .find_by_referral_code(code)
            .await?
            .ok_or_else(|| RentalError::not_found(format!("Referral code {code}")))?;
        if referrer.id == user {
            debug!("Self-referral ignored");
            return Ok(Attribution::NoOp(NoOpReason::SelfReferral));
        }
        match self.users.link_referrer(user, referrer.id).await? {
            None => Err(RentalError::not_found(format!("User {user}"))),
            Some(true) => {
                info!(referrer = referrer.id, "Referral attributed");
                Ok(Attribution::Linked {
                    referrer: referrer.id,
                })
            }
            Some(false) => {
                debug!("User already has a referrer");
                Ok(Attribution::NoOp(NoOpReason::AlreadyReferred))
            }
        }
    }

    pub async fn count_referrals(&self, user: UserId) -> Result<u64> {
        self.users.count_referred_by(user).await
    }
}
