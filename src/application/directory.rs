use crate::domain::ports::UserStoreRef;
use crate::domain::user::{ProfileUpdate, User, UserId};
use crate::error::{RentalError, Result};
use chrono::Utc;
use tracing::{debug, info, instrument};

/// User lookup and profile maintenance, as consumed by the front-end.
#[derive(Clone)]
pub struct UserDirectory {
    users: UserStoreRef,
}

impl UserDirectory {
    pub fn new(users: UserStoreRef) -> Self {
        Self { users }
    }

    /// Idempotent: safe to call on first contact and again at form completion.
    #[instrument(skip(self))]
    pub async fn get_or_create_user(&self, id: UserId) -> Result<User> {
        let user = self.users.get_or_create(id, Utc::now()).await?;
        debug!(referral_code = %user.referral_code, "User resolved");
        Ok(user)
    }

    pub async fn get_user(&self, id: UserId) -> Result<User> {
        self.users
            .get(id)
            .await?
            .ok_or_else(|| RentalError::not_found(format!("User {id}")))
    }

    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, id: UserId, update: ProfileUpdate) -> Result<User> {
        self.users
            .update_profile(id, update)
            .await?
            .ok_or_else(|| RentalError::not_found(format!("User {id}")))
    }

    #[instrument(skip(self))]
    pub async fn register_partner(&self, id: UserId) -> Result<User> {
        let user = self.users.mark_partner(id, Utc::now()).await?;
        info!("Partner registered");
        Ok(user)
    }
}
