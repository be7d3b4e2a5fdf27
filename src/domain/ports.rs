use super::money::{Amount, Hours};
use super::payout::Payout;
use super::rental::{Rental, RentalId};
use super::resource::{NewResource, Resource, ResourceId};
use super::user::{ProfileUpdate, ReferralCode, User, UserId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Idempotent upsert keyed by the external id.
    async fn get_or_create(&self, id: UserId, at: DateTime<Utc>) -> Result<User>;
    async fn get(&self, id: UserId) -> Result<Option<User>>;
    async fn update_profile(&self, id: UserId, update: ProfileUpdate) -> Result<Option<User>>;
    /// Upsert that sets the partner flag.
    async fn mark_partner(&self, id: UserId, at: DateTime<Utc>) -> Result<User>;
    async fn find_by_referral_code(&self, code: &ReferralCode) -> Result<Option<User>>;
    /// Writes `referrer` only if the user has none yet, atomically.
    /// `None` when the user does not exist, otherwise whether this call wrote it.
    async fn link_referrer(&self, id: UserId, referrer: UserId) -> Result<Option<bool>>;
    async fn count_referred_by(&self, referrer: UserId) -> Result<u64>;
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fails with `Conflict` when the code is already taken.
    async fn insert(&self, draft: NewResource) -> Result<Resource>;
    async fn get(&self, id: ResourceId) -> Result<Option<Resource>>;
    async fn all(&self) -> Result<Vec<Resource>>;
    async fn list_available(&self) -> Result<Vec<Resource>>;
    /// Fails with `Conflict` while an open rental references `id`.
    async fn release(&self, id: ResourceId) -> Result<Resource>;
    /// Clears the flag on the current primary and sets it on `id` as one
    /// atomic step. Fails with `NotFound`, changing nothing, if `id` is absent.
    async fn set_primary(&self, id: ResourceId) -> Result<Resource>;
    async fn get_primary(&self) -> Result<Option<Resource>>;
}

/// Rental persistence. Every method that touches availability claims the
/// resource and writes the rental in one isolated unit.
#[async_trait]
pub trait RentalStore: Send + Sync {
    /// Claims `resource` and inserts the rental. `Conflict` if the resource is
    /// absent or taken; nothing is written in that case.
    async fn create(
        &self,
        user: UserId,
        resource: ResourceId,
        at: DateTime<Utc>,
    ) -> Result<Rental>;
    /// Inserts an open rental with no bike bound.
    async fn create_pending(&self, user: UserId, at: DateTime<Utc>) -> Result<Rental>;
    /// Binds `resource` to a pending rental under the same claim discipline.
    async fn assign(&self, rental: RentalId, resource: ResourceId) -> Result<Rental>;
    /// Reads rental and rate and writes end time and fee in one unit.
    async fn close(
        &self,
        rental: RentalId,
        hours: Hours,
        at: DateTime<Utc>,
        release: bool,
    ) -> Result<Rental>;
    async fn get(&self, id: RentalId) -> Result<Option<Rental>>;
    async fn all(&self) -> Result<Vec<Rental>>;
    /// Rentals of every bike owned by `partner`.
    async fn for_owner(&self, partner: UserId) -> Result<Vec<Rental>>;
}

#[async_trait]
pub trait PayoutStore: Send + Sync {
    async fn append(&self, partner: UserId, amount: Amount, at: DateTime<Utc>) -> Result<Payout>;
    async fn for_partner(&self, partner: UserId) -> Result<Vec<Payout>>;
}

/// Outbound message delivery to users.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: UserId, message: &str) -> Result<()>;
}

/// Per-user conversation state with an explicit deadline.
#[async_trait]
pub trait SessionStore<S>: Send + Sync
where
    S: Clone + Send + Sync + 'static,
{
    async fn put(&self, user: UserId, state: S, expires_at: Instant) -> Result<()>;
    /// Returns the state only if it has not expired at `now`.
    async fn get(&self, user: UserId, now: Instant) -> Result<Option<S>>;
    async fn remove(&self, user: UserId) -> Result<Option<S>>;
    /// Drops expired entries, returning how many were removed.
    async fn purge(&self, now: Instant) -> Result<usize>;
}

pub type UserStoreRef = Arc<dyn UserStore>;
pub type ResourceStoreRef = Arc<dyn ResourceStore>;
pub type RentalStoreRef = Arc<dyn RentalStore>;
pub type PayoutStoreRef = Arc<dyn PayoutStore>;
pub type NotifierRef = Arc<dyn Notifier>;

/// The four entity stores the services run on.
#[derive(Clone)]
pub struct Stores {
    pub users: UserStoreRef,
    pub resources: ResourceStoreRef,
    pub rentals: RentalStoreRef,
    pub payouts: PayoutStoreRef,
}

impl Stores {
    /// Uses one backend for every entity.
    pub fn shared<T>(store: T) -> Self
    where
        T: UserStore + ResourceStore + RentalStore + PayoutStore + 'static,
    {
        let store = Arc::new(store);
        Self {
            users: store.clone(),
            resources: store.clone(),
            rentals: store.clone(),
            payouts: store,
        }
    }
}
