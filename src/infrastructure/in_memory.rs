use crate::domain::money::{Amount, Hours};
use crate::domain::payout::{Payout, PayoutId};
use crate::domain::ports::{PayoutStore, RentalStore, ResourceStore, SessionStore, UserStore};
use crate::domain::rental::{Rental, RentalId};
use crate::domain::resource::{NewResource, Resource, ResourceId, default_code};
use crate::domain::user::{ProfileUpdate, ReferralCode, User, UserId};
use crate::error::{RentalError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};

type ResourceRow = Arc<Mutex<Resource>>;

/// A thread-safe in-memory store for every entity.
///
/// Each resource sits behind its own mutex, which plays the part of a
/// row-level write lock: claiming a bike locks only that bike, so rentals of
/// different bikes never wait on each other.
///
/// Lock order, always outer to inner: `primary`, `resources` map, a resource
/// row, `rentals`. Nothing acquires them in the reverse direction.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    users: Arc<RwLock<HashMap<UserId, User>>>,
    resources: Arc<RwLock<BTreeMap<ResourceId, ResourceRow>>>,
    codes: Arc<Mutex<HashSet<String>>>,
    primary: Arc<Mutex<Option<ResourceId>>>,
    rentals: Arc<RwLock<BTreeMap<RentalId, Rental>>>,
    payouts: Arc<RwLock<Vec<Payout>>>,
    resource_seq: Arc<AtomicU64>,
    rental_seq: Arc<AtomicU64>,
    payout_seq: Arc<AtomicU64>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn row(&self, id: ResourceId) -> Option<ResourceRow> {
        self.resources.read().await.get(&id).cloned()
    }

    async fn rows(&self) -> Vec<ResourceRow> {
        self.resources.read().await.values().cloned().collect()
    }
}

fn next_id(seq: &AtomicU64) -> u64 {
    seq.fetch_add(1, Ordering::SeqCst) + 1
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn get_or_create(&self, id: UserId, at: DateTime<Utc>) -> Result<User> {
        let mut users = self.users.write().await;
        Ok(users.entry(id).or_insert_with(|| User::new(id, at)).clone())
    }

    async fn get(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn update_profile(&self, id: UserId, update: ProfileUpdate) -> Result<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|user| {
            user.apply(update);
            user.clone()
        }))
    }

    async fn mark_partner(&self, id: UserId, at: DateTime<Utc>) -> Result<User> {
        let mut users = self.users.write().await;
        let user = users.entry(id).or_insert_with(|| User::new(id, at));
        user.is_partner = true;
        Ok(user.clone())
    }

    async fn find_by_referral_code(&self, code: &ReferralCode) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| &u.referral_code == code).cloned())
    }

    async fn link_referrer(&self, id: UserId, referrer: UserId) -> Result<Option<bool>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|user| user.link_referrer(referrer)))
    }

    async fn count_referred_by(&self, referrer: UserId) -> Result<u64> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .filter(|u| u.id != referrer && u.referrer == Some(referrer))
            .count() as u64)
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn insert(&self, draft: NewResource) -> Result<Resource> {
        draft.validate()?;
        let mut codes = self.codes.lock().await;
        let id = next_id(&self.resource_seq);
        let code = draft.code.clone().unwrap_or_else(|| default_code(id));
        if codes.contains(&code) {
            return Err(RentalError::conflict(format!("Bike code {code} is taken")));
        }
        let resource = Resource::new(
            id,
            NewResource {
                code: Some(code.clone()),
                ..draft
            },
        );
        self.resources
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(resource.clone())));
        codes.insert(code);
        Ok(resource)
    }

    async fn get(&self, id: ResourceId) -> Result<Option<Resource>> {
        match self.row(id).await {
            Some(row) => Ok(Some(row.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn all(&self) -> Result<Vec<Resource>> {
        // Held so a concurrent primary swap is never observed half-done.
        let _primary = self.primary.lock().await;
        let mut all = Vec::new();
        for row in self.rows().await {
            all.push(row.lock().await.clone());
        }
        Ok(all)
    }

    async fn list_available(&self) -> Result<Vec<Resource>> {
        let mut available = Vec::new();
        for row in self.rows().await {
            let resource = row.lock().await;
            if resource.available {
                available.push(resource.clone());
            }
        }
        Ok(available)
    }

    async fn release(&self, id: ResourceId) -> Result<Resource> {
        let row = self
            .row(id)
            .await
            .ok_or_else(|| RentalError::not_found(format!("Bike {id}")))?;
        let mut resource = row.lock().await;
        let in_use = self
            .rentals
            .read()
            .await
            .values()
            .any(|r| r.resource == Some(id) && r.is_open());
        if in_use {
            return Err(RentalError::conflict(format!("Bike {id} is in an open rental")));
        }
        resource.release();
        Ok(resource.clone())
    }

    async fn set_primary(&self, id: ResourceId) -> Result<Resource> {
        let mut primary = self.primary.lock().await;
        let target = self
            .row(id)
            .await
            .ok_or_else(|| RentalError::not_found(format!("Bike {id}")))?;
        if let Some(previous) = *primary
            && previous != id
            && let Some(row) = self.row(previous).await
        {
            row.lock().await.primary = false;
        }
        let mut resource = target.lock().await;
        resource.primary = true;
        *primary = Some(id);
        Ok(resource.clone())
    }

    async fn get_primary(&self) -> Result<Option<Resource>> {
        let primary = self.primary.lock().await;
        match *primary {
            Some(id) => ResourceStore::get(self, id).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl RentalStore for InMemoryStore {
    async fn create(
        &self,
        user: UserId,
        resource: ResourceId,
        at: DateTime<Utc>,
    ) -> Result<Rental> {
        let row = self
            .row(resource)
            .await
            .ok_or_else(|| RentalError::conflict(format!("Bike {resource} does not exist")))?;
        // The row guard is held across check, flip and insert.
        let mut bike = row.lock().await;
        bike.claim()?;
        let rental = Rental::new(next_id(&self.rental_seq), user, Some(resource), at);
        self.rentals.write().await.insert(rental.id, rental.clone());
        Ok(rental)
    }

    async fn create_pending(&self, user: UserId, at: DateTime<Utc>) -> Result<Rental> {
        let rental = Rental::new(next_id(&self.rental_seq), user, None, at);
        self.rentals.write().await.insert(rental.id, rental.clone());
        Ok(rental)
    }

    async fn assign(&self, rental: RentalId, resource: ResourceId) -> Result<Rental> {
        let Some(row) = self.row(resource).await else {
            return if self.rentals.read().await.contains_key(&rental) {
                Err(RentalError::conflict(format!("Bike {resource} does not exist")))
            } else {
                Err(RentalError::not_found(format!("Rental {rental}")))
            };
        };
        let mut bike = row.lock().await;
        let mut rentals = self.rentals.write().await;
        let entry = rentals
            .get_mut(&rental)
            .ok_or_else(|| RentalError::not_found(format!("Rental {rental}")))?;
        entry.ensure_bindable()?;
        bike.claim()?;
        entry.bind(resource)?;
        Ok(entry.clone())
    }

    async fn close(
        &self,
        rental: RentalId,
        hours: Hours,
        at: DateTime<Utc>,
        release: bool,
    ) -> Result<Rental> {
        let resource = self
            .rentals
            .read()
            .await
            .get(&rental)
            .ok_or_else(|| RentalError::not_found(format!("Rental {rental}")))?
            .resource
            .ok_or_else(|| RentalError::not_found(format!("Bike of rental {rental}")))?;
        let row = self
            .row(resource)
            .await
            .ok_or_else(|| RentalError::not_found(format!("Bike {resource}")))?;
        let mut bike = row.lock().await;
        let mut rentals = self.rentals.write().await;
        let entry = rentals
            .get_mut(&rental)
            .ok_or_else(|| RentalError::not_found(format!("Rental {rental}")))?;
        entry.close(bike.hourly_rate, hours, at)?;
        if release {
            bike.release();
        }
        Ok(entry.clone())
    }

    async fn get(&self, id: RentalId) -> Result<Option<Rental>> {
        Ok(self.rentals.read().await.get(&id).cloned())
    }

    async fn all(&self) -> Result<Vec<Rental>> {
        Ok(self.rentals.read().await.values().cloned().collect())
    }

    async fn for_owner(&self, partner: UserId) -> Result<Vec<Rental>> {
        let mut owned = HashSet::new();
        for row in self.rows().await {
            let resource = row.lock().await;
            if resource.owner == Some(partner) {
                owned.insert(resource.id);
            }
        }
        let rentals = self.rentals.read().await;
        Ok(rentals
            .values()
            .filter(|r| r.resource.is_some_and(|id| owned.contains(&id)))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PayoutStore for InMemoryStore {
    async fn append(&self, partner: UserId, amount: Amount, at: DateTime<Utc>) -> Result<Payout> {
        let payout = Payout {
            id: next_id(&self.payout_seq) as PayoutId,
            partner,
            amount,
            created_at: at,
        };
        self.payouts.write().await.push(payout.clone());
        Ok(payout)
    }

    async fn for_partner(&self, partner: UserId) -> Result<Vec<Payout>> {
        let payouts = self.payouts.read().await;
        Ok(payouts
            .iter()
            .filter(|p| p.partner == partner)
            .cloned()
            .collect())
    }
}

/// Session store kept in process memory. Entries carry their own deadline.
pub struct InMemorySessionStore<S> {
    sessions: RwLock<HashMap<UserId, (S, Instant)>>,
}

impl<S> Default for InMemorySessionStore<S> {
    fn default() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl<S> InMemorySessionStore<S> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<S> SessionStore<S> for InMemorySessionStore<S>
where
    S: Clone + Send + Sync + 'static,
{
    async fn put(&self, user: UserId, state: S, expires_at: Instant) -> Result<()> {
        self.sessions.write().await.insert(user, (state, expires_at));
        Ok(())
    }

    async fn get(&self, user: UserId, now: Instant) -> Result<Option<S>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(&user)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(state, _)| state.clone()))
    }

    async fn remove(&self, user: UserId) -> Result<Option<S>> {
        Ok(self.sessions.write().await.remove(&user).map(|(state, _)| state))
    }

    async fn purge(&self, now: Instant) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, (_, expires_at)| *expires_at > now);
        Ok(before - sessions.len())
    }
}
