use super::EngineConfig;
use crate::domain::money::Hours;
use crate::domain::ports::{RentalStoreRef, ResourceStoreRef};
use crate::domain::rental::{Rental, RentalId};
use crate::domain::resource::{Resource, ResourceId};
use crate::domain::user::UserId;
use crate::error::{RentalError, Result};
use chrono::Utc;
use tracing::{debug, info, instrument};

/// Creates, binds and closes rentals.
///
/// Turning "available bike + renter" into a rental is the one place where
/// concurrent requests race. The check of the availability flag, its flip and
/// the rental insert must run as one isolated unit; the stores guarantee this
/// (a per-bike lock in memory, a `get_for_update` transaction in RocksDB).
/// Never replace a call below with a read of the bike followed by a separate
/// write: two renters would both see it free.
#[derive(Clone)]
pub struct ReservationEngine {
    rentals: RentalStoreRef,
    resources: ResourceStoreRef,
    config: EngineConfig,
}

impl ReservationEngine {
    pub fn new(rentals: RentalStoreRef, resources: ResourceStoreRef, config: EngineConfig) -> Self {
        Self {
            rentals,
            resources,
            config,
        }
    }

    /// Claims `resource` for `user`. Exactly one of any number of concurrent
    /// callers for the same bike succeeds; the rest get `Conflict`.
    #[instrument(skip(self))]
    pub async fn create_rental(&self, user: UserId, resource: ResourceId) -> Result<Rental> {
        let rental = self.rentals.create(user, resource, Utc::now()).await?;
        info!(rental_id = rental.id, "Rental started");
        Ok(rental)
    }

    /// Rents the current primary bike.
    #[instrument(skip(self))]
    pub async fn rent_primary(&self, user: UserId) -> Result<(Rental, Resource)> {
        let primary = self.primary().await?;
        let rental = self.create_rental(user, primary.id).await?;
        Ok((rental, primary))
    }

    /// Persists a request that waits for an administrator to bind a bike.
    #[instrument(skip(self))]
    pub async fn request_rental(&self, user: UserId) -> Result<Rental> {
        let rental = self.rentals.create_pending(user, Utc::now()).await?;
        info!(rental_id = rental.id, "Rental requested");
        Ok(rental)
    }

    #[instrument(skip(self))]
    pub async fn assign_resource(&self, rental: RentalId, resource: ResourceId) -> Result<Rental> {
        let rental = self.rentals.assign(rental, resource).await?;
        info!(rental_id = rental.id, bike_id = resource, "Bike assigned");
        Ok(rental)
    }

    /// Binds the current primary bike to a pending rental.
    #[instrument(skip(self))]
    pub async fn assign_primary(&self, rental: RentalId) -> Result<(Rental, Resource)> {
        let primary = self.primary().await?;
        let rental = self.assign_resource(rental, primary.id).await?;
        Ok((rental, primary))
    }

    /// Ends the rental now and bills `hours` at the bike's rate.
    ///
    /// The bike stays unavailable afterwards unless `release_on_close` is set;
    /// it is otherwise returned to service through [`super::ResourceRegistry::release`].
    #[instrument(skip(self, hours), fields(hours = %hours.value()))]
    pub async fn close_rental(&self, rental: RentalId, hours: Hours) -> Result<Rental> {
        let rental = self
            .rentals
            .close(rental, hours, Utc::now(), self.config.release_on_close)
            .await?;
        info!(rental_id = rental.id, fee = %rental.fee, "Rental closed");
        Ok(rental)
    }

    pub async fn get_rental(&self, id: RentalId) -> Result<Rental> {
        self.rentals
            .get(id)
            .await?
            .ok_or_else(|| RentalError::not_found(format!("Rental {id}")))
    }

    pub async fn list_rentals(&self) -> Result<Vec<Rental>> {
        self.rentals.all().await
    }

    async fn primary(&self) -> Result<Resource> {
        let primary = self
            .resources
            .get_primary()
            .await?
            .ok_or_else(|| RentalError::not_found("Primary bike"))?;
        debug!(bike_id = primary.id, "Primary bike resolved");
        Ok(primary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::{Balance, HourlyRate};
    use crate::domain::ports::ResourceStore;
    use crate::domain::rental::RentalStatus;
    use crate::domain::resource::NewResource;
    use crate::infrastructure::in_memory::InMemoryStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn engine(store: &Arc<InMemoryStore>, release_on_close: bool) -> ReservationEngine {
        ReservationEngine::new(store.clone(), store.clone(), EngineConfig { release_on_close })
    }

    async fn bike(store: &InMemoryStore, rate: Option<rust_decimal::Decimal>) -> Resource {
        let mut draft = NewResource::named("bike");
        draft.hourly_rate = rate.map(|r| HourlyRate::new(r).unwrap());
        store.insert(draft).await.unwrap()
    }

    #[tokio::test]
    async fn test_close_rental_fee() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(&store, false);
        let paid = bike(&store, Some(dec!(10.0))).await;
        let free = bike(&store, None).await;

        let rental = engine.create_rental(1, paid.id).await.unwrap();
        let closed = engine
            .close_rental(rental.id, Hours::new(dec!(2)).unwrap())
            .await
            .unwrap();
        assert_eq!(closed.fee, Balance::new(dec!(20.0)));
        assert_eq!(closed.status(), RentalStatus::Closed);

        let rental = engine.create_rental(1, free.id).await.unwrap();
        let closed = engine
            .close_rental(rental.id, Hours::new(dec!(2)).unwrap())
            .await
            .unwrap();
        assert_eq!(closed.fee, Balance::new(dec!(0.0)));
    }

    #[tokio::test]
    async fn test_close_twice_conflicts() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(&store, false);
        let b = bike(&store, Some(dec!(3))).await;
        let rental = engine.create_rental(1, b.id).await.unwrap();
        let hours = Hours::new(dec!(1)).unwrap();
        let first = engine.close_rental(rental.id, hours).await.unwrap();

        assert!(matches!(
            engine.close_rental(rental.id, hours).await,
            Err(RentalError::Conflict(_))
        ));
        assert_eq!(engine.get_rental(rental.id).await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_availability_not_restored_at_close_by_default() {
        let store = Arc::new(InMemoryStore::new());
        let b = bike(&store, Some(dec!(3))).await;
        let engine = engine(&store, false);
        let rental = engine.create_rental(1, b.id).await.unwrap();
        engine
            .close_rental(rental.id, Hours::new(dec!(1)).unwrap())
            .await
            .unwrap();
        assert!(matches!(
            engine.create_rental(2, b.id).await,
            Err(RentalError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_release_on_close() {
        let store = Arc::new(InMemoryStore::new());
        let b = bike(&store, Some(dec!(3))).await;
        let engine = engine(&store, true);
        let rental = engine.create_rental(1, b.id).await.unwrap();
        engine
            .close_rental(rental.id, Hours::new(dec!(1)).unwrap())
            .await
            .unwrap();
        assert!(engine.create_rental(2, b.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_rent_primary_requires_primary() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(&store, false);
        assert!(matches!(
            engine.rent_primary(1).await,
            Err(RentalError::NotFound(_))
        ));

        let b = bike(&store, None).await;
        store.set_primary(b.id).await.unwrap();
        let (rental, primary) = engine.rent_primary(1).await.unwrap();
        assert_eq!(rental.resource, Some(primary.id));
    }

    #[tokio::test]
    async fn test_assign_primary_to_request() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(&store, false);
        let request = engine.request_rental(1).await.unwrap();
        assert_eq!(request.status(), RentalStatus::Pending);

        let b = bike(&store, None).await;
        store.set_primary(b.id).await.unwrap();
        let (rental, _) = engine.assign_primary(request.id).await.unwrap();
        assert_eq!(rental.status(), RentalStatus::Assigned);

        let second = engine.request_rental(2).await.unwrap();
        assert!(matches!(
            engine.assign_primary(second.id).await,
            Err(RentalError::Conflict(_))
        ));
        assert!(matches!(
            engine.assign_primary(999).await,
            Err(RentalError::NotFound(_))
        ));
    }
}
