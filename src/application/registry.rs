use crate::domain::ports::{ResourceStoreRef, UserStoreRef};
use crate::domain::resource::{NewResource, Resource, ResourceId};
use crate::error::{RentalError, Result};
use tracing::{info, instrument};

/// Bike registration, availability listing and the primary designation.
#[derive(Clone)]
pub struct ResourceRegistry {
    resources: ResourceStoreRef,
    users: UserStoreRef,
}

impl ResourceRegistry {
    pub fn new(resources: ResourceStoreRef, users: UserStoreRef) -> Self {
        Self { resources, users }
    }

    /// Registers a bike. An owner, when given, must be a known partner.
    #[instrument(skip(self, draft), fields(name = %draft.name, owner = ?draft.owner))]
    pub async fn register(&self, draft: NewResource) -> Result<Resource> {
        draft.validate()?;
        if let Some(owner) = draft.owner {
            let user = self
                .users
                .get(owner)
                .await?
                .ok_or_else(|| RentalError::not_found(format!("Partner {owner}")))?;
            if !user.is_partner {
                return Err(RentalError::validation(format!(
                    "User {owner} is not a partner"
                )));
            }
        }
        let resource = self.resources.insert(draft).await?;
        info!(bike_id = resource.id, code = %resource.code, "Bike registered");
        Ok(resource)
    }

    pub async fn get(&self, id: ResourceId) -> Result<Resource> {
        self.resources
            .get(id)
            .await?
            .ok_or_else(|| RentalError::not_found(format!("Bike {id}")))
    }

    pub async fn list_available(&self) -> Result<Vec<Resource>> {
        self.resources.list_available().await
    }

    pub async fn list_all(&self) -> Result<Vec<Resource>> {
        self.resources.all().await
    }

    /// Makes a bike rentable again once no open rental holds it.
    #[instrument(skip(self))]
    pub async fn release(&self, id: ResourceId) -> Result<Resource> {
        let resource = self.resources.release(id).await?;
        info!(bike_id = id, "Bike released");
        Ok(resource)
    }

    #[instrument(skip(self))]
    pub async fn set_primary(&self, id: ResourceId) -> Result<Resource> {
        let resource = self.resources.set_primary(id).await?;
        info!(bike_id = id, "Primary bike changed");
        Ok(resource)
    }

    pub async fn get_primary(&self) -> Result<Option<Resource>> {
        self.resources.get_primary().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::UserStore;
    use crate::infrastructure::in_memory::InMemoryStore;
    use chrono::Utc;
    use std::sync::Arc;

    fn registry(store: &Arc<InMemoryStore>) -> ResourceRegistry {
        ResourceRegistry::new(store.clone(), store.clone())
    }

    #[tokio::test]
    async fn test_register_checks_owner() {
        let store = Arc::new(InMemoryStore::new());
        let registry = registry(&store);

        assert!(matches!(
            registry.register(NewResource::named("x").owned_by(5)).await,
            Err(RentalError::NotFound(_))
        ));
        store.get_or_create(5, Utc::now()).await.unwrap();
        assert!(matches!(
            registry.register(NewResource::named("x").owned_by(5)).await,
            Err(RentalError::ValidationError(_))
        ));
        store.mark_partner(5, Utc::now()).await.unwrap();
        let bike = registry
            .register(NewResource::named("x").owned_by(5))
            .await
            .unwrap();
        assert_eq!(bike.owner, Some(5));
    }

    #[tokio::test]
    async fn test_unowned_bikes_are_allowed() {
        let store = Arc::new(InMemoryStore::new());
        let registry = registry(&store);
        let bike = registry.register(NewResource::named("spare")).await.unwrap();
        assert!(bike.owner.is_none());
        assert_eq!(registry.list_available().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_primary_swap_leaves_exactly_one() {
        let store = Arc::new(InMemoryStore::new());
        let registry = registry(&store);
        let a = registry.register(NewResource::named("a")).await.unwrap();
        let b = registry.register(NewResource::named("b")).await.unwrap();
        assert!(registry.get_primary().await.unwrap().is_none());

        registry.set_primary(a.id).await.unwrap();
        registry.set_primary(b.id).await.unwrap();

        assert_eq!(registry.get_primary().await.unwrap().unwrap().id, b.id);
        let flagged: Vec<_> = registry
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.primary)
            .collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].id, b.id);
    }

    #[tokio::test]
    async fn test_set_primary_same_bike_twice() {
        let store = Arc::new(InMemoryStore::new());
        let registry = registry(&store);
        let a = registry.register(NewResource::named("a")).await.unwrap();
        registry.set_primary(a.id).await.unwrap();
        let again = registry.set_primary(a.id).await.unwrap();
        assert!(again.primary);
    }
}
