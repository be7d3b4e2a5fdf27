mod common;

use velorent::application::{EngineConfig, Services};
use velorent::domain::ports::Stores;
use velorent::error::RentalError;

const PARTNER: u64 = 1001;

/// Races `renters` claims on a single bike and checks exactly one wins.
async fn race_for_one_bike(services: Services, stores: Stores, renters: u64) {
    let bike = common::partner_with_bikes(&services, PARTNER, "10", 1).await.remove(0);

    let handles: Vec<_> = (0..renters)
        .map(|i| {
            let reservations = services.reservations.clone();
            tokio::spawn(async move { reservations.create_rental(2000 + i, bike.id).await })
        })
        .collect();

    let mut won = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(RentalError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(won, 1);
    assert_eq!(conflicts, renters - 1);
    assert_eq!(stores.rentals.all().await.unwrap().len(), 1);
    assert!(!services.registry.get(bike.id).await.unwrap().available);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_claims_on_one_bike_have_one_winner() {
    let (services, stores) = common::services(EngineConfig::default());
    race_for_one_bike(services, stores, 64).await;
}

#[cfg(feature = "storage-rocksdb")]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_claims_on_one_rocksdb_bike_have_one_winner() {
    use velorent::infrastructure::rocksdb::RocksDbStore;

    let dir = tempfile::tempdir().unwrap();
    let stores = Stores::shared(RocksDbStore::open(dir.path().join("db")).unwrap());
    let services = Services::new(stores.clone(), EngineConfig::default());
    race_for_one_bike(services, stores, 32).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_claims_on_distinct_bikes_all_succeed() {
    let (services, stores) = common::services(EngineConfig::default());
    let bikes = common::partner_with_bikes(&services, PARTNER, "10", 32).await;

    let handles: Vec<_> = bikes
        .iter()
        .enumerate()
        .map(|(i, bike)| {
            let reservations = services.reservations.clone();
            let bike = bike.id;
            tokio::spawn(async move { reservations.create_rental(3000 + i as u64, bike).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(stores.rentals.all().await.unwrap().len(), 32);
    assert!(services.registry.list_available().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_primary_swaps_race_with_rent_primary() {
    let (services, stores) = common::services(EngineConfig::default());
    let bikes = common::partner_with_bikes(&services, PARTNER, "10", 4).await;
    services.registry.set_primary(bikes[0].id).await.unwrap();

    let mut handles = Vec::new();
    for (i, bike) in bikes.iter().enumerate() {
        let registry = services.registry.clone();
        let id = bike.id;
        handles.push(tokio::spawn(async move {
            registry.set_primary(id).await.map(|_| ())
        }));
        let reservations = services.reservations.clone();
        handles.push(tokio::spawn(async move {
            match reservations.rent_primary(4000 + i as u64).await {
                Ok(_) | Err(RentalError::Conflict(_)) => Ok(()),
                Err(e) => Err(e),
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let flagged = stores
        .resources
        .all()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.primary)
        .count();
    assert_eq!(flagged, 1);
}
