#![allow(dead_code)]

use std::io::Write;
use tempfile::NamedTempFile;
use velorent::application::{EngineConfig, Services};
use velorent::domain::money::HourlyRate;
use velorent::domain::ports::Stores;
use velorent::domain::resource::{NewResource, Resource};
use velorent::domain::user::UserId;
use velorent::infrastructure::in_memory::InMemoryStore;

pub fn services(config: EngineConfig) -> (Services, Stores) {
    let stores = Stores::shared(InMemoryStore::new());
    (Services::new(stores.clone(), config), stores)
}

/// Registers `partner` and `count` bikes they own, all at `rate` per hour.
pub async fn partner_with_bikes(
    services: &Services,
    partner: UserId,
    rate: &str,
    count: usize,
) -> Vec<Resource> {
    services.directory.register_partner(partner).await.unwrap();
    let rate: HourlyRate = rate.parse().unwrap();
    let mut bikes = Vec::with_capacity(count);
    for i in 0..count {
        let draft = NewResource::named(format!("Bike {i}"))
            .with_rate(rate)
            .owned_by(partner);
        bikes.push(services.registry.register(draft).await.unwrap());
    }
    bikes
}

pub fn script(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}
