use crate::domain::money::{Amount, Hours};
use crate::domain::payout::Payout;
use crate::domain::ports::{PayoutStore, RentalStore, ResourceStore, UserStore};
use crate::domain::rental::{Rental, RentalId};
use crate::domain::resource::{NewResource, Resource, ResourceId, default_code};
use crate::domain::user::{ProfileUpdate, ReferralCode, User, UserId};
use crate::error::{RentalError, Result};
use ::rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, ErrorKind, IteratorMode, Options, Transaction,
    TransactionDB, TransactionDBOptions,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub const CF_USERS: &str = "users";
pub const CF_RESOURCES: &str = "resources";
/// Bike code -> bike id, enforcing code uniqueness.
pub const CF_RESOURCE_CODES: &str = "resource_codes";
pub const CF_RENTALS: &str = "rentals";
pub const CF_PAYOUTS: &str = "payouts";
pub const CF_META: &str = "meta";

const COLUMN_FAMILIES: [&str; 6] = [
    CF_USERS,
    CF_RESOURCES,
    CF_RESOURCE_CODES,
    CF_RENTALS,
    CF_PAYOUTS,
    CF_META,
];
const PRIMARY_KEY: &[u8] = b"primary";

type Txn<'a> = Transaction<'a, TransactionDB>;

/// A persistent store on a RocksDB `TransactionDB`.
///
/// Every read-then-write goes through a transaction that takes the row with
/// `get_for_update`, so the row stays write-locked until commit. A caller
/// that times out waiting for the lock gets `Conflict`, as if it had lost the
/// race. Only touched rows are locked; rentals of different bikes run in
/// parallel.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<TransactionDB>,
    resource_seq: Arc<AtomicU64>,
    rental_seq: Arc<AtomicU64>,
    payout_seq: Arc<AtomicU64>,
}

impl RocksDbStore {
    /// Opens or creates a database at `path` with all column families present.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = TransactionDB::open_cf_descriptors(
            &opts,
            &TransactionDBOptions::default(),
            path,
            descriptors,
        )?;

        let store = Self {
            db: Arc::new(db),
            resource_seq: Arc::default(),
            rental_seq: Arc::default(),
            payout_seq: Arc::default(),
        };
        store
            .resource_seq
            .store(store.last_key(CF_RESOURCES)?, Ordering::SeqCst);
        store
            .rental_seq
            .store(store.last_key(CF_RENTALS)?, Ordering::SeqCst);
        store
            .payout_seq
            .store(store.last_key(CF_PAYOUTS)?, Ordering::SeqCst);
        Ok(store)
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            RentalError::InternalError(Box::new(std::io::Error::other(format!(
                "Column family {name} not found"
            ))))
        })
    }

    fn last_key(&self, name: &str) -> Result<u64> {
        let cf = self.cf(name)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                decode_key(&key)
            }
            None => Ok(0),
        }
    }

    fn scan<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let cf = self.cf(name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(decode(&value)?);
        }
        Ok(values)
    }

    fn read<T: DeserializeOwned>(&self, name: &str, id: u64) -> Result<Option<T>> {
        let cf = self.cf(name)?;
        self.db
            .get_cf(cf, key(id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn lock_row<T: DeserializeOwned>(
        &self,
        txn: &Txn<'_>,
        name: &str,
        id: u64,
    ) -> Result<Option<T>> {
        let cf = self.cf(name)?;
        txn.get_for_update_cf(cf, key(id), true)
            .map_err(lock_error)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn write_row<T: Serialize>(
        &self,
        txn: &Txn<'_>,
        name: &str,
        id: u64,
        value: &T,
    ) -> Result<()> {
        let cf = self.cf(name)?;
        txn.put_cf(cf, key(id), encode(value)?).map_err(lock_error)
    }

    fn upsert_user(&self, id: UserId, at: DateTime<Utc>, partner: bool) -> Result<User> {
        let txn = self.db.transaction();
        let existing: Option<User> = self.lock_row(&txn, CF_USERS, id)?;
        let mut user = existing.clone().unwrap_or_else(|| User::new(id, at));
        if partner {
            user.is_partner = true;
        }
        if existing.as_ref() != Some(&user) {
            self.write_row(&txn, CF_USERS, id, &user)?;
            txn.commit().map_err(lock_error)?;
        }
        Ok(user)
    }

    fn modify_user<R>(&self, id: UserId, change: impl FnOnce(&mut User) -> R) -> Result<Option<R>> {
        let txn = self.db.transaction();
        let Some(mut user) = self.lock_row::<User>(&txn, CF_USERS, id)? else {
            return Ok(None);
        };
        let outcome = change(&mut user);
        self.write_row(&txn, CF_USERS, id, &user)?;
        txn.commit().map_err(lock_error)?;
        Ok(Some(outcome))
    }

    fn insert_resource(&self, draft: NewResource) -> Result<Resource> {
        draft.validate()?;
        let id = self.resource_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let code = draft.code.clone().unwrap_or_else(|| default_code(id));
        let codes = self.cf(CF_RESOURCE_CODES)?;

        let txn = self.db.transaction();
        if txn
            .get_for_update_cf(codes, code.as_bytes(), true)
            .map_err(lock_error)?
            .is_some()
        {
            return Err(RentalError::conflict(format!("Bike code {code} is taken")));
        }
        let resource = Resource::new(
            id,
            NewResource {
                code: Some(code.clone()),
                ..draft
            },
        );
        txn.put_cf(codes, code.as_bytes(), key(id)).map_err(lock_error)?;
        self.write_row(&txn, CF_RESOURCES, id, &resource)?;
        txn.commit().map_err(lock_error)?;
        Ok(resource)
    }

    fn swap_primary(&self, id: ResourceId) -> Result<Resource> {
        let meta = self.cf(CF_META)?;
        let txn = self.db.transaction();
        let previous = txn
            .get_for_update_cf(meta, PRIMARY_KEY, true)
            .map_err(lock_error)?
            .map(|bytes| decode_key(&bytes))
            .transpose()?;
        // Dropping `txn` on this early return discards everything.
        let mut target: Resource = self
            .lock_row(&txn, CF_RESOURCES, id)?
            .ok_or_else(|| RentalError::not_found(format!("Bike {id}")))?;

        if let Some(previous) = previous
            && previous != id
            && let Some(mut old) = self.lock_row::<Resource>(&txn, CF_RESOURCES, previous)?
        {
            old.primary = false;
            self.write_row(&txn, CF_RESOURCES, previous, &old)?;
        }
        target.primary = true;
        self.write_row(&txn, CF_RESOURCES, id, &target)?;
        txn.put_cf(meta, PRIMARY_KEY, key(id)).map_err(lock_error)?;
        txn.commit().map_err(lock_error)?;
        Ok(target)
    }

    fn read_primary(&self) -> Result<Option<Resource>> {
        let meta = self.cf(CF_META)?;
        let resources = self.cf(CF_RESOURCES)?;
        let txn = self.db.transaction();
        // Shared lock: a swap cannot commit between the two reads.
        let Some(bytes) = txn
            .get_for_update_cf(meta, PRIMARY_KEY, false)
            .map_err(lock_error)?
        else {
            return Ok(None);
        };
        let id = decode_key(&bytes)?;
        txn.get_cf(resources, key(id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn release_resource(&self, id: ResourceId) -> Result<Resource> {
        let txn = self.db.transaction();
        let mut resource: Resource = self
            .lock_row(&txn, CF_RESOURCES, id)?
            .ok_or_else(|| RentalError::not_found(format!("Bike {id}")))?;
        // Claims and closes lock the bike row too, so this scan cannot race them.
        if self
            .scan::<Rental>(CF_RENTALS)?
            .iter()
            .any(|r| r.resource == Some(id) && r.is_open())
        {
            return Err(RentalError::conflict(format!("Bike {id} is in an open rental")));
        }
        resource.release();
        self.write_row(&txn, CF_RESOURCES, id, &resource)?;
        txn.commit().map_err(lock_error)?;
        Ok(resource)
    }

    fn claim_and_insert(
        &self,
        user: UserId,
        resource: ResourceId,
        at: DateTime<Utc>,
    ) -> Result<Rental> {
        let txn = self.db.transaction();
        let mut bike: Resource = self
            .lock_row(&txn, CF_RESOURCES, resource)?
            .ok_or_else(|| RentalError::conflict(format!("Bike {resource} does not exist")))?;
        bike.claim()?;
        let rental = Rental::new(
            self.rental_seq.fetch_add(1, Ordering::SeqCst) + 1,
            user,
            Some(resource),
            at,
        );
        self.write_row(&txn, CF_RESOURCES, resource, &bike)?;
        self.write_row(&txn, CF_RENTALS, rental.id, &rental)?;
        txn.commit().map_err(lock_error)?;
        Ok(rental)
    }

    fn bind_resource(&self, rental: RentalId, resource: ResourceId) -> Result<Rental> {
        let txn = self.db.transaction();
        let mut entry: Rental = self
            .lock_row(&txn, CF_RENTALS, rental)?
            .ok_or_else(|| RentalError::not_found(format!("Rental {rental}")))?;
        entry.ensure_bindable()?;
        let mut bike: Resource = self
            .lock_row(&txn, CF_RESOURCES, resource)?
            .ok_or_else(|| RentalError::conflict(format!("Bike {resource} does not exist")))?;
        bike.claim()?;
        entry.bind(resource)?;
        self.write_row(&txn, CF_RESOURCES, resource, &bike)?;
        self.write_row(&txn, CF_RENTALS, rental, &entry)?;
        txn.commit().map_err(lock_error)?;
        Ok(entry)
    }

    fn close_rental(
        &self,
        rental: RentalId,
        hours: Hours,
        at: DateTime<Utc>,
        release: bool,
    ) -> Result<Rental> {
        let txn = self.db.transaction();
        let mut entry: Rental = self
            .lock_row(&txn, CF_RENTALS, rental)?
            .ok_or_else(|| RentalError::not_found(format!("Rental {rental}")))?;
        let resource = entry
            .resource
            .ok_or_else(|| RentalError::not_found(format!("Bike of rental {rental}")))?;
        let mut bike: Resource = self
            .lock_row(&txn, CF_RESOURCES, resource)?
            .ok_or_else(|| RentalError::not_found(format!("Bike {resource}")))?;
        entry.close(bike.hourly_rate, hours, at)?;
        if release {
            bike.release();
            self.write_row(&txn, CF_RESOURCES, resource, &bike)?;
        }
        self.write_row(&txn, CF_RENTALS, rental, &entry)?;
        txn.commit().map_err(lock_error)?;
        Ok(entry)
    }
}

fn key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn decode_key(bytes: &[u8]) -> Result<u64> {
    <[u8; 8]>::try_from(bytes)
        .map(u64::from_be_bytes)
        .map_err(|_| {
            RentalError::InternalError(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Malformed key",
            )))
        })
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| {
        RentalError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Serialization error: {}", e),
        )))
    })
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        RentalError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Deserialization error: {}", e),
        )))
    })
}

/// Lock waits that expire mean another writer holds the row.
fn lock_error(e: ::rocksdb::Error) -> RentalError {
    match e.kind() {
        ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain => {
            RentalError::conflict(format!("Row is locked by a concurrent update: {e}"))
        }
        _ => RentalError::StorageError(e),
    }
}

#[async_trait]
impl UserStore for RocksDbStore {
    async fn get_or_create(&self, id: UserId, at: DateTime<Utc>) -> Result<User> {
        self.upsert_user(id, at, false)
    }

    async fn get(&self, id: UserId) -> Result<Option<User>> {
        self.read(CF_USERS, id)
    }

    async fn update_profile(&self, id: UserId, update: ProfileUpdate) -> Result<Option<User>> {
        self.modify_user(id, |user| {
            user.apply(update);
            user.clone()
        })
    }

    async fn mark_partner(&self, id: UserId, at: DateTime<Utc>) -> Result<User> {
        self.upsert_user(id, at, true)
    }

    async fn find_by_referral_code(&self, code: &ReferralCode) -> Result<Option<User>> {
        let users: Vec<User> = self.scan(CF_USERS)?;
        Ok(users.into_iter().find(|u| &u.referral_code == code))
    }

    async fn link_referrer(&self, id: UserId, referrer: UserId) -> Result<Option<bool>> {
        self.modify_user(id, |user| user.link_referrer(referrer))
    }

    async fn count_referred_by(&self, referrer: UserId) -> Result<u64> {
        let users: Vec<User> = self.scan(CF_USERS)?;
        Ok(users
            .iter()
            .filter(|u| u.id != referrer && u.referrer == Some(referrer))
            .count() as u64)
    }
}

#[async_trait]
impl ResourceStore for RocksDbStore {
    async fn insert(&self, draft: NewResource) -> Result<Resource> {
        self.insert_resource(draft)
    }

    async fn get(&self, id: ResourceId) -> Result<Option<Resource>> {
        self.read(CF_RESOURCES, id)
    }

    async fn all(&self) -> Result<Vec<Resource>> {
        self.scan(CF_RESOURCES)
    }

    async fn list_available(&self) -> Result<Vec<Resource>> {
        let resources: Vec<Resource> = self.scan(CF_RESOURCES)?;
        Ok(resources.into_iter().filter(|r| r.available).collect())
    }

    async fn release(&self, id: ResourceId) -> Result<Resource> {
        self.release_resource(id)
    }

    async fn set_primary(&self, id: ResourceId) -> Result<Resource> {
        self.swap_primary(id)
    }

    async fn get_primary(&self) -> Result<Option<Resource>> {
        self.read_primary()
    }
}

#[async_trait]
impl RentalStore for RocksDbStore {
    async fn create(
        &self,
        user: UserId,
        resource: ResourceId,
        at: DateTime<Utc>,
    ) -> Result<Rental> {
        self.claim_and_insert(user, resource, at)
    }

    async fn create_pending(&self, user: UserId, at: DateTime<Utc>) -> Result<Rental> {
        let rental = Rental::new(
            self.rental_seq.fetch_add(1, Ordering::SeqCst) + 1,
            user,
            None,
            at,
        );
        let cf = self.cf(CF_RENTALS)?;
        self.db.put_cf(cf, key(rental.id), encode(&rental)?)?;
        Ok(rental)
    }

    async fn assign(&self, rental: RentalId, resource: ResourceId) -> Result<Rental> {
        self.bind_resource(rental, resource)
    }

    async fn close(
        &self,
        rental: RentalId,
        hours: Hours,
        at: DateTime<Utc>,
        release: bool,
    ) -> Result<Rental> {
        self.close_rental(rental, hours, at, release)
    }

    async fn get(&self, id: RentalId) -> Result<Option<Rental>> {
        self.read(CF_RENTALS, id)
    }

    async fn all(&self) -> Result<Vec<Rental>> {
        self.scan(CF_RENTALS)
    }

    async fn for_owner(&self, partner: UserId) -> Result<Vec<Rental>> {
        let resources: Vec<Resource> = self.scan(CF_RESOURCES)?;
        let owned: Vec<ResourceId> = resources
            .iter()
            .filter(|r| r.owner == Some(partner))
            .map(|r| r.id)
            .collect();
        let rentals: Vec<Rental> = self.scan(CF_RENTALS)?;
        Ok(rentals
            .into_iter()
            .filter(|r| r.resource.is_some_and(|id| owned.contains(&id)))
            .collect())
    }
}

#[async_trait]
impl PayoutStore for RocksDbStore {
    async fn append(&self, partner: UserId, amount: Amount, at: DateTime<Utc>) -> Result<Payout> {
        let payout = Payout {
            id: self.payout_seq.fetch_add(1, Ordering::SeqCst) + 1,
            partner,
            amount,
            created_at: at,
        };
        let cf = self.cf(CF_PAYOUTS)?;
        self.db.put_cf(cf, key(payout.id), encode(&payout)?)?;
        Ok(payout)
    }

    async fn for_partner(&self, partner: UserId) -> Result<Vec<Payout>> {
        let payouts: Vec<Payout> = self.scan(CF_PAYOUTS)?;
        Ok(payouts.into_iter().filter(|p| p.partner == partner).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::{Balance, HourlyRate};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in COLUMN_FAMILIES {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_rental_lifecycle() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();

        let bike = store
            .insert(
                NewResource::named("Test Bike")
                    .owned_by(1001)
                    .with_rate(HourlyRate::new(dec!(10.0)).unwrap())
                    .with_code("B100"),
            )
            .await
            .unwrap();
        let rental = RentalStore::create(&store, 2001, bike.id, Utc::now())
            .await
            .unwrap();
        assert!(matches!(
            RentalStore::create(&store, 2002, bike.id, Utc::now()).await,
            Err(RentalError::Conflict(_))
        ));

        let closed = store
            .close(rental.id, Hours::new(dec!(3)).unwrap(), Utc::now(), false)
            .await
            .unwrap();
        assert_eq!(closed.fee, Balance::new(dec!(30.0)));
        assert_eq!(store.for_owner(1001).await.unwrap(), vec![closed]);
    }

    #[tokio::test]
    async fn test_rocksdb_release_refused_while_rental_open() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        let bike = store.insert(NewResource::named("bike")).await.unwrap();
        let rental = RentalStore::create(&store, 2001, bike.id, Utc::now())
            .await
            .unwrap();

        assert!(matches!(
            ResourceStore::release(&store, bike.id).await,
            Err(RentalError::Conflict(_))
        ));
        assert!(matches!(
            RentalStore::create(&store, 2002, bike.id, Utc::now()).await,
            Err(RentalError::Conflict(_))
        ));

        store
            .close(rental.id, Hours::new(dec!(1)).unwrap(), Utc::now(), false)
            .await
            .unwrap();
        assert!(ResourceStore::release(&store, bike.id).await.unwrap().available);
    }

    #[tokio::test]
    async fn test_rocksdb_primary_swap() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        let a = store.insert(NewResource::named("a")).await.unwrap();
        let b = store.insert(NewResource::named("b")).await.unwrap();

        store.set_primary(a.id).await.unwrap();
        store.set_primary(b.id).await.unwrap();
        assert!(matches!(
            store.set_primary(99).await,
            Err(RentalError::NotFound(_))
        ));

        assert_eq!(store.get_primary().await.unwrap().unwrap().id, b.id);
        let flagged = ResourceStore::all(&store)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.primary)
            .count();
        assert_eq!(flagged, 1);
    }

    #[tokio::test]
    async fn test_rocksdb_sequences_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDbStore::open(dir.path()).unwrap();
            store.insert(NewResource::named("a")).await.unwrap();
            store.create_pending(1, Utc::now()).await.unwrap();
        }
        let store = RocksDbStore::open(dir.path()).unwrap();
        let b = store.insert(NewResource::named("b")).await.unwrap();
        let r = store.create_pending(1, Utc::now()).await.unwrap();
        assert_eq!(b.id, 2);
        assert_eq!(r.id, 2);
        assert!(matches!(
            store.insert(NewResource::named("c").with_code("B1")).await,
            Err(RentalError::Conflict(_))
        ));
    }
}
