use crate::domain::order::Order;
use crate::domain::ports::{EscrowUpdate, OrderStore, ReputationStore, UserReputation};
use crate::error::{EscrowError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing orders.
pub const CF_ORDERS: &str = "orders";
/// Column Family for storing user reputation counters.
pub const CF_USERS: &str = "users";

/// A persistent store implementation using RocksDB.
///
/// Orders and reputation live in separate Column Families. Escrow updates are
/// written with a single `WriteBatch`, so an order transition and the seller's
/// reputation credit land together or not at all. Writers are serialized by an
/// in-process lock so the version check and the batch write cannot interleave.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("orders" and "users") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_orders = ColumnFamilyDescriptor::new(CF_ORDERS, Options::default());
        let cf_users = ColumnFamilyDescriptor::new(CF_USERS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_orders, cf_users])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| EscrowError::Storage(format!("{} column family not found", name)))
    }

    fn read<T: DeserializeOwned>(&self, cf: &str, key: &str) -> Result<Option<T>> {
        let handle = self.cf(cf)?;
        match self.db.get_pinned_cf(handle, key.as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| EscrowError::Storage(format!("Deserialization error: {}", e))),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf: &str, key: &str, value: &T) -> Result<()> {
        let handle = self.cf(cf)?;
        self.db.put_cf(handle, key.as_bytes(), encode(value)?)?;
        Ok(())
    }

    async fn adjust_user(&self, user_id: &str, adjust: impl FnOnce(&mut UserReputation)) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut user: UserReputation = self.read(CF_USERS, user_id)?.unwrap_or_default();
        adjust(&mut user);
        self.write(CF_USERS, user_id, &user)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| EscrowError::Storage(format!("Serialization error: {}", e)))
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>> {
        self.read(CF_ORDERS, order_id)
    }

    async fn update_escrow(&self, update: EscrowUpdate) -> Result<Order> {
        let _guard = self.write_lock.lock().await;

        let mut order: Order = self
            .read(CF_ORDERS, &update.order_id)?
            .ok_or_else(|| EscrowError::NotFound(update.order_id.clone()))?;
        if order.version != update.expected_version {
            return Err(EscrowError::Conflict(format!(
                "Order {} was modified concurrently (expected version {}, found {})",
                update.order_id, update.expected_version, order.version
            )));
        }
        update.apply_to(&mut order);

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_ORDERS)?, order.id.as_bytes(), encode(&order)?);
        if let Some(credit) = &update.credit {
            let mut user: UserReputation = self.read(CF_USERS, &credit.user_id)?.unwrap_or_default();
            user.trades_completed += credit.trades_completed;
            user.reputation_score += credit.reputation_delta;
            batch.put_cf(self.cf(CF_USERS)?, credit.user_id.as_bytes(), encode(&user)?);
        }
        self.db.write(batch)?;

        Ok(order)
    }

    async fn insert(&self, order: Order) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(CF_ORDERS, &order.id, &order)
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let handle = self.cf(CF_ORDERS)?;
        let mut orders = Vec::new();
        for item in self.db.iterator_cf(handle, IteratorMode::Start) {
            let (_key, value) = item?;
            let order: Order = serde_json::from_slice(&value)
                .map_err(|e| EscrowError::Storage(format!("Failed to deserialize order: {}", e)))?;
            orders.push(order);
        }
        Ok(orders)
    }
}

#[async_trait]
impl ReputationStore for RocksDBStore {
    async fn reputation(&self, user_id: &str) -> Result<UserReputation> {
        Ok(self.read(CF_USERS, user_id)?.unwrap_or_default())
    }

    async fn increment_trades_completed(&self, user_id: &str) -> Result<()> {
        self.adjust_user(user_id, |user| user.trades_completed += 1)
            .await
    }

    async fn increment_reputation_score(&self, user_id: &str, delta: i64) -> Result<()> {
        self.adjust_user(user_id, |user| user.reputation_score += delta)
            .await
    }
}
