use crate::domain::money::Money;
use crate::domain::notification::Notification;
use crate::domain::order::{Message, Order};
use crate::domain::ports::{
    Authorization, AuthorizationRequest, EscrowUpdate, MessageStore, NotificationSink,
    OrderStore, PaymentGateway, ReputationStore, UserReputation,
};
use crate::error::{EscrowError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct StoreState {
    orders: HashMap<String, Order>,
    users: HashMap<String, UserReputation>,
}

/// A thread-safe in-memory store for orders and user reputation.
///
/// Both live behind one `RwLock`, so an escrow update and its reputation credit
/// are applied under the same write guard and no reader sees one without the
/// other.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.get(order_id).cloned())
    }

    async fn update_escrow(&self, update: EscrowUpdate) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&update.order_id)
            .ok_or_else(|| EscrowError::NotFound(update.order_id.clone()))?;

        if order.version != update.expected_version {
            return Err(EscrowError::Conflict(format!(
                "Order {} was modified concurrently (expected version {}, found {})",
                update.order_id, update.expected_version, order.version
            )));
        }

        update.apply_to(order);
        let updated = order.clone();

        if let Some(credit) = &update.credit {
            let user = state.users.entry(credit.user_id.clone()).or_default();
            user.trades_completed += credit.trades_completed;
            user.reputation_score += credit.reputation_delta;
        }

        Ok(updated)
    }

    async fn insert(&self, order: Order) -> Result<()> {
        let mut state = self.state.write().await;
        state.orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state.orders.values().cloned().collect();
        orders.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(orders)
    }
}

#[async_trait]
impl ReputationStore for InMemoryStore {
    async fn reputation(&self, user_id: &str) -> Result<UserReputation> {
        let state = self.state.read().await;
        Ok(state.users.get(user_id).cloned().unwrap_or_default())
    }

    async fn increment_trades_completed(&self, user_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .users
            .entry(user_id.to_string())
            .or_default()
            .trades_completed += 1;
        Ok(())
    }

    async fn increment_reputation_score(&self, user_id: &str, delta: i64) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .users
            .entry(user_id.to_string())
            .or_default()
            .reputation_score += delta;
        Ok(())
    }
}

/// In-memory chat history keyed by order.
#[derive(Default, Clone)]
pub struct InMemoryMessageStore {
    messages: Arc<RwLock<Vec<Message>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, message: Message) {
        self.messages.write().await.push(message);
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn recent_messages(&self, order_id: &str, limit: usize) -> Result<Vec<Message>> {
        let messages = self.messages.read().await;
        let mut recent: Vec<Message> = messages
            .iter()
            .filter(|m| m.order_id == order_id)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit);
        Ok(recent)
    }
}

/// Collects notifications; can be told to fail deliveries.
#[derive(Default, Clone)]
pub struct InMemoryNotificationSink {
    notifications: Arc<RwLock<Vec<Notification>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().await.clone()
    }

    pub async fn for_user(&self, user_id: &str) -> Vec<Notification> {
        self.notifications
            .read()
            .await
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn create(&self, notification: Notification) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EscrowError::Storage(
                "notification sink unavailable".to_string(),
            ));
        }
        tracing::info!(user_id = %notification.user_id, title = %notification.title, "notification created");
        self.notifications.write().await.push(notification);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOperation {
    Authorize,
    Capture,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationState {
    RequiresCapture,
    Captured,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationRecord {
    pub money: Money,
    pub metadata: BTreeMap<String, String>,
    pub state: AuthorizationState,
}

#[derive(Default)]
struct GatewayState {
    authorizations: HashMap<String, AuthorizationRecord>,
    failing: HashSet<GatewayOperation>,
    calls: HashMap<GatewayOperation, usize>,
}

/// A processor simulation with manual-capture semantics.
///
/// Operations can be switched to fail, which is how tests exercise the
/// "gateway error leaves no local mutation" paths.
#[derive(Default, Clone)]
pub struct InMemoryPaymentGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes every subsequent call of `operation` fail until `recover` is called.
    pub fn fail(&self, operation: GatewayOperation) {
        self.lock().failing.insert(operation);
    }

    pub fn recover(&self, operation: GatewayOperation) {
        self.lock().failing.remove(&operation);
    }

    /// Number of attempted calls of `operation`, failed ones included.
    pub fn calls(&self, operation: GatewayOperation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    pub fn authorization_count(&self) -> usize {
        self.lock().authorizations.len()
    }

    pub fn authorization(&self, authorization_id: &str) -> Option<AuthorizationRecord> {
        self.lock().authorizations.get(authorization_id).cloned()
    }

    fn begin(&self, operation: GatewayOperation) -> Result<std::sync::MutexGuard<'_, GatewayState>> {
        let mut state = self.lock();
        *state.calls.entry(operation).or_default() += 1;
        if state.failing.contains(&operation) {
            return Err(EscrowError::Gateway(format!(
                "{:?} rejected by processor",
                operation
            )));
        }
        Ok(state)
    }

    fn transition(
        &self,
        operation: GatewayOperation,
        authorization_id: &str,
        to: AuthorizationState,
    ) -> Result<()> {
        let mut state = self.begin(operation)?;
        let record = state
            .authorizations
            .get_mut(authorization_id)
            .ok_or_else(|| {
                EscrowError::Gateway(format!("No such authorization: {}", authorization_id))
            })?;
        // Repeating a completed transition succeeds, so a caller whose commit
        // failed after the processor call can retry.
        if record.state == to {
            return Ok(());
        }
        if record.state != AuthorizationState::RequiresCapture {
            return Err(EscrowError::Gateway(format!(
                "Authorization {} is {:?}",
                authorization_id, record.state
            )));
        }
        record.state = to;
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn authorize(&self, request: &AuthorizationRequest) -> Result<Authorization> {
        let mut state = self.begin(GatewayOperation::Authorize)?;
        let id = format!("pi_{}", Uuid::new_v4().simple());
        let client_secret = format!("{}_secret_{}", id, Uuid::new_v4().simple());
        state.authorizations.insert(
            id.clone(),
            AuthorizationRecord {
                money: request.money.clone(),
                metadata: request.metadata.clone(),
                state: AuthorizationState::RequiresCapture,
            },
        );
        Ok(Authorization {
            id,
            client_secret: Some(client_secret),
        })
    }

    async fn capture(&self, authorization_id: &str) -> Result<()> {
        self.transition(
            GatewayOperation::Capture,
            authorization_id,
            AuthorizationState::Captured,
        )
    }

    async fn cancel(&self, authorization_id: &str) -> Result<()> {
        self.transition(
            GatewayOperation::Cancel,
            authorization_id,
            AuthorizationState::Cancelled,
        )
    }
}
