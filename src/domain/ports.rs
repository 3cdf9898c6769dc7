use super::decision::{BackendError, DecisionRecord};
use super::money::Money;
use super::notification::Notification;
use super::order::{EscrowStatus, Message, Order, OrderStatus};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Reputation counters of a marketplace user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserReputation {
    pub trades_completed: u64,
    pub reputation_score: i64,
}

/// Reputation increments committed together with an escrow transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReputationCredit {
    pub user_id: String,
    pub trades_completed: u64,
    pub reputation_delta: i64,
}

/// A multi-field escrow write guarded by an optimistic version check.
///
/// Stores must apply every present field, and the reputation credit if any, as a
/// single atomic unit, and only when the stored order still has
/// `expected_version`. On success the order's version is incremented.
#[derive(Debug, Clone, PartialEq)]
pub struct EscrowUpdate {
    pub order_id: String,
    pub expected_version: u64,
    pub escrow_status: Option<EscrowStatus>,
    pub payment_reference: Option<String>,
    pub status: Option<OrderStatus>,
    pub decision: Option<DecisionRecord>,
    pub credit: Option<ReputationCredit>,
}

impl EscrowUpdate {
    pub fn for_order(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            expected_version: order.version,
            escrow_status: None,
            payment_reference: None,
            status: None,
            decision: None,
            credit: None,
        }
    }

    pub fn escrow_status(mut self, status: EscrowStatus) -> Self {
        self.escrow_status = Some(status);
        self
    }

    pub fn payment_reference(mut self, reference: impl Into<String>) -> Self {
        self.payment_reference = Some(reference.into());
        self
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn decision(mut self, record: DecisionRecord) -> Self {
        self.decision = Some(record);
        self
    }

    pub fn credit(mut self, credit: ReputationCredit) -> Self {
        self.credit = Some(credit);
        self
    }

    /// Applies the order-level fields to `order` and bumps its version.
    pub fn apply_to(&self, order: &mut Order) {
        if let Some(status) = self.escrow_status {
            order.escrow_status = status;
        }
        if let Some(reference) = &self.payment_reference {
            order.payment_reference = Some(reference.clone());
        }
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(decision) = &self.decision {
            order.decision = Some(decision.clone());
        }
        order.version += 1;
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>>;
    /// Commits `update` atomically. Fails with `NotFound` for unknown orders and
    /// `Conflict` when the stored version differs from `expected_version`.
    async fn update_escrow(&self, update: EscrowUpdate) -> Result<Order>;
    async fn insert(&self, order: Order) -> Result<()>;
    async fn all_orders(&self) -> Result<Vec<Order>>;
}

/// Read and admin surface over user reputation counters.
///
/// Escrow releases never call the increments; their credit travels inside the
/// `EscrowUpdate` so it commits with the order.
#[async_trait]
pub trait ReputationStore: Send + Sync {
    async fn reputation(&self, user_id: &str) -> Result<UserReputation>;
    async fn increment_trades_completed(&self, user_id: &str) -> Result<()>;
    async fn increment_reputation_score(&self, user_id: &str, delta: i64) -> Result<()>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// The latest `limit` messages of an order, newest first.
    async fn recent_messages(&self, order_id: &str, limit: usize) -> Result<Vec<Message>>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn create(&self, notification: Notification) -> Result<()>;
}

/// Request for a manually-captured authorization.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationRequest {
    pub money: Money,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
}

impl AuthorizationRequest {
    pub fn escrow(order_id: &str, money: Money) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("orderId".to_string(), order_id.to_string());
        metadata.insert("type".to_string(), "escrow".to_string());
        Self {
            money,
            description: format!("Escrow payment for order {}", order_id),
            metadata,
        }
    }
}

/// A reservation of funds at the payment processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub id: String,
    /// Continuation token for the client-side payment UI.
    pub client_secret: Option<String>,
}

/// Capability over the external processor. Failures surface as `EscrowError::Gateway`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Reserves funds with manual capture; nothing moves until `capture`.
    async fn authorize(&self, request: &AuthorizationRequest) -> Result<Authorization>;
    async fn capture(&self, authorization_id: &str) -> Result<()>;
    async fn cancel(&self, authorization_id: &str) -> Result<()>;
}

/// A language-generation service consulted before releasing funds.
#[async_trait]
pub trait DecisionBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, BackendError>;
}

pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type ReputationStoreRef = Arc<dyn ReputationStore>;
pub type MessageStoreRef = Arc<dyn MessageStore>;
pub type NotificationSinkRef = Arc<dyn NotificationSink>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type DecisionBackendBox = Box<dyn DecisionBackend>;
