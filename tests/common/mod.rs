#![allow(dead_code)]

use async_trait::async_trait;
use escrowd::application::decision::DecisionEngine;
use escrowd::application::escrow::{EscrowPorts, EscrowService};
use escrowd::config::EscrowConfig;
use escrowd::domain::decision::BackendError;
use escrowd::domain::guard::Actor;
use escrowd::domain::money::{Amount, Currency, Money};
use escrowd::domain::order::{Order, OrderStatus};
use escrowd::domain::ports::{DecisionBackend, DecisionBackendBox, OrderStore};
use escrowd::infrastructure::in_memory::{
    InMemoryMessageStore, InMemoryNotificationSink, InMemoryPaymentGateway, InMemoryStore,
};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const BUYER: &str = "buyer-1";
pub const SELLER: &str = "seller-1";
pub const ADMIN: &str = "admin-1";
pub const STRANGER: &str = "someone-else";

/// The escrow service wired to in-memory adapters the test can inspect.
pub struct Harness {
    pub store: InMemoryStore,
    pub messages: InMemoryMessageStore,
    pub notifications: InMemoryNotificationSink,
    pub gateway: InMemoryPaymentGateway,
    pub service: EscrowService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_engine(DecisionEngine::fallback_only())
    }

    pub fn with_backend(backend: impl DecisionBackend + 'static) -> Self {
        let backend: DecisionBackendBox = Box::new(backend);
        Self::with_engine(DecisionEngine::new(Some(backend), Duration::from_secs(10)))
    }

    pub fn with_engine(engine: DecisionEngine) -> Self {
        let store = InMemoryStore::new();
        let messages = InMemoryMessageStore::new();
        let notifications = InMemoryNotificationSink::new();
        let gateway = InMemoryPaymentGateway::new();
        let service = EscrowService::new(
            EscrowPorts {
                orders: Arc::new(store.clone()),
                messages: Arc::new(messages.clone()),
                notifications: Arc::new(notifications.clone()),
                gateway: Arc::new(gateway.clone()),
            },
            engine,
            EscrowConfig::default(),
        );
        Self {
            store,
            messages,
            notifications,
            gateway,
            service,
        }
    }

    pub async fn add_order(&self, order: Order) {
        self.store.insert(order).await.unwrap();
    }

    pub async fn order(&self, order_id: &str) -> Order {
        self.service.find_order(order_id).await.unwrap()
    }

    /// Inserts a shipped, tracked order and moves its escrow to HELD.
    pub async fn held_order(&self, order_id: &str) -> Order {
        self.add_order(shipped_order(order_id)).await;
        self.service
            .create_escrow(order_id, dec!(100), "usd", &buyer())
            .await
            .unwrap();
        self.order(order_id).await
    }
}

pub fn buyer() -> Actor {
    Actor::user(BUYER)
}

pub fn seller() -> Actor {
    Actor::user(SELLER)
}

pub fn admin() -> Actor {
    Actor::admin(ADMIN)
}

pub fn stranger() -> Actor {
    Actor::user(STRANGER)
}

pub fn order(order_id: &str) -> Order {
    Order::new(
        order_id,
        BUYER,
        SELLER,
        Money::new(Amount::new(dec!(100)).unwrap(), Currency::usd()),
    )
}

pub fn shipped_order(order_id: &str) -> Order {
    let mut order = order(order_id);
    order.status = OrderStatus::Shipped;
    order.tracking_number = Some("1Z999AA10123456784".to_string());
    order
}

/// Answers every prompt with the same text and counts the calls.
pub struct ScriptedBackend {
    reply: String,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl DecisionBackend for ScriptedBackend {
    async fn generate(&self, _prompt: &str) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// Always fails with a transport error.
pub struct FailingBackend;

#[async_trait]
impl DecisionBackend for FailingBackend {
    async fn generate(&self, _prompt: &str) -> Result<String, BackendError> {
        Err(BackendError::Request("connection refused".to_string()))
    }
}

/// Never answers.
pub struct StalledBackend;

#[async_trait]
impl DecisionBackend for StalledBackend {
    async fn generate(&self, _prompt: &str) -> Result<String, BackendError> {
        std::future::pending::<()>().await;
        Ok(String::new())
    }
}
