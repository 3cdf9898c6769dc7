mod common;

use async_trait::async_trait;
use common::*;
use escrowd::application::decision::DecisionEngine;
use escrowd::application::escrow::{EscrowPorts, EscrowService};
use escrowd::config::EscrowConfig;
use escrowd::domain::order::{EscrowStatus, Order};
use escrowd::domain::ports::{EscrowUpdate, OrderStore, ReputationStore};
use escrowd::error::{EscrowError, Result};
use escrowd::infrastructure::in_memory::{
    AuthorizationState, GatewayOperation, InMemoryMessageStore, InMemoryNotificationSink,
    InMemoryPaymentGateway, InMemoryStore,
};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[tokio::test]
async fn test_capture_failure_leaves_no_trace() {
    let h = Harness::new();
    let before = h.held_order("O1").await;
    h.gateway.fail(GatewayOperation::Capture);

    let result = h.service.release_escrow("O1", &seller(), false).await;
    assert!(matches!(&result, Err(EscrowError::Gateway(_))));
    assert!(result.unwrap_err().is_retryable());

    assert_eq!(h.order("O1").await, before);
    assert_eq!(h.store.reputation(SELLER).await.unwrap().trades_completed, 0);
    assert!(h.notifications.notifications().await.is_empty());

    // The caller retries once the processor recovers.
    h.gateway.recover(GatewayOperation::Capture);
    let outcome = h
        .service
        .release_escrow("O1", &seller(), false)
        .await
        .unwrap();
    assert!(outcome.released);
    assert_eq!(h.store.reputation(SELLER).await.unwrap().trades_completed, 1);
    assert_eq!(h.notifications.for_user(SELLER).await.len(), 1);
}

#[tokio::test]
async fn test_authorize_failure_leaves_order_pending() {
    let h = Harness::new();
    h.add_order(order("O1")).await;
    h.gateway.fail(GatewayOperation::Authorize);

    let result = h
        .service
        .create_escrow("O1", dec!(100), "usd", &buyer())
        .await;
    assert!(matches!(result, Err(EscrowError::Gateway(_))));

    let current = h.order("O1").await;
    assert_eq!(current.escrow_status, EscrowStatus::Pending);
    assert!(current.payment_reference.is_none());
}

#[tokio::test]
async fn test_cancel_failure_keeps_escrow_held() {
    let h = Harness::new();
    let before = h.held_order("O1").await;
    h.gateway.fail(GatewayOperation::Cancel);

    let result = h.service.cancel_escrow("O1", &buyer(), "wrong size").await;
    assert!(matches!(result, Err(EscrowError::Gateway(_))));
    assert_eq!(h.order("O1").await, before);
    assert!(h.notifications.notifications().await.is_empty());
}

#[tokio::test]
async fn test_notification_failure_does_not_roll_back() {
    let h = Harness::new();
    h.held_order("O1").await;
    h.notifications.set_failing(true);

    let outcome = h
        .service
        .release_escrow("O1", &seller(), false)
        .await
        .unwrap();
    assert!(outcome.released);
    assert_eq!(h.order("O1").await.escrow_status, EscrowStatus::Released);
    assert_eq!(h.store.reputation(SELLER).await.unwrap().trades_completed, 1);
    assert!(h.notifications.notifications().await.is_empty());
}

/// Order store whose escrow writes always fail.
#[derive(Clone)]
struct RejectingStore {
    inner: InMemoryStore,
}

#[async_trait]
impl OrderStore for RejectingStore {
    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>> {
        self.inner.find_by_id(order_id).await
    }

    async fn update_escrow(&self, _update: EscrowUpdate) -> Result<Order> {
        Err(EscrowError::Storage("disk full".to_string()))
    }

    async fn insert(&self, order: Order) -> Result<()> {
        self.inner.insert(order).await
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        self.inner.all_orders().await
    }
}

#[tokio::test]
async fn test_unrecorded_authorization_is_voided() {
    let store = RejectingStore {
        inner: InMemoryStore::new(),
    };
    store.insert(order("O1")).await.unwrap();
    let gateway = InMemoryPaymentGateway::new();
    let service = EscrowService::new(
        EscrowPorts {
            orders: Arc::new(store.clone()),
            messages: Arc::new(InMemoryMessageStore::new()),
            notifications: Arc::new(InMemoryNotificationSink::new()),
            gateway: Arc::new(gateway.clone()),
        },
        DecisionEngine::fallback_only(),
        EscrowConfig::default(),
    );

    let result = service
        .create_escrow("O1", dec!(100), "usd", &buyer())
        .await;
    assert!(matches!(result, Err(EscrowError::Storage(_))));
    assert_eq!(gateway.calls(GatewayOperation::Cancel), 1);
    assert_eq!(gateway.authorization_count(), 1);

    let order = store.find_by_id("O1").await.unwrap().unwrap();
    assert_eq!(order.escrow_status, EscrowStatus::Pending);
    assert!(order.payment_reference.is_none());
}

#[tokio::test]
async fn test_release_commit_credits_seller_exactly_once() {
    let h = Harness::new();
    let held = h.held_order("O1").await;

    h.service
        .release_escrow("O1", &seller(), false)
        .await
        .unwrap();

    let released = h.order("O1").await;
    assert_eq!(released.version, held.version + 1);
    assert_eq!(
        h.gateway
            .authorization(released.payment_reference.as_deref().unwrap())
            .unwrap()
            .state,
        AuthorizationState::Captured
    );
    let reputation = h.store.reputation(SELLER).await.unwrap();
    assert_eq!(reputation.trades_completed, 1);
    assert_eq!(reputation.reputation_score, 1);
    assert_eq!(h.store.reputation(BUYER).await.unwrap().trades_completed, 0);
}

/// Order store that loses the first RELEASED commit.
#[derive(Clone)]
struct LossyReleaseStore {
    inner: InMemoryStore,
    lost: Arc<AtomicBool>,
}

#[async_trait]
impl OrderStore for LossyReleaseStore {
    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>> {
        self.inner.find_by_id(order_id).await
    }

    async fn update_escrow(&self, update: EscrowUpdate) -> Result<Order> {
        if update.escrow_status == Some(EscrowStatus::Released) && !self.lost.swap(true, Ordering::SeqCst) {
            return Err(EscrowError::Storage("transient io".to_string()));
        }
        self.inner.update_escrow(update).await
    }

    async fn insert(&self, order: Order) -> Result<()> {
        self.inner.insert(order).await
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        self.inner.all_orders().await
    }
}

#[tokio::test]
async fn test_release_retry_completes_after_lost_commit() {
    let inner = InMemoryStore::new();
    let store = LossyReleaseStore {
        inner: inner.clone(),
        lost: Arc::new(AtomicBool::new(false)),
    };
    store.insert(shipped_order("O1")).await.unwrap();
    let gateway = InMemoryPaymentGateway::new();
    let notifications = InMemoryNotificationSink::new();
    let service = EscrowService::new(
        EscrowPorts {
            orders: Arc::new(store.clone()),
            messages: Arc::new(InMemoryMessageStore::new()),
            notifications: Arc::new(notifications.clone()),
            gateway: Arc::new(gateway.clone()),
        },
        DecisionEngine::fallback_only(),
        EscrowConfig::default(),
    );
    service
        .create_escrow("O1", dec!(100), "usd", &buyer())
        .await
        .unwrap();

    let first = service.release_escrow("O1", &seller(), false).await;
    assert!(matches!(first, Err(EscrowError::Storage(_))));
    let stuck = store.find_by_id("O1").await.unwrap().unwrap();
    assert_eq!(stuck.escrow_status, EscrowStatus::Held);
    let reference = stuck.payment_reference.clone().unwrap();
    assert_eq!(
        gateway.authorization(&reference).unwrap().state,
        AuthorizationState::Captured
    );

    // The funds already moved; the retry only has to record it.
    let outcome = service
        .release_escrow("O1", &seller(), false)
        .await
        .unwrap();
    assert!(outcome.released);
    assert_eq!(
        store.find_by_id("O1").await.unwrap().unwrap().escrow_status,
        EscrowStatus::Released
    );
    assert_eq!(gateway.calls(GatewayOperation::Capture), 2);
    let reputation = inner.reputation(SELLER).await.unwrap();
    assert_eq!(reputation.trades_completed, 1);
    assert_eq!(reputation.reputation_score, 1);
    assert_eq!(notifications.for_user(SELLER).await.len(), 1);
}
