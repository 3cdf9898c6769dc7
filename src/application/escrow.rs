use super::decision::DecisionEngine;
use crate::config::EscrowConfig;
use crate::domain::decision::{DecisionRecord, DecisionSource, Verdict};
use crate::domain::guard::{Actor, EscrowAction, can_perform};
use crate::domain::money::{Amount, Currency, Money};
use crate::domain::notification::Notification;
use crate::domain::order::{EscrowStatus, Order, OrderStatus};
use crate::domain::ports::{
    AuthorizationRequest, EscrowUpdate, MessageStoreRef, NotificationSinkRef, OrderStoreRef,
    PaymentGatewayRef, ReputationCredit,
};
use crate::error::{EscrowError, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{error, info, instrument, warn};

/// The collaborators the escrow service drives.
#[derive(Clone)]
pub struct EscrowPorts {
    pub orders: OrderStoreRef,
    pub messages: MessageStoreRef,
    pub notifications: NotificationSinkRef,
    pub gateway: PaymentGatewayRef,
}

/// Result of a successful `create_escrow`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowCreated {
    /// Continuation token for the client-side payment UI.
    pub authorization_token: Option<String>,
    pub authorization_id: String,
}

/// Result of `release_escrow`. `released == false` means the decision held the funds.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseOutcome {
    pub released: bool,
    pub reason: String,
    pub confidence: f64,
    pub source: DecisionSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelOutcome {
    pub cancelled: bool,
}

/// Per-order async locks; operations on one order run one at a time.
#[derive(Default)]
struct OrderLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl OrderLocks {
    async fn acquire(&self, order_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Entries only referenced by the map are idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(order_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// The escrow state machine.
///
/// Sole writer of `escrow_status`, `payment_reference` and the decision record.
/// Every operation validates its preconditions before touching the payment
/// gateway, and commits local state only after the gateway call succeeded, so a
/// gateway failure never leaves the order half-updated.
pub struct EscrowService {
    orders: OrderStoreRef,
    messages: MessageStoreRef,
    notifications: NotificationSinkRef,
    gateway: PaymentGatewayRef,
    decisions: DecisionEngine,
    config: EscrowConfig,
    locks: OrderLocks,
}

impl EscrowService {
    pub fn new(ports: EscrowPorts, decisions: DecisionEngine, config: EscrowConfig) -> Self {
        Self {
            orders: ports.orders,
            messages: ports.messages,
            notifications: ports.notifications,
            gateway: ports.gateway,
            decisions,
            config,
            locks: OrderLocks::default(),
        }
    }

    pub async fn find_order(&self, order_id: &str) -> Result<Order> {
        self.orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| EscrowError::NotFound(order_id.to_string()))
    }

    /// Authorizes `amount` with manual capture and moves the escrow to HELD.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn create_escrow(
        &self,
        order_id: &str,
        amount: Decimal,
        currency: &str,
        actor: &Actor,
    ) -> Result<EscrowCreated> {
        let amount = Amount::new(amount)?;
        let currency = Currency::new(currency)?;

        let _guard = self.locks.acquire(order_id).await;
        let order = self.find_order(order_id).await?;
        authorize(EscrowAction::Create, &order, actor)?;

        if amount != order.price.amount || currency != order.price.currency {
            return Err(EscrowError::ValidationError(format!(
                "Escrow amount {} does not match order amount {}",
                Money::new(amount, currency),
                order.price
            )));
        }
        if order.payment_reference.is_some() {
            return Err(EscrowError::Conflict(
                "Payment already created for this order".to_string(),
            ));
        }
        if order.escrow_status != EscrowStatus::Pending {
            return Err(EscrowError::Conflict(format!(
                "Escrow is {}, expected PENDING",
                order.escrow_status
            )));
        }

        let request = AuthorizationRequest::escrow(&order.id, order.price.clone());
        let authorization = self.gateway.authorize(&request).await?;

        let update = EscrowUpdate::for_order(&order)
            .escrow_status(EscrowStatus::Held)
            .payment_reference(&authorization.id);
        if let Err(e) = self.orders.update_escrow(update).await {
            error!(order_id, authorization_id = %authorization.id, error = %e, "failed to record authorization, voiding it");
            if let Err(void_error) = self.gateway.cancel(&authorization.id).await {
                error!(order_id, authorization_id = %authorization.id, error = %void_error, "failed to void unrecorded authorization");
            }
            return Err(e);
        }

        info!(order_id, authorization_id = %authorization.id, amount = %order.price, "escrow held");
        Ok(EscrowCreated {
            authorization_token: authorization.client_secret,
            authorization_id: authorization.id,
        })
    }

    /// Captures the held funds for the seller, or records why they stay held.
    ///
    /// A forced release by an admin skips the decision engine. Otherwise an open
    /// dispute always holds, and the engine decides for everything else.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn release_escrow(
        &self,
        order_id: &str,
        actor: &Actor,
        force: bool,
    ) -> Result<ReleaseOutcome> {
        let _guard = self.locks.acquire(order_id).await;
        let order = self.find_order(order_id).await?;
        authorize(EscrowAction::Release { force }, &order, actor)?;
        let reference = held_reference(&order, "release")?;

        let record = if force {
            DecisionRecord::from_verdict(Verdict::new(true, "forced", 1.0), DecisionSource::Forced)
        } else if order.has_open_dispute() {
            DecisionRecord::from_verdict(
                Verdict::new(false, "Release blocked: the order has an open dispute", 1.0),
                DecisionSource::DisputePolicy,
            )
        } else {
            let messages = match self
                .messages
                .recent_messages(&order.id, self.config.message_limit)
                .await
            {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(order_id, error = %e, "could not load order messages, evaluating without them");
                    Vec::new()
                }
            };
            DecisionRecord::from_decision(self.decisions.evaluate(&order, &messages).await)
        };

        if !record.can_release {
            warn!(order_id, reason = %record.reason, source = %record.source, "escrow release held");
            let outcome = outcome_of(&record);
            self.orders
                .update_escrow(EscrowUpdate::for_order(&order).decision(record))
                .await?;
            return Ok(outcome);
        }

        self.gateway.capture(reference).await?;

        let outcome = outcome_of(&record);
        let update = EscrowUpdate::for_order(&order)
            .escrow_status(EscrowStatus::Released)
            .decision(record)
            .credit(ReputationCredit {
                user_id: order.seller_id.clone(),
                trades_completed: 1,
                reputation_delta: self.config.reputation_delta,
            });
        if let Err(e) = self.orders.update_escrow(update).await {
            error!(order_id, payment_reference = reference, error = %e, "funds captured but release was not recorded, a retry records it");
            return Err(e);
        }

        info!(order_id, source = %outcome.source, "escrow released");
        self.notify(Notification::escrow_released(&order.seller_id, &order.id))
            .await;
        Ok(outcome)
    }

    /// Voids the authorization and refunds the order.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn cancel_escrow(
        &self,
        order_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> Result<CancelOutcome> {
        let _guard = self.locks.acquire(order_id).await;
        let order = self.find_order(order_id).await?;
        authorize(EscrowAction::Cancel, &order, actor)?;

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EscrowError::ValidationError(
                "Reason is required for cancellation".to_string(),
            ));
        }
        let reference = held_reference(&order, "cancel")?;

        self.gateway.cancel(reference).await?;

        let record = DecisionRecord::from_verdict(
            Verdict::new(false, reason, 1.0),
            DecisionSource::Cancellation,
        );
        let update = EscrowUpdate::for_order(&order)
            .escrow_status(EscrowStatus::Refunded)
            .status(OrderStatus::Refunded)
            .decision(record);
        if let Err(e) = self.orders.update_escrow(update).await {
            error!(order_id, payment_reference = reference, error = %e, "authorization voided but refund was not recorded");
            return Err(e);
        }

        info!(order_id, reason, "escrow refunded");
        self.notify(Notification::escrow_cancelled(&order.buyer_id, &order.id))
            .await;
        Ok(CancelOutcome { cancelled: true })
    }

    async fn notify(&self, notification: Notification) {
        let user_id = notification.user_id.clone();
        if let Err(e) = self.notifications.create(notification).await {
            warn!(user_id, error = %e, "failed to deliver notification");
        }
    }
}

fn authorize(action: EscrowAction, order: &Order, actor: &Actor) -> Result<()> {
    if can_perform(action, order, actor) {
        Ok(())
    } else {
        Err(EscrowError::Forbidden(format!(
            "{} may not {} for order {}",
            actor.id, action, order.id
        )))
    }
}

/// The authorization reference of a HELD escrow, or the conflict explaining why
/// `operation` cannot run.
fn held_reference<'a>(order: &'a Order, operation: &str) -> Result<&'a str> {
    let status = order.escrow_status;
    if status.is_terminal() {
        return Err(EscrowError::Conflict(format!(
            "Cannot {}: escrow already {}",
            operation,
            status.to_string().to_lowercase()
        )));
    }
    if status == EscrowStatus::Pending {
        return Err(EscrowError::Conflict(format!(
            "Cannot {}: no payment has been authorized",
            operation
        )));
    }
    order.payment_reference.as_deref().ok_or_else(|| {
        EscrowError::Conflict(format!("No payment reference recorded for order {}", order.id))
    })
}

fn outcome_of(record: &DecisionRecord) -> ReleaseOutcome {
    ReleaseOutcome {
        released: record.can_release,
        reason: record.reason.clone(),
        confidence: record.confidence,
        source: record.source,
    }
}
