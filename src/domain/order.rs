use super::decision::DecisionRecord;
use super::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the order itself, owned by the surrounding marketplace.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        };
        f.write_str(s)
    }
}

/// Escrow lifecycle: `Pending -> Held -> {Released | Refunded}`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowStatus {
    #[default]
    Pending,
    Held,
    Released,
    Refunded,
}

impl EscrowStatus {
    /// Released and refunded escrows never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, EscrowStatus::Released | EscrowStatus::Refunded)
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EscrowStatus::Pending => "PENDING",
            EscrowStatus::Held => "HELD",
            EscrowStatus::Released => "RELEASED",
            EscrowStatus::Refunded => "REFUNDED",
        };
        f.write_str(s)
    }
}

/// Only `open` blocks a release; any other value the marketplace uses is kept as `Other`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum DisputeStatus {
    Open,
    Closed,
    #[serde(other)]
    Other,
}

/// The order record the escrow core reads and updates.
///
/// `escrow_status`, `payment_reference` and `decision` are written only by the
/// escrow service; everything else belongs to the marketplace.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    pub id: String,
    pub buyer_id: String,
    pub seller_id: String,
    #[serde(flatten)]
    pub price: Money,
    pub status: OrderStatus,
    #[serde(default)]
    pub escrow_status: EscrowStatus,
    #[serde(default)]
    pub payment_reference: Option<String>,
    #[serde(default)]
    pub dispute_status: Option<DisputeStatus>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub item_title: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub decision: Option<DecisionRecord>,
    /// Optimistic concurrency counter, bumped on every committed escrow write.
    #[serde(default)]
    pub version: u64,
}

impl Order {
    pub fn new(
        id: impl Into<String>,
        buyer_id: impl Into<String>,
        seller_id: impl Into<String>,
        price: Money,
    ) -> Self {
        Self {
            id: id.into(),
            buyer_id: buyer_id.into(),
            seller_id: seller_id.into(),
            price,
            status: OrderStatus::Pending,
            escrow_status: EscrowStatus::Pending,
            payment_reference: None,
            dispute_status: None,
            tracking_number: None,
            item_title: None,
            created_at: Utc::now(),
            decision: None,
            version: 0,
        }
    }

    pub fn has_open_dispute(&self) -> bool {
        self.dispute_status == Some(DisputeStatus::Open)
    }

    pub fn is_buyer(&self, user_id: &str) -> bool {
        self.buyer_id == user_id
    }

    pub fn is_seller(&self, user_id: &str) -> bool {
        self.seller_id == user_id
    }
}

/// A chat message between the parties of an order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Message {
    pub order_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
