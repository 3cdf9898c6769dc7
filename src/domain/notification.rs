use serde::{Deserialize, Serialize};

/// A user-facing notification emitted after a terminal escrow transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub link: String,
    pub order_id: String,
}

impl Notification {
    pub fn escrow_released(seller_id: &str, order_id: &str) -> Self {
        Self {
            user_id: seller_id.to_string(),
            kind: "order".to_string(),
            title: "Escrow Released".to_string(),
            message: format!(
                "Payment for order #{} has been released. Your reputation has been updated.",
                order_id
            ),
            link: format!("/orders/{}", order_id),
            order_id: order_id.to_string(),
        }
    }

    pub fn escrow_cancelled(buyer_id: &str, order_id: &str) -> Self {
        Self {
            user_id: buyer_id.to_string(),
            kind: "order".to_string(),
            title: "Order Cancelled".to_string(),
            message: format!(
                "Order #{} has been cancelled. Your payment will be refunded.",
                order_id
            ),
            link: format!("/orders/{}", order_id),
            order_id: order_id.to_string(),
        }
    }
}
