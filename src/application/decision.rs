use crate::domain::decision::{
    BackendError, Decision, FALLBACK_CONFIDENCE, FallbackCause, INFERRED_CONFIDENCE, Verdict,
    clamp_confidence,
};
use crate::domain::order::{Message, Order, OrderStatus};
use crate::domain::ports::DecisionBackendBox;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

const MESSAGE_PREVIEW_CHARS: usize = 100;
const INFERRED_REASON_CHARS: usize = 200;
const DEFAULT_MODEL_REASON: &str = "AI analysis completed";

/// Produces release decisions for held escrows.
///
/// The primary path asks a language backend for a structured verdict. When the
/// backend is absent, fails, or exceeds `timeout`, the deterministic rule in
/// [`fallback_decision`] answers instead, so `evaluate` always returns.
pub struct DecisionEngine {
    backend: Option<DecisionBackendBox>,
    timeout: Duration,
}

impl DecisionEngine {
    pub fn new(backend: Option<DecisionBackendBox>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// An engine with no language backend; every evaluation uses the fallback rule.
    pub fn fallback_only() -> Self {
        Self::new(None, Duration::from_secs(10))
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn evaluate(&self, order: &Order, messages: &[Message]) -> Decision {
        let Some(backend) = &self.backend else {
            warn!(order_id = %order.id, "decision backend not configured, using fallback heuristics");
            return fallback_decision(order, FallbackCause::Unconfigured);
        };

        let prompt = evidence_summary(order, messages, Utc::now());
        let error = match tokio::time::timeout(self.timeout, backend.generate(&prompt)).await {
            Ok(Ok(text)) => {
                debug!(order_id = %order.id, chars = text.len(), "decision backend answered");
                return interpret_response(&text);
            }
            Ok(Err(e)) => e,
            Err(_) => BackendError::Timeout(self.timeout),
        };

        warn!(order_id = %order.id, error = %error, "decision backend failed, using fallback heuristics");
        fallback_decision(order, FallbackCause::BackendFailed(error.to_string()))
    }
}

/// Deterministic release rule: shipped or delivered, tracked, and not disputed.
pub fn fallback_decision(order: &Order, cause: FallbackCause) -> Decision {
    let tracked = order
        .tracking_number
        .as_deref()
        .is_some_and(|t| !t.trim().is_empty());
    let can_release = matches!(order.status, OrderStatus::Delivered | OrderStatus::Shipped)
        && !order.has_open_dispute()
        && tracked;

    let reason = match &cause {
        FallbackCause::Unconfigured => {
            "Using fallback heuristics (decision backend not available)".to_string()
        }
        FallbackCause::BackendFailed(error) => {
            format!("Decision backend failed: {}. Using fallback heuristics.", error)
        }
    };

    Decision::Heuristic {
        verdict: Verdict::new(can_release, reason, FALLBACK_CONFIDENCE),
        cause,
    }
}

/// Renders the order evidence and the release criteria as a backend prompt.
pub fn evidence_summary(order: &Order, messages: &[Message], now: DateTime<Utc>) -> String {
    Evidence {
        order,
        messages,
        now,
    }
    .to_string()
}

struct Evidence<'a> {
    order: &'a Order,
    messages: &'a [Message],
    now: DateTime<Utc>,
}

impl fmt::Display for Evidence<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = self.order;
        let age_days = (self.now - order.created_at).num_days().max(0);

        writeln!(
            f,
            "Check whether the deal conditions are met for order #{}:",
            order.id
        )?;
        writeln!(f)?;
        writeln!(
            f,
            "Item: {}",
            order.item_title.as_deref().unwrap_or("Unknown")
        )?;
        writeln!(f, "Order status: {}", order.status)?;
        writeln!(
            f,
            "Tracking number: {}",
            order.tracking_number.as_deref().unwrap_or("not provided")
        )?;
        writeln!(
            f,
            "Created at: {} ({} days ago)",
            order.created_at.to_rfc3339(),
            age_days
        )?;
        writeln!(
            f,
            "Dispute: {}",
            if order.has_open_dispute() { "open" } else { "none" }
        )?;
        writeln!(f)?;
        writeln!(f, "Latest messages between buyer and seller:")?;
        if self.messages.is_empty() {
            writeln!(f, "No messages")?;
        }
        for message in self.messages {
            let role = if order.is_buyer(&message.sender_id) {
                "Buyer"
            } else if order.is_seller(&message.sender_id) {
                "Seller"
            } else {
                "Participant"
            };
            writeln!(
                f,
                "[{}] {}: {}",
                message.created_at.format("%Y-%m-%d"),
                role,
                truncate_chars(&message.content, MESSAGE_PREVIEW_CHARS)
            )?;
        }
        writeln!(f)?;
        f.write_str(
            "Check the following criteria:\n\
             1. Order status must be DELIVERED or SHIPPED (for goods) or PAID (for services)\n\
             2. Goods must have a tracking number\n\
             3. There is no open dispute\n\
             4. Enough time has passed since the order was created (at least 1 day for goods)\n\
             \n\
             Answer in JSON format:\n\
             {\"canRelease\": true/false, \"reason\": \"short explanation\", \"confidence\": 0.0-1.0}\n",
        )
    }
}

/// Turns raw backend text into a decision.
///
/// The first well-formed JSON object in the text wins, wherever it sits among
/// prose or markdown fences. Text without one is read by keyword.
pub fn interpret_response(text: &str) -> Decision {
    match extract_json_object(text) {
        Some(object) => Decision::Primary(verdict_from_object(&object)),
        None => {
            let lower = text.to_lowercase();
            let can_release = lower.contains("release") && !lower.contains("hold");
            Decision::Inferred(Verdict::new(
                can_release,
                truncate_chars(text.trim(), INFERRED_REASON_CHARS),
                INFERRED_CONFIDENCE,
            ))
        }
    }
}

fn verdict_from_object(object: &Map<String, Value>) -> Verdict {
    let can_release = matches!(object.get("canRelease"), Some(Value::Bool(true)));
    let reason = object
        .get("reason")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_MODEL_REASON);
    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .map(clamp_confidence)
        .unwrap_or(INFERRED_CONFIDENCE);
    Verdict::new(can_release, reason, confidence)
}

fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    text.char_indices()
        .filter(|(_, c)| *c == '{')
        .find_map(|(start, _)| {
            let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(Value::Object(object))) => Some(object),
                _ => None,
            }
        })
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
