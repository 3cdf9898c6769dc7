use crate::domain::order::Order;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct OrderRow<'a> {
    order: &'a str,
    status: String,
    escrow_status: String,
    payment_reference: &'a str,
    decision: String,
    reason: &'a str,
}

impl<'a> From<&'a Order> for OrderRow<'a> {
    fn from(order: &'a Order) -> Self {
        Self {
            order: &order.id,
            status: order.status.to_string(),
            escrow_status: order.escrow_status.to_string(),
            payment_reference: order.payment_reference.as_deref().unwrap_or(""),
            decision: order
                .decision
                .as_ref()
                .map(|d| d.source.to_string())
                .unwrap_or_default(),
            reason: order.decision.as_ref().map(|d| d.reason.as_str()).unwrap_or(""),
        }
    }
}

/// Writes the final escrow state of orders as CSV.
pub struct OrderWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OrderWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_orders(&mut self, orders: Vec<Order>) -> Result<()> {
        for order in &orders {
            self.writer.serialize(OrderRow::from(order))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decision::{DecisionRecord, DecisionSource, Verdict};
    use crate::domain::money::{Amount, Currency, Money};
    use crate::domain::order::EscrowStatus;
    use rust_decimal_macros::dec;

    #[test]
    fn test_write_orders() {
        let mut held = Order::new(
            "O1",
            "B",
            "S",
            Money::new(Amount::new(dec!(100)).unwrap(), Currency::usd()),
        );
        held.escrow_status = EscrowStatus::Held;
        held.payment_reference = Some("pi_1".to_string());
        held.decision = Some(DecisionRecord::from_verdict(
            Verdict::new(false, "No tracking, yet", 0.3),
            DecisionSource::Fallback,
        ));
        let pending = Order::new(
            "O2",
            "B",
            "S",
            Money::new(Amount::new(dec!(5)).unwrap(), Currency::usd()),
        );

        let mut out = Vec::new();
        OrderWriter::new(&mut out)
            .write_orders(vec![held, pending])
            .unwrap();
        let text = String::from_utf8(out).unwrap();

        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("order,status,escrow_status,payment_reference,decision,reason")
        );
        assert_eq!(
            lines.next(),
            Some("O1,PENDING,HELD,pi_1,fallback,\"No tracking, yet\"")
        );
        assert_eq!(lines.next(), Some("O2,PENDING,PENDING,,,"));
    }
}
