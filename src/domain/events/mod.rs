//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::status::{OrderStatus, PaymentStatus};

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Payment(PaymentEvent),
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, reference: String, total: Decimal },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    CancellationStarted { order_id: Uuid },
    Completed { order_id: Uuid },
    PaymentApplied { order_id: Uuid, amount: Decimal, total_paid: Decimal, total_due: Decimal },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PaymentEvent {
    Recorded { payment_id: Uuid, order_id: Uuid, amount: Decimal },
    Settled { payment_id: Uuid, order_id: Uuid, status: PaymentStatus },
    Refunded { payment_id: Uuid, order_id: Uuid, amount: Decimal },
}
