//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::status::{OrderPaymentStatus, OrderStatus, StatusError};
use crate::domain::totals::{self, ChargeLine, OrderCharges, OrderTotals};
use crate::domain::value_objects::{Money, MoneyError, Sku};

/// A placed order. Holds the invariant `total_due =
/// max(0, total_payable - total_paid)` through every mutation. Once the
/// status reaches completed the order is frozen except for payment-driven
/// fields; while cancellation is in progress only status and notes move.
#[derive(Clone, Debug)]
pub struct Order {
    id: Uuid,
    reference: String,
    customer_id: Uuid,
    currency: String,
    status: OrderStatus,
    payment_status: OrderPaymentStatus,
    lines: Vec<SellLine>,
    shipping_cost: Money,
    total_discount: Money,
    subtotal: Money,
    vat_total: Money,
    total_payable: Money,
    total_paid: Money,
    total_due: Money,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

/// One sold line: a product or a concrete color/size variant of it.
#[derive(Clone, Debug)]
pub struct SellLine {
    pub product_id: Uuid,
    pub color_id: Option<Uuid>,
    pub size_id: Option<Uuid>,
    pub name: String,
    pub sku: Option<Sku>,
    pub quantity: u32,
    pub unit_price: Money,
    pub discount: Money,
    pub vat_percentage: Decimal,
}

impl SellLine {
    fn charge(&self) -> ChargeLine {
        ChargeLine {
            quantity: self.quantity,
            unit_price: self.unit_price.clone(),
            discount: self.discount.clone(),
            vat_percentage: self.vat_percentage,
        }
    }
}

/// Mutable order-level fields outside the payment flow.
#[derive(Clone, Debug, Default)]
pub struct OrderEdit {
    pub notes: Option<String>,
    pub shipping_cost: Option<Money>,
    pub total_discount: Option<Money>,
}

impl OrderEdit {
    fn touches_money(&self) -> bool {
        self.shipping_cost.is_some() || self.total_discount.is_some()
    }
}

impl Order {
    pub fn place(
        reference: impl Into<String>,
        customer_id: Uuid,
        currency: &str,
        lines: Vec<SellLine>,
        shipping_cost: Money,
        total_discount: Money,
    ) -> Result<Self, OrderError> {
        if lines.is_empty() {
            return Err(OrderError::NoItems);
        }
        let id = Uuid::now_v7();
        let now = Utc::now();
        let mut order = Self {
            id,
            reference: reference.into(),
            customer_id,
            currency: currency.to_string(),
            status: OrderStatus::Pending,
            payment_status: OrderPaymentStatus::Unpaid,
            lines,
            shipping_cost,
            total_discount,
            subtotal: Money::zero(currency),
            vat_total: Money::zero(currency),
            total_payable: Money::zero(currency),
            total_paid: Money::zero(currency),
            total_due: Money::zero(currency),
            notes: None,
            created_at: now,
            updated_at: now,
            events: vec![],
        };
        order.recalculate()?;
        order.raise_event(DomainEvent::Order(OrderEvent::Created {
            order_id: id,
            reference: order.reference.clone(),
            total: order.total_payable.amount(),
        }));
        Ok(order)
    }

    /// Rehydrates a persisted order; raises no event.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid,
        reference: String,
        customer_id: Uuid,
        currency: String,
        status: OrderStatus,
        payment_status: OrderPaymentStatus,
        lines: Vec<SellLine>,
        shipping_cost: Money,
        total_discount: Money,
        total_paid: Money,
        notes: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        let mut order = Self {
            id, reference, customer_id,
            subtotal: Money::zero(&currency),
            vat_total: Money::zero(&currency),
            total_payable: Money::zero(&currency),
            total_due: Money::zero(&currency),
            currency, status, payment_status, lines,
            shipping_cost, total_discount, total_paid,
            notes, created_at, updated_at, events: vec![],
        };
        order.recalculate()?;
        Ok(order)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn reference(&self) -> &str { &self.reference }
    pub fn customer_id(&self) -> Uuid { self.customer_id }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment_status(&self) -> OrderPaymentStatus { self.payment_status }
    pub fn lines(&self) -> &[SellLine] { &self.lines }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn vat_total(&self) -> &Money { &self.vat_total }
    pub fn shipping_cost(&self) -> &Money { &self.shipping_cost }
    pub fn total_discount(&self) -> &Money { &self.total_discount }
    pub fn total_payable(&self) -> &Money { &self.total_payable }
    pub fn total_paid(&self) -> &Money { &self.total_paid }
    pub fn total_due(&self) -> &Money { &self.total_due }
    pub fn notes(&self) -> Option<&str> { self.notes.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn can_edit(&self) -> bool { !self.status.is_terminal() }

    /// Moves the order along the status table. A refused transition leaves
    /// the order untouched.
    pub fn transition_status(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        let from = self.status;
        self.status = from.transition_to(next)?;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to: next }));
        if next == OrderStatus::CancellationRequested {
            self.raise_event(DomainEvent::Order(OrderEvent::CancellationStarted { order_id: self.id }));
        }
        if next == OrderStatus::Completed {
            self.raise_event(DomainEvent::Order(OrderEvent::Completed { order_id: self.id }));
        }
        Ok(())
    }

    /// Applies non-payment field edits, gated by the lifecycle stage:
    /// completed orders refuse everything here, orders in the cancellation
    /// sub-range accept notes only.
    pub fn update_details(&mut self, edit: OrderEdit) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::Immutable);
        }
        if self.status.is_cancellation_in_progress() && edit.touches_money() {
            return Err(OrderError::EditRestricted(self.status));
        }
        if let Some(notes) = edit.notes { self.notes = Some(notes); }
        if let Some(shipping) = edit.shipping_cost { self.shipping_cost = shipping; }
        if let Some(discount) = edit.total_discount { self.total_discount = discount; }
        self.recalculate()?;
        Ok(())
    }

    /// Payment-driven update: mirrors a validated payment onto the order.
    /// Allowed at any lifecycle stage, including completed.
    pub fn apply_payment(&mut self, amount: &Money) -> Result<(), OrderError> {
        self.total_paid = self.total_paid.add(amount)?;
        self.recalculate()?;
        self.payment_status = if self.total_paid.amount() >= self.total_payable.amount() {
            OrderPaymentStatus::Paid
        } else if self.total_paid.amount() > Decimal::ZERO {
            OrderPaymentStatus::Partial
        } else {
            OrderPaymentStatus::Unpaid
        };
        self.raise_event(DomainEvent::Order(OrderEvent::PaymentApplied {
            order_id: self.id,
            amount: amount.amount(),
            total_paid: self.total_paid.amount(),
            total_due: self.total_due.amount(),
        }));
        Ok(())
    }

    /// Payment-driven update for a refunded payment: gives the amount back
    /// and marks the order refunded.
    pub fn apply_refund(&mut self, amount: &Money) -> Result<(), OrderError> {
        self.total_paid = self.total_paid.subtract(amount)?.clamp_zero();
        self.recalculate()?;
        self.payment_status = OrderPaymentStatus::Refunded;
        self.raise_event(DomainEvent::Order(OrderEvent::PaymentApplied {
            order_id: self.id,
            amount: -amount.amount(),
            total_paid: self.total_paid.amount(),
            total_due: self.total_due.amount(),
        }));
        Ok(())
    }

    pub fn totals(&self) -> Result<OrderTotals, MoneyError> {
        let charges = OrderCharges {
            shipping_cost: self.shipping_cost.clone(),
            total_discount: self.total_discount.clone(),
            total_paid: self.total_paid.clone(),
        };
        let lines: Vec<ChargeLine> = self.lines.iter().map(SellLine::charge).collect();
        totals::compute(&self.currency, &lines, &charges)
    }

    fn recalculate(&mut self) -> Result<(), OrderError> {
        let t = self.totals()?;
        self.subtotal = t.subtotal;
        self.vat_total = t.vat_total;
        self.total_payable = t.total;
        self.total_due = t.total_due;
        self.touch();
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum OrderError {
    #[error("an order needs at least one line")]
    NoItems,
    #[error("completed orders only accept payment-driven updates")]
    Immutable,
    #[error("only status and notes may change while the order is in '{0}'")]
    EditRestricted(OrderStatus),
    #[error(transparent)]
    Transition(#[from] StatusError),
    #[error(transparent)]
    Money(#[from] MoneyError),
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUR: &str = "XOF";

    fn money(units: i64) -> Money { Money::new(Decimal::new(units, 0), CUR) }

    fn widget_line(qty: u32, price: i64, vat: i64) -> SellLine {
        SellLine {
            product_id: Uuid::now_v7(),
            color_id: None,
            size_id: None,
            name: "Widget".into(),
            sku: Sku::new("W-001").ok(),
            quantity: qty,
            unit_price: money(price),
            discount: money(0),
            vat_percentage: Decimal::new(vat, 0),
        }
    }

    fn placed(shipping: i64) -> Order {
        Order::place("ORD-0001", Uuid::now_v7(), CUR, vec![widget_line(2, 10, 20)], money(shipping), money(0)).unwrap()
    }

    #[test]
    fn place_computes_totals() {
        let order = placed(5);
        assert_eq!(order.subtotal(), &money(20));
        assert_eq!(order.vat_total(), &money(4));
        assert_eq!(order.total_payable(), &money(29));
        assert_eq!(order.total_due(), &money(29));
        assert_eq!(order.payment_status(), OrderPaymentStatus::Unpaid);
    }

    #[test]
    fn place_refuses_empty_order() {
        let r = Order::place("ORD-0002", Uuid::now_v7(), CUR, vec![], money(0), money(0));
        assert!(matches!(r, Err(OrderError::NoItems)));
    }

    #[test]
    fn full_payment_settles_the_order_position() {
        let mut order = Order::place("ORD-0003", Uuid::now_v7(), CUR, vec![widget_line(1, 50, 0)], money(0), money(0)).unwrap();
        order.apply_payment(&money(50)).unwrap();
        assert_eq!(order.total_paid(), &money(50));
        assert_eq!(order.total_due(), &Money::zero(CUR));
        assert_eq!(order.payment_status(), OrderPaymentStatus::Paid);
    }

    #[test]
    fn partial_payment_tracks_due() {
        let mut order = placed(5);
        order.apply_payment(&money(9)).unwrap();
        assert_eq!(order.total_due(), &money(20));
        assert_eq!(order.payment_status(), OrderPaymentStatus::Partial);
    }

    #[test]
    fn overpayment_clamps_due_to_zero() {
        let mut order = placed(0);
        order.apply_payment(&money(100)).unwrap();
        assert_eq!(order.total_due(), &Money::zero(CUR));
        assert_eq!(order.payment_status(), OrderPaymentStatus::Paid);
    }

    #[test]
    fn refund_restores_due_and_marks_refunded() {
        let mut order = placed(5);
        order.apply_payment(&money(29)).unwrap();
        order.apply_refund(&money(29)).unwrap();
        assert_eq!(order.total_paid(), &money(0));
        assert_eq!(order.total_due(), &money(29));
        assert_eq!(order.payment_status(), OrderPaymentStatus::Refunded);
    }

    #[test]
    fn completed_order_refuses_edits_but_takes_payments() {
        let mut order = placed(5);
        order.transition_status(OrderStatus::Confirmed).unwrap();
        order.transition_status(OrderStatus::Processing).unwrap();
        order.transition_status(OrderStatus::Completed).unwrap();

        let err = order.update_details(OrderEdit { notes: Some("late note".into()), ..Default::default() }).unwrap_err();
        assert!(matches!(err, OrderError::Immutable));
        assert_eq!(order.notes(), None);

        order.apply_payment(&money(29)).unwrap();
        assert_eq!(order.payment_status(), OrderPaymentStatus::Paid);
    }

    #[test]
    fn cancellation_in_progress_restricts_edits_to_notes() {
        let mut order = placed(5);
        order.transition_status(OrderStatus::CancellationRequested).unwrap();

        let err = order.update_details(OrderEdit { shipping_cost: Some(money(9)), ..Default::default() }).unwrap_err();
        assert!(matches!(err, OrderError::EditRestricted(_)));
        assert_eq!(order.shipping_cost(), &money(5));

        order.update_details(OrderEdit { notes: Some("customer called".into()), ..Default::default() }).unwrap();
        assert_eq!(order.notes(), Some("customer called"));
    }

    #[test]
    fn invalid_transition_leaves_order_unchanged() {
        let mut order = placed(5);
        let err = order.transition_status(OrderStatus::Completed).unwrap_err();
        assert!(matches!(err, OrderError::Transition(StatusError::InvalidOrderTransition { .. })));
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn shipping_edit_recalculates() {
        let mut order = placed(5);
        order.update_details(OrderEdit { shipping_cost: Some(money(10)), ..Default::default() }).unwrap();
        assert_eq!(order.total_payable(), &money(34));
        assert_eq!(order.total_due(), &money(34));
    }
}
