//! Payment Aggregate

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::events::{DomainEvent, PaymentEvent};
use crate::domain::status::{PaymentAction, PaymentMethod, PaymentStatus, StatusError};
use crate::domain::value_objects::Money;

/// A single payment recorded against an order. Created pending; settles via
/// validate/reject, and a settled success may later be refunded. Settled
/// records (success/refunded) are immutable.
#[derive(Clone, Debug)]
pub struct Payment {
    id: Uuid,
    order_id: Uuid,
    method: PaymentMethod,
    amount: Money,
    status: PaymentStatus,
    transaction_reference: Option<String>,
    payment_date: DateTime<Utc>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

/// Editable field set for a not-yet-settled payment.
#[derive(Clone, Debug, Default)]
pub struct PaymentUpdate {
    pub method: Option<PaymentMethod>,
    pub amount: Option<Money>,
    pub transaction_reference: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl Payment {
    pub fn record(order_id: Uuid, method: PaymentMethod, amount: Money) -> Result<Self, PaymentError> {
        if amount.is_negative() || amount.amount().is_zero() {
            return Err(PaymentError::NonPositiveAmount);
        }
        let id = Uuid::now_v7();
        let now = Utc::now();
        let mut payment = Self {
            id, order_id, method, amount: amount.clone(),
            status: PaymentStatus::Pending,
            transaction_reference: None, payment_date: now, notes: None,
            created_at: now, updated_at: now, events: vec![],
        };
        payment.raise_event(DomainEvent::Payment(PaymentEvent::Recorded {
            payment_id: id, order_id, amount: amount.amount(),
        }));
        Ok(payment)
    }

    /// Rehydrates a persisted record; raises no event.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid, order_id: Uuid, method: PaymentMethod, amount: Money, status: PaymentStatus,
        transaction_reference: Option<String>, payment_date: DateTime<Utc>, notes: Option<String>,
        created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id, order_id, method, amount, status, transaction_reference,
            payment_date, notes, created_at, updated_at, events: vec![],
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_id(&self) -> Uuid { self.order_id }
    pub fn method(&self) -> PaymentMethod { self.method }
    pub fn amount(&self) -> &Money { &self.amount }
    pub fn status(&self) -> PaymentStatus { self.status }
    pub fn transaction_reference(&self) -> Option<&str> { self.transaction_reference.as_deref() }
    pub fn payment_date(&self) -> DateTime<Utc> { self.payment_date }
    pub fn notes(&self) -> Option<&str> { self.notes.as_deref() }

    /// pending -> success. The caller must mirror the settled amount onto the
    /// owning order via `Order::apply_payment`, in the same unit of work.
    pub fn validate(&mut self) -> Result<(), PaymentError> {
        self.transition(PaymentAction::Validate)?;
        self.raise_event(DomainEvent::Payment(PaymentEvent::Settled {
            payment_id: self.id, order_id: self.order_id, status: self.status,
        }));
        Ok(())
    }

    /// pending -> failed.
    pub fn reject(&mut self) -> Result<(), PaymentError> {
        self.transition(PaymentAction::Reject)?;
        self.raise_event(DomainEvent::Payment(PaymentEvent::Settled {
            payment_id: self.id, order_id: self.order_id, status: self.status,
        }));
        Ok(())
    }

    /// success -> refunded.
    pub fn refund(&mut self) -> Result<(), PaymentError> {
        self.transition(PaymentAction::Refund)?;
        self.raise_event(DomainEvent::Payment(PaymentEvent::Refunded {
            payment_id: self.id, order_id: self.order_id, amount: self.amount.amount(),
        }));
        Ok(())
    }

    /// Applies field edits; refused once the payment has settled. Nothing is
    /// written when the gate refuses.
    pub fn update(&mut self, update: PaymentUpdate) -> Result<(), PaymentError> {
        if !self.status.can_edit() {
            return Err(PaymentError::NotEditable(self.status));
        }
        if let Some(amount) = &update.amount {
            if amount.is_negative() || amount.amount().is_zero() {
                return Err(PaymentError::NonPositiveAmount);
            }
        }
        if let Some(method) = update.method { self.method = method; }
        if let Some(amount) = update.amount { self.amount = amount; }
        if let Some(reference) = update.transaction_reference { self.transaction_reference = Some(reference); }
        if let Some(date) = update.payment_date { self.payment_date = date; }
        if let Some(notes) = update.notes { self.notes = Some(notes); }
        self.touch();
        Ok(())
    }

    pub fn can_delete(&self) -> bool { self.status.can_delete() }

    fn transition(&mut self, action: PaymentAction) -> Result<(), PaymentError> {
        self.status = self.status.apply(action)?;
        self.touch();
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PaymentError {
    #[error(transparent)]
    Transition(#[from] StatusError),
    #[error("payment in state '{0}' cannot be edited")]
    NotEditable(PaymentStatus),
    #[error("payment amount must be positive")]
    NonPositiveAmount,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn payment(amount: i64) -> Payment {
        Payment::record(Uuid::now_v7(), PaymentMethod::OrangeMoney, Money::new(Decimal::new(amount, 0), "XOF")).unwrap()
    }

    #[test]
    fn record_starts_pending() {
        let mut p = payment(50);
        assert_eq!(p.status(), PaymentStatus::Pending);
        assert_eq!(p.take_events().len(), 1);
    }

    #[test]
    fn zero_amount_refused() {
        let r = Payment::record(Uuid::now_v7(), PaymentMethod::Cash, Money::zero("XOF"));
        assert!(matches!(r, Err(PaymentError::NonPositiveAmount)));
    }

    #[test]
    fn validate_then_refund() {
        let mut p = payment(50);
        p.validate().unwrap();
        assert_eq!(p.status(), PaymentStatus::Success);
        p.refund().unwrap();
        assert_eq!(p.status(), PaymentStatus::Refunded);
    }

    #[test]
    fn double_validate_refused_state_unchanged() {
        let mut p = payment(50);
        p.validate().unwrap();
        let err = p.validate().unwrap_err();
        assert!(matches!(err, PaymentError::Transition(StatusError::InvalidPaymentTransition { .. })));
        assert_eq!(p.status(), PaymentStatus::Success);
    }

    #[test]
    fn settled_payment_rejects_edits() {
        let mut p = payment(50);
        p.validate().unwrap();
        let err = p.update(PaymentUpdate { notes: Some("late".into()), ..Default::default() }).unwrap_err();
        assert!(matches!(err, PaymentError::NotEditable(PaymentStatus::Success)));
        assert_eq!(p.notes(), None);
    }

    #[test]
    fn rejected_payment_may_be_edited_and_deleted() {
        let mut p = payment(50);
        p.reject().unwrap();
        p.update(PaymentUpdate { method: Some(PaymentMethod::Wave), ..Default::default() }).unwrap();
        assert_eq!(p.method(), PaymentMethod::Wave);
        assert!(p.can_delete());
    }

    #[test]
    fn success_cannot_be_deleted() {
        let mut p = payment(50);
        p.validate().unwrap();
        assert!(!p.can_delete());
    }
}
