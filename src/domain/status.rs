//! Order and payment status model.
//!
//! Statuses travel as raw codes at the edges (database columns, status-update
//! payloads) and are converted once into these enums; every consumer matches
//! exhaustively. Transition checks never mutate anything, so a refused action
//! leaves state untouched.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle stage of an order. Codes 0-6 on the wire; 3-5 form the
/// cancellation sub-range, 6 is terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    CancellationRequested,
    Cancelling,
    Cancelled,
    Completed,
}

impl OrderStatus {
    pub fn code(self) -> i16 {
        match self {
            Self::Pending => 0,
            Self::Confirmed => 1,
            Self::Processing => 2,
            Self::CancellationRequested => 3,
            Self::Cancelling => 4,
            Self::Cancelled => 5,
            Self::Completed => 6,
        }
    }

    pub fn from_code(code: i16) -> Result<Self, StatusError> {
        match code {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Confirmed),
            2 => Ok(Self::Processing),
            3 => Ok(Self::CancellationRequested),
            4 => Ok(Self::Cancelling),
            5 => Ok(Self::Cancelled),
            6 => Ok(Self::Completed),
            other => Err(StatusError::UnknownOrderStatus(other)),
        }
    }

    pub fn is_terminal(self) -> bool { self == Self::Completed }

    /// Codes 3-5: only status and notes stay editable, the UI shows a warning.
    pub fn is_cancellation_in_progress(self) -> bool {
        matches!(self, Self::CancellationRequested | Self::Cancelling | Self::Cancelled)
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed)
                | (Self::Confirmed, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Pending, Self::CancellationRequested)
                | (Self::Confirmed, Self::CancellationRequested)
                | (Self::Processing, Self::CancellationRequested)
                | (Self::CancellationRequested, Self::Cancelling)
                | (Self::Cancelling, Self::Cancelled)
        )
    }

    pub fn transition_to(self, next: OrderStatus) -> Result<OrderStatus, StatusError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StatusError::InvalidOrderTransition { from: self, to: next })
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::CancellationRequested => "cancellation_requested",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        };
        write!(f, "{}", s)
    }
}

/// Order-level payment position, codes 0-3. Derived from paid vs payable,
/// never set directly by a client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPaymentStatus {
    #[default]
    Unpaid,
    Partial,
    Paid,
    Refunded,
}

impl OrderPaymentStatus {
    pub fn code(self) -> i16 {
        match self {
            Self::Unpaid => 0,
            Self::Partial => 1,
            Self::Paid => 2,
            Self::Refunded => 3,
        }
    }

    pub fn from_code(code: i16) -> Result<Self, StatusError> {
        match code {
            0 => Ok(Self::Unpaid),
            1 => Ok(Self::Partial),
            2 => Ok(Self::Paid),
            3 => Ok(Self::Refunded),
            other => Err(StatusError::UnknownPaymentStatus(other)),
        }
    }
}

/// Lifecycle stage of an individual payment record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Success,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StatusError> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            other => Err(StatusError::UnknownPaymentState(other.to_string())),
        }
    }

    /// Resulting status for an action, or the refusal. Pure: the caller
    /// decides whether to persist the result.
    pub fn apply(self, action: PaymentAction) -> Result<PaymentStatus, StatusError> {
        match (self, action) {
            (Self::Pending, PaymentAction::Validate) => Ok(Self::Success),
            (Self::Pending, PaymentAction::Reject) => Ok(Self::Failed),
            (Self::Success, PaymentAction::Refund) => Ok(Self::Refunded),
            (from, action) => Err(StatusError::InvalidPaymentTransition { from, action }),
        }
    }

    /// Fields may be edited only before the payment settles.
    pub fn can_edit(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }

    /// Settled payments (success/refunded) are permanent records.
    pub fn can_delete(self) -> bool {
        matches!(self, Self::Pending | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Requested state change on a payment record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentAction {
    Validate,
    Reject,
    Refund,
}

impl fmt::Display for PaymentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validate => "validate",
            Self::Reject => "reject",
            Self::Refund => "refund",
        };
        write!(f, "{}", s)
    }
}

/// Accepted means of payment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Paypal,
    Stripe,
    OrangeMoney,
    Wave,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Card => "card",
            Self::Paypal => "paypal",
            Self::Stripe => "stripe",
            Self::OrangeMoney => "orange_money",
            Self::Wave => "wave",
            Self::BankTransfer => "bank_transfer",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StatusError> {
        match s {
            "cash" => Ok(Self::Cash),
            "card" => Ok(Self::Card),
            "paypal" => Ok(Self::Paypal),
            "stripe" => Ok(Self::Stripe),
            "orange_money" => Ok(Self::OrangeMoney),
            "wave" => Ok(Self::Wave),
            "bank_transfer" => Ok(Self::BankTransfer),
            other => Err(StatusError::UnknownPaymentMethod(other.to_string())),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StatusError {
    #[error("unknown order status code {0}")]
    UnknownOrderStatus(i16),
    #[error("unknown order payment status code {0}")]
    UnknownPaymentStatus(i16),
    #[error("unknown payment state '{0}'")]
    UnknownPaymentState(String),
    #[error("unknown payment method '{0}'")]
    UnknownPaymentMethod(String),
    #[error("cannot move order from '{from}' to '{to}'")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },
    #[error("cannot {action} a payment in state '{from}'")]
    InvalidPaymentTransition { from: PaymentStatus, action: PaymentAction },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_codes_round_trip() {
        for code in 0..=6 {
            assert_eq!(OrderStatus::from_code(code).unwrap().code(), code);
        }
        assert!(OrderStatus::from_code(7).is_err());
    }

    #[test]
    fn forward_path() {
        let s = OrderStatus::Pending
            .transition_to(OrderStatus::Confirmed).unwrap()
            .transition_to(OrderStatus::Processing).unwrap()
            .transition_to(OrderStatus::Completed).unwrap();
        assert!(s.is_terminal());
    }

    #[test]
    fn completed_is_terminal() {
        for code in 0..=6 {
            let next = OrderStatus::from_code(code).unwrap();
            assert!(!OrderStatus::Completed.can_transition_to(next));
        }
    }

    #[test]
    fn cancellation_sub_range() {
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::CancellationRequested));
        let s = OrderStatus::CancellationRequested
            .transition_to(OrderStatus::Cancelling).unwrap()
            .transition_to(OrderStatus::Cancelled).unwrap();
        assert!(s.is_cancellation_in_progress());
        assert!(!s.is_terminal());
        // no jumping back out of the sub-range
        assert!(!s.can_transition_to(OrderStatus::Processing));
        assert!(!s.can_transition_to(OrderStatus::Completed));
    }

    #[test]
    fn no_skipping_stages() {
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::CancellationRequested.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn payment_transition_table() {
        assert_eq!(PaymentStatus::Pending.apply(PaymentAction::Validate).unwrap(), PaymentStatus::Success);
        assert_eq!(PaymentStatus::Pending.apply(PaymentAction::Reject).unwrap(), PaymentStatus::Failed);
        assert_eq!(PaymentStatus::Success.apply(PaymentAction::Refund).unwrap(), PaymentStatus::Refunded);
    }

    #[test]
    fn validate_twice_is_refused() {
        let settled = PaymentStatus::Pending.apply(PaymentAction::Validate).unwrap();
        assert!(settled.apply(PaymentAction::Validate).is_err());
    }

    #[test]
    fn refund_requires_success() {
        assert!(PaymentStatus::Pending.apply(PaymentAction::Refund).is_err());
        assert!(PaymentStatus::Failed.apply(PaymentAction::Refund).is_err());
        assert!(PaymentStatus::Refunded.apply(PaymentAction::Refund).is_err());
    }

    #[test]
    fn edit_and_delete_gates() {
        assert!(PaymentStatus::Pending.can_edit());
        assert!(PaymentStatus::Failed.can_edit());
        assert!(!PaymentStatus::Success.can_edit());
        assert!(!PaymentStatus::Refunded.can_edit());
        assert!(!PaymentStatus::Cancelled.can_edit());

        assert!(PaymentStatus::Cancelled.can_delete());
        assert!(!PaymentStatus::Success.can_delete());
        assert!(!PaymentStatus::Refunded.can_delete());
    }

    #[test]
    fn method_parse_round_trip() {
        for m in ["cash", "card", "paypal", "stripe", "orange_money", "wave", "bank_transfer"] {
            assert_eq!(PaymentMethod::parse(m).unwrap().as_str(), m);
        }
        assert!(PaymentMethod::parse("cheque").is_err());
    }
}
