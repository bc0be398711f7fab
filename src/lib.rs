//! Boutique Core
//!
//! Order/payment lifecycle and totals engine for a self-hosted storefront.
//!
//! ## Features
//! - Order status lifecycle (codes 0-6, cancellation sub-range 3-5)
//! - Payment record transitions (validate / reject / refund) with edit and
//!   delete gates
//! - Decimal totals calculator (subtotal, VAT, shipping, discount, due)
//! - Reducer-driven cart with checkout reconciliation and stock checks

use thiserror::Error;

pub mod domain;

pub use domain::aggregates::{Cart, CartAction, CartKey, Order, OrderEdit, Payment, Product, SellLine};
pub use domain::status::{OrderPaymentStatus, OrderStatus, PaymentAction, PaymentMethod, PaymentStatus};
pub use domain::totals::{ChargeLine, OrderCharges, OrderTotals};
pub use domain::value_objects::{Money, Quantity, Sku};

/// Crate-level error, one variant per domain concern.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Status(#[from] domain::status::StatusError),

    #[error(transparent)]
    Money(#[from] domain::value_objects::MoneyError),

    #[error(transparent)]
    Order(#[from] domain::aggregates::OrderError),

    #[error(transparent)]
    Payment(#[from] domain::aggregates::PaymentError),

    #[error(transparent)]
    Cart(#[from] domain::aggregates::CartError),

    #[error(transparent)]
    Product(#[from] domain::aggregates::ProductError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    // the umbrella error lets callers mix domain operations behind one `?`
    fn settle(payment: &mut Payment, order: &mut Order) -> Result<()> {
        payment.validate()?;
        order.apply_payment(&payment.amount().clone())?;
        Ok(())
    }

    #[test]
    fn domain_errors_convert_into_the_crate_error() {
        let line = SellLine {
            product_id: Uuid::now_v7(),
            color_id: None,
            size_id: None,
            name: "Widget".into(),
            sku: None,
            quantity: 1,
            unit_price: Money::new(Decimal::new(50, 0), "XOF"),
            discount: Money::zero("XOF"),
            vat_percentage: Decimal::ZERO,
        };
        let mut order = Order::place("ORD-1", Uuid::now_v7(), "XOF", vec![line], Money::zero("XOF"), Money::zero("XOF")).unwrap();
        let mut payment = Payment::record(order.id(), PaymentMethod::Cash, Money::new(Decimal::new(50, 0), "XOF")).unwrap();

        settle(&mut payment, &mut order).unwrap();
        assert_eq!(order.total_due(), &Money::zero("XOF"));

        let err = settle(&mut payment, &mut order).unwrap_err();
        assert!(matches!(err, Error::Payment(_)));
    }
}
