//! Order totals calculator.
//!
//! All accumulation is `Decimal` end to end; two-place rounding belongs to
//! `Money` display. The grand total is allowed to go negative (a discount can
//! exceed the goods value) while the amount due is clamped at zero.

use rust_decimal::Decimal;

use crate::domain::value_objects::{Money, MoneyError};

/// One chargeable line: quantity, unit price, flat line discount and the VAT
/// percentage applied to the discounted line value.
#[derive(Clone, Debug)]
pub struct ChargeLine {
    pub quantity: u32,
    pub unit_price: Money,
    pub discount: Money,
    pub vat_percentage: Decimal,
}

impl ChargeLine {
    /// `quantity * unit_price - discount`
    pub fn subtotal(&self) -> Result<Money, MoneyError> {
        self.unit_price.multiply(self.quantity).subtract(&self.discount)
    }

    pub fn vat(&self) -> Result<Money, MoneyError> {
        let base = self.subtotal()?;
        Ok(Money::new(
            base.amount() * self.vat_percentage / Decimal::ONE_HUNDRED,
            base.currency(),
        ))
    }
}

/// Order-level figures fed into the calculation alongside the lines.
#[derive(Clone, Debug)]
pub struct OrderCharges {
    pub shipping_cost: Money,
    pub total_discount: Money,
    pub total_paid: Money,
}

impl OrderCharges {
    pub fn none(currency: &str) -> Self {
        Self {
            shipping_cost: Money::zero(currency),
            total_discount: Money::zero(currency),
            total_paid: Money::zero(currency),
        }
    }
}

/// Computed breakdown of an order's money position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub vat_total: Money,
    pub shipping_cost: Money,
    pub total_discount: Money,
    pub total: Money,
    pub total_paid: Money,
    pub total_due: Money,
}

/// Computes the full breakdown for a set of lines in `currency`.
///
/// An empty line list yields a zero subtotal. `total` is not clamped;
/// `total_due` never drops below zero, even when paid exceeds total.
pub fn compute(
    currency: &str,
    lines: &[ChargeLine],
    charges: &OrderCharges,
) -> Result<OrderTotals, MoneyError> {
    let mut subtotal = Money::zero(currency);
    let mut vat_total = Money::zero(currency);
    for line in lines {
        subtotal = subtotal.add(&line.subtotal()?)?;
        vat_total = vat_total.add(&line.vat()?)?;
    }

    let total = subtotal
        .add(&vat_total)?
        .add(&charges.shipping_cost)?
        .subtract(&charges.total_discount)?;
    let total_due = total.subtract(&charges.total_paid)?.clamp_zero();

    Ok(OrderTotals {
        subtotal,
        vat_total,
        shipping_cost: charges.shipping_cost.clone(),
        total_discount: charges.total_discount.clone(),
        total,
        total_paid: charges.total_paid.clone(),
        total_due,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUR: &str = "XOF";

    fn money(units: i64) -> Money { Money::new(Decimal::new(units, 0), CUR) }

    fn line(qty: u32, price: i64, discount: i64, vat: i64) -> ChargeLine {
        ChargeLine {
            quantity: qty,
            unit_price: money(price),
            discount: money(discount),
            vat_percentage: Decimal::new(vat, 0),
        }
    }

    #[test]
    fn empty_lines_zero_subtotal() {
        let t = compute(CUR, &[], &OrderCharges::none(CUR)).unwrap();
        assert_eq!(t.subtotal, Money::zero(CUR));
        assert_eq!(t.total, Money::zero(CUR));
        assert_eq!(t.total_due, Money::zero(CUR));
    }

    #[test]
    fn spec_scenario_two_widgets() {
        // qty 2 at 10, 20% VAT, shipping 5: subtotal 20, vat 4, total 29
        let charges = OrderCharges { shipping_cost: money(5), total_discount: money(0), total_paid: money(0) };
        let t = compute(CUR, &[line(2, 10, 0, 20)], &charges).unwrap();
        assert_eq!(t.subtotal, money(20));
        assert_eq!(t.vat_total, money(4));
        assert_eq!(t.total, money(29));
        assert_eq!(t.total_due, money(29));
    }

    #[test]
    fn subtotal_is_sum_of_line_subtotals() {
        let lines = vec![line(3, 7, 2, 18), line(1, 100, 15, 0), line(5, 2, 0, 10)];
        let t = compute(CUR, &lines, &OrderCharges::none(CUR)).unwrap();
        let by_hand = lines.iter().fold(Money::zero(CUR), |acc, l| acc.add(&l.subtotal().unwrap()).unwrap());
        assert_eq!(t.subtotal, by_hand);
    }

    #[test]
    fn due_clamped_when_overpaid() {
        let charges = OrderCharges { shipping_cost: money(0), total_discount: money(0), total_paid: money(100) };
        let t = compute(CUR, &[line(1, 30, 0, 0)], &charges).unwrap();
        assert_eq!(t.total, money(30));
        assert_eq!(t.total_due, Money::zero(CUR));
    }

    #[test]
    fn total_may_go_negative_due_may_not() {
        // order-level discount exceeds goods value
        let charges = OrderCharges { shipping_cost: money(0), total_discount: money(50), total_paid: money(0) };
        let t = compute(CUR, &[line(1, 30, 0, 0)], &charges).unwrap();
        assert_eq!(t.total, money(-20));
        assert!(t.total.is_negative());
        assert_eq!(t.total_due, Money::zero(CUR));
    }

    #[test]
    fn vat_applies_after_line_discount() {
        // (2*10 - 10) = 10, 20% VAT on 10 = 2
        let t = compute(CUR, &[line(2, 10, 10, 20)], &OrderCharges::none(CUR)).unwrap();
        assert_eq!(t.subtotal, money(10));
        assert_eq!(t.vat_total, money(2));
    }

    #[test]
    fn fractional_vat_accumulates_exactly() {
        // 100 lines of 0.01 at 18% VAT: vat_total must be exactly 0.18
        let penny = ChargeLine {
            quantity: 1,
            unit_price: Money::new(Decimal::new(1, 2), CUR),
            discount: Money::zero(CUR),
            vat_percentage: Decimal::new(18, 0),
        };
        let lines = vec![penny; 100];
        let t = compute(CUR, &lines, &OrderCharges::none(CUR)).unwrap();
        assert_eq!(t.subtotal.amount(), Decimal::new(100, 2));
        assert_eq!(t.vat_total.amount(), Decimal::new(18, 2));
    }

    #[test]
    fn currency_mismatch_is_an_error() {
        let charges = OrderCharges {
            shipping_cost: Money::new(Decimal::new(5, 0), "EUR"),
            total_discount: money(0),
            total_paid: money(0),
        };
        assert!(compute(CUR, &[line(1, 10, 0, 0)], &charges).is_err());
    }
}
