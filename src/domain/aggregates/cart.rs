//! Cart Aggregate
//!
//! The cart is an explicit store driven by a reducer: every mutation is a
//! `CartAction` fed to `Cart::apply`, which either produces the next state or
//! refuses and leaves the cart untouched. Mutation is `&mut self` only; one
//! action completes before the next is accepted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::aggregates::order::SellLine;
use crate::domain::aggregates::product::Product;
use crate::domain::value_objects::{Money, Sku};

/// Identity of a cart line: a product plus the shopper's color/size pick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CartKey {
    pub product_id: Uuid,
    pub color_id: Option<Uuid>,
    pub size_id: Option<Uuid>,
}

/// A priced line ready to enter the cart. Price and stock ceiling come from
/// the variant when the shopper picked one, else from the product itself.
#[derive(Clone, Debug)]
pub struct LineQuote {
    pub key: CartKey,
    pub name: String,
    pub sku: Option<Sku>,
    pub unit_price: Money,
    pub available_stock: u32,
    pub discount: Money,
    pub vat_percentage: Decimal,
}

impl LineQuote {
    pub fn resolve(
        product: &Product,
        color_id: Option<Uuid>,
        size_id: Option<Uuid>,
        vat_percentage: Decimal,
    ) -> Result<Self, CartError> {
        let key = CartKey { product_id: product.id(), color_id, size_id };
        let wants_variant = color_id.is_some() || size_id.is_some();
        let (sku, unit_price, available_stock) = if wants_variant {
            let variant = product
                .variant(color_id, size_id)
                .ok_or(CartError::UnknownVariant { key })?;
            (variant.sku.clone(), variant.price.clone(), variant.stock.value())
        } else {
            (Some(product.sku().clone()), product.sale_price().clone(), product.stock().value())
        };
        Ok(Self {
            key,
            name: product.name().to_string(),
            sku,
            unit_price: unit_price.clone(),
            available_stock,
            discount: Money::zero(unit_price.currency()),
            vat_percentage,
        })
    }
}

#[derive(Clone, Debug)]
pub struct CartLine {
    pub key: CartKey,
    pub name: String,
    pub sku: Option<Sku>,
    pub quantity: u32,
    pub unit_price: Money,
    pub available_stock: u32,
    pub discount: Money,
    pub vat_percentage: Decimal,
}

/// Everything that can happen to a cart.
#[derive(Clone, Debug)]
pub enum CartAction {
    /// Merge one unit of the quoted line in; an existing line with the same
    /// key gains quantity instead of duplicating.
    Add(LineQuote),
    /// Set an existing line's quantity; zero removes the line.
    SetQuantity { key: CartKey, quantity: u32 },
    Remove { key: CartKey },
    Clear,
}

/// A requested quantity the source cannot cover, reported at checkout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StockShortage {
    pub key: CartKey,
    pub name: String,
    pub requested: u32,
    pub available: u32,
}

#[derive(Clone, Debug)]
pub struct Cart {
    session_id: String,
    currency: String,
    lines: Vec<CartLine>,
    subtotal: Money,
    updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(session_id: impl Into<String>, currency: &str) -> Self {
        Self {
            session_id: session_id.into(),
            currency: currency.to_string(),
            lines: vec![],
            subtotal: Money::zero(currency),
            updated_at: Utc::now(),
        }
    }

    pub fn session_id(&self) -> &str { &self.session_id }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn line(&self, key: &CartKey) -> Option<&CartLine> { self.lines.iter().find(|l| &l.key == key) }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// The reducer. A refused action returns the error and changes nothing.
    pub fn apply(&mut self, action: CartAction) -> Result<(), CartError> {
        match action {
            CartAction::Add(quote) => {
                if let Some(existing) = self.lines.iter_mut().find(|l| l.key == quote.key) {
                    existing.quantity += 1;
                } else {
                    self.lines.push(CartLine {
                        key: quote.key,
                        name: quote.name,
                        sku: quote.sku,
                        quantity: 1,
                        unit_price: quote.unit_price,
                        available_stock: quote.available_stock,
                        discount: quote.discount,
                        vat_percentage: quote.vat_percentage,
                    });
                }
            }
            CartAction::SetQuantity { key, quantity } => {
                if self.line(&key).is_none() {
                    return Err(CartError::LineNotFound { key });
                }
                if quantity == 0 {
                    self.lines.retain(|l| l.key != key);
                } else if let Some(line) = self.lines.iter_mut().find(|l| l.key == key) {
                    line.quantity = quantity;
                }
            }
            CartAction::Remove { key } => {
                let before = self.lines.len();
                self.lines.retain(|l| l.key != key);
                if self.lines.len() == before {
                    return Err(CartError::LineNotFound { key });
                }
            }
            CartAction::Clear => self.lines.clear(),
        }
        self.recalculate();
        Ok(())
    }

    /// Lines whose requested quantity exceeds their stock ceiling. Checkout
    /// blocks while this is non-empty.
    pub fn stock_shortages(&self) -> Vec<StockShortage> {
        self.lines
            .iter()
            .filter(|l| l.quantity > l.available_stock)
            .map(|l| StockShortage {
                key: l.key,
                name: l.name.clone(),
                requested: l.quantity,
                available: l.available_stock,
            })
            .collect()
    }

    /// Reconciles the cart into order lines for checkout submission.
    /// Refuses on an empty cart or any stock shortage.
    pub fn into_sell_lines(self) -> Result<Vec<SellLine>, CartError> {
        if self.lines.is_empty() {
            return Err(CartError::Empty);
        }
        let shortages = self.stock_shortages();
        if !shortages.is_empty() {
            return Err(CartError::InsufficientStock(shortages));
        }
        Ok(self
            .lines
            .into_iter()
            .map(|l| SellLine {
                product_id: l.key.product_id,
                color_id: l.key.color_id,
                size_id: l.key.size_id,
                name: l.name,
                sku: l.sku,
                quantity: l.quantity,
                unit_price: l.unit_price,
                discount: l.discount,
                vat_percentage: l.vat_percentage,
            })
            .collect())
    }

    fn recalculate(&mut self) {
        self.subtotal = self.lines.iter().fold(Money::zero(&self.currency), |acc, l| {
            let line_total = l
                .unit_price
                .multiply(l.quantity)
                .subtract(&l.discount)
                .unwrap_or_else(|_| l.unit_price.multiply(l.quantity));
            acc.add(&line_total).unwrap_or(acc)
        });
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CartError {
    #[error("no line in the cart for product {}", .key.product_id)]
    LineNotFound { key: CartKey },
    #[error("product {} has no variant for the requested color/size", .key.product_id)]
    UnknownVariant { key: CartKey },
    #[error("cart is empty")]
    Empty,
    #[error("{} line(s) exceed available stock", .0.len())]
    InsufficientStock(Vec<StockShortage>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::Variant;
    use crate::domain::value_objects::Quantity;

    const CUR: &str = "XOF";

    fn product(stock: u32) -> Product {
        let mut p = Product::create(Sku::new("TEE-1").unwrap(), "Tee", Money::new(Decimal::new(15, 0), CUR));
        p.add_stock(stock);
        p
    }

    fn quote(p: &Product) -> LineQuote {
        LineQuote::resolve(p, None, None, Decimal::new(18, 0)).unwrap()
    }

    #[test]
    fn adding_same_key_twice_merges_into_one_line() {
        let p = product(10);
        let mut cart = Cart::new("sess-1", CUR);
        cart.apply(CartAction::Add(quote(&p))).unwrap();
        cart.apply(CartAction::Add(quote(&p))).unwrap();
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 2);
        assert_eq!(cart.subtotal(), &Money::new(Decimal::new(30, 0), CUR));
    }

    #[test]
    fn different_variants_get_their_own_lines() {
        let mut p = product(10);
        let color = Uuid::now_v7();
        let size = Uuid::now_v7();
        p.add_variant(Variant {
            color_id: Some(color), size_id: Some(size), sku: None,
            price: Money::new(Decimal::new(18, 0), CUR), stock: Quantity::new(4),
        });
        let mut cart = Cart::new("sess-1", CUR);
        cart.apply(CartAction::Add(quote(&p))).unwrap();
        let variant_quote = LineQuote::resolve(&p, Some(color), Some(size), Decimal::ZERO).unwrap();
        assert_eq!(variant_quote.unit_price, Money::new(Decimal::new(18, 0), CUR));
        assert_eq!(variant_quote.available_stock, 4);
        cart.apply(CartAction::Add(variant_quote)).unwrap();
        assert_eq!(cart.lines().len(), 2);
    }

    #[test]
    fn unknown_variant_is_refused() {
        let p = product(10);
        assert!(matches!(
            LineQuote::resolve(&p, Some(Uuid::now_v7()), None, Decimal::ZERO),
            Err(CartError::UnknownVariant { .. })
        ));
    }

    #[test]
    fn zero_quantity_removes_the_line() {
        let p = product(10);
        let mut cart = Cart::new("sess-1", CUR);
        let key = quote(&p).key;
        cart.apply(CartAction::Add(quote(&p))).unwrap();
        cart.apply(CartAction::SetQuantity { key, quantity: 0 }).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.subtotal(), &Money::zero(CUR));
    }

    #[test]
    fn removing_a_missing_line_is_an_error() {
        let p = product(10);
        let mut cart = Cart::new("sess-1", CUR);
        let key = quote(&p).key;
        assert!(matches!(cart.apply(CartAction::Remove { key }), Err(CartError::LineNotFound { .. })));
    }

    #[test]
    fn shortages_enumerate_offending_lines() {
        let p = product(2);
        let mut cart = Cart::new("sess-1", CUR);
        let key = quote(&p).key;
        cart.apply(CartAction::Add(quote(&p))).unwrap();
        cart.apply(CartAction::SetQuantity { key, quantity: 5 }).unwrap();
        let shortages = cart.stock_shortages();
        assert_eq!(shortages.len(), 1);
        assert_eq!(shortages[0].requested, 5);
        assert_eq!(shortages[0].available, 2);
        assert!(matches!(cart.into_sell_lines(), Err(CartError::InsufficientStock(_))));
    }

    #[test]
    fn checkout_reconciliation_produces_sell_lines() {
        let p = product(10);
        let mut cart = Cart::new("sess-1", CUR);
        cart.apply(CartAction::Add(quote(&p))).unwrap();
        cart.apply(CartAction::Add(quote(&p))).unwrap();
        let lines = cart.into_sell_lines().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 2);
        assert_eq!(lines[0].vat_percentage, Decimal::new(18, 0));
    }

    #[test]
    fn empty_cart_cannot_check_out() {
        let cart = Cart::new("sess-1", CUR);
        assert!(matches!(cart.into_sell_lines(), Err(CartError::Empty)));
    }
}
