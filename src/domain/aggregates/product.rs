//! Product Aggregate

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::value_objects::{Money, Quantity, Sku};

/// A sellable product. Pricing and stock live either on the product itself or
/// on a concrete color/size variant; carts always quote from whichever source
/// the shopper picked.
#[derive(Clone, Debug)]
pub struct Product {
    id: Uuid,
    sku: Sku,
    name: String,
    sale_price: Money,
    stock: Quantity,
    status: ProductStatus,
    variants: Vec<Variant>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// A color/size combination with its own price and stock.
#[derive(Clone, Debug)]
pub struct Variant {
    pub color_id: Option<Uuid>,
    pub size_id: Option<Uuid>,
    pub sku: Option<Sku>,
    pub price: Money,
    pub stock: Quantity,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ProductStatus { #[default] Draft, Active, Archived }

impl Product {
    pub fn create(sku: Sku, name: impl Into<String>, sale_price: Money) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), sku, name: name.into(), sale_price,
            stock: Quantity::default(), status: ProductStatus::Draft,
            variants: vec![], created_at: now, updated_at: now,
        }
    }

    /// Rehydrates a persisted product with its stored identity.
    pub fn restore(
        id: Uuid,
        sku: Sku,
        name: impl Into<String>,
        sale_price: Money,
        stock: Quantity,
        variants: Vec<Variant>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id, sku, name: name.into(), sale_price, stock,
            status: ProductStatus::Active, variants, created_at, updated_at,
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn sku(&self) -> &Sku { &self.sku }
    pub fn name(&self) -> &str { &self.name }
    pub fn sale_price(&self) -> &Money { &self.sale_price }
    pub fn stock(&self) -> Quantity { self.stock }
    pub fn status(&self) -> &ProductStatus { &self.status }
    pub fn variants(&self) -> &[Variant] { &self.variants }
    pub fn is_in_stock(&self) -> bool { !self.stock.is_zero() }

    pub fn publish(&mut self) -> Result<(), ProductError> {
        if self.name.is_empty() { return Err(ProductError::MissingName); }
        self.status = ProductStatus::Active;
        self.touch();
        Ok(())
    }

    pub fn archive(&mut self) { self.status = ProductStatus::Archived; self.touch(); }

    pub fn update_price(&mut self, new_price: Money) {
        self.sale_price = new_price;
        self.touch();
    }

    pub fn add_variant(&mut self, variant: Variant) {
        self.variants.push(variant);
        self.touch();
    }

    /// The variant matching a shopper's color/size pick, if any.
    pub fn variant(&self, color_id: Option<Uuid>, size_id: Option<Uuid>) -> Option<&Variant> {
        self.variants.iter().find(|v| v.color_id == color_id && v.size_id == size_id)
    }

    pub fn add_stock(&mut self, qty: u32) {
        self.stock = self.stock.add(qty);
        self.touch();
    }

    pub fn remove_stock(&mut self, qty: u32) -> Result<(), ProductError> {
        self.stock = self.stock.subtract(qty).ok_or(ProductError::InsufficientStock)?;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProductError {
    #[error("product name is required")]
    MissingName,
    #[error("insufficient stock")]
    InsufficientStock,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_product_create() {
        let p = Product::create(Sku::new("TEST-001").unwrap(), "Test Product", Money::new(Decimal::new(1999, 2), "XOF"));
        assert_eq!(p.name(), "Test Product");
        assert_eq!(p.status(), &ProductStatus::Draft);
    }

    #[test]
    fn test_stock() {
        let mut p = Product::create(Sku::new("TEST").unwrap(), "P", Money::new(Decimal::new(10, 0), "XOF"));
        p.add_stock(10);
        assert!(p.is_in_stock());
        p.remove_stock(5).unwrap();
        assert_eq!(p.stock().value(), 5);
        assert!(p.remove_stock(6).is_err());
    }

    #[test]
    fn variant_lookup_by_color_and_size() {
        let mut p = Product::create(Sku::new("TEE").unwrap(), "Tee", Money::new(Decimal::new(15, 0), "XOF"));
        let color = Uuid::now_v7();
        let size = Uuid::now_v7();
        p.add_variant(Variant {
            color_id: Some(color), size_id: Some(size), sku: None,
            price: Money::new(Decimal::new(18, 0), "XOF"), stock: Quantity::new(3),
        });
        assert!(p.variant(Some(color), Some(size)).is_some());
        assert!(p.variant(Some(color), None).is_none());
        assert!(p.variant(None, None).is_none());
    }
}
