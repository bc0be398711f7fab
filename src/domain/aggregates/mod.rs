//! Aggregates module
pub mod product;
pub mod order;
pub mod payment;
pub mod cart;

pub use product::{Product, ProductError, ProductStatus, Variant};
pub use order::{Order, OrderEdit, OrderError, SellLine};
pub use payment::{Payment, PaymentError, PaymentUpdate};
pub use cart::{Cart, CartAction, CartError, CartKey, CartLine, LineQuote, StockShortage};
