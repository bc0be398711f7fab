//! Domain layer: status model, totals arithmetic and the aggregates that
//! hold the order/payment invariants.

pub mod aggregates;
pub mod events;
pub mod status;
pub mod totals;
pub mod value_objects;
