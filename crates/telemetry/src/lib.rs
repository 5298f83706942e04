//! Cost accounting for Switchyard.
//!
//! Holds the per-provider, per-million-token pricing table the gateway uses
//! to turn token counts into a cost when it finalizes a completion.

pub mod pricing;

pub use pricing::PricingTable;
pub use switchyard_core::ModelPricing;
