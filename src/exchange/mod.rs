//! Exchange negotiation
//!
//! Two users swap one toy each. Every side confirms twice (or fails) and the
//! exchange status follows from both sides.

mod engine;
mod status;

pub use engine::ExchangeEngine;
