//! autopost domain crate
//!
//! This crate contains the core domain logic following hexagonal architecture:
//! - `model`: Domain entities and value objects
//! - `ports`: Trait definitions for external dependencies (adapters)
//! - `usecases`: Gate, resolver, queue and the two driver loops
//! - `limits`: Channel length caps and truncation

pub mod limits;
pub mod model;
pub mod ports;
pub mod usecases;

pub use model::*;
pub use ports::*;
