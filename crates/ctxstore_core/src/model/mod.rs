//! Record, query and mapping model.
//!
//! # Responsibility
//! - Define the canonical stored record shape and its typed fields.
//! - Define fetch requests passed through to store backends.
//! - Define the domain mapping contract (`Representable`).
//!
//! # Invariants
//! - Every stored record is identified by a stable `(entity, id)` key.
//! - Domain values are copies; they never hold references into a store.

pub mod change_set;
pub mod query;
pub mod record;
pub mod representable;
