//! Public service facade.
//!
//! # Responsibility
//! - Compose contexts, mapping and store into typed use-case operations.
//! - Keep callers decoupled from queues, contexts and backends.

pub mod error;
pub mod record_service;
