//! # Registry
//!
//! Lookup of the per-entity operations batches execute.

pub mod batch_handler_registry;

pub use batch_handler_registry::{BatchJobHandler, HandlerRegistry};
