//! Foundational data structures, error types, and selection types.

pub mod error;
pub mod models;
pub mod selection;
