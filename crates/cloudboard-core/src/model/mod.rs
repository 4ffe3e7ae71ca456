//! Data model
//!
//! Accounts, features and identity artifacts exchanged between the adapters
//! and the reconciliation engine.

mod artifact;
mod cloud;
mod feature;

// Re-exports
pub use artifact::*;
pub use cloud::*;
pub use feature::*;
