//! Cloud gateway interfaces for machine-reaper
//!
//! This crate defines the contract between the retirement engine and the
//! provider API: the machine model, the gateway trait, and an in-memory mock
//! gateway for tests. It contains no transport code itself.

mod machine;
mod mock;
mod traits;

pub use machine::*;
pub use mock::*;
pub use traits::*;
