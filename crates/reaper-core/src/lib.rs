//! Retirement engine for machine-reaper
//!
//! This crate is the decision core:
//! - Age/tag/state policy over the account's machines
//! - Direct deletion state machine (Running -> Stopping -> Stopped -> Deleting -> Deleted)
//! - Deferred deletion of machines stuck mid-transition, batched into one request
//! - A per-run report of what happened to every machine

mod deletion;
mod engine;
mod error;
mod events;

pub use deletion::*;
pub use engine::*;
pub use error::*;
pub use events::*;
