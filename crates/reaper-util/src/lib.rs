//! Shared utilities for machine-reaper
//!
//! This crate provides:
//! - ID types (MachineId, RunId)
//! - UTC time and the CloudAPI timestamp format
//! - The pause used between mutating API calls
//! - Default config path

mod ids;
mod pace;
mod paths;
mod time;

pub use ids::*;
pub use pace::*;
pub use paths::*;
pub use time::*;
