//! Joyent/Triton CloudAPI implementation of the cloud gateway
//!
//! This crate provides:
//! - HTTP-signature request signing with an ed25519 account key
//! - A `reqwest` client for the machine and tag endpoints
//! - Delivery of deferred deletion requests to a notification webhook

mod client;
mod notify;
mod signing;

pub use client::*;
pub use notify::*;
pub use signing::*;

use thiserror::Error;

/// Errors building the gateway
#[derive(Debug, Error)]
pub enum TritonError {
    #[error("Invalid sdc_url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Signing key error: {0}")]
    Signing(#[from] SigningError),

    #[error("Failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
