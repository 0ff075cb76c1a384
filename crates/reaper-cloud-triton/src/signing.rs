//! HTTP-signature request signing
//!
//! CloudAPI authenticates every request with an `Authorization: Signature`
//! header computed over the `Date` header. The account key is an ed25519
//! seed stored hex-encoded in the key file.

use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// `strftime` form of an RFC 1123 date in GMT
pub const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Algorithm name advertised in the signature header
pub const SIGNATURE_ALGORITHM: &str = "ed25519";

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("Failed to read key file {path}: {source}")]
    ReadKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid hex in key: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// Signs CloudAPI requests on behalf of one account key
pub struct RequestSigner {
    key_id: String,
    signing_key: SigningKey,
}

impl RequestSigner {
    /// Load the key seed from `path`
    pub fn from_key_file(account: &str, key_id: &str, path: &Path) -> Result<Self, SigningError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SigningError::ReadKey {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_hex(account, key_id, &contents)
    }

    /// Build from a hex-encoded 32-byte seed; surrounding whitespace is ignored
    pub fn from_hex(account: &str, key_id: &str, hex_str: &str) -> Result<Self, SigningError> {
        let bytes = hex::decode(hex_str.trim())?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SigningError::InvalidLength(bytes.len()))?;

        Ok(Self::from_signing_key(
            account,
            key_id,
            SigningKey::from_bytes(&seed),
        ))
    }

    pub fn from_signing_key(account: &str, key_id: &str, signing_key: SigningKey) -> Self {
        Self {
            key_id: format!("/{}/keys/{}", account, key_id),
            signing_key,
        }
    }

    /// Full key id as sent to CloudAPI, `/{account}/keys/{key_id}`
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// `Authorization` header value for a request carrying `Date: {date}`
    pub fn sign_date(&self, date: &str) -> String {
        let signature = self.signing_key.sign(signing_string(date).as_bytes());
        let encoded = base64::engine::general_purpose::STANDARD.encode(signature.to_bytes());

        format!(
            "Signature keyId=\"{}\",algorithm=\"{}\",signature=\"{}\"",
            self.key_id, SIGNATURE_ALGORITHM, encoded
        )
    }
}

/// The exact bytes covered by the signature
pub fn signing_string(date: &str) -> String {
    format!("date: {}", date)
}

/// Format a `Date` header value
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}
