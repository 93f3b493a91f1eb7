//! Unified error types for the signing protocol
//!
//! All failures flow through this module. Every error terminates the
//! signing session; nothing is retried by the device.

use serde::{Deserialize, Serialize};

/// Main error type for all signing operations
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("[{:?}] {}{}", .code, .message, details_suffix(.details))]
pub struct SignerError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

fn details_suffix(details: &Option<String>) -> String {
    match details {
        Some(d) => format!(" ({})", d),
        None => String::new(),
    }
}

impl SignerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors

    /// Malformed or invalid host-supplied data. Not retryable.
    pub fn data_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::DataError, msg)
    }

    /// Protocol-sequencing violation, including host mutation of
    /// previously approved data. Not retryable.
    pub fn process_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProcessError, msg)
    }

    /// Output total exceeds the verified input total.
    pub fn not_enough_funds(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotEnoughFunds, msg)
    }

    /// The user declined a confirmation prompt. Soft failure; the
    /// session is discarded cleanly without emitting any signature.
    pub fn action_cancelled(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ActionCancelled, msg)
    }

    pub fn is_user_declined(&self) -> bool {
        self.code == ErrorCode::ActionCancelled
    }
}

/// Error codes for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed/invalid input data (bad prev hash, invalid signature,
    /// forbidden key path, multisig mismatch, disabled coin field)
    DataError,
    /// Protocol-sequencing violation (transaction mutated mid-session)
    ProcessError,
    /// Policy rejection: total_out exceeds verified total_in
    NotEnoughFunds,
    /// User declined a confirmation prompt
    ActionCancelled,
}

/// Result type alias for signing operations
pub type SignResult<T> = Result<T, SignerError>;

impl From<hex::FromHexError> for SignerError {
    fn from(e: hex::FromHexError) -> Self {
        SignerError::data_error(e.to_string())
    }
}

impl From<bitcoin::bip32::Error> for SignerError {
    fn from(e: bitcoin::bip32::Error) -> Self {
        SignerError::data_error(format!("BIP32 error: {}", e))
    }
}

impl From<secp256k1::Error> for SignerError {
    fn from(e: secp256k1::Error) -> Self {
        SignerError::data_error(format!("Secp256k1 error: {}", e))
    }
}
