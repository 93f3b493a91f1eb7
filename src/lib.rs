//! Coldsign Core Library
//!
//! Device-side implementation of the multi-pass transaction-signing
//! protocol for Bitcoin-family coins (Bitcoin, Bcash, Decred, Zcash).
//!
//! # Architecture
//!
//! This crate provides:
//! - **signer**: The multi-pass signing state machine and entry point
//! - **host**: Wire vocabulary plus the `HostChannel`, `Confirmer` and
//!   `KeyStore` service traits the embedder implements
//! - **prevtx**: Streaming verification of previous transactions
//! - **replacement**: Fee-bump / PayJoin reconciliation against
//!   already-signed originals
//! - **approver**: Fee policy, spend totals and user confirmation
//! - **sighash**: Legacy, BIP-143, BIP-341, ZIP-243 and Decred digests
//! - **scripts**: Script assembly and address decoding
//!
//! # Security
//!
//! The host is untrusted. Input amounts are corroborated against
//! hash-verified previous transactions, every record is digest-checked
//! across streaming passes, and no signature is produced before every
//! approval and verification step has passed. Key material never enters
//! this crate; it stays behind the `KeyStore` trait.
//!
//! # Example
//!
//! ```rust,ignore
//! use coldsign::{sign_tx, SessionConfig};
//! use coldsign::coin::CoinProfile;
//!
//! let config = SessionConfig::new(CoinProfile::bitcoin());
//! let signed = sign_tx(request, config, &mut host, &mut ui, &keystore)?;
//! println!("raw tx: {}", hex::encode(signed.serialized_tx));
//! ```

pub mod approver;
pub mod coin;
pub mod collector;
pub mod config;
pub mod error;
pub mod host;
pub mod keychain;
pub mod logging;
pub mod multisig;
pub mod ownership;
pub mod paymentreq;
pub mod prevtx;
pub mod replacement;
pub mod sanitize;
pub mod scripts;
pub mod serializer;
pub mod sighash;
pub mod signer;
pub mod types;
pub mod verification;
pub mod weight;
pub mod writers;

// Re-export key types for convenience
pub use config::{SafetyLevel, SessionConfig};
pub use error::{ErrorCode, SignResult, SignerError};
pub use host::{Confirmer, HostChannel, KeyStore, Prompt, TxAck, TxRequest};
pub use signer::{sign_tx, SessionState, SignedTx};
pub use types::*;
