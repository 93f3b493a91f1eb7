//! Host wire protocol and device service traits
//!
//! The device is the requesting side: it asks the host for one record
//! at a time and blocks until the matching response arrives. There is
//! never more than one outstanding request. The typed helpers below
//! pair each request with the expected response variant and run the
//! field sanitizers before any data reaches the state machine.

use crate::coin::CoinProfile;
use crate::error::{SignResult, SignerError};
use crate::sanitize;
use crate::types::{
    PaymentRequest, PrevInput, PrevOutput, PrevTx, TxHash, TxInput, TxOutput,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// Wire vocabulary
// =============================================================================

/// Device-to-host request. `tx_hash` selects a previous transaction;
/// without it the request concerns the transaction under construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxRequest {
    TxInput { request_index: u32, tx_hash: Option<TxHash> },
    TxOutput { request_index: u32, tx_hash: Option<TxHash> },
    TxMeta { tx_hash: TxHash },
    TxExtraData { tx_hash: TxHash, offset: u32, len: u32 },
    TxOrigInput { request_index: u32, tx_hash: TxHash },
    TxOrigOutput { request_index: u32, tx_hash: TxHash },
    TxPaymentReq { request_index: u32 },
    TxFinished,
}

/// Host response, one variant per request kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxAck {
    Input(TxInput),
    Output(TxOutput),
    PrevMeta(PrevTx),
    PrevInput(PrevInput),
    PrevOutput(PrevOutput),
    ExtraData(Vec<u8>),
    PaymentRequest(PaymentRequest),
    Finished,
}

/// Synchronous request/response channel to the host
pub trait HostChannel {
    fn request(&mut self, req: TxRequest) -> SignResult<TxAck>;
}

fn unexpected_response() -> SignerError {
    SignerError::process_error("Unexpected response to transaction request")
}

/// Request an input of the transaction under construction
pub fn request_tx_input<H: HostChannel>(
    host: &mut H,
    coin: &CoinProfile,
    index: u32,
) -> SignResult<TxInput> {
    match host.request(TxRequest::TxInput { request_index: index, tx_hash: None })? {
        TxAck::Input(txi) => sanitize::sanitize_tx_input(txi, coin),
        _ => Err(unexpected_response()),
    }
}

/// Request an input of the original transaction being replaced
pub fn request_orig_input<H: HostChannel>(
    host: &mut H,
    coin: &CoinProfile,
    index: u32,
    tx_hash: TxHash,
) -> SignResult<TxInput> {
    match host.request(TxRequest::TxOrigInput { request_index: index, tx_hash })? {
        TxAck::Input(txi) => sanitize::sanitize_tx_input(txi, coin),
        _ => Err(unexpected_response()),
    }
}

/// Request an input of a previous transaction
pub fn request_prev_input<H: HostChannel>(
    host: &mut H,
    coin: &CoinProfile,
    index: u32,
    tx_hash: TxHash,
) -> SignResult<PrevInput> {
    match host.request(TxRequest::TxInput { request_index: index, tx_hash: Some(tx_hash) })? {
        TxAck::PrevInput(txi) => sanitize::sanitize_prev_input(txi, coin),
        _ => Err(unexpected_response()),
    }
}

/// Request an output of the transaction under construction
pub fn request_tx_output<H: HostChannel>(
    host: &mut H,
    coin: &CoinProfile,
    index: u32,
) -> SignResult<TxOutput> {
    match host.request(TxRequest::TxOutput { request_index: index, tx_hash: None })? {
        TxAck::Output(txo) => sanitize::sanitize_tx_output(txo, coin),
        _ => Err(unexpected_response()),
    }
}

/// Request an output of the original transaction being replaced
pub fn request_orig_output<H: HostChannel>(
    host: &mut H,
    coin: &CoinProfile,
    index: u32,
    tx_hash: TxHash,
) -> SignResult<TxOutput> {
    match host.request(TxRequest::TxOrigOutput { request_index: index, tx_hash })? {
        TxAck::Output(txo) => sanitize::sanitize_tx_output(txo, coin),
        _ => Err(unexpected_response()),
    }
}

/// Request an output of a previous transaction
pub fn request_prev_output<H: HostChannel>(
    host: &mut H,
    _coin: &CoinProfile,
    index: u32,
    tx_hash: TxHash,
) -> SignResult<PrevOutput> {
    match host.request(TxRequest::TxOutput { request_index: index, tx_hash: Some(tx_hash) })? {
        TxAck::PrevOutput(txo) => Ok(txo),
        _ => Err(unexpected_response()),
    }
}

/// Request the metadata of a previous transaction
pub fn request_tx_meta<H: HostChannel>(
    host: &mut H,
    coin: &CoinProfile,
    tx_hash: TxHash,
) -> SignResult<PrevTx> {
    match host.request(TxRequest::TxMeta { tx_hash })? {
        TxAck::PrevMeta(tx) => sanitize::sanitize_tx_meta(tx, coin),
        _ => Err(unexpected_response()),
    }
}

/// Request a chunk of a previous transaction's trailing extra data
pub fn request_extra_data<H: HostChannel>(
    host: &mut H,
    tx_hash: TxHash,
    offset: u32,
    len: u32,
) -> SignResult<Vec<u8>> {
    match host.request(TxRequest::TxExtraData { tx_hash, offset, len })? {
        TxAck::ExtraData(chunk) => {
            if chunk.len() != len as usize {
                return Err(SignerError::data_error("Invalid extra data chunk size"));
            }
            Ok(chunk)
        }
        _ => Err(unexpected_response()),
    }
}

/// Request a payment request record
pub fn request_payment_req<H: HostChannel>(
    host: &mut H,
    index: u32,
) -> SignResult<PaymentRequest> {
    match host.request(TxRequest::TxPaymentReq { request_index: index })? {
        TxAck::PaymentRequest(req) => Ok(req),
        _ => Err(unexpected_response()),
    }
}

/// Signal protocol completion
pub fn request_tx_finish<H: HostChannel>(host: &mut H) -> SignResult<()> {
    match host.request(TxRequest::TxFinished)? {
        TxAck::Finished => Ok(()),
        _ => Err(unexpected_response()),
    }
}

// =============================================================================
// User confirmation
// =============================================================================

/// Typed confirmation prompts shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    /// Payable output: destination and amount
    ConfirmOutput { address: String, amount: u64 },
    /// OP_RETURN payload
    ConfirmOpReturn { data: Vec<u8> },
    /// Fee exceeds the coin's per-size threshold
    FeeOverThreshold { fee: u64 },
    /// Final confirmation: total spent and fee
    SignTx { spending: u64, fee: u64 },
    /// Input or change path outside the expected namespace
    UnknownDerivationPath { address_n: Vec<u32> },
    /// This transaction replaces an earlier one
    Replacement { description: String, txid: TxHash },
    /// Fee change of a replacement transaction
    ModifyFee { fee_delta: i64, new_fee: u64 },
    /// A replaced output's amount changed
    ModifyOutput { address: String, orig_amount: u64, new_amount: u64 },
    /// lock_time differs from the default
    NonDefaultLocktime { lock_time: u32, lock_time_disabled: bool },
    /// Host-supplied payment request covering several outputs
    PaymentRequest { recipient_name: String, amount: u64 },
    /// More change outputs than a wallet normally produces
    ChangeCountOverThreshold { change_count: u32 },
}

/// Display/confirmation service; out of scope for this crate beyond
/// the trait boundary
pub trait Confirmer {
    fn confirm(&mut self, prompt: &Prompt) -> bool;
}

/// Raise a prompt and convert a decline into a clean cancellation
pub fn confirm_or_cancel<C: Confirmer>(
    confirmer: &mut C,
    prompt: Prompt,
    decline_msg: &str,
) -> SignResult<()> {
    if confirmer.confirm(&prompt) {
        Ok(())
    } else {
        Err(SignerError::action_cancelled(decline_msg))
    }
}

// =============================================================================
// Key access
// =============================================================================

/// Key derivation and signing service. Key material never enters this
/// crate; only public keys and finished signatures cross the boundary.
pub trait KeyStore {
    /// Compressed (33-byte) public key for the path
    fn public_key(&self, address_n: &[u32]) -> SignResult<Vec<u8>>;

    /// DER-encoded ECDSA signature of the digest (without sighash byte)
    fn sign_ecdsa(&self, digest: &[u8; 32], address_n: &[u32]) -> SignResult<Vec<u8>>;

    /// 64-byte BIP-340 Schnorr signature of the digest
    fn sign_schnorr(&self, digest: &[u8; 32], address_n: &[u32]) -> SignResult<Vec<u8>>;
}
