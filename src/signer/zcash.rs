//! Zcash signing variant
//!
//! Sapling v4 transactions keep the shared streaming flow but swap
//! the digest scheme for ZIP-243 and constrain the accepted
//! transaction versions. Because ZIP-243 commits to the spent amount,
//! legacy-style full-transaction re-hashing is never needed.

use crate::error::{SignResult, SignerError};
use crate::sighash::{self, TxDigests};
use crate::types::{SignRequest, TxHash, TxInput};

/// Sapling v4 is the only format in scope; v3 (Overwinter) digests
/// under ZIP-143 and v5 (NU5) uses a different digest tree entirely
pub fn check_version(tx: &SignRequest) -> SignResult<()> {
    match tx.version {
        4 => Ok(()),
        _ => Err(SignerError::data_error("Unsupported transaction version")),
    }
}

/// Per-input signature digest
pub fn signature_digest(
    digests: &TxDigests,
    tx: &SignRequest,
    txi: &TxInput,
    script_code: &[u8],
) -> SignResult<TxHash> {
    sighash::zip243::preimage_hash(digests, tx, txi, script_code, sighash::SIGHASH_ALL)
}
