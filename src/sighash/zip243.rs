//! ZIP-243 signature hash (Zcash Overwinter/Sapling v4)
//!
//! BLAKE2b-256 with the consensus branch id baked into the hash
//! personalization, so signatures cannot replay across network
//! upgrades. Shielded fields are absent from transparent-only
//! transactions and hash as zero.

use super::TxDigests;
use crate::error::{SignResult, SignerError};
use crate::types::{SignRequest, TxHash, TxInput};
use crate::writers::{self, TxHasher, WriteBytes};

const OVERWINTER_FLAG: u32 = 1 << 31;
const EMPTY_HASH: [u8; 32] = [0u8; 32];

pub fn preimage_hash(
    digests: &TxDigests,
    tx: &SignRequest,
    txi: &TxInput,
    script_code: &[u8],
    hash_type: u32,
) -> SignResult<TxHash> {
    let branch_id = tx
        .branch_id
        .ok_or_else(|| SignerError::data_error("Branch ID must be set."))?;
    let version_group_id = tx
        .version_group_id
        .ok_or_else(|| SignerError::data_error("Version group ID must be set."))?;
    let expiry = tx
        .expiry
        .ok_or_else(|| SignerError::data_error("Expiry not provided"))?;

    let mut personal = [0u8; 16];
    personal[..12].copy_from_slice(b"ZcashSigHash");
    personal[12..].copy_from_slice(&branch_id.to_le_bytes());

    let mut h = TxHasher::blake2b_personal(&personal);
    writers::write_u32(&mut h, tx.version | OVERWINTER_FLAG);
    writers::write_u32(&mut h, version_group_id);
    h.write(&digests.h_prevouts.digest(false));
    h.write(&digests.h_sequences.digest(false));
    h.write(&digests.h_outputs.digest(false));
    h.write(&EMPTY_HASH); // hashJoinSplits
    h.write(&EMPTY_HASH); // hashShieldedSpends
    h.write(&EMPTY_HASH); // hashShieldedOutputs
    writers::write_u32(&mut h, tx.lock_time);
    writers::write_u32(&mut h, expiry);
    writers::write_u64(&mut h, 0); // valueBalance
    writers::write_u32(&mut h, hash_type);
    writers::write_bytes_reversed(&mut h, &txi.prev_hash);
    writers::write_u32(&mut h, txi.prev_index);
    writers::write_bytes_prefixed(&mut h, script_code);
    writers::write_u64(&mut h, txi.amount);
    writers::write_u32(&mut h, txi.sequence);
    Ok(h.finalize(false))
}
