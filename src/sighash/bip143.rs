//! BIP-143 signature hash (segwit v0 and forced-BIP-143 forks)

use super::TxDigests;
use crate::types::{SignRequest, TxHash, TxInput};
use crate::writers::{self, TxHasher};

/// Per-input preimage digest. `script_code` is the scriptCode of BIP-143:
/// the P2PKH script over the key hash for P2WPKH, the witness script for
/// P2WSH, or the spent scriptPubKey for forced-BIP-143 legacy inputs.
pub fn preimage_hash(
    digests: &TxDigests,
    tx: &SignRequest,
    txi: &TxInput,
    script_code: &[u8],
    hash_type: u32,
) -> TxHash {
    let mut h = TxHasher::sha256();
    writers::write_u32(&mut h, tx.version);
    h_write(&mut h, digests.h_prevouts.digest(true));
    h_write(&mut h, digests.h_sequences.digest(true));
    writers::write_bytes_reversed(&mut h, &txi.prev_hash);
    writers::write_u32(&mut h, txi.prev_index);
    writers::write_bytes_prefixed(&mut h, script_code);
    writers::write_u64(&mut h, txi.amount);
    writers::write_u32(&mut h, txi.sequence);
    h_write(&mut h, digests.h_outputs.digest(true));
    writers::write_u32(&mut h, tx.lock_time);
    writers::write_u32(&mut h, hash_type);
    h.finalize(true)
}

fn h_write(h: &mut TxHasher, digest: TxHash) {
    use crate::writers::WriteBytes;
    h.write(&digest);
}
