//! Decred signature hash
//!
//! BLAKE-256 over two serializations: the witness-free prefix, shared
//! by every input, and a per-input witness serialization carrying the
//! signed input's script. The final digest binds both together with
//! the hash type.

use super::SIGHASH_ALL;
use crate::types::{PrevOutput, SignRequest, TxHash, TxInput};
use crate::writers::{self, TxHasher, WriteBytes};

const SERIALIZE_NO_WITNESS: u32 = 1 << 16;
const SERIALIZE_WITNESS_SIGNING: u32 = 3 << 16;

/// Witness-free half of the transaction, built once across the
/// streaming passes
pub struct PrefixHasher {
    h: TxHasher,
}

impl PrefixHasher {
    pub fn new(tx: &SignRequest) -> Self {
        let mut h = TxHasher::blake256();
        writers::write_u32(&mut h, tx.version | SERIALIZE_NO_WITNESS);
        writers::write_compact_size(&mut h, tx.inputs_count as usize);
        Self { h }
    }

    pub fn add_input(&mut self, txi: &TxInput) {
        writers::write_tx_input_decred(
            &mut self.h,
            &txi.prev_hash,
            txi.prev_index,
            txi.decred_tree.unwrap_or(0),
            txi.sequence,
        );
    }

    pub fn outputs_start(&mut self, outputs_count: u32) {
        writers::write_compact_size(&mut self.h, outputs_count as usize);
    }

    pub fn add_output(&mut self, txo: &PrevOutput) {
        writers::write_prev_output(&mut self.h, txo, true);
    }

    pub fn finalize(mut self, tx: &SignRequest) -> TxHash {
        writers::write_u32(&mut self.h, tx.lock_time);
        writers::write_u32(&mut self.h, tx.expiry.unwrap_or(0));
        self.h.finalize(false)
    }
}

/// Witness serialization for signing: the signed input carries its
/// script, every other slot is empty
pub fn witness_hash(tx: &SignRequest, signed_index: usize, script: &[u8]) -> TxHash {
    let mut h = TxHasher::blake256();
    writers::write_u32(&mut h, tx.version | SERIALIZE_WITNESS_SIGNING);
    writers::write_compact_size(&mut h, tx.inputs_count as usize);
    for i in 0..tx.inputs_count as usize {
        if i == signed_index {
            writers::write_bytes_prefixed(&mut h, script);
        } else {
            writers::write_compact_size(&mut h, 0);
        }
    }
    h.finalize(false)
}

pub fn signature_hash(prefix_hash: &TxHash, witness_hash: &TxHash) -> TxHash {
    let mut h = TxHasher::blake256();
    writers::write_u32(&mut h, SIGHASH_ALL);
    h.write(prefix_hash);
    h.write(witness_hash);
    h.finalize(false)
}
