//! Pre-segwit signature hash
//!
//! The legacy preimage is the full transaction with every scriptSig
//! blanked except the signed input's, which carries the scriptPubKey
//! of the output it spends. Built incrementally as inputs and outputs
//! stream past, one builder instance per signed input.

use crate::types::{SignRequest, TxHash, TxInput};
use crate::writers::{self, TxHasher};

pub struct LegacyPreimage {
    h: TxHasher,
}

impl LegacyPreimage {
    pub fn new(tx: &SignRequest) -> Self {
        let mut h = TxHasher::sha256();
        writers::write_tx_header(&mut h, tx.version, tx.timestamp, None, false, tx.inputs_count as usize);
        Self { h }
    }

    /// Add one input. `script` is the spent scriptPubKey for the input
    /// being signed and empty for every other input.
    pub fn add_input(&mut self, txi: &TxInput, script: &[u8]) {
        writers::write_tx_input(&mut self.h, &txi.prev_hash, txi.prev_index, script, txi.sequence);
    }

    pub fn outputs_start(&mut self, outputs_count: u32) {
        writers::write_compact_size(&mut self.h, outputs_count as usize);
    }

    pub fn add_output(&mut self, amount: u64, script_pubkey: &[u8]) {
        writers::write_tx_output(&mut self.h, amount, script_pubkey);
    }

    pub fn finalize(mut self, lock_time: u32, hash_type: u32) -> TxHash {
        writers::write_u32(&mut self.h, lock_time);
        writers::write_u32(&mut self.h, hash_type);
        self.h.finalize(true)
    }
}
