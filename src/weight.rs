//! Transaction weight estimation
//!
//! Predicts the serialized weight of the finished transaction from the
//! streamed inputs and outputs, before any signature exists. The fee
//! threshold works on virtual size, so estimates use worst-case
//! signature lengths.

use crate::types::{InputScriptType, TxInput};

const TXSIZE_HEADER: u64 = 4;
const TXSIZE_FOOTER: u64 = 4;
/// Segwit marker and flag bytes
const TXSIZE_SEGWIT_OVERHEAD: u64 = 2;
/// Outpoint plus sequence
const TXSIZE_INPUT: u64 = 40;
/// Amount field of an output
const TXSIZE_OUTPUT: u64 = 8;
/// Maximum DER signature length including the hash-type byte
const TXSIZE_DER_SIGNATURE: u64 = 72;
const TXSIZE_SCHNORR_SIGNATURE: u64 = 64;
const TXSIZE_PUBKEY: u64 = 33;

fn compact_size_len(n: u64) -> u64 {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

fn push_len(n: u64) -> u64 {
    if n < 0x4c {
        1 + n
    } else if n <= 0xff {
        2 + n
    } else {
        3 + n
    }
}

pub struct TxWeightCalculator {
    /// Weight units; base bytes count four times, witness bytes once
    counter: u64,
    segwit_inputs: u32,
}

impl TxWeightCalculator {
    pub fn new(inputs_count: u32, outputs_count: u32) -> Self {
        let base = TXSIZE_HEADER
            + TXSIZE_FOOTER
            + compact_size_len(inputs_count as u64)
            + compact_size_len(outputs_count as u64);
        Self {
            counter: 4 * base,
            segwit_inputs: 0,
        }
    }

    pub fn add_input(&mut self, txi: &TxInput) {
        let multisig_n = txi
            .multisig
            .as_ref()
            .map(|ms| match &ms.key_source {
                crate::types::KeySource::Pubkeys(keys) => (ms.m as u64, keys.len() as u64),
                crate::types::KeySource::Xpubs(xpubs) => (ms.m as u64, xpubs.len() as u64),
            });

        // redeem/witness script of an m-of-n multisig
        let multisig_script_len = multisig_n
            .map(|(_, n)| 3 + n * (1 + TXSIZE_PUBKEY));
        // OP_0 plus m signatures plus the script push
        let multisig_stack_len = multisig_n
            .map(|(m, _)| 1 + m * (1 + TXSIZE_DER_SIGNATURE))
            .unwrap_or(0);

        match txi.script_type {
            InputScriptType::SpendAddress => {
                let script_sig = match multisig_script_len {
                    None => (1 + TXSIZE_DER_SIGNATURE) + (1 + TXSIZE_PUBKEY),
                    Some(script) => multisig_stack_len + push_len(script),
                };
                self.counter += 4 * (TXSIZE_INPUT + compact_size_len(script_sig) + script_sig);
            }
            InputScriptType::SpendMultisig => {
                let script = multisig_script_len.unwrap_or(3 + 2 * (1 + TXSIZE_PUBKEY));
                let script_sig = multisig_stack_len.max(1 + (1 + TXSIZE_DER_SIGNATURE))
                    + push_len(script);
                self.counter += 4 * (TXSIZE_INPUT + compact_size_len(script_sig) + script_sig);
            }
            InputScriptType::SpendWitness | InputScriptType::SpendP2shWitness => {
                self.segwit_inputs += 1;
                // P2SH wrapping pushes the witness program into script_sig
                let script_sig: u64 = match txi.script_type {
                    InputScriptType::SpendP2shWitness => {
                        if multisig_n.is_some() { 1 + 34 } else { 1 + 22 }
                    }
                    _ => 0,
                };
                self.counter += 4 * (TXSIZE_INPUT + compact_size_len(script_sig) + script_sig);
                let witness = match multisig_script_len {
                    None => 1 + (1 + TXSIZE_DER_SIGNATURE) + (1 + TXSIZE_PUBKEY),
                    Some(script) => 1 + 1 + multisig_n.map(|(m, _)| m).unwrap_or(1) * (1 + TXSIZE_DER_SIGNATURE) + push_len(script),
                };
                self.counter += witness;
            }
            InputScriptType::SpendTaproot => {
                self.segwit_inputs += 1;
                self.counter += 4 * (TXSIZE_INPUT + 1);
                self.counter += 1 + 1 + TXSIZE_SCHNORR_SIGNATURE;
            }
            InputScriptType::External => {
                let script_sig = txi.script_sig.as_ref().map_or(0, |s| s.len() as u64);
                self.counter += 4 * (TXSIZE_INPUT + compact_size_len(script_sig) + script_sig);
                if let Some(witness) = &txi.witness {
                    if !witness.is_empty() {
                        self.segwit_inputs += 1;
                        self.counter += witness.len() as u64;
                    }
                }
            }
        }
    }

    pub fn add_output(&mut self, script_pubkey_len: usize) {
        let len = script_pubkey_len as u64;
        self.counter += 4 * (TXSIZE_OUTPUT + compact_size_len(len) + len);
    }

    pub fn weight(&self) -> u64 {
        if self.segwit_inputs > 0 {
            self.counter + 4 * TXSIZE_SEGWIT_OVERHEAD
        } else {
            self.counter
        }
    }

    /// Virtual size in bytes, rounded up
    pub fn vsize(&self) -> u64 {
        (self.weight() + 3) / 4
    }
}
