//! Accumulated knowledge about a transaction under construction
//!
//! `TxInfo` is fed one record at a time as the streaming passes run.
//! It tracks the wallet root shared by the internal inputs, the
//! multisig key-set fingerprint, and a control digest over everything
//! the host could mutate between passes. The same accumulator serves
//! the transaction being signed and any original transaction being
//! replaced.

use crate::error::{SignResult, SignerError};
use crate::keychain;
use crate::multisig;
use crate::types::{SignRequest, TxHash, TxInput, TxOutput, SEQUENCE_FINAL};
use crate::writers::{self, TxHasher};

/// Running agreement over a value observed across records: unset until
/// the first observation, poisoned forever on the first mismatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Agreement<T> {
    Unset,
    Value(T),
    Mismatch,
}

impl<T: PartialEq> Agreement<T> {
    pub fn add(&mut self, value: T) {
        match self {
            Self::Unset => *self = Self::Value(value),
            Self::Value(current) if *current == value => {}
            _ => *self = Self::Mismatch,
        }
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

pub struct TxInfo {
    pub tx: SignRequest,
    /// Wallet root shared by all internal inputs
    pub wallet_path: Agreement<Vec<u32>>,
    /// Key-set identity shared by all internal inputs (None for
    /// single-sig inputs)
    pub multisig_fingerprint: Agreement<Option<[u8; 32]>>,
    pub min_sequence: u32,
    /// Control digest over every mutable field of every record
    h_tx_check: TxHasher,
}

impl TxInfo {
    pub fn new(tx: SignRequest) -> Self {
        Self {
            tx,
            wallet_path: Agreement::Unset,
            multisig_fingerprint: Agreement::Unset,
            min_sequence: SEQUENCE_FINAL,
            h_tx_check: TxHasher::sha256(),
        }
    }

    pub fn add_input(&mut self, txi: &TxInput) -> SignResult<()> {
        if !txi.is_external() {
            self.wallet_path
                .add(keychain::wallet_path(&txi.address_n).to_vec());
            let fp = match &txi.multisig {
                Some(ms) => Some(multisig::fingerprint(ms)?),
                None => None,
            };
            self.multisig_fingerprint.add(fp);
        }
        self.min_sequence = self.min_sequence.min(txi.sequence);
        writers::write_tx_input_check(&mut self.h_tx_check, txi);
        Ok(())
    }

    pub fn add_output(&mut self, txo: &TxOutput, script_pubkey: &[u8]) {
        writers::write_u64(&mut self.h_tx_check, txo.amount);
        writers::write_bytes_prefixed(&mut self.h_tx_check, script_pubkey);
        writers::write_u32(&mut self.h_tx_check, txo.address_n.len() as u32);
        for n in &txo.address_n {
            writers::write_u32(&mut self.h_tx_check, *n);
        }
    }

    /// Digest of everything collected so far; equal digests across
    /// passes prove the host streamed identical records.
    pub fn hash_check(&self) -> TxHash {
        self.h_tx_check.digest(false)
    }

    /// Whether lock_time can take effect at all
    pub fn lock_time_disabled(&self) -> bool {
        self.min_sequence == SEQUENCE_FINAL
    }

    /// Change heuristic over everything learned from the inputs
    pub fn output_is_change(&self, txo: &TxOutput) -> bool {
        if txo.multisig.is_some() || self.multisig_fingerprint.get().map_or(false, |fp| fp.is_some())
        {
            let fp = match self.multisig_fingerprint.get() {
                Some(Some(fp)) => Some(fp),
                _ => return false,
            };
            if !keychain::multisig_matches(txo.multisig.as_ref(), fp) {
                return false;
            }
        }
        keychain::output_is_change(txo, self.wallet_path.get().map(|p| p.as_slice()))
    }

    /// Cross-pass consistency check against a fresh accumulation of the
    /// same records
    pub fn check_unchanged(&self, other_digest: TxHash) -> SignResult<()> {
        if self.hash_check() != other_digest {
            return Err(SignerError::process_error(
                "Transaction has changed during signing",
            ));
        }
        Ok(())
    }
}
