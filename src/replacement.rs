//! Original-transaction reconciliation for replacement signing
//!
//! A replacement (fee bump, RBF, PayJoin) references inputs and
//! outputs of an already-signed original by `orig_hash`/`orig_index`.
//! The original is streamed alongside the new transaction, its records
//! must appear in order with none removed, its txid is recomputed from
//! the streamed bytes, and one of its signed inputs is later verified
//! cryptographically. Fee deltas are re-derived here from the
//! accumulated amounts, never taken from the host.

use crate::coin::CoinProfile;
use crate::collector::TxInfo;
use crate::error::{SignResult, SignerError};
use crate::host::{self, HostChannel};
use crate::sighash::TxDigests;
use crate::types::{SignRequest, TxHash, TxInput, TxOutput};
use crate::writers::{self, TxHasher};

#[derive(PartialEq)]
enum Phase {
    Inputs,
    Outputs,
    Done,
}

pub struct OriginalTx {
    pub orig_hash: TxHash,
    pub info: TxInfo,
    /// Digest accumulators for verifying one of the original's
    /// signatures
    pub sig_digests: TxDigests,
    pub total_in: u64,
    pub total_out: u64,
    /// Sum of the original's change outputs
    pub change_out: u64,
    /// First signed input, held back for signature verification
    pub verification_input: Option<(u32, TxInput)>,
    /// Witness-free serialization for recomputing the txid
    h_tx: TxHasher,
    next_input: u32,
    next_output: u32,
    phase: Phase,
}

impl OriginalTx {
    /// Fetch the original's metadata and start its running digests
    pub fn fetch<H: HostChannel>(
        host: &mut H,
        coin: &CoinProfile,
        orig_hash: TxHash,
    ) -> SignResult<Self> {
        let meta = host::request_tx_meta(host, coin, orig_hash)?;
        let tx = SignRequest {
            version: meta.version,
            lock_time: meta.lock_time,
            inputs_count: meta.inputs_count,
            outputs_count: meta.outputs_count,
            expiry: meta.expiry,
            timestamp: meta.timestamp,
            version_group_id: meta.version_group_id,
            branch_id: meta.branch_id,
        };

        let mut h_tx = TxHasher::sha256();
        writers::write_tx_header(
            &mut h_tx,
            tx.version,
            tx.timestamp,
            tx.version_group_id,
            coin.overwintered,
            tx.inputs_count as usize,
        );

        Ok(Self {
            orig_hash,
            sig_digests: TxDigests::new(coin),
            info: TxInfo::new(tx),
            total_in: 0,
            total_out: 0,
            change_out: 0,
            verification_input: None,
            h_tx,
            next_input: 0,
            next_output: 0,
            phase: Phase::Inputs,
        })
    }

    /// Process the original input a new input claims to replace. The
    /// new input must match the original exactly; originals must be
    /// referenced in order and completely.
    pub fn process_input<H: HostChannel>(
        &mut self,
        host: &mut H,
        coin: &CoinProfile,
        txi: &TxInput,
        script_pubkey: &[u8],
    ) -> SignResult<()> {
        let orig_index = txi
            .orig_index
            .ok_or_else(|| SignerError::process_error("Missing original input index"))?;
        if self.phase != Phase::Inputs {
            return Err(SignerError::process_error(
                "Rearranging or removal of original inputs is not supported.",
            ));
        }
        if orig_index >= self.info.tx.inputs_count {
            return Err(SignerError::process_error(
                "Not enough inputs in original transaction.",
            ));
        }
        if orig_index != self.next_input {
            return Err(SignerError::process_error(
                "Rearranging or removal of original inputs is not supported.",
            ));
        }

        let orig_txi = host::request_orig_input(host, coin, orig_index, self.orig_hash)?;
        if orig_txi.prev_hash != txi.prev_hash
            || orig_txi.prev_index != txi.prev_index
            || orig_txi.amount != txi.amount
            || orig_txi.script_type != txi.script_type
            || orig_txi.address_n != txi.address_n
        {
            return Err(SignerError::process_error(
                "Original input does not match current input.",
            ));
        }

        writers::write_tx_input(
            &mut self.h_tx,
            &orig_txi.prev_hash,
            orig_txi.prev_index,
            orig_txi.script_sig.as_deref().unwrap_or(&[]),
            orig_txi.sequence,
        );
        self.sig_digests.add_input(&orig_txi, script_pubkey);
        self.info.add_input(&orig_txi)?;
        self.total_in = self
            .total_in
            .checked_add(orig_txi.amount)
            .ok_or_else(|| SignerError::data_error("Total input amount overflow"))?;

        let signed = orig_txi.script_sig.as_deref().map_or(false, |s| !s.is_empty())
            || orig_txi.witness.as_deref().map_or(false, |w| !w.is_empty() && w[0] != 0);
        if signed && self.verification_input.is_none() {
            self.verification_input = Some((orig_index, orig_txi));
        }

        self.next_input += 1;
        Ok(())
    }

    /// Fetch the original output a new output claims to replace
    pub fn fetch_output<H: HostChannel>(
        &mut self,
        host: &mut H,
        coin: &CoinProfile,
        orig_index: u32,
    ) -> SignResult<TxOutput> {
        if self.phase == Phase::Inputs {
            self.begin_outputs()?;
        }
        if self.phase != Phase::Outputs {
            return Err(SignerError::process_error(
                "Rearranging or removal of original outputs is not supported.",
            ));
        }
        if orig_index >= self.info.tx.outputs_count {
            return Err(SignerError::process_error(
                "Not enough outputs in original transaction.",
            ));
        }
        if orig_index != self.next_output {
            return Err(SignerError::process_error(
                "Rearranging or removal of original outputs is not supported.",
            ));
        }
        host::request_orig_output(host, coin, orig_index, self.orig_hash)
    }

    /// Record a fetched original output with its derived scriptPubKey
    pub fn record_output(&mut self, orig_txo: &TxOutput, script_pubkey: &[u8]) -> SignResult<()> {
        writers::write_tx_output(&mut self.h_tx, orig_txo.amount, script_pubkey);
        self.sig_digests.add_output(orig_txo.amount, script_pubkey);
        self.info.add_output(orig_txo, script_pubkey);
        self.total_out = self
            .total_out
            .checked_add(orig_txo.amount)
            .ok_or_else(|| SignerError::data_error("Total output amount overflow"))?;
        if self.info.output_is_change(orig_txo) {
            self.change_out += orig_txo.amount;
        }
        self.next_output += 1;
        Ok(())
    }

    fn begin_outputs(&mut self) -> SignResult<()> {
        if self.next_input != self.info.tx.inputs_count {
            return Err(SignerError::process_error(
                "Rearranging or removal of original inputs is not supported.",
            ));
        }
        writers::write_compact_size(&mut self.h_tx, self.info.tx.outputs_count as usize);
        self.phase = Phase::Outputs;
        Ok(())
    }

    /// Every original record must have been consumed; the recomputed
    /// txid must match the claimed orig_hash.
    pub fn finalize(&mut self, coin: &CoinProfile) -> SignResult<()> {
        if self.phase == Phase::Inputs {
            self.begin_outputs()?;
        }
        if self.next_output != self.info.tx.outputs_count {
            return Err(SignerError::process_error(
                "Rearranging or removal of original outputs is not supported.",
            ));
        }
        writers::write_u32(&mut self.h_tx, self.info.tx.lock_time);
        if coin.has_expiry() {
            writers::write_u32(&mut self.h_tx, self.info.tx.expiry.unwrap_or(0));
        }

        let mut txid = self.h_tx.digest(coin.sign_hash_double);
        txid.reverse();
        if txid != self.orig_hash {
            return Err(SignerError::process_error("Invalid original TXID."));
        }
        self.phase = Phase::Done;
        Ok(())
    }

    /// Fee of the original, re-derived from its own verified records
    pub fn fee(&self) -> SignResult<u64> {
        self.total_in
            .checked_sub(self.total_out)
            .ok_or_else(|| SignerError::process_error("Invalid original fee"))
    }
}
