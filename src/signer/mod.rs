//! Multi-pass signing state machine
//!
//! The session drives the host through repeated streaming passes over
//! the same logical records:
//!
//!  1. collect and classify inputs (fetching referenced originals)
//!  2. approve outputs, diffing any replaced originals
//!  3. approve fee, lock_time and totals
//!  4. verify inputs against streamed previous transactions and check
//!     nothing changed since approval
//!  5. serialize inputs, signing legacy ones as they pass
//!  6. serialize outputs
//!  7. sign segwit and taproot inputs, emit witnesses and the footer
//!
//! Every record is re-requested in later passes and checked against
//! the digest taken when it was approved; any divergence aborts with
//! "Transaction has changed during signing". No signature is produced
//! before every approval and verification step has passed.

pub mod decred;
pub mod zcash;

use crate::approver::Approver;
use crate::coin::CoinProfile;
use crate::collector::TxInfo;
use crate::config::SessionConfig;
use crate::error::{SignResult, SignerError};
use crate::host::{self, Confirmer, HostChannel, KeyStore};
use crate::multisig;
use crate::ownership;
use crate::prevtx::PrevTxCache;
use crate::replacement::OriginalTx;
use crate::sanitize;
use crate::scripts;
use crate::serializer;
use crate::sighash::{self, legacy::LegacyPreimage, TxDigests};
use crate::types::{InputScriptType, SignRequest, TxHash, TxInput, TxOutput};
use crate::verification::{self, SignatureVerifier};
use crate::writers::{self, TxHasher, WriteBytes};
use crate::{log_debug, log_error, log_info};

/// Progress of a signing session. States only ever advance; any error
/// moves to `Failed` and destroys the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    CollectingInputs,
    CollectingOutputs,
    VerifyingPrevTx,
    Signing,
    Done,
    Failed,
}

/// Result of a completed session
#[derive(Debug, Clone)]
pub struct SignedTx {
    /// Fully serialized transaction in the coin's wire format
    pub serialized_tx: Vec<u8>,
    /// Per-input DER (or 64-byte Schnorr) signatures; `None` for
    /// external inputs
    pub signatures: Vec<Option<Vec<u8>>>,
}

/// Sign a transaction against the given host, confirmation surface and
/// key store. This is the crate's single entry point.
pub fn sign_tx<H, C, K>(
    request: SignRequest,
    config: SessionConfig,
    host: &mut H,
    confirmer: &mut C,
    keystore: &K,
) -> SignResult<SignedTx>
where
    H: HostChannel,
    C: Confirmer,
    K: KeyStore,
{
    let tx = sanitize::sanitize_sign_tx(request, &config.coin)?;

    if config.coin.decred {
        return decred::sign_tx(tx, config, host, confirmer, keystore);
    }
    if config.coin.overwintered {
        zcash::check_version(&tx)?;
    }

    let mut session = SigningSession::new(tx, config, host, confirmer, keystore);
    match session.run() {
        Ok(signed) => Ok(signed),
        Err(err) => {
            session.state = SessionState::Failed;
            log_error!("signer", "signing session failed", code = format!("{:?}", err.code));
            Err(err)
        }
    }
}

#[derive(Clone, Copy, Default)]
struct InputFlags {
    external: bool,
    segwit: bool,
    taproot: bool,
    presigned: bool,
}

pub(crate) fn input_check_digest(txi: &TxInput) -> TxHash {
    let mut h = TxHasher::sha256();
    writers::write_tx_input_check(&mut h, txi);
    h.finalize(false)
}

pub(crate) fn output_check_digest(txo: &TxOutput, script_pubkey: &[u8]) -> TxHash {
    let mut h = TxHasher::sha256();
    writers::write_u64(&mut h, txo.amount);
    writers::write_bytes_prefixed(&mut h, script_pubkey);
    writers::write_u32(&mut h, txo.address_n.len() as u32);
    for n in &txo.address_n {
        writers::write_u32(&mut h, *n);
    }
    h.finalize(false)
}

struct SigningSession<'a, H, C, K> {
    host: &'a mut H,
    confirmer: &'a mut C,
    keystore: &'a K,
    coin: CoinProfile,
    tx: SignRequest,
    state: SessionState,

    tx_info: TxInfo,
    approver: Approver,
    sig_digests: TxDigests,
    prev_cache: PrevTxCache,
    orig_txs: Vec<OriginalTx>,

    flags: Vec<InputFlags>,
    input_script_pubkeys: Vec<Vec<u8>>,
    input_checks: Vec<TxHash>,
    output_checks: Vec<TxHash>,
    /// Fresh accumulation of the re-streamed records, compared against
    /// `tx_info` before the serialized transaction is released
    h_recheck: TxHasher,
    /// All internal inputs are taproot, so sighashes already commit to
    /// every amount and previous-tx streaming can be skipped
    taproot_only: bool,

    serialized_tx: Vec<u8>,
    signatures: Vec<Option<Vec<u8>>>,
}

impl<'a, H, C, K> SigningSession<'a, H, C, K>
where
    H: HostChannel,
    C: Confirmer,
    K: KeyStore,
{
    fn new(
        tx: SignRequest,
        config: SessionConfig,
        host: &'a mut H,
        confirmer: &'a mut C,
        keystore: &'a K,
    ) -> Self {
        let coin = config.coin.clone();
        let inputs_count = tx.inputs_count;
        let outputs_count = tx.outputs_count;
        Self {
            host,
            confirmer,
            keystore,
            approver: Approver::new(config, inputs_count, outputs_count),
            sig_digests: TxDigests::new(&coin),
            tx_info: TxInfo::new(tx.clone()),
            prev_cache: PrevTxCache::new(),
            orig_txs: Vec::new(),
            coin,
            tx,
            state: SessionState::CollectingInputs,
            flags: Vec::new(),
            input_script_pubkeys: Vec::new(),
            input_checks: Vec::new(),
            output_checks: Vec::new(),
            h_recheck: TxHasher::sha256(),
            taproot_only: true,
            serialized_tx: Vec::new(),
            signatures: Vec::new(),
        }
    }

    fn run(&mut self) -> SignResult<SignedTx> {
        self.collect_inputs()?;
        self.collect_outputs()?;
        self.verify_inputs()?;
        self.serialize_and_sign_inputs()?;
        self.serialize_outputs()?;
        self.sign_witness_inputs()?;
        self.finish()
    }

    // =========================================================================
    // Step 1: inputs
    // =========================================================================

    fn collect_inputs(&mut self) -> SignResult<()> {
        for i in 0..self.tx.inputs_count {
            let txi = host::request_tx_input(&mut *self.host, &self.coin, i)?;
            self.input_checks.push(input_check_digest(&txi));

            let script_pubkey = self.derive_input_script_pubkey(&txi)?;
            let mut flags = InputFlags {
                external: txi.is_external(),
                segwit: txi.is_segwit(),
                taproot: txi.is_taproot(),
                presigned: false,
            };

            if flags.external {
                flags.presigned = txi.script_sig.as_deref().map_or(false, |s| !s.is_empty())
                    || txi.witness.as_deref().map_or(false, |w| !w.is_empty() && w[0] != 0);
                match &txi.ownership_proof {
                    Some(proof) => {
                        ownership::verify_ownership_proof(
                            proof,
                            &script_pubkey,
                            txi.commitment_data.as_deref().unwrap_or(&[]),
                        )?;
                    }
                    None if !flags.presigned => {
                        return Err(SignerError::data_error("Invalid external input"));
                    }
                    None => {}
                }
                self.approver.add_external_input(&txi)?;
            } else {
                self.approver.add_internal_input(&mut *self.confirmer, &txi)?;
            }
            if !flags.taproot {
                self.taproot_only = false;
            }

            self.tx_info.add_input(&txi)?;
            self.sig_digests.add_input(&txi, &script_pubkey);

            if let Some(orig_hash) = txi.orig_hash {
                let idx = self.find_or_fetch_orig(orig_hash)?;
                self.orig_txs[idx].process_input(
                    &mut *self.host,
                    &self.coin,
                    &txi,
                    &script_pubkey,
                )?;
            }

            self.flags.push(flags);
            self.input_script_pubkeys.push(script_pubkey);
        }
        log_debug!("signer", "inputs collected", count = self.tx.inputs_count);
        Ok(())
    }

    // =========================================================================
    // Step 2+3: outputs and approval
    // =========================================================================

    fn collect_outputs(&mut self) -> SignResult<()> {
        self.state = SessionState::CollectingOutputs;
        let mut payment_req_loaded = false;

        for i in 0..self.tx.outputs_count {
            let txo = host::request_tx_output(&mut *self.host, &self.coin, i)?;
            let is_change = self.tx_info.output_is_change(&txo);
            let script_pubkey = self.derive_output_script(&txo)?;
            self.output_checks.push(output_check_digest(&txo, &script_pubkey));

            if let Some(req_index) = txo.payment_req_index {
                if !payment_req_loaded {
                    let request = host::request_payment_req(&mut *self.host, req_index)?;
                    self.approver.set_payment_request(request)?;
                    payment_req_loaded = true;
                }
            }

            let orig_txo = match (txo.orig_hash, txo.orig_index) {
                (Some(orig_hash), Some(orig_index)) => {
                    let idx = self.find_or_fetch_orig(orig_hash)?;
                    let orig_txo =
                        self.orig_txs[idx].fetch_output(&mut *self.host, &self.coin, orig_index)?;
                    if is_change && orig_txo.address_n != txo.address_n {
                        return Err(SignerError::data_error(
                            "Original output is missing change-output parameters.",
                        ));
                    }
                    let orig_script = self.derive_output_script(&orig_txo)?;
                    self.orig_txs[idx].record_output(&orig_txo, &orig_script)?;
                    Some(orig_txo)
                }
                _ => None,
            };

            if is_change {
                self.approver.add_change_output(&txo, &script_pubkey)?;
            } else {
                self.approver.add_external_output(
                    &mut *self.confirmer,
                    &txo,
                    &script_pubkey,
                    orig_txo.as_ref(),
                )?;
            }

            self.tx_info.add_output(&txo, &script_pubkey);
            self.sig_digests.add_output(txo.amount, &script_pubkey);
        }

        let mut orig_txs = std::mem::take(&mut self.orig_txs);
        for orig in &mut orig_txs {
            orig.finalize(&self.coin)?;
        }
        self.orig_txs = orig_txs;

        self.approver
            .approve_orig_txids(&mut *self.confirmer, &self.orig_txs)?;
        self.approver
            .approve_tx(&mut *self.confirmer, &self.tx_info, &self.orig_txs)?;
        log_info!("signer", "transaction approved by user");
        Ok(())
    }

    // =========================================================================
    // Step 4: verification pass
    // =========================================================================

    fn verify_inputs(&mut self) -> SignResult<()> {
        self.state = SessionState::VerifyingPrevTx;

        for i in 0..self.tx.inputs_count {
            let txi = self.fetch_input_checked(i)?;
            writers::write_tx_input_check(&mut self.h_recheck, &txi);
            let flags = self.flags[i as usize];
            let script_pubkey = self.input_script_pubkeys[i as usize].clone();

            // previous-tx corroboration is skipped only when every
            // input is taproot; the BIP-341 sighash then commits to
            // all spent amounts and scripts, so a lying host can only
            // produce an invalid signature
            if !self.taproot_only {
                let (amount, prev_script) = self.prev_cache.get_output(
                    &mut *self.host,
                    &self.coin,
                    txi.prev_hash,
                    txi.prev_index,
                )?;
                if amount != txi.amount {
                    return Err(SignerError::data_error("Invalid amount specified"));
                }
                if flags.external && prev_script != script_pubkey {
                    return Err(SignerError::data_error("Invalid external input"));
                }
            }

            if flags.presigned {
                self.verify_presigned(i, &txi, &script_pubkey)?;
            }
        }

        let orig_count = self.orig_txs.len();
        for idx in 0..orig_count {
            self.verify_original(idx)?;
        }
        log_debug!("signer", "input verification complete");
        Ok(())
    }

    fn verify_presigned(&mut self, index: u32, txi: &TxInput, script_pubkey: &[u8]) -> SignResult<()> {
        let verifier = SignatureVerifier::new(
            script_pubkey,
            txi.script_sig.as_deref(),
            txi.witness.as_deref(),
        )?;
        let digest = if txi.is_taproot() {
            verifier.ensure_hash_type(0x00)?;
            sighash::bip341::preimage_hash(&self.sig_digests, &self.tx, index, 0x00)
        } else {
            verifier.ensure_hash_type(sighash::hash_type_byte(&self.coin))?;
            let script_code = verification::script_code_for(
                script_pubkey,
                txi.script_sig.as_deref(),
                txi.witness.as_deref(),
            )?;
            if txi.is_segwit() || self.coin.force_bip143 {
                sighash::bip143::preimage_hash(
                    &self.sig_digests,
                    &self.tx,
                    txi,
                    &script_code,
                    sighash::sighash_type(&self.coin),
                )
            } else if self.coin.overwintered {
                zcash::signature_digest(&self.sig_digests, &self.tx, txi, &script_code)?
            } else {
                self.legacy_digest(index, &script_code)?
            }
        };
        verifier.verify(&digest)
    }

    /// One signed input of each original transaction must verify
    /// against the original's own digest
    fn verify_original(&mut self, idx: usize) -> SignResult<()> {
        let (index, txi) = self.orig_txs[idx]
            .verification_input
            .clone()
            .ok_or_else(|| {
                SignerError::process_error("Original transaction is missing a signed input.")
            })?;

        let (_, script_pubkey) = self.prev_cache.get_output(
            &mut *self.host,
            &self.coin,
            txi.prev_hash,
            txi.prev_index,
        )?;
        let verifier = SignatureVerifier::new(
            &script_pubkey,
            txi.script_sig.as_deref(),
            txi.witness.as_deref(),
        )?;

        let orig = &self.orig_txs[idx];
        let digest = if txi.is_taproot() {
            sighash::bip341::preimage_hash(&orig.sig_digests, &orig.info.tx, index, 0x00)
        } else if txi.is_segwit() || self.coin.force_bip143 {
            let script_code = verification::script_code_for(
                &script_pubkey,
                txi.script_sig.as_deref(),
                txi.witness.as_deref(),
            )?;
            sighash::bip143::preimage_hash(
                &orig.sig_digests,
                &orig.info.tx,
                &txi,
                &script_code,
                sighash::sighash_type(&self.coin),
            )
        } else if self.coin.overwintered {
            let script_code = verification::script_code_for(&script_pubkey, None, None)?;
            zcash::signature_digest(&orig.sig_digests, &orig.info.tx, &txi, &script_code)?
        } else {
            self.legacy_digest_for_original(idx, index, &script_pubkey)?
        };

        verifier
            .verify(&digest)
            .map_err(|_| SignerError::process_error("Invalid original signature"))
    }

    // =========================================================================
    // Steps 5-7: serialization and signing
    // =========================================================================

    fn is_segwit_tx(&self) -> bool {
        self.flags.iter().any(|f| f.segwit)
    }

    fn serialize_and_sign_inputs(&mut self) -> SignResult<()> {
        self.state = SessionState::Signing;
        let segwit = self.is_segwit_tx();
        let mut serialized = Vec::new();
        serializer::write_signed_tx_header(&mut serialized, &self.tx, &self.coin, segwit);
        self.serialized_tx = serialized;
        self.signatures = vec![None; self.tx.inputs_count as usize];

        for i in 0..self.tx.inputs_count {
            let txi = self.fetch_input_checked(i)?;
            let flags = self.flags[i as usize];

            let script_sig: Vec<u8> = if flags.external {
                txi.script_sig.clone().unwrap_or_default()
            } else if flags.segwit {
                match txi.script_type {
                    InputScriptType::SpendP2shWitness => {
                        let program = self.witness_program(&txi)?;
                        scripts::p2sh_witness_script_sig(&program)
                    }
                    _ => Vec::new(),
                }
            } else {
                let (sig, script_sig) = self.sign_nonsegwit(i, &txi)?;
                self.signatures[i as usize] = Some(sig);
                script_sig
            };

            writers::write_tx_input(
                &mut self.serialized_tx,
                &txi.prev_hash,
                txi.prev_index,
                &script_sig,
                txi.sequence,
            );
        }
        Ok(())
    }

    fn serialize_outputs(&mut self) -> SignResult<()> {
        writers::write_compact_size(&mut self.serialized_tx, self.tx.outputs_count as usize);
        for i in 0..self.tx.outputs_count {
            let (txo, script_pubkey) = self.fetch_output_checked(i)?;
            writers::write_u64(&mut self.h_recheck, txo.amount);
            writers::write_bytes_prefixed(&mut self.h_recheck, &script_pubkey);
            writers::write_u32(&mut self.h_recheck, txo.address_n.len() as u32);
            for n in &txo.address_n {
                writers::write_u32(&mut self.h_recheck, *n);
            }
            writers::write_tx_output(&mut self.serialized_tx, txo.amount, &script_pubkey);
        }
        Ok(())
    }

    fn sign_witness_inputs(&mut self) -> SignResult<()> {
        if !self.is_segwit_tx() {
            return Ok(());
        }
        for i in 0..self.tx.inputs_count {
            let flags = self.flags[i as usize];
            let witness = if flags.external {
                let txi = self.fetch_input_checked(i)?;
                match txi.witness {
                    Some(w) if !w.is_empty() => w,
                    _ => scripts::witness_empty(),
                }
            } else if flags.taproot {
                let txi = self.fetch_input_checked(i)?;
                let digest = sighash::bip341::preimage_hash(&self.sig_digests, &self.tx, i, 0x00);
                let sig = self.keystore.sign_schnorr(&digest, &txi.address_n)?;
                self.signatures[i as usize] = Some(sig.clone());
                scripts::witness_p2tr(&sig, 0x00)
            } else if flags.segwit {
                let txi = self.fetch_input_checked(i)?;
                let script_code = self.script_code(&txi)?;
                let digest = sighash::bip143::preimage_hash(
                    &self.sig_digests,
                    &self.tx,
                    &txi,
                    &script_code,
                    sighash::sighash_type(&self.coin),
                );
                let sig = self.keystore.sign_ecdsa(&digest, &txi.address_n)?;
                self.signatures[i as usize] = Some(sig.clone());
                let hash_type = sighash::hash_type_byte(&self.coin);
                match &txi.multisig {
                    None => {
                        let pubkey = self.keystore.public_key(&txi.address_n)?;
                        scripts::witness_p2wpkh(&sig, hash_type, &pubkey)
                    }
                    Some(ms) => {
                        let combined = self.combined_signatures(&txi, ms, &sig)?;
                        let resolved = multisig::resolve_pubkeys(ms)?;
                        let script = scripts::multisig_redeem_script(&resolved, ms.m)?;
                        scripts::witness_multisig(&combined, hash_type, &script)
                    }
                }
            } else {
                scripts::witness_empty()
            };
            self.serialized_tx.write(&witness);
        }
        Ok(())
    }

    fn finish(&mut self) -> SignResult<SignedTx> {
        self.tx_info.check_unchanged(self.h_recheck.digest(false))?;
        serializer::write_signed_tx_footer(&mut self.serialized_tx, &self.tx, &self.coin);
        host::request_tx_finish(&mut *self.host)?;
        self.state = SessionState::Done;
        log_info!(
            "signer",
            "transaction serialized",
            size = self.serialized_tx.len()
        );
        Ok(SignedTx {
            serialized_tx: std::mem::take(&mut self.serialized_tx),
            signatures: std::mem::take(&mut self.signatures),
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn fetch_input_checked(&mut self, i: u32) -> SignResult<TxInput> {
        let txi = host::request_tx_input(&mut *self.host, &self.coin, i)?;
        if input_check_digest(&txi) != self.input_checks[i as usize] {
            return Err(SignerError::process_error(
                "Transaction has changed during signing",
            ));
        }
        Ok(txi)
    }

    fn fetch_output_checked(&mut self, i: u32) -> SignResult<(TxOutput, Vec<u8>)> {
        let txo = host::request_tx_output(&mut *self.host, &self.coin, i)?;
        let script_pubkey = self.derive_output_script(&txo)?;
        if output_check_digest(&txo, &script_pubkey) != self.output_checks[i as usize] {
            return Err(SignerError::process_error(
                "Transaction has changed during signing",
            ));
        }
        Ok((txo, script_pubkey))
    }

    fn find_or_fetch_orig(&mut self, orig_hash: TxHash) -> SignResult<usize> {
        if let Some(pos) = self.orig_txs.iter().position(|o| o.orig_hash == orig_hash) {
            return Ok(pos);
        }
        let orig = OriginalTx::fetch(&mut *self.host, &self.coin, orig_hash)?;
        self.orig_txs.push(orig);
        Ok(self.orig_txs.len() - 1)
    }

    fn derive_input_script_pubkey(&self, txi: &TxInput) -> SignResult<Vec<u8>> {
        if txi.is_external() {
            return txi
                .script_pubkey
                .clone()
                .ok_or_else(|| SignerError::data_error("Missing script_pubkey field."));
        }
        let pubkey = self.keystore.public_key(&txi.address_n)?;
        let resolved = match &txi.multisig {
            Some(ms) => {
                let keys = multisig::resolve_pubkeys(ms)?;
                multisig::pubkey_index(&keys, &pubkey)?;
                Some(keys)
            }
            None => None,
        };
        scripts::input_script_pubkey(
            txi.script_type,
            &pubkey,
            txi.multisig.as_ref(),
            resolved.as_deref(),
        )
    }

    fn derive_output_script(&self, txo: &TxOutput) -> SignResult<Vec<u8>> {
        let change_pubkey = if !txo.address_n.is_empty() {
            Some(self.keystore.public_key(&txo.address_n)?)
        } else {
            None
        };
        let resolved = txo
            .multisig
            .as_ref()
            .map(multisig::resolve_pubkeys)
            .transpose()?;
        scripts::derive_output_script(
            txo,
            &self.coin,
            change_pubkey.as_deref(),
            resolved.as_deref(),
        )
    }

    /// scriptCode of an internal input for BIP-143 and legacy digests
    fn script_code(&self, txi: &TxInput) -> SignResult<Vec<u8>> {
        let pubkey = self.keystore.public_key(&txi.address_n)?;
        match &txi.multisig {
            None => Ok(scripts::p2pkh_script(&scripts::hash160_digest(&pubkey))),
            Some(ms) => {
                let resolved = multisig::resolve_pubkeys(ms)?;
                scripts::multisig_redeem_script(&resolved, ms.m)
            }
        }
    }

    /// Witness program committed to by a P2SH-wrapped segwit input
    fn witness_program(&self, txi: &TxInput) -> SignResult<Vec<u8>> {
        let pubkey = self.keystore.public_key(&txi.address_n)?;
        match &txi.multisig {
            None => Ok(scripts::p2wpkh_script(&scripts::hash160_digest(&pubkey))),
            Some(ms) => {
                let resolved = multisig::resolve_pubkeys(ms)?;
                let script = scripts::multisig_redeem_script(&resolved, ms.m)?;
                Ok(scripts::p2wsh_script(&writers::sha256_digest(&script)))
            }
        }
    }

    /// Merge this device's signature into the co-signer slots at its
    /// key position
    fn combined_signatures(
        &self,
        txi: &TxInput,
        ms: &crate::types::MultisigScript,
        our_sig: &[u8],
    ) -> SignResult<Vec<Vec<u8>>> {
        let resolved = multisig::resolve_pubkeys(ms)?;
        let pubkey = self.keystore.public_key(&txi.address_n)?;
        let our_index = multisig::pubkey_index(&resolved, &pubkey)?;
        let mut combined = ms.signatures.clone();
        combined.resize(resolved.len(), Vec::new());
        combined[our_index] = our_sig.to_vec();
        Ok(combined)
    }

    fn sign_nonsegwit(&mut self, index: u32, txi: &TxInput) -> SignResult<(Vec<u8>, Vec<u8>)> {
        let script_code = if self.coin.force_bip143 || self.coin.overwintered {
            self.script_code(txi)?
        } else {
            // the legacy preimage carries the spent scriptPubKey
            self.input_script_pubkeys[index as usize].clone()
        };

        let digest = if self.coin.force_bip143 {
            sighash::bip143::preimage_hash(
                &self.sig_digests,
                &self.tx,
                txi,
                &script_code,
                sighash::sighash_type(&self.coin),
            )
        } else if self.coin.overwintered {
            zcash::signature_digest(&self.sig_digests, &self.tx, txi, &script_code)?
        } else {
            let code = match &txi.multisig {
                Some(_) => self.script_code(txi)?,
                None => script_code,
            };
            self.legacy_digest(index, &code)?
        };

        let sig = self.keystore.sign_ecdsa(&digest, &txi.address_n)?;
        let hash_type = sighash::hash_type_byte(&self.coin);
        let script_sig = match &txi.multisig {
            None => {
                let pubkey = self.keystore.public_key(&txi.address_n)?;
                scripts::p2pkh_script_sig(&sig, hash_type, &pubkey)
            }
            Some(ms) => {
                let combined = self.combined_signatures(txi, ms, &sig)?;
                let resolved = multisig::resolve_pubkeys(ms)?;
                let redeem = scripts::multisig_redeem_script(&resolved, ms.m)?;
                scripts::multisig_script_sig(&combined, hash_type, &redeem)
            }
        };
        Ok((sig, script_sig))
    }

    /// Full legacy preimage over a fresh re-request of every record
    fn legacy_digest(&mut self, signed_index: u32, script_code: &[u8]) -> SignResult<TxHash> {
        let mut preimage = LegacyPreimage::new(&self.tx);
        for i in 0..self.tx.inputs_count {
            let txi = self.fetch_input_checked(i)?;
            let script: &[u8] = if i == signed_index { script_code } else { &[] };
            preimage.add_input(&txi, script);
        }
        preimage.outputs_start(self.tx.outputs_count);
        for i in 0..self.tx.outputs_count {
            let (txo, script_pubkey) = self.fetch_output_checked(i)?;
            preimage.add_output(txo.amount, &script_pubkey);
        }
        Ok(preimage.finalize(self.tx.lock_time, sighash::sighash_type(&self.coin)))
    }

    /// Legacy preimage of an original transaction, re-streamed from
    /// the host
    fn legacy_digest_for_original(
        &mut self,
        idx: usize,
        signed_index: u32,
        script_pubkey: &[u8],
    ) -> SignResult<TxHash> {
        let orig_hash = self.orig_txs[idx].orig_hash;
        let orig_tx = self.orig_txs[idx].info.tx.clone();
        let mut preimage = LegacyPreimage::new(&orig_tx);
        for i in 0..orig_tx.inputs_count {
            let txi = host::request_orig_input(&mut *self.host, &self.coin, i, orig_hash)?;
            let script: &[u8] = if i == signed_index { script_pubkey } else { &[] };
            preimage.add_input(&txi, script);
        }
        preimage.outputs_start(orig_tx.outputs_count);
        for i in 0..orig_tx.outputs_count {
            let txo = host::request_orig_output(&mut *self.host, &self.coin, i, orig_hash)?;
            let script = self.derive_output_script(&txo)?;
            preimage.add_output(txo.amount, &script);
        }
        Ok(preimage.finalize(orig_tx.lock_time, sighash::sighash_type(&self.coin)))
    }
}
