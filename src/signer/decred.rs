//! Decred signing flow
//!
//! Decred keeps the streaming passes but swaps the digest and wire
//! formats: BLAKE-256 everywhere, a witness-free prefix serialization
//! shared by every signature, and a separate witness section carrying
//! the spent amounts. External and replacement inputs are not
//! supported on this chain.

use crate::approver::Approver;
use crate::coin::CoinProfile;
use crate::collector::TxInfo;
use crate::config::SessionConfig;
use crate::error::{SignResult, SignerError};
use crate::host::{self, Confirmer, HostChannel, KeyStore};
use crate::log_info;
use crate::multisig;
use crate::prevtx::PrevTxCache;
use crate::scripts;
use crate::serializer;
use crate::sighash::{self, decred::PrefixHasher};
use crate::types::{
    DecredStakingSpend, PrevOutput, SignRequest, TxHash, TxInput, TxOutput,
};
use crate::writers::{self, TxHasher};

use super::{input_check_digest, output_check_digest, SessionState, SignedTx};

const OP_SSGEN: u8 = 0xbb;
const OP_SSRTX: u8 = 0xbc;

pub fn sign_tx<H, C, K>(
    tx: SignRequest,
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
    let mut signer = DecredSigner::new(tx, config, host, confirmer, keystore);
    match signer.run() {
        Ok(signed) => Ok(signed),
        Err(err) => {
            signer.state = SessionState::Failed;
            Err(err)
        }
    }
}

struct DecredSigner<'a, H, C, K> {
    host: &'a mut H,
    confirmer: &'a mut C,
    keystore: &'a K,
    coin: CoinProfile,
    tx: SignRequest,
    state: SessionState,

    tx_info: TxInfo,
    approver: Approver,
    prefix: Option<PrefixHasher>,
    prev_cache: PrevTxCache,

    input_checks: Vec<TxHash>,
    output_checks: Vec<TxHash>,
    h_recheck: TxHasher,

    serialized_tx: Vec<u8>,
    signatures: Vec<Option<Vec<u8>>>,
}

impl<'a, H, C, K> DecredSigner<'a, H, C, K>
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
        Self {
            host,
            confirmer,
            keystore,
            approver: Approver::new(config, tx.inputs_count, tx.outputs_count),
            tx_info: TxInfo::new(tx.clone()),
            prefix: Some(PrefixHasher::new(&tx)),
            prev_cache: PrevTxCache::new(),
            coin,
            tx,
            state: SessionState::CollectingInputs,
            input_checks: Vec::new(),
            output_checks: Vec::new(),
            h_recheck: TxHasher::sha256(),
            serialized_tx: Vec::new(),
            signatures: Vec::new(),
        }
    }

    fn run(&mut self) -> SignResult<SignedTx> {
        self.collect_inputs()?;
        self.collect_outputs()?;
        self.verify_inputs()?;
        self.serialize_and_sign()?;
        self.finish()
    }

    fn collect_inputs(&mut self) -> SignResult<()> {
        for i in 0..self.tx.inputs_count {
            let txi = host::request_tx_input(&mut *self.host, &self.coin, i)?;
            if txi.is_external() {
                return Err(SignerError::data_error("External inputs not supported"));
            }
            if txi.orig_hash.is_some() {
                return Err(SignerError::data_error(
                    "Replacement transactions are not supported",
                ));
            }
            self.input_checks.push(input_check_digest(&txi));
            self.approver.add_internal_input(&mut *self.confirmer, &txi)?;
            self.tx_info.add_input(&txi)?;
            if let Some(prefix) = &mut self.prefix {
                prefix.add_input(&txi);
            }
        }
        Ok(())
    }

    fn collect_outputs(&mut self) -> SignResult<()> {
        self.state = SessionState::CollectingOutputs;
        if let Some(prefix) = &mut self.prefix {
            prefix.outputs_start(self.tx.outputs_count);
        }

        for i in 0..self.tx.outputs_count {
            let txo = host::request_tx_output(&mut *self.host, &self.coin, i)?;
            let script_pubkey = self.derive_output_script(&txo)?;
            self.output_checks.push(output_check_digest(&txo, &script_pubkey));

            if self.tx_info.output_is_change(&txo) {
                self.approver.add_change_output(&txo, &script_pubkey)?;
            } else {
                self.approver
                    .add_external_output(&mut *self.confirmer, &txo, &script_pubkey, None)?;
            }
            self.tx_info.add_output(&txo, &script_pubkey);
            if let Some(prefix) = &mut self.prefix {
                prefix.add_output(&PrevOutput {
                    amount: txo.amount,
                    script_pubkey: script_pubkey.clone(),
                    decred_script_version: Some(0),
                });
            }
        }

        self.approver.approve_tx(&mut *self.confirmer, &self.tx_info, &[])
    }

    fn verify_inputs(&mut self) -> SignResult<()> {
        self.state = SessionState::VerifyingPrevTx;
        for i in 0..self.tx.inputs_count {
            let txi = self.fetch_input_checked(i)?;
            writers::write_tx_input_check(&mut self.h_recheck, &txi);
            let (amount, _script) = self.prev_cache.get_output(
                &mut *self.host,
                &self.coin,
                txi.prev_hash,
                txi.prev_index,
            )?;
            if amount != txi.amount {
                return Err(SignerError::data_error("Invalid amount specified"));
            }
        }
        Ok(())
    }

    fn serialize_and_sign(&mut self) -> SignResult<()> {
        self.state = SessionState::Signing;
        self.signatures = vec![None; self.tx.inputs_count as usize];

        let mut serialized = Vec::new();
        serializer::write_signed_tx_header(&mut serialized, &self.tx, &self.coin, false);
        for i in 0..self.tx.inputs_count {
            let txi = self.fetch_input_checked(i)?;
            writers::write_tx_input_decred(
                &mut serialized,
                &txi.prev_hash,
                txi.prev_index,
                txi.decred_tree.unwrap_or(0),
                txi.sequence,
            );
        }

        writers::write_compact_size(&mut serialized, self.tx.outputs_count as usize);
        for i in 0..self.tx.outputs_count {
            let (txo, script_pubkey) = self.fetch_output_checked(i)?;
            writers::write_u64(&mut self.h_recheck, txo.amount);
            writers::write_bytes_prefixed(&mut self.h_recheck, &script_pubkey);
            writers::write_u32(&mut self.h_recheck, txo.address_n.len() as u32);
            for n in &txo.address_n {
                writers::write_u32(&mut self.h_recheck, *n);
            }
            writers::write_u64(&mut serialized, txo.amount);
            writers::write_u16(&mut serialized, 0);
            writers::write_bytes_prefixed(&mut serialized, &script_pubkey);
        }

        serializer::write_decred_witness_header(&mut serialized, &self.tx);
        self.serialized_tx = serialized;

        let prefix = self
            .prefix
            .take()
            .ok_or_else(|| SignerError::process_error("Prefix hash already consumed"))?;
        let prefix_hash = prefix.finalize(&self.tx);

        for i in 0..self.tx.inputs_count {
            let txi = self.fetch_input_checked(i)?;
            let script_code = self.script_code(&txi)?;
            let witness = sighash::decred::witness_hash(&self.tx, i as usize, &script_code);
            let digest = sighash::decred::signature_hash(&prefix_hash, &witness);

            let sig = self.keystore.sign_ecdsa(&digest, &txi.address_n)?;
            self.signatures[i as usize] = Some(sig.clone());

            let hash_type = sighash::hash_type_byte(&self.coin);
            let script_sig = match &txi.multisig {
                None => {
                    let pubkey = self.keystore.public_key(&txi.address_n)?;
                    scripts::p2pkh_script_sig(&sig, hash_type, &pubkey)
                }
                Some(ms) => {
                    let resolved = multisig::resolve_pubkeys(ms)?;
                    let pubkey = self.keystore.public_key(&txi.address_n)?;
                    let our_index = multisig::pubkey_index(&resolved, &pubkey)?;
                    let mut combined = ms.signatures.clone();
                    combined.resize(resolved.len(), Vec::new());
                    combined[our_index] = sig;
                    let redeem = scripts::multisig_redeem_script(&resolved, ms.m)?;
                    scripts::multisig_script_sig(&combined, hash_type, &redeem)
                }
            };
            serializer::write_decred_witness(&mut self.serialized_tx, txi.amount, &script_sig);
        }
        Ok(())
    }

    fn finish(&mut self) -> SignResult<SignedTx> {
        self.tx_info.check_unchanged(self.h_recheck.digest(false))?;
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

    /// Script the signature commits to. Staking spends commit to the
    /// stake-tagged form of the P2PKH script.
    fn script_code(&self, txi: &TxInput) -> SignResult<Vec<u8>> {
        let pubkey = self.keystore.public_key(&txi.address_n)?;
        let base = match &txi.multisig {
            None => scripts::p2pkh_script(&scripts::hash160_digest(&pubkey)),
            Some(ms) => {
                let resolved = multisig::resolve_pubkeys(ms)?;
                scripts::multisig_redeem_script(&resolved, ms.m)?
            }
        };
        Ok(match txi.decred_staking_spend {
            Some(DecredStakingSpend::SSGen) => stake_tagged(OP_SSGEN, &base),
            Some(DecredStakingSpend::SSRtx) => stake_tagged(OP_SSRTX, &base),
            None => base,
        })
    }
}

fn stake_tagged(opcode: u8, script: &[u8]) -> Vec<u8> {
    let mut tagged = Vec::with_capacity(script.len() + 1);
    tagged.push(opcode);
    tagged.extend_from_slice(script);
    tagged
}
