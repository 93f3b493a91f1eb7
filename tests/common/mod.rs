//! Shared fixtures for the integration suites: a scriptable host, a
//! recording confirmation surface and a deterministic key store backed
//! by real secp256k1 keys.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashMap;

use bitcoin::hashes::Hash;
use secp256k1::{All, Keypair, Message, Scalar, Secp256k1, SecretKey};

use coldsign::coin::CoinProfile;
use coldsign::error::{SignResult, SignerError};
use coldsign::host::{Confirmer, HostChannel, KeyStore, Prompt, TxAck, TxRequest};
use coldsign::scripts;
use coldsign::types::{
    InputScriptType, OutputScriptType, PaymentRequest, PrevInput, PrevOutput, PrevTx, TxHash,
    TxInput, TxOutput, SEQUENCE_FINAL,
};
use coldsign::writers::{self, TxHasher, WriteBytes};

pub const H: u32 = 0x8000_0000;

/// Burn address used as the payee in most scenarios
pub const EATER: &str = "1BitcoinEaterAddressDontSendf59kuE";

// =============================================================================
// Key store
// =============================================================================

/// Derives one secret key per path by hashing the path words. Counts
/// signing calls so tests can assert that nothing was signed before a
/// rejection.
pub struct TestKeyStore {
    secp: Secp256k1<All>,
    pub sign_calls: Cell<u32>,
}

impl TestKeyStore {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
            sign_calls: Cell::new(0),
        }
    }

    pub fn secret(&self, address_n: &[u32]) -> SecretKey {
        let mut data = Vec::new();
        for n in address_n {
            data.extend_from_slice(&n.to_le_bytes());
        }
        SecretKey::from_slice(&writers::sha256_digest(&data)).expect("derived scalar")
    }

    pub fn pubkey(&self, address_n: &[u32]) -> Vec<u8> {
        secp256k1::PublicKey::from_secret_key(&self.secp, &self.secret(address_n))
            .serialize()
            .to_vec()
    }
}

impl KeyStore for TestKeyStore {
    fn public_key(&self, address_n: &[u32]) -> SignResult<Vec<u8>> {
        Ok(self.pubkey(address_n))
    }

    fn sign_ecdsa(&self, digest: &[u8; 32], address_n: &[u32]) -> SignResult<Vec<u8>> {
        self.sign_calls.set(self.sign_calls.get() + 1);
        let sig = self
            .secp
            .sign_ecdsa(&Message::from_digest(*digest), &self.secret(address_n));
        Ok(sig.serialize_der().to_vec())
    }

    fn sign_schnorr(&self, digest: &[u8; 32], address_n: &[u32]) -> SignResult<Vec<u8>> {
        self.sign_calls.set(self.sign_calls.get() + 1);
        let keypair = Keypair::from_secret_key(&self.secp, &self.secret(address_n));
        let (xonly, _) = keypair.x_only_public_key();

        // key-path spends sign with the TapTweak-adjusted key
        let mut hasher = TxHasher::tagged("TapTweak");
        hasher.write(&xonly.serialize());
        let tweak = Scalar::from_be_bytes(hasher.finalize(false)).expect("tweak scalar");
        let tweaked = keypair
            .add_xonly_tweak(&self.secp, &tweak)
            .expect("tweaked keypair");

        let sig = self
            .secp
            .sign_schnorr_no_aux_rand(&Message::from_digest(*digest), &tweaked);
        Ok(sig.as_ref().to_vec())
    }
}

// =============================================================================
// Confirmation surface
// =============================================================================

/// Records every prompt; answers are popped from `responses`, defaulting
/// to accept.
pub struct RecordingUi {
    pub seen: Vec<Prompt>,
    pub responses: Vec<bool>,
}

impl RecordingUi {
    pub fn accepting() -> Self {
        Self {
            seen: Vec::new(),
            responses: Vec::new(),
        }
    }

    pub fn declining_first() -> Self {
        Self {
            seen: Vec::new(),
            responses: vec![false],
        }
    }
}

impl Confirmer for RecordingUi {
    fn confirm(&mut self, prompt: &Prompt) -> bool {
        self.seen.push(prompt.clone());
        self.responses.pop().unwrap_or(true)
    }
}

// =============================================================================
// Host
// =============================================================================

/// A previous transaction as the host would hold it
pub struct PrevTxData {
    pub meta: PrevTx,
    pub inputs: Vec<PrevInput>,
    pub outputs: Vec<PrevOutput>,
}

impl PrevTxData {
    /// The txid the device will recompute while streaming this data
    pub fn txid(&self, coin: &CoinProfile) -> TxHash {
        let mut h = if coin.decred {
            TxHasher::blake256()
        } else {
            TxHasher::sha256()
        };
        let version = if coin.decred {
            self.meta.version | 1 << 16
        } else {
            self.meta.version
        };
        writers::write_tx_header(
            &mut h,
            version,
            self.meta.timestamp,
            self.meta.version_group_id,
            coin.overwintered,
            self.inputs.len(),
        );
        for txi in &self.inputs {
            if coin.decred {
                writers::write_tx_input_decred(
                    &mut h,
                    &txi.prev_hash,
                    txi.prev_index,
                    txi.decred_tree.unwrap_or(0),
                    txi.sequence,
                );
            } else {
                writers::write_prev_input(&mut h, txi);
            }
        }
        writers::write_compact_size(&mut h, self.outputs.len());
        for txo in &self.outputs {
            writers::write_prev_output(&mut h, txo, coin.decred);
        }
        writers::write_u32(&mut h, self.meta.lock_time);
        if coin.has_expiry() {
            writers::write_u32(&mut h, self.meta.expiry.unwrap_or(0));
        }
        let mut id = h.finalize(coin.sign_hash_double);
        id.reverse();
        id
    }
}

/// An already-signed original transaction held by the host for
/// replacement signing
pub struct OrigTxData {
    pub meta: PrevTx,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

/// Serves current, previous and original records from plain vectors.
/// Optional tamper hooks mutate a record's amount starting from its
/// n-th serve, emulating a host that changes data between passes.
pub struct MockHost {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub prev_txs: HashMap<TxHash, PrevTxData>,
    pub orig_txs: HashMap<TxHash, OrigTxData>,
    pub payment_requests: Vec<PaymentRequest>,
    pub finished: bool,
    pub tamper_input_from_serve: Option<(usize, u32)>,
    pub tamper_output_from_serve: Option<(usize, u32)>,
    input_serves: Vec<u32>,
    output_serves: Vec<u32>,
}

impl MockHost {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            inputs,
            outputs,
            prev_txs: HashMap::new(),
            orig_txs: HashMap::new(),
            payment_requests: Vec::new(),
            finished: false,
            tamper_input_from_serve: None,
            tamper_output_from_serve: None,
            input_serves: Vec::new(),
            output_serves: Vec::new(),
        }
    }

    fn bump(serves: &mut Vec<u32>, i: usize) -> u32 {
        if serves.len() <= i {
            serves.resize(i + 1, 0);
        }
        serves[i] += 1;
        serves[i]
    }

    fn unknown_tx() -> SignerError {
        SignerError::process_error("unknown transaction requested in test")
    }
}

impl HostChannel for MockHost {
    fn request(&mut self, req: TxRequest) -> SignResult<TxAck> {
        match req {
            TxRequest::TxInput {
                request_index,
                tx_hash: None,
            } => {
                let i = request_index as usize;
                let serve = Self::bump(&mut self.input_serves, i);
                let mut txi = self.inputs[i].clone();
                if let Some((idx, from)) = self.tamper_input_from_serve {
                    if idx == i && serve >= from {
                        txi.amount += 1;
                    }
                }
                Ok(TxAck::Input(txi))
            }
            TxRequest::TxOutput {
                request_index,
                tx_hash: None,
            } => {
                let i = request_index as usize;
                let serve = Self::bump(&mut self.output_serves, i);
                let mut txo = self.outputs[i].clone();
                if let Some((idx, from)) = self.tamper_output_from_serve {
                    if idx == i && serve >= from {
                        txo.amount += 1;
                    }
                }
                Ok(TxAck::Output(txo))
            }
            TxRequest::TxInput {
                request_index,
                tx_hash: Some(hash),
            } => {
                let prev = self.prev_txs.get(&hash).ok_or_else(Self::unknown_tx)?;
                Ok(TxAck::PrevInput(prev.inputs[request_index as usize].clone()))
            }
            TxRequest::TxOutput {
                request_index,
                tx_hash: Some(hash),
            } => {
                let prev = self.prev_txs.get(&hash).ok_or_else(Self::unknown_tx)?;
                Ok(TxAck::PrevOutput(prev.outputs[request_index as usize].clone()))
            }
            TxRequest::TxMeta { tx_hash } => {
                if let Some(orig) = self.orig_txs.get(&tx_hash) {
                    return Ok(TxAck::PrevMeta(orig.meta.clone()));
                }
                let prev = self.prev_txs.get(&tx_hash).ok_or_else(Self::unknown_tx)?;
                Ok(TxAck::PrevMeta(prev.meta.clone()))
            }
            TxRequest::TxOrigInput {
                request_index,
                tx_hash,
            } => {
                let orig = self.orig_txs.get(&tx_hash).ok_or_else(Self::unknown_tx)?;
                Ok(TxAck::Input(orig.inputs[request_index as usize].clone()))
            }
            TxRequest::TxOrigOutput {
                request_index,
                tx_hash,
            } => {
                let orig = self.orig_txs.get(&tx_hash).ok_or_else(Self::unknown_tx)?;
                Ok(TxAck::Output(orig.outputs[request_index as usize].clone()))
            }
            TxRequest::TxPaymentReq { request_index } => Ok(TxAck::PaymentRequest(
                self.payment_requests[request_index as usize].clone(),
            )),
            TxRequest::TxExtraData { .. } => Err(Self::unknown_tx()),
            TxRequest::TxFinished => {
                self.finished = true;
                Ok(TxAck::Finished)
            }
        }
    }
}

// =============================================================================
// Record builders
// =============================================================================

pub fn bip44_path(purpose: u32, coin: u32, change: u32, index: u32) -> Vec<u32> {
    vec![purpose | H, coin | H, H, change, index]
}

pub fn input(
    prev_hash: TxHash,
    amount: u64,
    script_type: InputScriptType,
    address_n: Vec<u32>,
) -> TxInput {
    TxInput {
        prev_hash,
        prev_index: 0,
        amount,
        script_type,
        address_n,
        multisig: None,
        sequence: SEQUENCE_FINAL,
        decred_tree: None,
        decred_staking_spend: None,
        orig_hash: None,
        orig_index: None,
        script_sig: None,
        witness: None,
        ownership_proof: None,
        commitment_data: None,
        script_pubkey: None,
    }
}

/// A one-output previous transaction paying `amount` to `script_pubkey`
pub fn funding_tx(script_pubkey: Vec<u8>, amount: u64) -> PrevTxData {
    PrevTxData {
        meta: PrevTx::new(1, 0, 1, 1),
        inputs: vec![PrevInput {
            prev_hash: [0x77; 32],
            prev_index: 0,
            script_sig: vec![0x51],
            sequence: SEQUENCE_FINAL,
            decred_tree: None,
        }],
        outputs: vec![PrevOutput {
            amount,
            script_pubkey,
            decred_script_version: None,
        }],
    }
}

/// Base58Check address with an arbitrary (possibly multi-byte) version
/// prefix
pub fn base58_address(prefix: &[u8], payload: &[u8; 20]) -> String {
    let mut body = prefix.to_vec();
    body.extend_from_slice(payload);
    let checksum = writers::sha256d_digest(&body);
    body.extend_from_slice(&checksum[..4]);
    bs58::encode(body).into_string()
}

pub fn reversed(mut hash: TxHash) -> TxHash {
    hash.reverse();
    hash
}

// =============================================================================
// Replacement scenario
// =============================================================================

/// A fee-bump scenario: a signed original (fee 5 000) and a replacement
/// spending the same input with the change output shrunk to
/// `new_change_amount`.
pub struct ReplacementFixture {
    pub host: MockHost,
    pub keys: TestKeyStore,
    pub orig_txid: TxHash,
    pub spent_script: Vec<u8>,
    pub p_in: Vec<u32>,
}

pub fn replacement_fixture(new_change_amount: u64) -> ReplacementFixture {
    let keys = TestKeyStore::new();
    let coin = CoinProfile::bitcoin();
    let p_in = bip44_path(44, 0, 0, 0);
    let p_change = bip44_path(44, 0, 1, 0);

    let spent_script = scripts::p2pkh_script(&scripts::hash160_digest(&keys.pubkey(&p_in)));
    let prev = funding_tx(spent_script.clone(), 390_000);
    let funding_txid = prev.txid(&coin);

    let payee_script = scripts::output_script_from_address(EATER, &coin).unwrap();
    let change_script = scripts::p2pkh_script(&scripts::hash160_digest(&keys.pubkey(&p_change)));

    // the original's signature, taken over the reference library's
    // legacy sighash of the unsigned original
    let unsigned = bitcoin::Transaction {
        version: bitcoin::transaction::Version::ONE,
        lock_time: bitcoin::absolute::LockTime::ZERO,
        input: vec![bitcoin::TxIn {
            previous_output: bitcoin::OutPoint {
                txid: bitcoin::Txid::from_byte_array(reversed(funding_txid)),
                vout: 0,
            },
            script_sig: bitcoin::ScriptBuf::new(),
            sequence: bitcoin::Sequence::from_consensus(0xffff_fffd),
            witness: bitcoin::Witness::new(),
        }],
        output: vec![
            bitcoin::TxOut {
                value: bitcoin::Amount::from_sat(370_000),
                script_pubkey: bitcoin::ScriptBuf::from_bytes(payee_script.clone()),
            },
            bitcoin::TxOut {
                value: bitcoin::Amount::from_sat(15_000),
                script_pubkey: bitcoin::ScriptBuf::from_bytes(change_script.clone()),
            },
        ],
    };
    let sighash = bitcoin::sighash::SighashCache::new(&unsigned)
        .legacy_signature_hash(0, bitcoin::Script::from_bytes(&spent_script), 1)
        .unwrap();
    // sign outside the key store so the session's signing-call counter
    // stays untouched
    let orig_sig = Secp256k1::new()
        .sign_ecdsa(
            &Message::from_digest(sighash.to_byte_array()),
            &keys.secret(&p_in),
        )
        .serialize_der()
        .to_vec();
    let orig_script_sig = scripts::p2pkh_script_sig(&orig_sig, 0x01, &keys.pubkey(&p_in));

    // txid of the signed original
    let mut buf = Vec::new();
    writers::write_tx_header(&mut buf, 1, None, None, false, 1);
    writers::write_tx_input(&mut buf, &funding_txid, 0, &orig_script_sig, 0xffff_fffd);
    writers::write_compact_size(&mut buf, 2);
    writers::write_tx_output(&mut buf, 370_000, &payee_script);
    writers::write_tx_output(&mut buf, 15_000, &change_script);
    writers::write_u32(&mut buf, 0);
    let orig_txid = reversed(writers::sha256d_digest(&buf));

    let mut orig_input = input(funding_txid, 390_000, InputScriptType::SpendAddress, p_in.clone());
    orig_input.sequence = 0xffff_fffd;
    orig_input.script_sig = Some(orig_script_sig);
    let orig = OrigTxData {
        meta: PrevTx::new(1, 0, 1, 2),
        inputs: vec![orig_input],
        outputs: vec![
            TxOutput::payable(EATER, 370_000),
            TxOutput::change(p_change.clone(), 15_000, OutputScriptType::PayToAddress),
        ],
    };

    // replacement records referencing the original
    let mut new_input = input(funding_txid, 390_000, InputScriptType::SpendAddress, p_in.clone());
    new_input.sequence = 0xffff_fffd;
    new_input.orig_hash = Some(orig_txid);
    new_input.orig_index = Some(0);
    let mut payee = TxOutput::payable(EATER, 370_000);
    payee.orig_hash = Some(orig_txid);
    payee.orig_index = Some(0);
    let mut change = TxOutput::change(p_change, new_change_amount, OutputScriptType::PayToAddress);
    change.orig_hash = Some(orig_txid);
    change.orig_index = Some(1);

    let mut host = MockHost::new(vec![new_input], vec![payee, change]);
    host.prev_txs.insert(funding_txid, prev);
    host.orig_txs.insert(orig_txid, orig);

    ReplacementFixture {
        host,
        keys,
        orig_txid,
        spent_script,
        p_in,
    }
}
