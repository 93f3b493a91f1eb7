//! Hostile-host scenarios. The host controls every record it streams;
//! each test mounts one concrete attack and asserts that the session
//! aborts with the right error class and, crucially, that the key
//! store was never asked for a signature.

mod common;

use bitcoin::hashes::Hash;
use bitcoin::sighash::SighashCache;
use bitcoin::{Amount, EcdsaSighashType, Script, ScriptBuf, TxOut};
use secp256k1::{Message, Secp256k1, SecretKey};

use coldsign::coin::CoinProfile;
use coldsign::host::Prompt;
use coldsign::scripts;
use coldsign::types::{InputScriptType, SignRequest, TxOutput};
use coldsign::{sign_tx, ErrorCode, SessionConfig};

use common::*;

/// One internal P2PKH input of 390 000 sat plus a host with the
/// matching previous transaction registered.
fn p2pkh_session(keys: &TestKeyStore, output_amount: u64) -> MockHost {
    let coin = CoinProfile::bitcoin();
    let p_in = bip44_path(44, 0, 0, 0);
    let spent_script = scripts::p2pkh_script(&scripts::hash160_digest(&keys.pubkey(&p_in)));
    let prev = funding_tx(spent_script, 390_000);
    let funding_txid = prev.txid(&coin);

    let mut host = MockHost::new(
        vec![input(funding_txid, 390_000, InputScriptType::SpendAddress, p_in)],
        vec![TxOutput::payable(EATER, output_amount)],
    );
    host.prev_txs.insert(funding_txid, prev);
    host
}

#[test]
fn test_input_mutation_after_approval_aborts() {
    let keys = TestKeyStore::new();
    let mut host = p2pkh_session(&keys, 380_000);
    // first serve is approved, every later serve is inflated
    host.tamper_input_from_serve = Some((0, 2));

    let mut ui = RecordingUi::accepting();
    let err = sign_tx(
        SignRequest::new(1, 0, 1, 1),
        SessionConfig::new(CoinProfile::bitcoin()),
        &mut host,
        &mut ui,
        &keys,
    )
    .unwrap_err();

    assert_eq!(err.code, ErrorCode::ProcessError);
    assert_eq!(err.message, "Transaction has changed during signing");
    assert_eq!(keys.sign_calls.get(), 0);
    assert!(!host.finished);
}

#[test]
fn test_output_mutation_after_approval_aborts() {
    let keys = TestKeyStore::new();
    let mut host = p2pkh_session(&keys, 380_000);
    host.tamper_output_from_serve = Some((0, 2));

    let mut ui = RecordingUi::accepting();
    let err = sign_tx(
        SignRequest::new(1, 0, 1, 1),
        SessionConfig::new(CoinProfile::bitcoin()),
        &mut host,
        &mut ui,
        &keys,
    )
    .unwrap_err();

    assert_eq!(err.code, ErrorCode::ProcessError);
    assert_eq!(err.message, "Transaction has changed during signing");
    assert_eq!(keys.sign_calls.get(), 0);
}

#[test]
fn test_not_enough_funds_rejected_before_signing() {
    let keys = TestKeyStore::new();
    let mut host = p2pkh_session(&keys, 400_000);

    let mut ui = RecordingUi::accepting();
    let err = sign_tx(
        SignRequest::new(1, 0, 1, 1),
        SessionConfig::new(CoinProfile::bitcoin()),
        &mut host,
        &mut ui,
        &keys,
    )
    .unwrap_err();

    assert_eq!(err.code, ErrorCode::NotEnoughFunds);
    assert_eq!(keys.sign_calls.get(), 0);
    assert!(!host.finished);
}

#[test]
fn test_declined_output_cancels_session() {
    let keys = TestKeyStore::new();
    let mut host = p2pkh_session(&keys, 380_000);

    let mut ui = RecordingUi::declining_first();
    let err = sign_tx(
        SignRequest::new(1, 0, 1, 1),
        SessionConfig::new(CoinProfile::bitcoin()),
        &mut host,
        &mut ui,
        &keys,
    )
    .unwrap_err();

    assert!(err.is_user_declined());
    assert_eq!(err.message, "Payment cancelled");
    assert!(matches!(ui.seen[0], Prompt::ConfirmOutput { .. }));
    assert_eq!(keys.sign_calls.get(), 0);
}

#[test]
fn test_inflated_input_amount_rejected() {
    let keys = TestKeyStore::new();
    let mut host = p2pkh_session(&keys, 380_000);
    // the previous transaction still carries 390 000
    host.inputs[0].amount = 390_001;

    let mut ui = RecordingUi::accepting();
    let err = sign_tx(
        SignRequest::new(1, 0, 1, 1),
        SessionConfig::new(CoinProfile::bitcoin()),
        &mut host,
        &mut ui,
        &keys,
    )
    .unwrap_err();

    assert_eq!(err.code, ErrorCode::DataError);
    assert_eq!(err.message, "Invalid amount specified");
    assert_eq!(keys.sign_calls.get(), 0);
}

#[test]
fn test_forged_prev_tx_rejected() {
    let keys = TestKeyStore::new();
    let mut host = p2pkh_session(&keys, 380_000);
    // re-register the funding transaction under a hash it does not
    // actually have and reference that hash from the input
    let (_, prev) = host.prev_txs.drain().next().unwrap();
    host.prev_txs.insert([0xab; 32], prev);
    host.inputs[0].prev_hash = [0xab; 32];

    let mut ui = RecordingUi::accepting();
    let err = sign_tx(
        SignRequest::new(1, 0, 1, 1),
        SessionConfig::new(CoinProfile::bitcoin()),
        &mut host,
        &mut ui,
        &keys,
    )
    .unwrap_err();

    assert_eq!(err.code, ErrorCode::DataError);
    assert_eq!(err.message, "Encountered invalid prev_hash");
    assert_eq!(keys.sign_calls.get(), 0);
}

#[test]
fn test_taproot_amount_checked_in_mixed_sessions() {
    let keys = TestKeyStore::new();
    let coin = CoinProfile::bitcoin();
    let p_legacy = bip44_path(44, 0, 0, 0);
    let p_tr = bip44_path(86, 0, 0, 0);

    let legacy_script =
        scripts::p2pkh_script(&scripts::hash160_digest(&keys.pubkey(&p_legacy)));
    let legacy_prev = funding_tx(legacy_script, 390_000);
    let legacy_txid = legacy_prev.txid(&coin);

    // the taproot UTXO really carries 1 000 sat; the host claims 100 000
    let output_key = scripts::taproot_output_key(&keys.pubkey(&p_tr)).unwrap();
    let tr_prev = funding_tx(scripts::p2tr_script(&output_key), 1_000);
    let tr_txid = tr_prev.txid(&coin);

    let mut host = MockHost::new(
        vec![
            input(legacy_txid, 390_000, InputScriptType::SpendAddress, p_legacy),
            input(tr_txid, 100_000, InputScriptType::SpendTaproot, p_tr),
        ],
        vec![TxOutput::payable(EATER, 470_000)],
    );
    host.prev_txs.insert(legacy_txid, legacy_prev);
    host.prev_txs.insert(tr_txid, tr_prev);

    let mut ui = RecordingUi::accepting();
    let err = sign_tx(
        SignRequest::new(1, 0, 2, 1),
        SessionConfig::new(coin),
        &mut host,
        &mut ui,
        &keys,
    )
    .unwrap_err();

    assert_eq!(err.code, ErrorCode::DataError);
    assert_eq!(err.message, "Invalid amount specified");
    assert_eq!(keys.sign_calls.get(), 0);
    assert!(!host.finished);
}

#[test]
fn test_external_input_without_proof_rejected() {
    let keys = TestKeyStore::new();
    let coin = CoinProfile::bitcoin();

    let ext_script = scripts::p2pkh_script(&[0x5e; 20]);
    let prev = funding_tx(ext_script.clone(), 390_000);
    let funding_txid = prev.txid(&coin);

    let mut ext = input(funding_txid, 390_000, InputScriptType::External, vec![]);
    ext.script_pubkey = Some(ext_script);
    let mut host = MockHost::new(vec![ext], vec![TxOutput::payable(EATER, 380_000)]);
    host.prev_txs.insert(funding_txid, prev);

    let mut ui = RecordingUi::accepting();
    let err = sign_tx(
        SignRequest::new(1, 0, 1, 1),
        SessionConfig::new(coin),
        &mut host,
        &mut ui,
        &keys,
    )
    .unwrap_err();

    assert_eq!(err.code, ErrorCode::DataError);
    assert_eq!(err.message, "Invalid external input");
    assert_eq!(keys.sign_calls.get(), 0);
}

#[test]
fn test_presigned_input_with_invalid_signature_rejected() {
    let keys = TestKeyStore::new();
    let secp = Secp256k1::new();
    let coin = CoinProfile::bitcoin();
    let p_in = bip44_path(84, 0, 0, 0);

    let own_script = scripts::p2wpkh_script(&scripts::hash160_digest(&keys.pubkey(&p_in)));
    let own_prev = funding_tx(own_script, 390_000);
    let own_txid = own_prev.txid(&coin);

    let ext_sk = SecretKey::from_slice(&[0x33; 32]).unwrap();
    let ext_pk = secp256k1::PublicKey::from_secret_key(&secp, &ext_sk)
        .serialize()
        .to_vec();
    let ext_script = scripts::p2wpkh_script(&scripts::hash160_digest(&ext_pk));
    let ext_prev = funding_tx(ext_script.clone(), 50_000);
    let ext_txid = ext_prev.txid(&coin);

    // a real signature by the right key, but over the wrong digest
    let stray_sig = secp
        .sign_ecdsa(&Message::from_digest([0x42; 32]), &ext_sk)
        .serialize_der()
        .to_vec();
    let mut ext = input(ext_txid, 50_000, InputScriptType::External, vec![]);
    ext.script_pubkey = Some(ext_script);
    ext.witness = Some(scripts::witness_p2wpkh(&stray_sig, 0x01, &ext_pk));

    let mut host = MockHost::new(
        vec![
            input(own_txid, 390_000, InputScriptType::SpendWitness, p_in),
            ext,
        ],
        vec![TxOutput::payable(EATER, 430_000)],
    );
    host.prev_txs.insert(own_txid, own_prev);
    host.prev_txs.insert(ext_txid, ext_prev);

    let mut ui = RecordingUi::accepting();
    let err = sign_tx(
        SignRequest::new(1, 0, 2, 1),
        SessionConfig::new(coin),
        &mut host,
        &mut ui,
        &keys,
    )
    .unwrap_err();

    assert_eq!(err.code, ErrorCode::DataError);
    assert_eq!(err.message, "Invalid signature");
    assert_eq!(keys.sign_calls.get(), 0);
}

#[test]
fn test_replacement_fee_decrease_rejected() {
    // original change is 15 000; raising it to 16 000 lowers the fee
    let ReplacementFixture {
        mut host, keys, ..
    } = replacement_fixture(16_000);

    let mut ui = RecordingUi::accepting();
    let err = sign_tx(
        SignRequest::new(1, 0, 1, 2),
        SessionConfig::new(CoinProfile::bitcoin()),
        &mut host,
        &mut ui,
        &keys,
    )
    .unwrap_err();

    assert_eq!(err.code, ErrorCode::ProcessError);
    assert_eq!(
        err.message,
        "Fee cannot be decreased in a replacement transaction"
    );
    assert_eq!(keys.sign_calls.get(), 0);
    assert!(!host.finished);
}

#[test]
fn test_presigned_input_with_valid_signature_accepted() {
    let keys = TestKeyStore::new();
    let secp = Secp256k1::new();
    let coin = CoinProfile::bitcoin();
    let p_in = bip44_path(84, 0, 0, 0);

    let own_script = scripts::p2wpkh_script(&scripts::hash160_digest(&keys.pubkey(&p_in)));
    let own_prev = funding_tx(own_script, 390_000);
    let own_txid = own_prev.txid(&coin);

    let ext_sk = SecretKey::from_slice(&[0x33; 32]).unwrap();
    let ext_pk = secp256k1::PublicKey::from_secret_key(&secp, &ext_sk)
        .serialize()
        .to_vec();
    let ext_script = scripts::p2wpkh_script(&scripts::hash160_digest(&ext_pk));
    let ext_prev = funding_tx(ext_script.clone(), 50_000);
    let ext_txid = ext_prev.txid(&coin);

    let payee_script = scripts::output_script_from_address(EATER, &coin).unwrap();

    // sign the external input over the final transaction shape
    let skeleton = bitcoin::Transaction {
        version: bitcoin::transaction::Version::ONE,
        lock_time: bitcoin::absolute::LockTime::ZERO,
        input: vec![
            bitcoin::TxIn {
                previous_output: bitcoin::OutPoint {
                    txid: bitcoin::Txid::from_byte_array(reversed(own_txid)),
                    vout: 0,
                },
                script_sig: ScriptBuf::new(),
                sequence: bitcoin::Sequence::MAX,
                witness: bitcoin::Witness::new(),
            },
            bitcoin::TxIn {
                previous_output: bitcoin::OutPoint {
                    txid: bitcoin::Txid::from_byte_array(reversed(ext_txid)),
                    vout: 0,
                },
                script_sig: ScriptBuf::new(),
                sequence: bitcoin::Sequence::MAX,
                witness: bitcoin::Witness::new(),
            },
        ],
        output: vec![TxOut {
            value: Amount::from_sat(430_000),
            script_pubkey: ScriptBuf::from_bytes(payee_script),
        }],
    };
    let sighash = SighashCache::new(&skeleton)
        .p2wpkh_signature_hash(
            1,
            Script::from_bytes(&ext_script),
            Amount::from_sat(50_000),
            EcdsaSighashType::All,
        )
        .unwrap();
    let ext_sig = secp
        .sign_ecdsa(&Message::from_digest(sighash.to_byte_array()), &ext_sk)
        .serialize_der()
        .to_vec();

    let mut ext = input(ext_txid, 50_000, InputScriptType::External, vec![]);
    ext.script_pubkey = Some(ext_script);
    ext.witness = Some(scripts::witness_p2wpkh(&ext_sig, 0x01, &ext_pk));

    let mut host = MockHost::new(
        vec![
            input(own_txid, 390_000, InputScriptType::SpendWitness, p_in),
            ext,
        ],
        vec![TxOutput::payable(EATER, 430_000)],
    );
    host.prev_txs.insert(own_txid, own_prev);
    host.prev_txs.insert(ext_txid, ext_prev);

    let mut ui = RecordingUi::accepting();
    let signed = sign_tx(
        SignRequest::new(1, 0, 2, 1),
        SessionConfig::new(coin),
        &mut host,
        &mut ui,
        &keys,
    )
    .unwrap();

    assert!(host.finished);
    assert!(signed.signatures[0].is_some());
    assert!(signed.signatures[1].is_none());
    // the external witness is carried through unchanged
    let tx: bitcoin::Transaction =
        bitcoin::consensus::encode::deserialize(&signed.serialized_tx).unwrap();
    assert_eq!(
        &tx.input[1].witness.nth(0).unwrap()[..ext_sig.len()],
        ext_sig.as_slice()
    );
}
