//! Script assembly and address decoding
//!
//! Builds every scriptPubKey, scriptSig and witness shape the signer
//! emits, and decodes payee addresses into output scripts. Multisig
//! participant keys arrive here already resolved to compressed pubkeys.
//!
//! Base58 prefixes are matched with minimal big-endian encoding so the
//! two-byte prefixes of Decred and Zcash work unchanged.

use crate::coin::CoinProfile;
use crate::error::{SignResult, SignerError};
use crate::types::{InputScriptType, MultisigScript, OutputScriptType, TxOutput};
use crate::writers::{self, sha256d_digest, TxHasher, WriteBytes};
use bitcoin::hashes::{hash160, Hash};
use secp256k1::{Scalar, Secp256k1, XOnlyPublicKey};

const OP_0: u8 = 0x00;
const OP_1: u8 = 0x51;
const OP_RETURN: u8 = 0x6a;
const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKMULTISIG: u8 = 0xae;

pub fn hash160_digest(data: &[u8]) -> [u8; 20] {
    hash160::Hash::hash(data).to_byte_array()
}

// =============================================================================
// Address decoding
// =============================================================================

/// Minimal big-endian encoding of a base58 version prefix
fn version_prefix(address_type: u32) -> Vec<u8> {
    let bytes = address_type.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(3);
    bytes[skip..].to_vec()
}

/// Base58Check-decode and strip the expected version prefix
fn base58_payload(address: &str, address_type: u32) -> SignResult<Option<Vec<u8>>> {
    let raw = bs58::decode(address)
        .into_vec()
        .map_err(|_| SignerError::data_error("Invalid address"))?;
    if raw.len() < 5 {
        return Err(SignerError::data_error("Invalid address"));
    }
    let (body, checksum) = raw.split_at(raw.len() - 4);
    if sha256d_digest(body)[..4] != *checksum {
        return Err(SignerError::data_error("Invalid address checksum"));
    }
    let prefix = version_prefix(address_type);
    if body.len() <= prefix.len() || !body.starts_with(&prefix) {
        return Ok(None);
    }
    Ok(Some(body[prefix.len()..].to_vec()))
}

/// Decode a payee address into its scriptPubKey
pub fn output_script_from_address(address: &str, coin: &CoinProfile) -> SignResult<Vec<u8>> {
    if let Some(hrp) = &coin.bech32_hrp {
        if address.len() > hrp.len() + 1
            && address[..hrp.len()].eq_ignore_ascii_case(hrp)
            && address.as_bytes()[hrp.len()] == b'1'
        {
            return bech32_output_script(address, hrp, coin);
        }
    }

    if let Some(pubkey_hash) = base58_payload(address, coin.address_type)? {
        if pubkey_hash.len() != 20 {
            return Err(SignerError::data_error("Invalid address"));
        }
        return Ok(p2pkh_script(&pubkey_hash));
    }
    if let Some(script_hash) = base58_payload(address, coin.address_type_p2sh)? {
        if script_hash.len() != 20 {
            return Err(SignerError::data_error("Invalid address"));
        }
        return Ok(p2sh_script(&script_hash));
    }
    Err(SignerError::data_error("Invalid address type"))
}

fn bech32_output_script(address: &str, hrp: &str, coin: &CoinProfile) -> SignResult<Vec<u8>> {
    use bech32::FromBase32;

    let (decoded_hrp, data, variant) =
        bech32::decode(address).map_err(|_| SignerError::data_error("Invalid address"))?;
    if !decoded_hrp.eq_ignore_ascii_case(hrp) || data.is_empty() {
        return Err(SignerError::data_error("Invalid address"));
    }
    let version = data[0].to_u8();
    let program = Vec::<u8>::from_base32(&data[1..])
        .map_err(|_| SignerError::data_error("Invalid address"))?;

    match version {
        0 => {
            if variant != bech32::Variant::Bech32 || !matches!(program.len(), 20 | 32) {
                return Err(SignerError::data_error("Invalid address"));
            }
        }
        1 => {
            if variant != bech32::Variant::Bech32m || program.len() != 32 || !coin.taproot {
                return Err(SignerError::data_error("Invalid address"));
            }
        }
        _ => return Err(SignerError::data_error("Invalid address witness program")),
    }

    let mut script = Vec::with_capacity(2 + program.len());
    script.push(if version == 0 { OP_0 } else { OP_1 + version - 1 });
    writers::write_op_push(&mut script, program.len());
    script.write(&program);
    Ok(script)
}

// =============================================================================
// scriptPubKey builders
// =============================================================================

pub fn p2pkh_script(pubkey_hash: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    writers::write_op_push(&mut script, pubkey_hash.len());
    script.write(pubkey_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

pub fn p2sh_script(script_hash: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.push(OP_HASH160);
    writers::write_op_push(&mut script, script_hash.len());
    script.write(script_hash);
    script.push(OP_EQUAL);
    script
}

pub fn p2wpkh_script(pubkey_hash: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(22);
    script.push(OP_0);
    writers::write_op_push(&mut script, pubkey_hash.len());
    script.write(pubkey_hash);
    script
}

pub fn p2wsh_script(script_hash: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(34);
    script.push(OP_0);
    writers::write_op_push(&mut script, script_hash.len());
    script.write(script_hash);
    script
}

pub fn p2tr_script(output_key: &[u8; 32]) -> Vec<u8> {
    let mut script = Vec::with_capacity(34);
    script.push(OP_1);
    writers::write_op_push(&mut script, 32);
    script.write(output_key);
    script
}

pub fn op_return_script(data: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(2 + data.len());
    script.push(OP_RETURN);
    writers::write_op_push(&mut script, data.len());
    script.write(data);
    script
}

/// BIP-341 key-path output key: the internal key tweaked with the
/// TapTweak hash of itself (no script tree)
pub fn taproot_output_key(internal_pubkey: &[u8]) -> SignResult<[u8; 32]> {
    let xonly = if internal_pubkey.len() == 33 {
        XOnlyPublicKey::from_slice(&internal_pubkey[1..])?
    } else {
        XOnlyPublicKey::from_slice(internal_pubkey)?
    };

    let mut hasher = TxHasher::tagged("TapTweak");
    hasher.write(&xonly.serialize());
    let tweak = Scalar::from_be_bytes(hasher.finalize(false))
        .map_err(|_| SignerError::data_error("Invalid taproot tweak"))?;

    let secp = Secp256k1::verification_only();
    let (output_key, _parity) = xonly.add_tweak(&secp, &tweak)?;
    Ok(output_key.serialize())
}

/// Sorted-less multisig redeem script: OP_m <pubkeys> OP_n OP_CHECKMULTISIG,
/// keys in host-declared order
pub fn multisig_redeem_script(pubkeys: &[Vec<u8>], m: u32) -> SignResult<Vec<u8>> {
    let n = pubkeys.len() as u32;
    if m == 0 || m > n || n > 15 {
        return Err(SignerError::data_error("Invalid multisig parameters"));
    }
    let mut script = Vec::new();
    script.push(OP_1 + (m as u8 - 1));
    for pubkey in pubkeys {
        writers::write_op_push(&mut script, pubkey.len());
        script.write(pubkey);
    }
    script.push(OP_1 + (n as u8 - 1));
    script.push(OP_CHECKMULTISIG);
    Ok(script)
}

/// scriptPubKey of the output an input of the given type spends
pub fn input_script_pubkey(
    script_type: InputScriptType,
    pubkey: &[u8],
    multisig: Option<&MultisigScript>,
    resolved_pubkeys: Option<&[Vec<u8>]>,
) -> SignResult<Vec<u8>> {
    match script_type {
        InputScriptType::SpendAddress => Ok(p2pkh_script(&hash160_digest(pubkey))),
        InputScriptType::SpendWitness => match multisig {
            None => Ok(p2wpkh_script(&hash160_digest(pubkey))),
            Some(ms) => {
                let keys = resolved_pubkeys
                    .ok_or_else(|| SignerError::process_error("Multisig keys not resolved"))?;
                let redeem = multisig_redeem_script(keys, ms.m)?;
                Ok(p2wsh_script(&crate::writers::sha256_digest(&redeem)))
            }
        },
        InputScriptType::SpendP2shWitness => {
            let inner = match multisig {
                None => p2wpkh_script(&hash160_digest(pubkey)),
                Some(ms) => {
                    let keys = resolved_pubkeys
                        .ok_or_else(|| SignerError::process_error("Multisig keys not resolved"))?;
                    let redeem = multisig_redeem_script(keys, ms.m)?;
                    p2wsh_script(&crate::writers::sha256_digest(&redeem))
                }
            };
            Ok(p2sh_script(&hash160_digest(&inner)))
        }
        InputScriptType::SpendMultisig => {
            let ms = multisig
                .ok_or_else(|| SignerError::data_error("Multisig details required."))?;
            let keys = resolved_pubkeys
                .ok_or_else(|| SignerError::process_error("Multisig keys not resolved"))?;
            let redeem = multisig_redeem_script(keys, ms.m)?;
            Ok(p2sh_script(&hash160_digest(&redeem)))
        }
        InputScriptType::SpendTaproot => Ok(p2tr_script(&taproot_output_key(pubkey)?)),
        InputScriptType::External => {
            Err(SignerError::process_error("External input has no derived script"))
        }
    }
}

/// scriptPubKey for a change output, derived from the device's own key
pub fn change_output_script(
    script_type: OutputScriptType,
    pubkey: &[u8],
    multisig: Option<&MultisigScript>,
    resolved_pubkeys: Option<&[Vec<u8>]>,
) -> SignResult<Vec<u8>> {
    let input_type = script_type
        .change_input_type()
        .ok_or_else(|| SignerError::data_error("Invalid change script type"))?;
    input_script_pubkey(input_type, pubkey, multisig, resolved_pubkeys)
}

/// scriptPubKey for any output of the transaction under construction
pub fn derive_output_script(
    txo: &TxOutput,
    coin: &CoinProfile,
    change_pubkey: Option<&[u8]>,
    resolved_pubkeys: Option<&[Vec<u8>]>,
) -> SignResult<Vec<u8>> {
    if txo.script_type == OutputScriptType::PayToOpReturn {
        let data = txo
            .op_return_data
            .as_deref()
            .ok_or_else(|| SignerError::data_error("OP_RETURN output without op_return_data"))?;
        return Ok(op_return_script(data));
    }
    if let Some(address) = &txo.address {
        return output_script_from_address(address, coin);
    }
    let pubkey = change_pubkey
        .ok_or_else(|| SignerError::process_error("Change key not derived"))?;
    change_output_script(txo.script_type, pubkey, txo.multisig.as_ref(), resolved_pubkeys)
}

// =============================================================================
// scriptSig and witness assembly
// =============================================================================

/// sig+hashtype followed by pubkey
pub fn p2pkh_script_sig(signature: &[u8], hash_type: u8, pubkey: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(signature.len() + pubkey.len() + 3);
    writers::write_op_push(&mut script, signature.len() + 1);
    script.write(signature);
    script.push(hash_type);
    writers::write_op_push(&mut script, pubkey.len());
    script.write(pubkey);
    script
}

/// OP_0, each signature, then the redeem script. Missing co-signer
/// slots are skipped; CHECKMULTISIG only sees the provided signatures.
pub fn multisig_script_sig(signatures: &[Vec<u8>], hash_type: u8, redeem_script: &[u8]) -> Vec<u8> {
    let mut script = Vec::new();
    // off-by-one bug in CHECKMULTISIG consumes an extra stack item
    script.push(OP_0);
    for sig in signatures.iter().filter(|s| !s.is_empty()) {
        writers::write_op_push(&mut script, sig.len() + 1);
        script.write(sig);
        script.push(hash_type);
    }
    writers::write_op_push(&mut script, redeem_script.len());
    script.write(redeem_script);
    script
}

/// scriptSig of a P2SH-wrapped segwit input: a single push of the
/// witness program
pub fn p2sh_witness_script_sig(witness_program: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(witness_program.len() + 1);
    writers::write_op_push(&mut script, witness_program.len());
    script.write(witness_program);
    script
}

/// Serialized witness stack for a P2WPKH spend
pub fn witness_p2wpkh(signature: &[u8], hash_type: u8, pubkey: &[u8]) -> Vec<u8> {
    let mut w = Vec::new();
    writers::write_compact_size(&mut w, 2);
    writers::write_compact_size(&mut w, signature.len() + 1);
    w.write(signature);
    w.push(hash_type);
    writers::write_bytes_prefixed(&mut w, pubkey);
    w
}

/// Serialized witness stack for a P2WSH multisig spend
pub fn witness_multisig(
    signatures: &[Vec<u8>],
    hash_type: u8,
    witness_script: &[u8],
) -> Vec<u8> {
    let present: Vec<&Vec<u8>> = signatures.iter().filter(|s| !s.is_empty()).collect();
    let mut w = Vec::new();
    writers::write_compact_size(&mut w, present.len() + 2);
    writers::write_compact_size(&mut w, 0);
    for sig in present {
        writers::write_compact_size(&mut w, sig.len() + 1);
        w.write(sig);
        w.push(hash_type);
    }
    writers::write_bytes_prefixed(&mut w, witness_script);
    w
}

/// Serialized witness stack for a taproot key-path spend. The default
/// hash type is implied by a 64-byte signature.
pub fn witness_p2tr(signature: &[u8], hash_type: u8) -> Vec<u8> {
    let mut w = Vec::new();
    writers::write_compact_size(&mut w, 1);
    if hash_type == 0 {
        writers::write_bytes_prefixed(&mut w, signature);
    } else {
        writers::write_compact_size(&mut w, signature.len() + 1);
        w.write(signature);
        w.push(hash_type);
    }
    w
}

/// Empty witness stack marker for non-segwit inputs in a segwit tx
pub fn witness_empty() -> Vec<u8> {
    vec![0]
}
