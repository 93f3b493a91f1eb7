//! Multisig key-set resolution
//!
//! The host declares participant keys either as raw compressed pubkeys
//! or as xpubs plus a shared non-hardened suffix. Both resolve to an
//! ordered list of leaf pubkeys; the order is part of the script and is
//! never changed here.

use crate::error::{SignResult, SignerError};
use crate::types::{KeySource, MultisigScript};
use crate::writers::{self, TxHasher, WriteBytes};
use bitcoin::bip32::{ChildNumber, Xpub};
use secp256k1::Secp256k1;
use std::str::FromStr;

/// Resolve the declared key set to ordered compressed pubkeys
pub fn resolve_pubkeys(multisig: &MultisigScript) -> SignResult<Vec<Vec<u8>>> {
    let pubkeys = match &multisig.key_source {
        KeySource::Pubkeys(keys) => {
            for key in keys {
                if key.len() != 33 {
                    return Err(SignerError::data_error("Invalid multisig public key"));
                }
            }
            keys.clone()
        }
        KeySource::Xpubs(descriptors) => {
            let secp = Secp256k1::verification_only();
            let mut keys = Vec::with_capacity(descriptors.len());
            for desc in descriptors {
                let node = Xpub::from_str(&desc.xpub)
                    .map_err(|_| SignerError::data_error("Invalid xpub in multisig script"))?;
                let path: Vec<ChildNumber> = desc
                    .address_n
                    .iter()
                    .map(|n| ChildNumber::from_normal_idx(*n))
                    .collect::<Result<_, _>>()
                    .map_err(|_| {
                        SignerError::data_error("Hardened derivation from xpub")
                    })?;
                let leaf = node.derive_pub(&secp, &path)?;
                keys.push(leaf.public_key.serialize().to_vec());
            }
            keys
        }
    };

    if multisig.m == 0 || multisig.m as usize > pubkeys.len() || pubkeys.len() > 15 {
        return Err(SignerError::data_error("Invalid multisig parameters"));
    }
    Ok(pubkeys)
}

/// Position of the device's key within the script's key order
pub fn pubkey_index(resolved: &[Vec<u8>], our_pubkey: &[u8]) -> SignResult<usize> {
    resolved
        .iter()
        .position(|k| k == our_pubkey)
        .ok_or_else(|| SignerError::data_error("Pubkey not found in multisig script"))
}

/// Order-independent identity of a multisig wallet, used to decide
/// whether a change output belongs to the same key set as the inputs.
/// Keys are sorted before hashing so participant order does not matter.
pub fn fingerprint(multisig: &MultisigScript) -> SignResult<[u8; 32]> {
    let mut keys = resolve_pubkeys(multisig)?;
    let n = keys.len();
    keys.sort();

    let mut hasher = TxHasher::sha256();
    writers::write_u32(&mut hasher, multisig.m);
    writers::write_u32(&mut hasher, n as u32);
    for key in &keys {
        hasher.write(key);
    }
    Ok(hasher.finalize(false))
}
