//! Derivation path policy
//!
//! Standardness of input paths and the change heuristic. A path that
//! fails these checks is not a hard error by itself: the caller raises
//! a warning prompt or fails closed depending on the safety level.

use crate::types::{InputScriptType, MultisigScript, TxOutput};

pub const HARDENED: u32 = 0x8000_0000;

/// Levels below the wallet root: change chain and address index
pub const BIP32_WALLET_DEPTH: usize = 2;
/// Highest change-chain value a change output may use
pub const BIP32_CHANGE_CHAIN: u32 = 1;
/// Highest address index a change output may use
pub const BIP32_MAX_LAST_ELEMENT: u32 = 1_000_000;

fn purpose(script_type: InputScriptType) -> &'static [u32] {
    match script_type {
        InputScriptType::SpendAddress => &[44 | HARDENED],
        InputScriptType::SpendMultisig => &[45 | HARDENED, 48 | HARDENED],
        InputScriptType::SpendP2shWitness => &[49 | HARDENED, 48 | HARDENED],
        InputScriptType::SpendWitness => &[84 | HARDENED, 48 | HARDENED],
        InputScriptType::SpendTaproot => &[86 | HARDENED],
        InputScriptType::External => &[],
    }
}

/// Whether the path matches the BIP-44 family template for its script
/// type: purpose'/coin'/account'/change/index, with a script-type level
/// after the account on purpose 48'.
pub fn path_is_standard(address_n: &[u32], script_type: InputScriptType, slip44: u32) -> bool {
    let purposes = purpose(script_type);
    if address_n.is_empty() || !purposes.contains(&address_n[0]) {
        return false;
    }
    let expected_len = if address_n[0] == 48 | HARDENED { 6 } else { 5 };
    if address_n.len() != expected_len {
        return false;
    }
    if address_n[1] != slip44 | HARDENED {
        return false;
    }
    // account must be hardened and small
    if address_n[2] & HARDENED == 0 || address_n[2] & !HARDENED > 100 {
        return false;
    }
    let change = address_n[expected_len - 2];
    let index = address_n[expected_len - 1];
    change <= BIP32_CHANGE_CHAIN && index <= BIP32_MAX_LAST_ELEMENT
}

/// The wallet root of a path: everything above change chain and index
pub fn wallet_path(address_n: &[u32]) -> &[u32] {
    if address_n.len() < BIP32_WALLET_DEPTH {
        address_n
    } else {
        &address_n[..address_n.len() - BIP32_WALLET_DEPTH]
    }
}

/// Change heuristic: the output path must sit under the same wallet
/// root as every internal input, stay on a change chain, and keep the
/// address index in wallet range. Multisig change must additionally
/// share the inputs' key-set fingerprint; that check is the caller's.
pub fn output_is_change(txo: &TxOutput, inputs_wallet_path: Option<&[u32]>) -> bool {
    if !txo.script_type.allows_change() || txo.address_n.is_empty() {
        return false;
    }
    let root = match inputs_wallet_path {
        Some(p) => p,
        // internal inputs disagree on their wallet root
        None => return false,
    };
    if txo.address_n.len() < BIP32_WALLET_DEPTH
        || &txo.address_n[..txo.address_n.len() - BIP32_WALLET_DEPTH] != root
    {
        return false;
    }
    let change = txo.address_n[txo.address_n.len() - 2];
    let index = txo.address_n[txo.address_n.len() - 1];
    change <= BIP32_CHANGE_CHAIN && index <= BIP32_MAX_LAST_ELEMENT
}

/// Multisig change must come from the same key set as the inputs
pub fn multisig_matches(
    output_multisig: Option<&MultisigScript>,
    inputs_fingerprint: Option<&[u8; 32]>,
) -> bool {
    match (output_multisig, inputs_fingerprint) {
        (None, None) => true,
        (Some(ms), Some(fp)) => crate::multisig::fingerprint(ms)
            .map(|out_fp| out_fp == *fp)
            .unwrap_or(false),
        _ => false,
    }
}
