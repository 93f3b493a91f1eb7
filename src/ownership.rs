//! SLIP-0019 ownership proofs
//!
//! An ownership proof demonstrates control of an input's key without a
//! full transaction signature. The proof body names ownership ids and
//! is signed with the same script machinery as a real spend, so the
//! signature check reuses `SignatureVerifier`.

use crate::error::{SignResult, SignerError};
use crate::types::TxHash;
use crate::verification::SignatureVerifier;
use crate::writers::{read_compact_size, sha256_digest, TxHasher, WriteBytes};

const VERSION_MAGIC: &[u8; 4] = b"SL\x00\x19";
const OWNERSHIP_ID_LEN: usize = 32;
const FLAG_USER_CONFIRMED: u8 = 0x01;

/// Parsed and signature-verified ownership proof
#[derive(Debug)]
pub struct OwnershipProof {
    pub flags: u8,
    pub ownership_ids: Vec<TxHash>,
}

impl OwnershipProof {
    pub fn user_confirmed(&self) -> bool {
        self.flags & FLAG_USER_CONFIRMED != 0
    }
}

/// Parse the proof, then check its signature over the proof body and
/// commitment data against the input's scriptPubKey.
pub fn verify_ownership_proof(
    proof: &[u8],
    script_pubkey: &[u8],
    commitment_data: &[u8],
) -> SignResult<OwnershipProof> {
    let bad_format = || SignerError::data_error("Unknown format of proof of ownership");

    if proof.len() < 5 || &proof[..4] != VERSION_MAGIC {
        return Err(bad_format());
    }
    let flags = proof[4];
    if flags & !FLAG_USER_CONFIRMED != 0 {
        return Err(SignerError::data_error("Unknown flags in proof of ownership"));
    }

    let mut offset = 5;
    let id_count = read_compact_size(proof, &mut offset)? as usize;
    let mut ownership_ids = Vec::with_capacity(id_count);
    for _ in 0..id_count {
        let id = proof
            .get(offset..offset + OWNERSHIP_ID_LEN)
            .ok_or_else(bad_format)?;
        let mut fixed = [0u8; 32];
        fixed.copy_from_slice(id);
        ownership_ids.push(fixed);
        offset += OWNERSHIP_ID_LEN;
    }

    // the signature commits to the proof body and the host's commitment
    let mut h = TxHasher::sha256();
    h.write(&proof[..offset]);
    h.write(commitment_data);
    let sighash = h.finalize(false);

    let script_sig_len = read_compact_size(proof, &mut offset)? as usize;
    let script_sig = proof
        .get(offset..offset + script_sig_len)
        .ok_or_else(bad_format)?;
    offset += script_sig_len;
    let witness = proof.get(offset..).ok_or_else(bad_format)?;

    let verifier = SignatureVerifier::new(
        script_pubkey,
        Some(script_sig).filter(|s| !s.is_empty()),
        Some(witness).filter(|w| !w.is_empty()),
    )?;
    verifier.verify(&sighash)?;

    Ok(OwnershipProof { flags, ownership_ids })
}

/// Ownership id of a script under a given proof key, per SLIP-0019
pub fn ownership_id(script_pubkey: &[u8], key_salt: &[u8]) -> TxHash {
    let mut h = TxHasher::sha256();
    h.write(key_salt);
    h.write(&sha256_digest(script_pubkey));
    h.finalize(false)
}
