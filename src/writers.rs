//! Wire-format primitives and incremental hashing
//!
//! All transaction bytes, whether destined for the host or for a
//! digest, go through the helpers in this module. Serialization targets
//! anything implementing `WriteBytes`, so the same record writers feed
//! plain buffers and running hashes alike.

use crate::error::{SignResult, SignerError};
use crate::types::{PrevInput, PrevOutput, TxHash, TxInput};
use bitcoin::hashes::{sha256, Hash, HashEngine};
use blake_hash::Digest;

/// Sink for serialized transaction bytes
pub trait WriteBytes {
    fn write(&mut self, bytes: &[u8]);
}

impl WriteBytes for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

// =============================================================================
// Incremental hashing
// =============================================================================

/// Running digest over serialized transaction data. One constructor per
/// digest family used by the supported chains.
#[derive(Clone)]
pub enum TxHasher {
    Sha256(sha256::HashEngine),
    Blake2b(blake2_rfc::blake2b::Blake2b),
    Blake256(blake_hash::Blake256),
}

impl TxHasher {
    pub fn sha256() -> Self {
        Self::Sha256(sha256::HashEngine::default())
    }

    /// BIP-340 tagged hash: SHA256(SHA256(tag) || SHA256(tag) || data)
    pub fn tagged(tag: &str) -> Self {
        let tag_hash = sha256::Hash::hash(tag.as_bytes());
        let mut engine = sha256::HashEngine::default();
        engine.input(tag_hash.as_byte_array());
        engine.input(tag_hash.as_byte_array());
        Self::Sha256(engine)
    }

    /// 32-byte BLAKE2b with a 16-byte personalization (Zcash). The
    /// personalization occupies words 6 and 7 of the BLAKE2b parameter
    /// block; word 0 packs digest length 32, fanout 1 and depth 1.
    pub fn blake2b_personal(personal: &[u8; 16]) -> Self {
        let mut params = [0u64; 8];
        params[0] = 32 | (1 << 16) | (1 << 24);
        let mut word = [0u8; 8];
        word.copy_from_slice(&personal[..8]);
        params[6] = u64::from_le_bytes(word);
        word.copy_from_slice(&personal[8..]);
        params[7] = u64::from_le_bytes(word);
        Self::Blake2b(blake2_rfc::blake2b::Blake2b::with_parameter_block(&params))
    }

    /// BLAKE-256 (Decred)
    pub fn blake256() -> Self {
        Self::Blake256(blake_hash::Blake256::new())
    }

    /// Digest of everything written so far, without consuming the
    /// accumulator. Used where one running hash feeds many preimages.
    pub fn digest(&self, double: bool) -> TxHash {
        self.clone().finalize(double)
    }

    /// Finish the digest. `double` re-hashes the result once more with
    /// the same primitive (txids on SHA256 chains; never used for
    /// tagged, BLAKE2b or BLAKE-256 digests).
    pub fn finalize(self, double: bool) -> TxHash {
        let mut out = [0u8; 32];
        match self {
            Self::Sha256(engine) => {
                let first = sha256::Hash::from_engine(engine);
                if double {
                    out.copy_from_slice(sha256::Hash::hash(first.as_byte_array()).as_byte_array());
                } else {
                    out.copy_from_slice(first.as_byte_array());
                }
            }
            Self::Blake2b(state) => {
                out.copy_from_slice(state.finalize().as_bytes());
            }
            Self::Blake256(state) => {
                let first = state.finalize();
                if double {
                    let mut again = blake_hash::Blake256::new();
                    again.update(&first);
                    out.copy_from_slice(&again.finalize());
                } else {
                    out.copy_from_slice(&first);
                }
            }
        }
        out
    }
}

impl WriteBytes for TxHasher {
    fn write(&mut self, bytes: &[u8]) {
        match self {
            Self::Sha256(engine) => engine.input(bytes),
            Self::Blake2b(state) => state.update(bytes),
            Self::Blake256(state) => state.update(bytes),
        }
    }
}

/// One-shot SHA256
pub fn sha256_digest(data: &[u8]) -> TxHash {
    let mut out = [0u8; 32];
    out.copy_from_slice(sha256::Hash::hash(data).as_byte_array());
    out
}

/// One-shot double SHA256
pub fn sha256d_digest(data: &[u8]) -> TxHash {
    let first = sha256_digest(data);
    sha256_digest(&first)
}

// =============================================================================
// Integer and byte-string encodings
// =============================================================================

pub fn write_u16<W: WriteBytes>(w: &mut W, n: u16) {
    w.write(&n.to_le_bytes());
}

pub fn write_u32<W: WriteBytes>(w: &mut W, n: u32) {
    w.write(&n.to_le_bytes());
}

pub fn write_u64<W: WriteBytes>(w: &mut W, n: u64) {
    w.write(&n.to_le_bytes());
}

/// Bitcoin CompactSize encoding
pub fn write_compact_size<W: WriteBytes>(w: &mut W, n: usize) {
    if n < 0xfd {
        w.write(&[n as u8]);
    } else if n <= 0xffff {
        w.write(&[0xfd]);
        write_u16(w, n as u16);
    } else if n <= 0xffff_ffff {
        w.write(&[0xfe]);
        write_u32(w, n as u32);
    } else {
        w.write(&[0xff]);
        write_u64(w, n as u64);
    }
}

pub fn write_bytes_prefixed<W: WriteBytes>(w: &mut W, bytes: &[u8]) {
    write_compact_size(w, bytes.len());
    w.write(bytes);
}

/// Hashes travel in display order; serialization wants them reversed
pub fn write_bytes_reversed<W: WriteBytes>(w: &mut W, bytes: &[u8]) {
    let reversed: Vec<u8> = bytes.iter().rev().copied().collect();
    w.write(&reversed);
}

/// Minimal data push for script assembly
pub fn write_op_push<W: WriteBytes>(w: &mut W, n: usize) {
    if n < 0x4c {
        w.write(&[n as u8]);
    } else if n <= 0xff {
        w.write(&[0x4c, n as u8]);
    } else if n <= 0xffff {
        w.write(&[0x4d]);
        write_u16(w, n as u16);
    } else {
        w.write(&[0x4e]);
        write_u32(w, n as u32);
    }
}

// =============================================================================
// Record writers
// =============================================================================

/// Input in on-chain serialization, with the given script_sig
pub fn write_tx_input<W: WriteBytes>(w: &mut W, prev_hash: &TxHash, prev_index: u32, script_sig: &[u8], sequence: u32) {
    write_bytes_reversed(w, prev_hash);
    write_u32(w, prev_index);
    write_bytes_prefixed(w, script_sig);
    write_u32(w, sequence);
}

/// Previous-tx input exactly as it appeared on chain
pub fn write_prev_input<W: WriteBytes>(w: &mut W, txi: &PrevInput) {
    write_tx_input(w, &txi.prev_hash, txi.prev_index, &txi.script_sig, txi.sequence);
}

/// Decred input serialization: the tree byte replaces the script, which
/// lives in the witness half of the transaction.
pub fn write_tx_input_decred<W: WriteBytes>(w: &mut W, prev_hash: &TxHash, prev_index: u32, tree: u32, sequence: u32) {
    write_bytes_reversed(w, prev_hash);
    write_u32(w, prev_index);
    w.write(&[tree as u8]);
    write_u32(w, sequence);
}

/// Output in on-chain serialization
pub fn write_tx_output<W: WriteBytes>(w: &mut W, amount: u64, script_pubkey: &[u8]) {
    write_u64(w, amount);
    write_bytes_prefixed(w, script_pubkey);
}

/// Previous-tx output exactly as it appeared on chain. Decred outputs
/// carry a script version between amount and script.
pub fn write_prev_output<W: WriteBytes>(w: &mut W, txo: &PrevOutput, decred: bool) {
    write_u64(w, txo.amount);
    if decred {
        write_u16(w, txo.decred_script_version.unwrap_or(0));
    }
    write_bytes_prefixed(w, &txo.script_pubkey);
}

/// Every field of an input that the host could mutate between passes,
/// in a fixed order. Digesting these across passes is what detects
/// mid-session tampering.
pub fn write_tx_input_check<W: WriteBytes>(w: &mut W, txi: &TxInput) {
    w.write(&txi.prev_hash);
    write_u32(w, txi.prev_index);
    write_u32(w, txi.script_type as u32);
    write_u32(w, txi.address_n.len() as u32);
    for n in &txi.address_n {
        write_u32(w, *n);
    }
    write_u32(w, txi.sequence);
    write_u64(w, txi.amount);
    write_bytes_prefixed(w, txi.script_pubkey.as_deref().unwrap_or(&[]));
}

/// Version words plus input count, i.e. everything that precedes the
/// first input on the wire. Zcash sets the Overwinter flag bit and
/// appends the version group id.
pub fn write_tx_header<W: WriteBytes>(
    w: &mut W,
    version: u32,
    timestamp: Option<u32>,
    version_group_id: Option<u32>,
    overwintered: bool,
    inputs_count: usize,
) {
    if overwintered {
        write_u32(w, version | (1 << 31));
        if let Some(group_id) = version_group_id {
            write_u32(w, group_id);
        }
    } else {
        write_u32(w, version);
    }
    if let Some(ts) = timestamp {
        write_u32(w, ts);
    }
    write_compact_size(w, inputs_count);
}

/// Read back a CompactSize (used when parsing host-supplied scripts)
pub fn read_compact_size(data: &[u8], offset: &mut usize) -> SignResult<u64> {
    let err = || SignerError::data_error("Invalid compact size");
    let first = *data.get(*offset).ok_or_else(err)?;
    *offset += 1;
    let value = match first {
        0xfd => {
            let bytes = data.get(*offset..*offset + 2).ok_or_else(err)?;
            *offset += 2;
            u16::from_le_bytes([bytes[0], bytes[1]]) as u64
        }
        0xfe => {
            let bytes = data.get(*offset..*offset + 4).ok_or_else(err)?;
            *offset += 4;
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64
        }
        0xff => {
            let bytes = data.get(*offset..*offset + 8).ok_or_else(err)?;
            *offset += 8;
            u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ])
        }
        n => n as u64,
    };
    Ok(value)
}
