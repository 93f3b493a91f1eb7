//! Protocol data model
//!
//! Structures exchanged with the host during the multi-pass signing
//! protocol. Nothing in here is trusted: every field is re-validated by
//! `sanitize` and every amount is corroborated against hash-verified
//! previous transactions before it is used.

use serde::{Deserialize, Serialize};

/// A transaction id in display order (as carried in wire messages)
pub type TxHash = [u8; 32];

pub const TX_HASH_SIZE: usize = 32;

/// Default sequence number (no RBF signaling, no relative locktime)
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

// =============================================================================
// Script types
// =============================================================================

/// How an input is spent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputScriptType {
    /// Legacy P2PKH (or P2SH single-sig)
    SpendAddress,
    /// Legacy P2SH multisig
    SpendMultisig,
    /// P2SH-wrapped segwit v0
    SpendP2shWitness,
    /// Native segwit v0 (P2WPKH / P2WSH)
    SpendWitness,
    /// Taproot key-path spend
    SpendTaproot,
    /// Not owned by this device; host supplies script_sig/witness
    External,
}

impl InputScriptType {
    pub fn is_segwit(&self) -> bool {
        matches!(self, Self::SpendP2shWitness | Self::SpendWitness | Self::SpendTaproot)
    }

    pub fn is_taproot(&self) -> bool {
        matches!(self, Self::SpendTaproot)
    }

    /// Script types the device signs with its own keys
    pub fn is_internal(&self) -> bool {
        !matches!(self, Self::External)
    }

    /// Script types that may carry a multisig payload
    pub fn allows_multisig(&self) -> bool {
        matches!(self, Self::SpendMultisig | Self::SpendP2shWitness | Self::SpendWitness)
    }
}

/// How an output pays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputScriptType {
    PayToAddress,
    PayToMultisig,
    PayToWitness,
    PayToP2shWitness,
    PayToTaproot,
    PayToOpReturn,
}

impl OutputScriptType {
    pub fn allows_multisig(&self) -> bool {
        matches!(self, Self::PayToMultisig | Self::PayToWitness | Self::PayToP2shWitness)
    }

    /// Output types that may be device-owned change (carry a derivation path)
    pub fn allows_change(&self) -> bool {
        !matches!(self, Self::PayToOpReturn)
    }

    /// The input script type a change output of this type corresponds to
    pub fn change_input_type(&self) -> Option<InputScriptType> {
        match self {
            Self::PayToAddress => Some(InputScriptType::SpendAddress),
            Self::PayToMultisig => Some(InputScriptType::SpendMultisig),
            Self::PayToWitness => Some(InputScriptType::SpendWitness),
            Self::PayToP2shWitness => Some(InputScriptType::SpendP2shWitness),
            Self::PayToTaproot => Some(InputScriptType::SpendTaproot),
            Self::PayToOpReturn => None,
        }
    }
}

// =============================================================================
// Multisig
// =============================================================================

/// An extended public key plus the derivation suffix applied to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpubDescriptor {
    /// Base58 serialized extended public key
    pub xpub: String,
    /// Non-hardened path suffix applied to the node
    pub address_n: Vec<u32>,
}

/// The participant key set of a multisig script, as declared by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// Ordered compressed public keys
    Pubkeys(Vec<Vec<u8>>),
    /// Ordered HD-node descriptors, each derived to a leaf key
    Xpubs(Vec<XpubDescriptor>),
}

/// Multisig payload attached to an input or change output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigScript {
    pub key_source: KeySource,
    /// Signature threshold
    pub m: u32,
    /// Co-signer signatures in participant order, empty slot for the
    /// key this device signs with
    pub signatures: Vec<Vec<u8>>,
}

// =============================================================================
// Decred
// =============================================================================

/// Decred staking spend variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecredStakingSpend {
    /// Stake generation (vote) spend
    SSGen,
    /// Stake revocation spend
    SSRtx,
}

// =============================================================================
// Transaction under construction
// =============================================================================

/// Top-level signing request: transaction metadata plus declared counts.
/// Inputs and outputs are streamed separately, multiple times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequest {
    pub version: u32,
    pub lock_time: u32,
    pub inputs_count: u32,
    pub outputs_count: u32,
    /// Decred / Zcash expiry height
    pub expiry: Option<u32>,
    /// Peercoin-style timestamp
    pub timestamp: Option<u32>,
    /// Zcash Overwinter/Sapling version group id
    pub version_group_id: Option<u32>,
    /// Zcash consensus branch id
    pub branch_id: Option<u32>,
}

impl SignRequest {
    pub fn new(version: u32, lock_time: u32, inputs_count: u32, outputs_count: u32) -> Self {
        Self {
            version,
            lock_time,
            inputs_count,
            outputs_count,
            expiry: None,
            timestamp: None,
            version_group_id: None,
            branch_id: None,
        }
    }
}

/// An input of the transaction under construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub prev_hash: TxHash,
    pub prev_index: u32,
    /// Claimed value of the referenced output. Always corroborated against
    /// the hash-verified previous transaction before any signature.
    pub amount: u64,
    pub script_type: InputScriptType,
    /// BIP-32 path; empty for external inputs
    pub address_n: Vec<u32>,
    pub multisig: Option<MultisigScript>,
    pub sequence: u32,
    /// Decred input tree
    pub decred_tree: Option<u32>,
    pub decred_staking_spend: Option<DecredStakingSpend>,
    /// Reference into an original transaction being replaced
    pub orig_hash: Option<TxHash>,
    pub orig_index: Option<u32>,
    /// Host-supplied for external/presigned inputs
    pub script_sig: Option<Vec<u8>>,
    pub witness: Option<Vec<u8>>,
    pub ownership_proof: Option<Vec<u8>>,
    pub commitment_data: Option<Vec<u8>>,
    /// scriptPubKey of the spent output; required for external inputs
    pub script_pubkey: Option<Vec<u8>>,
}

impl TxInput {
    pub fn is_external(&self) -> bool {
        self.script_type == InputScriptType::External
    }

    pub fn is_segwit(&self) -> bool {
        self.script_type.is_segwit()
            || (self.is_external() && self.witness.as_deref().map_or(false, |w| !w.is_empty()))
    }

    pub fn is_taproot(&self) -> bool {
        self.script_type.is_taproot()
            || (self.is_external()
                && self.script_pubkey.as_deref().map_or(false, |s| {
                    s.len() == 34 && s[0] == 0x51 && s[1] == 0x20
                }))
    }
}

/// An output of the transaction under construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Payee address; owned by the host, confirmed by the user
    pub address: Option<String>,
    /// Device-owned derivation path; makes the output a change candidate
    pub address_n: Vec<u32>,
    pub amount: u64,
    pub script_type: OutputScriptType,
    pub multisig: Option<MultisigScript>,
    pub op_return_data: Option<Vec<u8>>,
    pub orig_hash: Option<TxHash>,
    pub orig_index: Option<u32>,
    /// Index into a host-supplied payment request covering this output
    pub payment_req_index: Option<u32>,
}

impl TxOutput {
    pub fn payable(address: impl Into<String>, amount: u64) -> Self {
        Self {
            address: Some(address.into()),
            address_n: Vec::new(),
            amount,
            script_type: OutputScriptType::PayToAddress,
            multisig: None,
            op_return_data: None,
            orig_hash: None,
            orig_index: None,
            payment_req_index: None,
        }
    }

    pub fn change(address_n: Vec<u32>, amount: u64, script_type: OutputScriptType) -> Self {
        Self {
            address: None,
            address_n,
            amount,
            script_type,
            multisig: None,
            op_return_data: None,
            orig_hash: None,
            orig_index: None,
            payment_req_index: None,
        }
    }
}

// =============================================================================
// Previous transactions (streamed for verification, then discarded)
// =============================================================================

/// Metadata of a referenced previous transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrevTx {
    pub version: u32,
    pub lock_time: u32,
    pub inputs_count: u32,
    pub outputs_count: u32,
    /// Length of coin-specific trailing data (e.g. Zcash joinsplits)
    pub extra_data_len: u32,
    pub expiry: Option<u32>,
    pub timestamp: Option<u32>,
    pub version_group_id: Option<u32>,
    pub branch_id: Option<u32>,
}

impl PrevTx {
    pub fn new(version: u32, lock_time: u32, inputs_count: u32, outputs_count: u32) -> Self {
        Self {
            version,
            lock_time,
            inputs_count,
            outputs_count,
            extra_data_len: 0,
            expiry: None,
            timestamp: None,
            version_group_id: None,
            branch_id: None,
        }
    }
}

/// An input of a previous transaction, exactly as serialized on chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrevInput {
    pub prev_hash: TxHash,
    pub prev_index: u32,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    pub decred_tree: Option<u32>,
}

/// An output of a previous transaction, exactly as serialized on chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrevOutput {
    pub amount: u64,
    pub script_pubkey: Vec<u8>,
    pub decred_script_version: Option<u16>,
}

/// A host-supplied payment request covering one or more outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub recipient_name: String,
    /// Total amount the request covers; must equal the covered outputs
    pub amount: u64,
    pub memo: Option<String>,
}
