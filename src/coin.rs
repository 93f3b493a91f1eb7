//! Coin profiles
//!
//! Per-coin policy and capability data. Everything the state machine
//! needs to know about a coin lives here: which script families and
//! transaction fields are enabled, address prefixes, and the fee
//! threshold. Values are data, not logic — embedders supply their own
//! profiles; the registry below carries reference profiles used by the
//! test suite.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Capability and policy data for one coin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinProfile {
    pub coin_name: String,
    pub coin_shortcut: String,
    /// SLIP-0044 coin type (unhardened)
    pub slip44: u32,
    /// Base58 version prefix for P2PKH, big-endian minimal encoding
    pub address_type: u32,
    /// Base58 version prefix for P2SH
    pub address_type_p2sh: u32,
    /// Bech32 human-readable part, if the coin supports native segwit
    pub bech32_hrp: Option<String>,
    pub segwit: bool,
    pub taproot: bool,
    pub decred: bool,
    /// Zcash Overwinter/Sapling transaction format
    pub overwintered: bool,
    /// Coin requires a timestamp field in every transaction
    pub timestamp: bool,
    /// Coin allows trailing extra data in transactions
    pub extra_data: bool,
    /// BIP-143 fork id (Bcash/Bgold); also forces BIP-143 digests for
    /// legacy script types
    pub fork_id: Option<u32>,
    pub force_bip143: bool,
    /// Whether tx digests are double-SHA256 (false for Decred/Groestl coins)
    pub sign_hash_double: bool,
    /// Fee threshold in base units per kilobyte; fees above
    /// `maxfee_kb/1000 * vsize` need explicit confirmation
    pub maxfee_kb: u64,
    /// Zcash version group id expected in current transactions
    pub version_group_id: Option<u32>,
    /// Zcash consensus branch id
    pub branch_id: Option<u32>,
}

impl CoinProfile {
    /// Fields like expiry are shared by the Decred and Zcash formats
    pub fn has_expiry(&self) -> bool {
        self.decred || self.overwintered
    }

    pub fn bitcoin() -> Self {
        Self {
            coin_name: "Bitcoin".into(),
            coin_shortcut: "BTC".into(),
            slip44: 0,
            address_type: 0,
            address_type_p2sh: 5,
            bech32_hrp: Some("bc".into()),
            segwit: true,
            taproot: true,
            decred: false,
            overwintered: false,
            timestamp: false,
            extra_data: false,
            fork_id: None,
            force_bip143: false,
            sign_hash_double: true,
            maxfee_kb: 2_000_000,
            version_group_id: None,
            branch_id: None,
        }
    }

    pub fn testnet() -> Self {
        Self {
            coin_name: "Testnet".into(),
            coin_shortcut: "TEST".into(),
            slip44: 1,
            address_type: 111,
            address_type_p2sh: 196,
            bech32_hrp: Some("tb".into()),
            maxfee_kb: 10_000_000,
            ..Self::bitcoin()
        }
    }

    pub fn bcash() -> Self {
        Self {
            coin_name: "Bcash".into(),
            coin_shortcut: "BCH".into(),
            slip44: 145,
            bech32_hrp: None,
            segwit: false,
            taproot: false,
            fork_id: Some(0),
            force_bip143: true,
            maxfee_kb: 500_000,
            ..Self::bitcoin()
        }
    }

    pub fn decred() -> Self {
        Self {
            coin_name: "Decred".into(),
            coin_shortcut: "DCR".into(),
            slip44: 42,
            address_type: 0x073f,
            address_type_p2sh: 0x071a,
            bech32_hrp: None,
            segwit: false,
            taproot: false,
            decred: true,
            sign_hash_double: false,
            maxfee_kb: 10_000_000,
            ..Self::bitcoin()
        }
    }

    pub fn zcash() -> Self {
        Self {
            coin_name: "Zcash".into(),
            coin_shortcut: "ZEC".into(),
            slip44: 133,
            address_type: 0x1cb8,
            address_type_p2sh: 0x1cbd,
            bech32_hrp: None,
            segwit: false,
            taproot: false,
            overwintered: true,
            extra_data: true,
            maxfee_kb: 1_000_000,
            version_group_id: Some(0x892f_2085),
            branch_id: Some(0xc2d6_d0b4),
            ..Self::bitcoin()
        }
    }
}

lazy_static::lazy_static! {
    static ref REGISTRY: HashMap<&'static str, CoinProfile> = {
        let mut m = HashMap::new();
        m.insert("Bitcoin", CoinProfile::bitcoin());
        m.insert("Testnet", CoinProfile::testnet());
        m.insert("Bcash", CoinProfile::bcash());
        m.insert("Decred", CoinProfile::decred());
        m.insert("Zcash", CoinProfile::zcash());
        m
    };
}

/// Look up a reference profile by coin name
pub fn by_name(name: &str) -> Option<&'static CoinProfile> {
    REGISTRY.get(name)
}
