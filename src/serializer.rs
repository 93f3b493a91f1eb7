//! Signed-transaction wire assembly
//!
//! Pure byte emission for the final serialized transaction. Every coin
//! variant's header and footer shape lives here; no trust decisions
//! are made at this layer.

use crate::coin::CoinProfile;
use crate::types::SignRequest;
use crate::writers::{self, WriteBytes};

/// Decred's full (witness-carrying) serialization selector
const DECRED_SERIALIZE_FULL: u32 = 0;

/// Version words, optional segwit marker and flag, and the input count
pub fn write_signed_tx_header<W: WriteBytes>(
    w: &mut W,
    tx: &SignRequest,
    coin: &CoinProfile,
    segwit: bool,
) {
    if coin.overwintered {
        writers::write_u32(w, tx.version | (1 << 31));
        if let Some(group_id) = tx.version_group_id {
            writers::write_u32(w, group_id);
        }
    } else if coin.decred {
        writers::write_u32(w, tx.version | DECRED_SERIALIZE_FULL);
    } else {
        writers::write_u32(w, tx.version);
        if let Some(ts) = tx.timestamp {
            writers::write_u32(w, ts);
        }
        if segwit {
            w.write(&[0x00, 0x01]);
        }
    }
    writers::write_compact_size(w, tx.inputs_count as usize);
}

/// Everything after the witness section: lock_time, and the expiry and
/// Sapling trailer fields of the coins that carry them
pub fn write_signed_tx_footer<W: WriteBytes>(w: &mut W, tx: &SignRequest, coin: &CoinProfile) {
    writers::write_u32(w, tx.lock_time);
    if coin.has_expiry() {
        writers::write_u32(w, tx.expiry.unwrap_or(0));
    }
    if coin.overwintered && tx.version >= 4 {
        writers::write_u64(w, 0); // valueBalance
        writers::write_compact_size(w, 0); // nShieldedSpend
        writers::write_compact_size(w, 0); // nShieldedOutput
        writers::write_compact_size(w, 0); // nJoinSplit
    }
}

/// Decred places lock_time and expiry before the witness section,
/// which then repeats the input count
pub fn write_decred_witness_header<W: WriteBytes>(w: &mut W, tx: &SignRequest) {
    writers::write_u32(w, tx.lock_time);
    writers::write_u32(w, tx.expiry.unwrap_or(0));
    writers::write_compact_size(w, tx.inputs_count as usize);
}

/// One Decred witness record: spent amount, block height and index
/// defaults, and the signature script
pub fn write_decred_witness<W: WriteBytes>(w: &mut W, amount: u64, script_sig: &[u8]) {
    writers::write_u64(w, amount);
    writers::write_u32(w, 0); // block height
    writers::write_u32(w, 0xffff_ffff); // block index
    writers::write_bytes_prefixed(w, script_sig);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segwit_marker_flag() {
        let coin = CoinProfile::bitcoin();
        let tx = SignRequest::new(2, 0, 1, 1);

        let mut plain = Vec::new();
        write_signed_tx_header(&mut plain, &tx, &coin, false);
        assert_eq!(plain, vec![2, 0, 0, 0, 1]);

        let mut segwit = Vec::new();
        write_signed_tx_header(&mut segwit, &tx, &coin, true);
        assert_eq!(segwit, vec![2, 0, 0, 0, 0x00, 0x01, 1]);
    }

    #[test]
    fn test_zcash_sapling_trailer() {
        let coin = CoinProfile::zcash();
        let mut tx = SignRequest::new(4, 7, 1, 1);
        tx.expiry = Some(500);
        tx.version_group_id = Some(0x892f_2085);
        tx.branch_id = Some(0xc2d6_d0b4);

        let mut buf = Vec::new();
        write_signed_tx_footer(&mut buf, &tx, &coin);
        // lock_time + expiry + valueBalance + three empty counts
        assert_eq!(buf.len(), 4 + 4 + 8 + 3);
        assert_eq!(&buf[..4], &7u32.to_le_bytes());
        assert_eq!(&buf[4..8], &500u32.to_le_bytes());
        assert_eq!(&buf[8..], &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_decred_witness_record() {
        let mut buf = Vec::new();
        write_decred_witness(&mut buf, 70_000, &[0xaa, 0xbb]);
        assert_eq!(&buf[..8], &70_000u64.to_le_bytes());
        assert_eq!(&buf[8..12], &0u32.to_le_bytes());
        assert_eq!(&buf[12..16], &0xffff_ffffu32.to_le_bytes());
        assert_eq!(&buf[16..], &[2, 0xaa, 0xbb]);
    }
}
