//! BIP-341 taproot signature hash (key-path, default hash type)
//!
//! Commits to every spent amount and scriptPubKey, which is why
//! taproot inputs do not need previous-transaction streaming.

use super::TxDigests;
use crate::types::{SignRequest, TxHash};
use crate::writers::{self, TxHasher, WriteBytes};

/// Sighash epoch prefix
const EPOCH: u8 = 0x00;
/// Key-path spend, no annex
const SPEND_TYPE: u8 = 0x00;

pub fn preimage_hash(
    digests: &TxDigests,
    tx: &SignRequest,
    input_index: u32,
    hash_type: u8,
) -> TxHash {
    let mut h = TxHasher::tagged("TapSighash");
    h.write(&[EPOCH]);
    h.write(&[hash_type]);
    writers::write_u32(&mut h, tx.version);
    writers::write_u32(&mut h, tx.lock_time);
    h.write(&digests.h_prevouts.digest(false));
    h.write(&digests.h_amounts.digest(false));
    h.write(&digests.h_scriptpubkeys.digest(false));
    h.write(&digests.h_sequences.digest(false));
    h.write(&digests.h_outputs.digest(false));
    h.write(&[SPEND_TYPE]);
    writers::write_u32(&mut h, input_index);
    h.finalize(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin::CoinProfile;
    use crate::types::{InputScriptType, TxInput, SEQUENCE_FINAL};

    fn taproot_input(prev_fill: u8, amount: u64) -> TxInput {
        TxInput {
            prev_hash: [prev_fill; 32],
            prev_index: 0,
            amount,
            script_type: InputScriptType::SpendTaproot,
            address_n: vec![0],
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

    #[test]
    fn test_commits_to_all_spent_scripts() {
        let coin = CoinProfile::bitcoin();
        let tx = SignRequest::new(2, 0, 2, 1);
        let out = crate::scripts::p2tr_script(&[0x07; 32]);

        let digest_for = |other_script_fill: u8| {
            let mut digests = TxDigests::new(&coin);
            digests.add_input(&taproot_input(0x01, 50_000), &crate::scripts::p2tr_script(&[0x0a; 32]));
            digests.add_input(
                &taproot_input(0x02, 60_000),
                &crate::scripts::p2tr_script(&[other_script_fill; 32]),
            );
            digests.add_output(100_000, &out);
            preimage_hash(&digests, &tx, 0, 0x00)
        };

        // mutating a sibling input's scriptPubKey must change this
        // input's digest
        assert_ne!(digest_for(0x0b), digest_for(0x0c));
    }

    #[test]
    fn test_commits_to_input_index() {
        let coin = CoinProfile::bitcoin();
        let tx = SignRequest::new(2, 0, 2, 1);
        let mut digests = TxDigests::new(&coin);
        digests.add_input(&taproot_input(0x01, 50_000), &crate::scripts::p2tr_script(&[0x0a; 32]));
        digests.add_input(&taproot_input(0x02, 60_000), &crate::scripts::p2tr_script(&[0x0b; 32]));
        digests.add_output(100_000, &crate::scripts::p2tr_script(&[0x07; 32]));

        assert_ne!(
            preimage_hash(&digests, &tx, 0, 0x00),
            preimage_hash(&digests, &tx, 1, 0x00)
        );
    }
}
