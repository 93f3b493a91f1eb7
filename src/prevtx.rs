//! Streaming verification of previous transactions
//!
//! Input amounts claimed by the host are only trusted after the full
//! previous transaction has been streamed through a running hash and
//! the resulting txid matched the input's prev_hash. Verified outputs
//! are kept in a small cache keyed by outpoint so replacement flows do
//! not re-stream the same transaction.

use crate::coin::CoinProfile;
use crate::error::{SignResult, SignerError};
use crate::host::{self, HostChannel};
use crate::log_debug;
use crate::types::TxHash;
use crate::writers::{self, TxHasher};
use std::collections::HashMap;

/// Decred txids cover the witness-free serialization
const DECRED_SERIALIZE_NO_WITNESS: u32 = 1 << 16;

const EXTRA_DATA_CHUNK: u32 = 1024;

/// Verified outputs of previously streamed transactions
#[derive(Default)]
pub struct PrevTxCache {
    outputs: HashMap<(TxHash, u32), (u64, Vec<u8>)>,
}

impl PrevTxCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Amount and scriptPubKey of the referenced output, verified
    /// against its txid. Streams the whole previous transaction on a
    /// cache miss.
    pub fn get_output<H: HostChannel>(
        &mut self,
        host: &mut H,
        coin: &CoinProfile,
        prev_hash: TxHash,
        prev_index: u32,
    ) -> SignResult<(u64, Vec<u8>)> {
        if let Some(found) = self.outputs.get(&(prev_hash, prev_index)) {
            return Ok(found.clone());
        }
        let output = stream_and_verify(host, coin, prev_hash, prev_index)?;
        self.outputs.insert((prev_hash, prev_index), output.clone());
        Ok(output)
    }
}

fn stream_and_verify<H: HostChannel>(
    host: &mut H,
    coin: &CoinProfile,
    prev_hash: TxHash,
    prev_index: u32,
) -> SignResult<(u64, Vec<u8>)> {
    let tx = host::request_tx_meta(host, coin, prev_hash)?;

    if prev_index >= tx.outputs_count {
        return Err(SignerError::data_error(
            "Not enough outputs in previous transaction.",
        ));
    }

    let mut txh = if coin.decred {
        TxHasher::blake256()
    } else {
        TxHasher::sha256()
    };

    let version = if coin.decred {
        tx.version | DECRED_SERIALIZE_NO_WITNESS
    } else {
        tx.version
    };
    writers::write_tx_header(
        &mut txh,
        version,
        tx.timestamp,
        tx.version_group_id,
        coin.overwintered,
        tx.inputs_count as usize,
    );

    for i in 0..tx.inputs_count {
        let txi = host::request_prev_input(host, coin, i, prev_hash)?;
        if coin.decred {
            writers::write_tx_input_decred(
                &mut txh,
                &txi.prev_hash,
                txi.prev_index,
                txi.decred_tree.unwrap_or(0),
                txi.sequence,
            );
        } else {
            writers::write_prev_input(&mut txh, &txi);
        }
    }

    writers::write_compact_size(&mut txh, tx.outputs_count as usize);

    let mut found: Option<(u64, Vec<u8>)> = None;
    for i in 0..tx.outputs_count {
        let txo = host::request_prev_output(host, coin, i, prev_hash)?;
        writers::write_prev_output(&mut txh, &txo, coin.decred);
        if i == prev_index {
            if coin.decred && txo.decred_script_version.unwrap_or(0) != 0 {
                return Err(SignerError::data_error(
                    "Cannot use utxo that has script_version != 0",
                ));
            }
            found = Some((txo.amount, txo.script_pubkey));
        }
    }

    writers::write_u32(&mut txh, tx.lock_time);
    if coin.has_expiry() {
        writers::write_u32(&mut txh, tx.expiry.unwrap_or(0));
    }

    let mut offset = 0;
    while offset < tx.extra_data_len {
        let len = EXTRA_DATA_CHUNK.min(tx.extra_data_len - offset);
        let chunk = host::request_extra_data(host, prev_hash, offset, len)?;
        use crate::writers::WriteBytes;
        txh.write(&chunk);
        offset += len;
    }

    let mut computed = txh.finalize(coin.sign_hash_double);
    computed.reverse();
    if computed != prev_hash {
        return Err(SignerError::data_error("Encountered invalid prev_hash"));
    }

    log_debug!("prevtx", "previous transaction verified", txid = hex::encode(prev_hash));

    // outputs_count was checked up front
    found.ok_or_else(|| SignerError::data_error("Not enough outputs in previous transaction."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{TxAck, TxRequest};
    use crate::types::{PrevInput, PrevOutput, PrevTx, SEQUENCE_FINAL};

    /// Host serving a single one-input two-output previous transaction
    struct FakeHost {
        meta: PrevTx,
        inputs: Vec<PrevInput>,
        outputs: Vec<PrevOutput>,
    }

    impl FakeHost {
        fn txid(&self, coin: &CoinProfile) -> TxHash {
            let mut buf = Vec::new();
            writers::write_tx_header(&mut buf, self.meta.version, None, None, false, self.inputs.len());
            for txi in &self.inputs {
                writers::write_prev_input(&mut buf, txi);
            }
            writers::write_compact_size(&mut buf, self.outputs.len());
            for txo in &self.outputs {
                writers::write_prev_output(&mut buf, txo, false);
            }
            writers::write_u32(&mut buf, self.meta.lock_time);
            let mut hash = if coin.sign_hash_double {
                crate::writers::sha256d_digest(&buf)
            } else {
                crate::writers::sha256_digest(&buf)
            };
            hash.reverse();
            hash
        }
    }

    impl HostChannel for FakeHost {
        fn request(&mut self, req: TxRequest) -> SignResult<TxAck> {
            match req {
                TxRequest::TxMeta { .. } => Ok(TxAck::PrevMeta(self.meta.clone())),
                TxRequest::TxInput { request_index, tx_hash: Some(_) } => {
                    Ok(TxAck::PrevInput(self.inputs[request_index as usize].clone()))
                }
                TxRequest::TxOutput { request_index, tx_hash: Some(_) } => {
                    Ok(TxAck::PrevOutput(self.outputs[request_index as usize].clone()))
                }
                _ => Err(SignerError::process_error("unexpected request in test")),
            }
        }
    }

    fn fake_host() -> FakeHost {
        FakeHost {
            meta: PrevTx::new(1, 0, 1, 2),
            inputs: vec![PrevInput {
                prev_hash: [0x77; 32],
                prev_index: 0,
                script_sig: vec![0x00, 0x01],
                sequence: SEQUENCE_FINAL,
                decred_tree: None,
            }],
            outputs: vec![
                PrevOutput {
                    amount: 390_000,
                    script_pubkey: crate::scripts::p2pkh_script(&[0x21; 20]),
                    decred_script_version: None,
                },
                PrevOutput {
                    amount: 12_345,
                    script_pubkey: crate::scripts::p2pkh_script(&[0x22; 20]),
                    decred_script_version: None,
                },
            ],
        }
    }

    #[test]
    fn test_amount_verified_against_txid() {
        let coin = CoinProfile::bitcoin();
        let mut host = fake_host();
        let txid = host.txid(&coin);

        let mut cache = PrevTxCache::new();
        let (amount, script) = cache.get_output(&mut host, &coin, txid, 0).unwrap();
        assert_eq!(amount, 390_000);
        assert_eq!(script, crate::scripts::p2pkh_script(&[0x21; 20]));
    }

    #[test]
    fn test_mutated_amount_detected() {
        let coin = CoinProfile::bitcoin();
        let mut host = fake_host();
        let txid = host.txid(&coin);
        host.outputs[0].amount += 1;

        let mut cache = PrevTxCache::new();
        let err = cache.get_output(&mut host, &coin, txid, 0).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::DataError);
        assert_eq!(err.message, "Encountered invalid prev_hash");
    }

    #[test]
    fn test_out_of_range_index() {
        let coin = CoinProfile::bitcoin();
        let mut host = fake_host();
        let txid = host.txid(&coin);

        let mut cache = PrevTxCache::new();
        let err = cache.get_output(&mut host, &coin, txid, 5).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::DataError);
        assert_eq!(err.message, "Not enough outputs in previous transaction.");
    }

    #[test]
    fn test_cache_serves_repeat_lookups() {
        let coin = CoinProfile::bitcoin();
        let mut host = fake_host();
        let txid = host.txid(&coin);

        let mut cache = PrevTxCache::new();
        cache.get_output(&mut host, &coin, txid, 1).unwrap();
        // corrupt the host; cached result must still be served
        host.outputs[1].amount = 0;
        let (amount, _) = cache.get_output(&mut host, &coin, txid, 1).unwrap();
        assert_eq!(amount, 12_345);
    }
}
