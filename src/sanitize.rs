//! Field-level validation of host-supplied records
//!
//! Every record crossing the host boundary passes through exactly one
//! of these functions before the state machine sees it. The checks are
//! purely structural: cross-record consistency (amounts, digests,
//! totals) is enforced later by the verifier and the approver.

use crate::coin::CoinProfile;
use crate::error::{SignResult, SignerError};
use crate::types::{
    InputScriptType, OutputScriptType, PrevInput, PrevTx, SignRequest, TxInput, TxOutput,
};

fn require(cond: bool, msg: &str) -> SignResult<()> {
    if cond {
        Ok(())
    } else {
        Err(SignerError::data_error(msg))
    }
}

/// Coin-feature checks shared by the signing request and previous-tx
/// metadata: expiry, timestamp and the Zcash group/branch ids are only
/// accepted on coins that define them.
fn check_common_fields(
    expiry: Option<u32>,
    timestamp: Option<u32>,
    version_group_id: Option<u32>,
    branch_id: Option<u32>,
    coin: &CoinProfile,
) -> SignResult<()> {
    if coin.has_expiry() {
        require(expiry.is_some(), "Expiry not provided")?;
    } else {
        require(expiry.is_none(), "Expiry not enabled on this coin.")?;
    }

    if coin.timestamp {
        require(timestamp.is_some(), "Timestamp must be set.")?;
    } else {
        require(timestamp.is_none(), "Timestamp not enabled on this coin.")?;
    }

    if coin.overwintered {
        require(version_group_id.is_some(), "Version group ID must be set.")?;
        require(branch_id.is_some(), "Branch ID must be set.")?;
    } else {
        require(
            version_group_id.is_none(),
            "Version group ID not enabled on this coin.",
        )?;
        require(branch_id.is_none(), "Branch ID not enabled on this coin.")?;
    }

    Ok(())
}

/// Validate the top-level signing request
pub fn sanitize_sign_tx(tx: SignRequest, coin: &CoinProfile) -> SignResult<SignRequest> {
    require(tx.inputs_count > 0, "Transaction must have at least one input.")?;
    require(tx.outputs_count > 0, "Transaction must have at least one output.")?;
    check_common_fields(tx.expiry, tx.timestamp, tx.version_group_id, tx.branch_id, coin)?;
    Ok(tx)
}

/// Validate previous-transaction metadata
pub fn sanitize_tx_meta(tx: PrevTx, coin: &CoinProfile) -> SignResult<PrevTx> {
    if !coin.extra_data {
        require(tx.extra_data_len == 0, "Extra data not enabled on this coin.")?;
    }
    check_common_fields(tx.expiry, tx.timestamp, tx.version_group_id, tx.branch_id, coin)?;
    Ok(tx)
}

/// Validate an input of the transaction under construction
pub fn sanitize_tx_input(txi: TxInput, coin: &CoinProfile) -> SignResult<TxInput> {
    if txi.multisig.is_some() {
        require(
            txi.script_type.allows_multisig(),
            "Multisig field provided but not expected.",
        )?;
    } else {
        require(
            txi.script_type != InputScriptType::SpendMultisig,
            "Multisig details required.",
        )?;
    }

    if txi.is_external() {
        require(
            txi.address_n.is_empty(),
            "Input's address_n provided but not expected.",
        )?;
        require(
            txi.script_pubkey.is_some(),
            "Missing script_pubkey field.",
        )?;
    } else {
        require(!txi.address_n.is_empty(), "Missing address_n field.")?;
        // script_sig/witness stay legal here: original-transaction
        // inputs arrive through this sanitizer with their signatures
        require(
            txi.ownership_proof.is_none(),
            "Ownership proof provided but not expected.",
        )?;
    }

    if txi.commitment_data.is_some() {
        require(
            txi.ownership_proof.is_some(),
            "commitment_data field provided but not expected.",
        )?;
    }

    if txi.script_type.is_segwit() && !txi.script_type.is_taproot() {
        require(coin.segwit, "Segwit not enabled on this coin.")?;
    }
    if txi.script_type.is_taproot() {
        require(coin.taproot, "Taproot not enabled on this coin.")?;
    }

    if !coin.decred {
        require(
            txi.decred_tree.is_none() && txi.decred_staking_spend.is_none(),
            "Decred details provided but Decred coin not specified.",
        )?;
    }

    require(
        txi.orig_hash.is_some() == txi.orig_index.is_some(),
        "Orig hash and index must be provided together.",
    )?;

    Ok(txi)
}

/// Validate an input of a previous transaction
pub fn sanitize_prev_input(txi: PrevInput, coin: &CoinProfile) -> SignResult<PrevInput> {
    if !coin.decred {
        require(
            txi.decred_tree.is_none(),
            "Decred details provided but Decred coin not specified.",
        )?;
    }
    Ok(txi)
}

/// Validate an output of the transaction under construction
pub fn sanitize_tx_output(txo: TxOutput, coin: &CoinProfile) -> SignResult<TxOutput> {
    if txo.multisig.is_some() {
        require(
            txo.script_type.allows_multisig(),
            "Multisig field provided but not expected.",
        )?;
    } else {
        require(
            txo.script_type != OutputScriptType::PayToMultisig,
            "Multisig details required.",
        )?;
    }

    if txo.script_type == OutputScriptType::PayToOpReturn {
        require(
            txo.op_return_data.is_some(),
            "OP_RETURN output without op_return_data",
        )?;
        require(txo.amount == 0, "OP_RETURN output with non-zero amount")?;
        require(
            txo.address.is_none() && txo.address_n.is_empty() && txo.multisig.is_none(),
            "OP_RETURN output with address or multisig",
        )?;
    } else {
        require(
            txo.op_return_data.is_none(),
            "OP_RETURN data provided but not OP_RETURN script type.",
        )?;
        require(
            !(txo.address.is_some() && !txo.address_n.is_empty()),
            "Both address and address_n provided.",
        )?;
        require(
            txo.address.is_some() || !txo.address_n.is_empty(),
            "Missing address",
        )?;
    }

    match txo.script_type {
        OutputScriptType::PayToWitness | OutputScriptType::PayToP2shWitness => {
            require(coin.segwit, "Segwit not enabled on this coin.")?;
        }
        OutputScriptType::PayToTaproot => {
            require(coin.taproot, "Taproot not enabled on this coin.")?;
        }
        _ => {}
    }

    require(
        txo.orig_hash.is_some() == txo.orig_index.is_some(),
        "Orig hash and index must be provided together.",
    )?;

    Ok(txo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SEQUENCE_FINAL;

    fn internal_input() -> TxInput {
        TxInput {
            prev_hash: [0x11; 32],
            prev_index: 0,
            amount: 50_000,
            script_type: InputScriptType::SpendAddress,
            address_n: vec![44 | 1 << 31, 1 << 31, 1 << 31, 0, 0],
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
    fn test_expiry_gated_by_coin() {
        let mut tx = SignRequest::new(1, 0, 1, 1);
        tx.expiry = Some(100);
        let err = sanitize_sign_tx(tx, &CoinProfile::bitcoin()).unwrap_err();
        assert_eq!(err.message, "Expiry not enabled on this coin.");
    }

    #[test]
    fn test_zcash_requires_group_id() {
        let mut tx = SignRequest::new(4, 0, 1, 1);
        tx.expiry = Some(0);
        let err = sanitize_sign_tx(tx, &CoinProfile::zcash()).unwrap_err();
        assert_eq!(err.message, "Version group ID must be set.");
    }

    #[test]
    fn test_multisig_field_mismatch() {
        let mut txi = internal_input();
        txi.script_type = InputScriptType::SpendMultisig;
        let err = sanitize_tx_input(txi, &CoinProfile::bitcoin()).unwrap_err();
        assert_eq!(err.message, "Multisig details required.");
    }

    #[test]
    fn test_external_requires_script_pubkey() {
        let mut txi = internal_input();
        txi.script_type = InputScriptType::External;
        txi.address_n.clear();
        let err = sanitize_tx_input(txi, &CoinProfile::bitcoin()).unwrap_err();
        assert_eq!(err.message, "Missing script_pubkey field.");
    }

    #[test]
    fn test_segwit_gated_by_coin() {
        let mut txi = internal_input();
        txi.script_type = InputScriptType::SpendWitness;
        let err = sanitize_tx_input(txi, &CoinProfile::bcash()).unwrap_err();
        assert_eq!(err.message, "Segwit not enabled on this coin.");
    }

    #[test]
    fn test_op_return_constraints() {
        let txo = TxOutput {
            address: None,
            address_n: vec![],
            amount: 5,
            script_type: OutputScriptType::PayToOpReturn,
            multisig: None,
            op_return_data: Some(b"hello".to_vec()),
            orig_hash: None,
            orig_index: None,
            payment_req_index: None,
        };
        let err = sanitize_tx_output(txo, &CoinProfile::bitcoin()).unwrap_err();
        assert_eq!(err.message, "OP_RETURN output with non-zero amount");
    }

    #[test]
    fn test_output_needs_destination() {
        let txo = TxOutput {
            address: None,
            address_n: vec![],
            amount: 1000,
            script_type: OutputScriptType::PayToAddress,
            multisig: None,
            op_return_data: None,
            orig_hash: None,
            orig_index: None,
            payment_req_index: None,
        };
        let err = sanitize_tx_output(txo, &CoinProfile::bitcoin()).unwrap_err();
        assert_eq!(err.message, "Missing address");
    }

    #[test]
    fn test_valid_input_passes() {
        assert!(sanitize_tx_input(internal_input(), &CoinProfile::bitcoin()).is_ok());
    }
}
