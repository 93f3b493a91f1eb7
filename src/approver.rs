//! Spend approval and fee policy
//!
//! Accumulates verified amounts as records stream past and owns every
//! user-facing decision: per-output confirmation, fee thresholds,
//! replacement fee deltas, and the final signing confirmation. All
//! arithmetic here runs on device-verified amounts only.

use crate::coin::CoinProfile;
use crate::collector::TxInfo;
use crate::config::{SafetyLevel, SessionConfig};
use crate::error::{SignResult, SignerError};
use crate::host::{confirm_or_cancel, Confirmer, Prompt};
use crate::keychain;
use crate::log_info;
use crate::paymentreq::PaymentRequestTracker;
use crate::replacement::OriginalTx;
use crate::types::{PaymentRequest, TxInput, TxOutput};
use crate::weight::TxWeightCalculator;

/// Change outputs beyond this count are confirmed explicitly
const MAX_SILENT_CHANGE_COUNT: u32 = 2;
/// A fee this many times over the threshold is rejected outright
/// unless safety checks are relaxed
const FEE_RATIO_HARD_LIMIT: u64 = 10;

pub struct Approver {
    config: SessionConfig,
    weight: TxWeightCalculator,

    total_in: u64,
    external_in: u64,
    total_out: u64,
    change_out: u64,
    change_count: u32,

    orig_total_in: u64,
    orig_total_out: u64,
    orig_change_out: u64,
    orig_external_in: u64,

    payment_request: Option<PaymentRequestTracker>,
}

impl Approver {
    pub fn new(config: SessionConfig, inputs_count: u32, outputs_count: u32) -> Self {
        Self {
            config,
            weight: TxWeightCalculator::new(inputs_count, outputs_count),
            total_in: 0,
            external_in: 0,
            total_out: 0,
            change_out: 0,
            change_count: 0,
            orig_total_in: 0,
            orig_total_out: 0,
            orig_change_out: 0,
            orig_external_in: 0,
            payment_request: None,
        }
    }

    fn coin(&self) -> &CoinProfile {
        &self.config.coin
    }

    fn checked_total(total: u64, amount: u64) -> SignResult<u64> {
        total
            .checked_add(amount)
            .ok_or_else(|| SignerError::data_error("Total amount overflow"))
    }

    // =========================================================================
    // Inputs
    // =========================================================================

    pub fn add_internal_input<C: Confirmer>(
        &mut self,
        confirmer: &mut C,
        txi: &TxInput,
    ) -> SignResult<()> {
        if !keychain::path_is_standard(&txi.address_n, txi.script_type, self.coin().slip44) {
            match self.config.safety_level {
                SafetyLevel::Strict => {
                    return Err(SignerError::data_error("Forbidden key path"));
                }
                _ => confirm_or_cancel(
                    confirmer,
                    Prompt::UnknownDerivationPath {
                        address_n: txi.address_n.clone(),
                    },
                    "Signing cancelled",
                )?,
            }
        }
        self.weight.add_input(txi);
        self.total_in = Self::checked_total(self.total_in, txi.amount)?;
        if txi.orig_hash.is_some() {
            self.orig_total_in = Self::checked_total(self.orig_total_in, txi.amount)?;
        }
        Ok(())
    }

    pub fn add_external_input(&mut self, txi: &TxInput) -> SignResult<()> {
        self.weight.add_input(txi);
        self.total_in = Self::checked_total(self.total_in, txi.amount)?;
        self.external_in = Self::checked_total(self.external_in, txi.amount)?;
        if txi.orig_hash.is_some() {
            self.orig_total_in = Self::checked_total(self.orig_total_in, txi.amount)?;
            self.orig_external_in = Self::checked_total(self.orig_external_in, txi.amount)?;
        }
        Ok(())
    }

    // =========================================================================
    // Outputs
    // =========================================================================

    pub fn add_change_output(&mut self, txo: &TxOutput, script_pubkey: &[u8]) -> SignResult<()> {
        self.weight.add_output(script_pubkey.len());
        self.total_out = Self::checked_total(self.total_out, txo.amount)?;
        self.change_out = Self::checked_total(self.change_out, txo.amount)?;
        self.change_count += 1;
        Ok(())
    }

    /// Confirm an outgoing output with the user, or diff it against the
    /// original it replaces
    pub fn add_external_output<C: Confirmer>(
        &mut self,
        confirmer: &mut C,
        txo: &TxOutput,
        script_pubkey: &[u8],
        orig_txo: Option<&TxOutput>,
    ) -> SignResult<()> {
        self.weight.add_output(script_pubkey.len());
        self.total_out = Self::checked_total(self.total_out, txo.amount)?;

        if let Some(tracker) = &mut self.payment_request {
            if tracker.covers(txo) {
                // covered outputs are confirmed through the request
                return tracker.add_output(txo);
            }
        }

        if let Some(orig) = orig_txo {
            if orig.amount != txo.amount {
                return confirm_or_cancel(
                    confirmer,
                    Prompt::ModifyOutput {
                        address: txo.address.clone().unwrap_or_default(),
                        orig_amount: orig.amount,
                        new_amount: txo.amount,
                    },
                    "Payment cancelled",
                );
            }
            // unchanged original outputs were approved when the
            // original was signed
            return Ok(());
        }

        if let Some(data) = &txo.op_return_data {
            return confirm_or_cancel(
                confirmer,
                Prompt::ConfirmOpReturn { data: data.clone() },
                "Payment cancelled",
            );
        }

        confirm_or_cancel(
            confirmer,
            Prompt::ConfirmOutput {
                address: txo.address.clone().unwrap_or_default(),
                amount: txo.amount,
            },
            "Payment cancelled",
        )
    }

    // =========================================================================
    // Payment requests
    // =========================================================================

    pub fn set_payment_request(&mut self, request: PaymentRequest) -> SignResult<()> {
        if self.payment_request.is_some() {
            return Err(SignerError::data_error("Multiple payment requests"));
        }
        self.payment_request = Some(PaymentRequestTracker::new(request));
        Ok(())
    }

    // =========================================================================
    // Final approval
    // =========================================================================

    /// Replacement announcement, raised once per original transaction
    pub fn approve_orig_txids<C: Confirmer>(
        &self,
        confirmer: &mut C,
        orig_txs: &[OriginalTx],
    ) -> SignResult<()> {
        for orig in orig_txs {
            let description = if self.external_in > self.orig_external_in {
                "PayJoin"
            } else {
                "Fee bump"
            };
            confirm_or_cancel(
                confirmer,
                Prompt::Replacement {
                    description: description.into(),
                    txid: orig.orig_hash,
                },
                "Signing cancelled",
            )?;
        }
        Ok(())
    }

    pub fn approve_tx<C: Confirmer>(
        &self,
        confirmer: &mut C,
        tx_info: &TxInfo,
        orig_txs: &[OriginalTx],
    ) -> SignResult<()> {
        let fee = self
            .total_in
            .checked_sub(self.total_out)
            .ok_or_else(|| SignerError::not_enough_funds("Not enough funds"))?;

        if let Some(tracker) = &self.payment_request {
            let request = tracker.finish()?;
            confirm_or_cancel(
                confirmer,
                Prompt::PaymentRequest {
                    recipient_name: request.recipient_name.clone(),
                    amount: request.amount,
                },
                "Payment cancelled",
            )?;
        }

        // fee threshold scales with the transaction's virtual size
        let fee_threshold = self.coin().maxfee_kb * self.weight.vsize() / 1000;
        if fee > fee_threshold {
            if fee > FEE_RATIO_HARD_LIMIT * fee_threshold
                && !self.config.safety_level.allows_prompting()
            {
                return Err(SignerError::data_error("The fee is unexpectedly large"));
            }
            confirm_or_cancel(
                confirmer,
                Prompt::FeeOverThreshold { fee },
                "Signing cancelled",
            )?;
        }

        if self.change_count > MAX_SILENT_CHANGE_COUNT {
            confirm_or_cancel(
                confirmer,
                Prompt::ChangeCountOverThreshold {
                    change_count: self.change_count,
                },
                "Signing cancelled",
            )?;
        }

        if !orig_txs.is_empty() {
            return self.approve_replacement(confirmer, fee, orig_txs);
        }

        if tx_info.tx.lock_time != 0 {
            confirm_or_cancel(
                confirmer,
                Prompt::NonDefaultLocktime {
                    lock_time: tx_info.tx.lock_time,
                    lock_time_disabled: tx_info.lock_time_disabled(),
                },
                "Locktime cancelled",
            )?;
        }

        let spending = self.total_out - self.change_out + fee;
        log_info!("approver", "transaction approved", spending = spending, fee = fee);
        confirm_or_cancel(
            confirmer,
            Prompt::SignTx { spending, fee },
            "Signing cancelled",
        )
    }

    /// Fee-bump / PayJoin rules, all deltas re-derived on device
    fn approve_replacement<C: Confirmer>(
        &self,
        confirmer: &mut C,
        fee: u64,
        orig_txs: &[OriginalTx],
    ) -> SignResult<()> {
        let mut orig_fee: u64 = 0;
        for orig in orig_txs {
            orig_fee = orig_fee
                .checked_add(orig.fee()?)
                .ok_or_else(|| SignerError::data_error("Total amount overflow"))?;
        }

        // the user's own spend may only grow by the extra fee they pay;
        // any further growth must come from newly added external funds
        let own_in = self.total_in - self.external_in;
        let orig_own_in = self.orig_total_in - self.orig_external_in;
        let added_external = self.external_in.saturating_sub(self.orig_external_in);
        if own_in > orig_own_in && added_external == 0 && fee <= orig_fee {
            return Err(SignerError::process_error(
                "Original input does not match current input.",
            ));
        }

        let payjoin = added_external > 0;
        if !payjoin && fee < orig_fee {
            return Err(SignerError::process_error(
                "Fee cannot be decreased in a replacement transaction",
            ));
        }

        // a PayJoin where the receiver absorbs the cost leaves the
        // user's fee unchanged; nothing to confirm
        if payjoin && fee <= orig_fee {
            log_info!("approver", "payjoin approved without fee change", fee = fee);
            return Ok(());
        }

        let fee_delta = fee as i64 - orig_fee as i64;
        confirm_or_cancel(
            confirmer,
            Prompt::ModifyFee {
                fee_delta,
                new_fee: fee,
            },
            "Fee change cancelled",
        )
    }
}
