//! Host-supplied payment requests
//!
//! A payment request names a recipient and a total amount for a group
//! of outputs, letting the user confirm the group as a unit instead of
//! one address at a time. The device still checks that the covered
//! outputs add up to exactly the requested amount.

use crate::error::{SignResult, SignerError};
use crate::types::{PaymentRequest, TxOutput};

pub struct PaymentRequestTracker {
    request: PaymentRequest,
    covered: u64,
}

impl PaymentRequestTracker {
    pub fn new(request: PaymentRequest) -> Self {
        Self { request, covered: 0 }
    }

    /// Whether this output is confirmed through the request
    pub fn covers(&self, txo: &TxOutput) -> bool {
        txo.payment_req_index.is_some()
    }

    pub fn add_output(&mut self, txo: &TxOutput) -> SignResult<()> {
        self.covered = self
            .covered
            .checked_add(txo.amount)
            .ok_or_else(|| SignerError::data_error("Total amount overflow"))?;
        Ok(())
    }

    /// The covered outputs must add up to exactly the declared amount
    pub fn finish(&self) -> SignResult<&PaymentRequest> {
        if self.covered != self.request.amount {
            return Err(SignerError::data_error("Payment request amount mismatch"));
        }
        Ok(&self.request)
    }
}
