//! Session configuration
//!
//! The safety-check level is set once per session and threaded through
//! the state machine as a plain value; it is never global mutable state
//! and is read-only while signing is in progress.

use crate::coin::CoinProfile;
use serde::{Deserialize, Serialize};

/// How strictly policy violations are handled.
///
/// The level only ever converts policy failures (unusual paths,
/// oversized fees) into user-confirmable warnings. Cryptographic
/// verification failures are never downgraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    /// Policy violations are hard failures
    Strict,
    /// Policy violations become confirmation prompts
    Prompt,
    /// Same as `Prompt`, but reverts to `Strict` on next power cycle
    /// (persistence is the embedder's concern)
    PromptTemporarily,
}

impl SafetyLevel {
    pub fn allows_prompting(&self) -> bool {
        matches!(self, Self::Prompt | Self::PromptTemporarily)
    }
}

impl Default for SafetyLevel {
    fn default() -> Self {
        Self::Strict
    }
}

/// Configuration for one signing session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub coin: CoinProfile,
    pub safety_level: SafetyLevel,
}

impl SessionConfig {
    pub fn new(coin: CoinProfile) -> Self {
        Self {
            coin,
            safety_level: SafetyLevel::Strict,
        }
    }

    pub fn with_safety_level(mut self, level: SafetyLevel) -> Self {
        self.safety_level = level;
        self
    }
}
