//! Session configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{
    DEFAULT_COMMISSION_PERCENTAGE, DEFAULT_GAS_LIMIT, DEFAULT_GAS_REFRESH,
    DEFAULT_MAX_WAGER_NATIVE,
};
use crate::types::Wei;

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Platform fee on top of the wager, in percent
    pub commission_percentage: u32,

    /// Largest accepted wager (inclusive)
    pub max_wager: Wei,

    /// Gas ceiling of the fund-game transaction
    pub gas_limit: u64,

    /// Interval between gas price refreshes
    pub gas_refresh: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            commission_percentage: DEFAULT_COMMISSION_PERCENTAGE,
            max_wager: Wei::from_native(DEFAULT_MAX_WAGER_NATIVE).unwrap_or(Wei(u128::MAX)),
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_refresh: DEFAULT_GAS_REFRESH,
        }
    }
}
