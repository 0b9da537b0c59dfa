use serde::{Deserialize, Serialize};

/// Optional business checks layered on the transfer.
///
/// Both are off by default: a transfer to the same account is applied as
/// two offsetting increments, and a source balance may go negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferPolicy {
    /// Reject `from == to` before opening a transaction
    pub reject_same_account: bool,
    /// Abort when the source balance drops below zero
    pub require_sufficient_funds: bool,
}

impl TransferPolicy {
    /// Both checks enabled
    pub fn strict() -> Self {
        Self {
            reject_same_account: true,
            require_sufficient_funds: true,
        }
    }
}
