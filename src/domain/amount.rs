//! Amount type
//!
//! Domain primitive for transfer amounts in integer minor units.
//! Amounts are validated at construction time, so a transfer can never carry
//! a zero or negative value past the orchestrator boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Amount represents a validated, strictly positive number of minor units.
///
/// # Example
/// ```
/// use transfer_ledger::domain::Amount;
///
/// let amount = Amount::new(30).unwrap();
/// assert_eq!(amount.value(), 30);
/// assert_eq!(amount.debit(), -30);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(i64),
}

impl Amount {
    /// Create a new Amount, rejecting zero and negative values.
    pub fn new(value: i64) -> Result<Self, AmountError> {
        if value <= 0 {
            return Err(AmountError::NotPositive(value));
        }
        Ok(Self(value))
    }

    /// Get the raw minor-unit value.
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Signed delta for the debited side.
    pub fn debit(&self) -> i64 {
        // cannot overflow: value is in 1..=i64::MAX
        -self.0
    }

    /// Signed delta for the credited side.
    pub fn credit(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Amount {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}
