//! Transfer module
//!
//! Composes the store's single-row primitives into one atomic money transfer:
//! the transaction executor, the transfer handler that defines the unit of
//! work, and the caller-side retry wrapper for transient conflicts.

mod executor;
mod handler;
mod policy;
mod retry;

#[cfg(test)]
mod tests;

pub use executor::TxExecutor;
pub use handler::{execute_transfer, TransferHandler};
pub use policy::TransferPolicy;
pub use retry::{retry_transient, RetryPolicy};
