//! Shared ledger
//!
//! Holds balances, vault records, source reserves and the safety counters.
//! All mutation goes through a journaled `LedgerTx`, which is what makes a
//! whole trade commit or unwind as one unit.

pub mod state;
pub mod tx;
pub mod vault_ledger;

pub use state::{AdminParams, LedgerState, RouterStats};
pub use tx::{LedgerTx, Savepoint};
