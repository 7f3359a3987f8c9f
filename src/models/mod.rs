pub mod ledger;
pub mod principal;
pub mod token;

pub use ledger::LedgerEntry;
pub use principal::Principal;
pub use token::{mint, settle, sweep_batch, MintError, MintOutcome, SettleOutcome, TokenRecord};
