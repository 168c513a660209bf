// core.rs splits the ledger into block handling, balance replay and link checks.
pub mod chain;
pub mod state;
pub mod validation;

pub use chain::*;
pub use state::*;
pub use validation::*;
