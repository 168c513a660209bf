// Thin re-export module: implementation lives under `blockchain/core/`
// (block model and facade, accounting, chain validation).

pub mod core;
pub use self::core::*;
