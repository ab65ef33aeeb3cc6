//! Actor-based ledger runtime
//!
//! A single broker actor owns the registry and routes every message between
//! account and transfer actors, each of which runs its own FIFO message loop
//! on top of Ractor.

pub mod broker;
pub mod correlation;
pub mod events;
pub mod funds;
pub mod ledger;
pub mod message;
pub mod runtime;
pub mod savings;
pub mod transfer;

pub use broker::*;
pub use correlation::*;
pub use events::*;
pub use ledger::*;
pub use message::*;
pub use runtime::*;
