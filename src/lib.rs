//! # Ledger
//!
//! An actor-model banking ledger built on Ractor.
//!
//! This crate provides:
//! - A broker actor that owns the actor registry and routes every message
//! - Savings and funds account actors with private balances
//! - Transfer actors running a withdraw-then-deposit protocol across accounts
//! - Correlated request/reply with timeouts between actors
//! - A scripted demo driven from the `ledger` binary

pub mod actor;
pub mod cli;
pub mod config;
pub mod domain;

pub use actor::{ActorEvent, ActorHandle, EventLevel, Ledger};
pub use config::{RuntimeConfig, load_config};
pub use domain::{
    account::{ActorKind, ActorMeta, Amount, InitParams, RequestId},
    error::LedgerError,
    message::{Command, Envelope, Reply}
};
