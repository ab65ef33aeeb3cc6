//! Ledger domain: identifiers, message schema, errors and event names

pub mod account;
pub mod constant;
pub mod error;
pub mod message;
