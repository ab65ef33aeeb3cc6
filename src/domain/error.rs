use thiserror::Error;

/// Common error types for the ledger runtime
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// An awaited reply did not arrive before its deadline
    #[error("timeout waiting for {0}")]
    Timeout(String),

    /// Forward or lookup target has no live registry entry
    #[error("Actor not found: {0}")]
    ActorNotFound(String),

    /// Creation requested for an id that is already live
    #[error("Actor {0} already exists")]
    DuplicateActor(String),

    /// A correlation id was registered twice while still pending
    #[error("request {0} is already pending")]
    DuplicateRequest(String),

    /// Withdrawal exceeds the current balance
    #[error("Insufficient funds")]
    InsufficientFunds,

    /// Withdrawal attempted against a funds-only account
    #[error("Source actor {0} is a funds-only account and cannot be withdrawn from")]
    RestrictedAccountKind(String),

    /// Negative or non-finite amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    /// A message handler failed or panicked
    #[error("handler fault: {0}")]
    HandlerFault(String),

    /// Error string reported by another actor or by the broker
    #[error("{0}")]
    Remote(String),

    /// Messaging failures between actors and the broker
    #[error("{0}")]
    Broker(String),

    /// Spawn errors
    #[error("{0}")]
    Spawn(String),

    /// Configuration related errors
    #[error("{0}")]
    Configuration(String)
}

impl LedgerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LedgerError::Timeout(_))
    }
}

/// Convert from ractor::SpawnErr
impl From<ractor::SpawnErr> for LedgerError {
    fn from(err: ractor::SpawnErr) -> Self {
        LedgerError::Spawn(err.to_string())
    }
}

/// Convert from ractor::MessagingErr (mailbox closed, actor gone)
impl<T> From<ractor::MessagingErr<T>> for LedgerError {
    fn from(err: ractor::MessagingErr<T>) -> Self {
        LedgerError::Broker(err.to_string())
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Configuration(err.to_string())
    }
}

/// Convert from serde_yaml::Error
impl From<serde_yaml::Error> for LedgerError {
    fn from(err: serde_yaml::Error) -> Self {
        LedgerError::Configuration(err.to_string())
    }
}

/// Convert from anyhow::Error
impl From<anyhow::Error> for LedgerError {
    fn from(err: anyhow::Error) -> Self {
        LedgerError::Configuration(err.to_string())
    }
}
