//! Account domain types
//!
//! Identifiers, actor kinds, registry metadata and creation parameters shared
//! by the broker and every actor behaviour.

use std::fmt::{self, Display};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Monetary amount. Funds accrual produces fractional balances.
pub type Amount = f64;

/// The behaviour an actor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    /// Deposit / withdraw / balance
    Savings,
    /// Interest-bearing, no direct withdrawal, self-liquidating
    Funds,
    /// Orchestrates a two-leg transfer between two other actors
    Transfer
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::Savings => "savings",
            ActorKind::Funds => "funds",
            ActorKind::Transfer => "transfer"
        }
    }
}

impl Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata the broker keeps per registered id, answering "what kind of actor
/// is this" without routing through the actor itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorMeta {
    pub account_id: String,
    #[serde(rename = "actorType")]
    pub kind:       ActorKind
}

/// Startup parameters handed to a newly created actor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitParams {
    /// Logical account id; defaults to the actor id when absent
    pub account_id:             Option<String>,
    /// Opening balance (savings and funds)
    pub initial_balance:        Amount,
    /// Default transfer source (transfer kind)
    pub source_account_id:      Option<String>,
    /// Default transfer destination (transfer kind)
    pub destination_account_id: Option<String>
}

impl InitParams {
    /// Parameters for an account actor registered under an explicit logical id.
    pub fn account(account_id: impl Into<String>, initial_balance: Amount) -> Self {
        Self { account_id: Some(account_id.into()), initial_balance, ..Self::default() }
    }

    /// Parameters for an account actor whose logical id equals its actor id.
    pub fn with_balance(initial_balance: Amount) -> Self {
        Self { initial_balance, ..Self::default() }
    }

    /// Parameters for a transfer actor with preconfigured endpoints.
    pub fn transfer(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source_account_id: Some(source.into()),
            destination_account_id: Some(destination.into()),
            ..Self::default()
        }
    }

    /// The logical account id for an actor registered as `actor_id`.
    pub fn logical_id(&self, actor_id: &str) -> String {
        self.account_id.clone().unwrap_or_else(|| actor_id.to_string())
    }
}

/// Correlation identifier linking an outgoing request to its reply.
///
/// Format: `<prefix>-<unix millis>-<random suffix>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate(prefix: &str) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), &suffix[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_request_ids_are_unique_and_prefixed() {
        let ids: HashSet<RequestId> = (0..1000).map(|_| RequestId::generate("fwd")).collect();

        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.as_str().starts_with("fwd-")));
    }

    #[test]
    fn test_logical_id_falls_back_to_actor_id() {
        assert_eq!(InitParams::account("A", 100.0).logical_id("AccountA"), "A");
        assert_eq!(InitParams::with_balance(0.0).logical_id("C"), "C");
        assert_eq!(InitParams::transfer("A", "B").logical_id("ActionActor"), "ActionActor");
    }

    #[test]
    fn test_meta_uses_actor_type_field() {
        let meta = ActorMeta { account_id: "fA".to_string(), kind: ActorKind::Funds };
        let json = serde_json::to_value(&meta).unwrap();

        assert_eq!(json, serde_json::json!({ "accountId": "fA", "actorType": "funds" }));
    }
}
