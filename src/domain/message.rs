//! Message schema shared by actors and the broker
//!
//! Every message serializes as a flat record with a `type` discriminator,
//! e.g. `{"type":"deposit","amount":50}`. Messages are immutable once built.

use serde::{Deserialize, Serialize};

use crate::domain::account::{ActorKind, Amount, RequestId};

/// Commands an actor accepts on its inbound queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    Deposit {
        amount: Amount
    },
    Withdraw {
        amount: Amount
    },
    GetBalance,
    Transfer {
        amount: Amount,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from:   Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to:     Option<String>
    },
    Mature {
        #[serde(rename = "toId", default, skip_serializing_if = "Option::is_none")]
        target_id: Option<String>
    }
}

impl Command {
    /// The wire name of this command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Deposit { .. } => "deposit",
            Command::Withdraw { .. } => "withdraw",
            Command::GetBalance => "getBalance",
            Command::Transfer { .. } => "transfer",
            Command::Mature { .. } => "mature"
        }
    }
}

/// Messages an actor emits to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Reply {
    BalanceUpdate {
        #[serde(rename = "accountId")]
        account_id: String,
        balance:    Amount
    },
    BalanceInfo {
        #[serde(rename = "accountId")]
        account_id: String,
        #[serde(rename = "actorType", default, skip_serializing_if = "Option::is_none")]
        kind:       Option<ActorKind>,
        balance:    Amount
    },
    Error {
        #[serde(rename = "accountId", default, skip_serializing_if = "Option::is_none")]
        account_id: Option<String>,
        error:      String
    },
    TransferResult {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error:   Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from:    Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to:      Option<String>
    },
    Info {
        #[serde(rename = "accountId")]
        account_id: String,
        message:    String
    },
    /// Announcement an actor makes once its loop is running
    Ready {
        #[serde(rename = "accountId")]
        account_id: String,
        #[serde(rename = "actorType")]
        kind:       ActorKind
    }
}

impl Reply {
    pub fn error(account_id: &str, error: impl Into<String>) -> Self {
        Reply::Error { account_id: Some(account_id.to_string()), error: error.into() }
    }

    pub fn unknown(account_id: &str, command: &Command) -> Self {
        Self::error(account_id, format!("Unknown message type: {}", command.name()))
    }

    pub fn info(account_id: &str, message: impl Into<String>) -> Self {
        Reply::Info { account_id: account_id.to_string(), message: message.into() }
    }

    pub fn transfer_succeeded(from: &str, to: &str) -> Self {
        Reply::TransferResult {
            success: true,
            error:   None,
            from:    Some(from.to_string()),
            to:      Some(to.to_string())
        }
    }

    pub fn transfer_failed(error: impl Into<String>) -> Self {
        Reply::TransferResult { success: false, error: Some(error.into()), from: None, to: None }
    }

    /// The error text if this reply reports a failure.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Reply::Error { error, .. } => Some(error),
            Reply::TransferResult { success: false, error, .. } => Some(error.as_deref().unwrap_or("transfer failed")),
            _ => None
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_message().is_some()
    }

    /// The balance carried by a balance update or balance info reply.
    pub fn balance(&self) -> Option<Amount> {
        match self {
            Reply::BalanceUpdate { balance, .. } | Reply::BalanceInfo { balance, .. } => Some(*balance),
            _ => None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Reply::BalanceUpdate { .. } => "balanceUpdate",
            Reply::BalanceInfo { .. } => "balanceInfo",
            Reply::Error { .. } => "error",
            Reply::TransferResult { .. } => "transferResult",
            Reply::Info { .. } => "info",
            Reply::Ready { .. } => "ready"
        }
    }
}

/// A command on an actor's inbound queue, optionally tagged with the
/// correlation id its reply must echo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    #[serde(flatten)]
    pub command:    Command
}

impl Envelope {
    /// A command whose reply is awaited by someone.
    pub fn request(request_id: RequestId, command: Command) -> Self {
        Self { request_id: Some(request_id), command }
    }

    /// A fire-and-forget command; its reply surfaces as a notification.
    pub fn notify(command: Command) -> Self {
        Self { request_id: None, command }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_commands_use_flat_type_tag() {
        assert_eq!(serde_json::to_value(Command::Deposit { amount: 50.0 }).unwrap(), json!({ "type": "deposit", "amount": 50.0 }));
        assert_eq!(serde_json::to_value(Command::GetBalance).unwrap(), json!({ "type": "getBalance" }));
        assert_eq!(
            serde_json::to_value(Command::Mature { target_id: Some("A".to_string()) }).unwrap(),
            json!({ "type": "mature", "toId": "A" })
        );
    }

    #[test]
    fn test_transfer_endpoints_are_optional() {
        let parsed: Command = serde_json::from_value(json!({ "type": "transfer", "amount": 10 })).unwrap();
        assert_eq!(parsed, Command::Transfer { amount: 10.0, from: None, to: None });

        let parsed: Command =
            serde_json::from_value(json!({ "type": "transfer", "amount": 10, "from": "A", "to": "C" })).unwrap();
        assert_eq!(parsed, Command::Transfer { amount: 10.0, from: Some("A".to_string()), to: Some("C".to_string()) });
    }

    #[test]
    fn test_reply_field_names() {
        let update = Reply::BalanceUpdate { account_id: "A".to_string(), balance: 90.0 };
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({ "type": "balanceUpdate", "accountId": "A", "balance": 90.0 }));

        let result = Reply::transfer_succeeded("A", "B");
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "type": "transferResult", "success": true, "from": "A", "to": "B" })
        );

        let error = Reply::error("B", "Insufficient funds");
        assert_eq!(error.error_message(), Some("Insufficient funds"));
        assert!(error.balance().is_none());
    }

    #[test]
    fn test_envelope_flattens_command() {
        let envelope = Envelope::request(RequestId::from("fwd-1"), Command::Withdraw { amount: 5.0 });
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value, json!({ "type": "withdraw", "amount": 5.0, "requestId": "fwd-1" }));
        assert_eq!(serde_json::from_value::<Envelope>(value).unwrap(), envelope);
    }
}
