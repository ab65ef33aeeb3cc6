//! Savings account behaviour: deposit, withdraw, balance

use tracing::{Level, event};

use crate::{
    actor::runtime::{ActorContext, Behavior},
    domain::{
        account::{ActorKind, Amount, InitParams},
        constant::account,
        error::LedgerError,
        message::{Command, Reply}
    }
};

pub struct SavingsState {
    pub balance: Amount
}

pub struct SavingsAccount;

#[async_trait::async_trait]
impl Behavior for SavingsAccount {
    type State = SavingsState;

    const KIND: ActorKind = ActorKind::Savings;

    fn init(&self, _ctx: &ActorContext, params: InitParams) -> Self::State {
        SavingsState { balance: params.initial_balance }
    }

    async fn handle(
        &self,
        ctx: &ActorContext,
        state: &mut SavingsState,
        command: Command
    ) -> Result<Reply, LedgerError> {
        let account_id = ctx.account_id();

        let reply = match command {
            Command::Deposit { amount } => match validate(amount) {
                Ok(amount) => {
                    state.balance += amount;
                    event!(Level::DEBUG, event = account::DEPOSITED,
                           account_id = %account_id, amount = %amount, balance = %state.balance);
                    balance_update(account_id, state.balance)
                }
                Err(e) => Reply::error(account_id, e.to_string())
            },
            Command::Withdraw { amount } => match validate(amount) {
                Ok(amount) if state.balance >= amount => {
                    state.balance -= amount;
                    event!(Level::DEBUG, event = account::WITHDRAWN,
                           account_id = %account_id, amount = %amount, balance = %state.balance);
                    balance_update(account_id, state.balance)
                }
                Ok(amount) => {
                    event!(Level::DEBUG, event = account::WITHDRAW_REJECTED,
                           account_id = %account_id, amount = %amount, balance = %state.balance);
                    Reply::error(account_id, LedgerError::InsufficientFunds.to_string())
                }
                Err(e) => Reply::error(account_id, e.to_string())
            },
            Command::GetBalance => {
                Reply::BalanceInfo { account_id: account_id.to_string(), kind: Some(Self::KIND), balance: state.balance }
            }
            other => Reply::unknown(account_id, &other)
        };

        Ok(reply)
    }
}

/// Amounts must be finite and non-negative. Zero is a valid degenerate deposit.
pub(crate) fn validate(amount: Amount) -> Result<Amount, LedgerError> {
    if amount.is_finite() && amount >= 0.0 { Ok(amount) } else { Err(LedgerError::InvalidAmount(amount)) }
}

pub(crate) fn balance_update(account_id: &str, balance: Amount) -> Reply {
    Reply::BalanceUpdate { account_id: account_id.to_string(), balance }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{actor::ledger::Ledger, config::RuntimeConfig};

    async fn ledger_with(actor_id: &str, account_id: &str, balance: Amount) -> Ledger {
        let ledger = Ledger::start(RuntimeConfig::default()).await.unwrap();
        ledger.create_and_register(ActorKind::Savings, actor_id, InitParams::account(account_id, balance)).await.unwrap();
        ledger
    }

    async fn balance_of(ledger: &Ledger, id: &str) -> Amount {
        ledger.request(id, Command::GetBalance).await.unwrap().balance().unwrap()
    }

    #[tokio::test]
    async fn test_overdraw_leaves_balance_unchanged() {
        let ledger = ledger_with("AccountB", "B", 50.0).await;

        let reply = ledger.request("B", Command::Withdraw { amount: 80.0 }).await.unwrap();

        assert_eq!(reply, Reply::error("B", "Insufficient funds"));
        assert_eq!(balance_of(&ledger, "B").await, 50.0);
        ledger.shutdown();
    }

    #[tokio::test]
    async fn test_deposit_then_withdraw() {
        let ledger = ledger_with("AccountA", "A", 0.0).await;

        ledger.request("A", Command::Deposit { amount: 10.0 }).await.unwrap();
        let reply = ledger.request("A", Command::Withdraw { amount: 5.0 }).await.unwrap();

        assert_eq!(reply, Reply::BalanceUpdate { account_id: "A".to_string(), balance: 5.0 });
        ledger.shutdown();
    }

    #[tokio::test]
    async fn test_failed_withdraw_does_not_affect_later_deposit() {
        let ledger = ledger_with("AccountA", "A", 0.0).await;

        let withdraw = ledger.request("A", Command::Withdraw { amount: 5.0 }).await.unwrap();
        let deposit = ledger.request("A", Command::Deposit { amount: 10.0 }).await.unwrap();

        assert!(withdraw.is_error());
        assert_eq!(deposit.balance(), Some(10.0));
        ledger.shutdown();
    }

    #[tokio::test]
    async fn test_alias_and_actor_id_reach_same_account() {
        let ledger = ledger_with("AccountA", "A", 100.0).await;

        ledger.request("AccountA", Command::Deposit { amount: 50.0 }).await.unwrap();

        assert_eq!(balance_of(&ledger, "A").await, 150.0);
        assert_eq!(
            ledger.request("A", Command::GetBalance).await.unwrap(),
            Reply::BalanceInfo { account_id: "A".to_string(), kind: Some(ActorKind::Savings), balance: 150.0 }
        );
        ledger.shutdown();
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_commands() {
        let ledger = ledger_with("AccountA", "A", 100.0).await;

        let mature = ledger.request("A", Command::Mature { target_id: Some("B".to_string()) }).await.unwrap();
        let negative = ledger.request("A", Command::Deposit { amount: -3.0 }).await.unwrap();

        assert_eq!(mature.error_message(), Some("Unknown message type: mature"));
        assert_eq!(negative.error_message(), Some("Invalid amount: -3"));
        assert_eq!(balance_of(&ledger, "A").await, 100.0);
        ledger.shutdown();
    }
}
