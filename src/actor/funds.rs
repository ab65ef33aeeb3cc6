//! Funds account behaviour
//!
//! Deposits accrue interest on the post-deposit balance and the account cannot
//! be withdrawn from. `mature` liquidates the whole balance into another account
//! and then asks the broker to remove this actor; any failure along the way
//! leaves the actor alive with its balance intact.

use tracing::{Level, event};

use crate::{
    actor::{
        runtime::{ActorContext, Behavior},
        savings::{balance_update, validate}
    },
    domain::{
        account::{ActorKind, Amount, InitParams},
        constant::account,
        error::LedgerError,
        message::{Command, Reply}
    }
};

pub struct FundsState {
    pub balance: Amount
}

pub struct FundsAccount;

#[async_trait::async_trait]
impl Behavior for FundsAccount {
    type State = FundsState;

    const KIND: ActorKind = ActorKind::Funds;

    fn init(&self, ctx: &ActorContext, params: InitParams) -> Self::State {
        FundsState { balance: ctx.config().funds.accrue(0.0, params.initial_balance) }
    }

    async fn handle(&self, ctx: &ActorContext, state: &mut FundsState, command: Command) -> Result<Reply, LedgerError> {
        let account_id = ctx.account_id();

        let reply = match command {
            Command::Deposit { amount } => match validate(amount) {
                Ok(amount) => {
                    state.balance = ctx.config().funds.accrue(state.balance, amount);
                    event!(Level::DEBUG, event = account::DEPOSITED,
                           account_id = %account_id, amount = %amount, balance = %state.balance);
                    balance_update(account_id, state.balance)
                }
                Err(e) => Reply::error(account_id, e.to_string())
            },
            Command::Withdraw { .. } => {
                Reply::error(account_id, LedgerError::RestrictedAccountKind(account_id.to_string()).to_string())
            }
            Command::GetBalance => {
                Reply::BalanceInfo { account_id: account_id.to_string(), kind: Some(Self::KIND), balance: state.balance }
            }
            Command::Mature { target_id: Some(target_id) } => self.mature(ctx, state, &target_id).await,
            Command::Mature { target_id: None } => Reply::error(account_id, "mature requires a target savings id"),
            other => Reply::unknown(account_id, &other)
        };

        Ok(reply)
    }
}

impl FundsAccount {
    async fn mature(&self, ctx: &ActorContext, state: &mut FundsState, target_id: &str) -> Reply {
        let account_id = ctx.account_id();
        let timeouts = &ctx.config().timeouts;
        let amount = state.balance;

        event!(Level::INFO, event = account::MATURE_STARTED,
               account_id = %account_id, target = %target_id, amount = %amount);

        // The deposit would queue behind this handler and land after the timeout
        if target_id == ctx.actor_id() || target_id == account_id {
            let error = format!("cannot mature {} into itself", account_id);
            event!(Level::WARN, event = account::MATURE_FAILED, account_id = %account_id, error = %error);
            return Reply::error(account_id, error);
        }

        if amount <= 0.0 {
            ctx.notify(Reply::info(account_id, "No balance to transfer"));
        }

        let failure = match ctx.forward(target_id, Command::Deposit { amount }, timeouts.mature_deposit()).await {
            Ok(reply) => reply.error_message().map(|error| format!("mature deposit failed: {}", error)),
            Err(e) if e.is_timeout() => Some(format!("mature deposit timed out: {}", e)),
            Err(e) => Some(format!("mature deposit failed: {}", e))
        };
        if let Some(error) = failure {
            event!(Level::WARN, event = account::MATURE_FAILED, account_id = %account_id, error = %error);
            return Reply::error(account_id, error);
        }

        if let Err(e) = ctx.delete_actor(ctx.actor_id(), timeouts.mature_delete()).await {
            let error = if e.is_timeout() {
                format!("deleteActor timed out: {}", e)
            } else {
                format!("failed to delete actor: {}", e)
            };
            event!(Level::WARN, event = account::MATURE_FAILED, account_id = %account_id, error = %error);
            return Reply::error(account_id, error);
        }

        state.balance = 0.0;
        event!(Level::INFO, event = account::MATURED, account_id = %account_id, target = %target_id, amount = %amount);
        Reply::info(account_id, format!("Matured {} into {}", amount, target_id))
    }
}
