//! Transfer coordinator behaviour
//!
//! A saga over two independently owned balances, each step a correlated
//! round-trip through the broker:
//!
//! 1. eligibility: the source must not be a funds-only account
//! 2. destination: probe it, create an empty savings account if it is missing
//!    (skipped for ephemeral ids)
//! 3. withdraw from the source
//! 4. deposit into the destination
//!
//! There is no shared transaction. A deposit failure after a successful
//! withdrawal leaves the source debited unless compensation is enabled.

use tracing::{Level, event};

use crate::{
    actor::runtime::{ActorContext, Behavior},
    config::MetadataLookupPolicy,
    domain::{
        account::{ActorKind, Amount, InitParams},
        constant::transfer,
        error::LedgerError,
        message::{Command, Reply}
    }
};

pub struct TransferState {
    pub source:      Option<String>,
    pub destination: Option<String>
}

pub struct TransferCoordinator;

/// Why a transfer stopped, and which side it stopped on
struct Abort {
    error: String,
    from:  Option<String>,
    to:    Option<String>
}

impl Abort {
    fn new(error: impl Into<String>) -> Self {
        Self { error: error.into(), from: None, to: None }
    }

    fn at_source(error: impl Into<String>, from: &str) -> Self {
        Self { from: Some(from.to_string()), ..Self::new(error) }
    }

    fn at_destination(error: impl Into<String>, to: &str) -> Self {
        Self { to: Some(to.to_string()), ..Self::new(error) }
    }

    fn into_reply(self) -> Reply {
        Reply::TransferResult { success: false, error: Some(self.error), from: self.from, to: self.to }
    }
}

#[async_trait::async_trait]
impl Behavior for TransferCoordinator {
    type State = TransferState;

    const KIND: ActorKind = ActorKind::Transfer;

    fn init(&self, _ctx: &ActorContext, params: InitParams) -> Self::State {
        TransferState { source: params.source_account_id, destination: params.destination_account_id }
    }

    async fn handle(
        &self,
        ctx: &ActorContext,
        state: &mut TransferState,
        command: Command
    ) -> Result<Reply, LedgerError> {
        match command {
            Command::Transfer { amount, from, to } => {
                let from = from.or_else(|| state.source.clone());
                let to = to.or_else(|| state.destination.clone());

                let reply = match (from, to) {
                    (Some(from), Some(to)) => match self.perform(ctx, amount, &from, &to).await {
                        Ok(()) => Reply::transfer_succeeded(&from, &to),
                        Err(abort) => abort.into_reply()
                    },
                    _ => Reply::transfer_failed("transfer requires a source and a destination account")
                };
                Ok(reply)
            }
            other => Ok(Reply::unknown(ctx.account_id(), &other))
        }
    }
}

impl TransferCoordinator {
    async fn perform(&self, ctx: &ActorContext, amount: Amount, from: &str, to: &str) -> Result<(), Abort> {
        event!(Level::INFO, event = transfer::TRANSFER_STARTED,
               actor_id = %ctx.actor_id(), from = %from, to = %to, amount = %amount);

        if !amount.is_finite() || amount <= 0.0 {
            return Err(Abort::new(LedgerError::InvalidAmount(amount).to_string()));
        }

        self.check_eligibility(ctx, from).await?;
        self.ensure_destination(ctx, to).await?;

        let step = ctx.config().timeouts.transfer_step();

        leg(ctx.forward(from, Command::Withdraw { amount }, step).await).map_err(|error| {
            event!(Level::WARN, event = transfer::LEG_FAILED, leg = "withdraw", from = %from, error = %error);
            Abort::at_source(error, from)
        })?;

        if let Err(error) = leg(ctx.forward(to, Command::Deposit { amount }, step).await) {
            event!(Level::WARN, event = transfer::LEG_FAILED, leg = "deposit", to = %to, error = %error);
            let error = self.compensate(ctx, amount, from, error).await;
            return Err(Abort::at_destination(error, to));
        }

        event!(Level::INFO, event = transfer::TRANSFER_COMPLETED,
               actor_id = %ctx.actor_id(), from = %from, to = %to, amount = %amount);
        Ok(())
    }

    async fn check_eligibility(&self, ctx: &ActorContext, from: &str) -> Result<(), Abort> {
        let timeout = ctx.config().timeouts.transfer_step();

        match ctx.actor_info(from, timeout).await {
            Ok(Some(meta)) if meta.kind == ActorKind::Funds => {
                event!(Level::INFO, event = transfer::ELIGIBILITY_REJECTED, from = %from);
                Err(Abort::new(LedgerError::RestrictedAccountKind(from.to_string()).to_string()))
            }
            Ok(_) => Ok(()),
            Err(e) => match ctx.config().transfer.metadata_lookup {
                MetadataLookupPolicy::FailOpen => {
                    event!(Level::WARN, event = transfer::METADATA_LOOKUP_FAILED,
                           from = %from, error = %e, policy = "fail_open");
                    Ok(())
                }
                MetadataLookupPolicy::FailClosed => {
                    event!(Level::WARN, event = transfer::METADATA_LOOKUP_FAILED,
                           from = %from, error = %e, policy = "fail_closed");
                    Err(Abort::at_source(format!("Could not determine account kind of {}: {}", from, e), from))
                }
            }
        }
    }

    async fn ensure_destination(&self, ctx: &ActorContext, to: &str) -> Result<(), Abort> {
        if ctx.config().transfer.is_ephemeral(to) {
            return Ok(());
        }

        let timeout = ctx.config().timeouts.transfer_step();
        if ctx.forward(to, Command::GetBalance, timeout).await.is_ok() {
            return Ok(());
        }

        event!(Level::INFO, event = transfer::DESTINATION_CREATING, to = %to);
        ctx.notify(Reply::info(ctx.account_id(), format!("Destination {} not found. Creating new account...", to)));

        match ctx.create_actor(to, ActorKind::Savings, InitParams::with_balance(0.0), timeout).await {
            Ok(()) => {
                event!(Level::INFO, event = transfer::DESTINATION_CREATED, to = %to);
                Ok(())
            }
            Err(e) => Err(Abort::at_destination(format!("Failed to create account {}: {}", to, e), to))
        }
    }

    /// Credit the withdrawn amount back to the source when enabled.
    /// Returns the error text to report.
    async fn compensate(&self, ctx: &ActorContext, amount: Amount, from: &str, error: String) -> String {
        if !ctx.config().transfer.compensate_failed_deposit {
            return error;
        }

        let step = ctx.config().timeouts.transfer_step();
        match leg(ctx.forward(from, Command::Deposit { amount }, step).await) {
            Ok(_) => {
                event!(Level::INFO, event = transfer::COMPENSATION_APPLIED, from = %from, amount = %amount);
                format!("{}; {} credited back to {}", error, amount, from)
            }
            Err(credit_error) => {
                event!(Level::ERROR, event = transfer::COMPENSATION_FAILED,
                       from = %from, amount = %amount, error = %credit_error);
                format!("{}; credit back to {} failed: {}", error, from, credit_error)
            }
        }
    }
}

/// A leg succeeds only on a non-error reply; timeouts count as errors.
fn leg(outcome: Result<Reply, LedgerError>) -> Result<Reply, String> {
    match outcome {
        Ok(reply) => match reply.error_message() {
            Some(error) => Err(error.to_string()),
            None => Ok(reply)
        },
        Err(e) => Err(e.to_string())
    }
}
