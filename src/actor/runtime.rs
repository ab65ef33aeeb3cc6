//! Actor message loop
//!
//! Every account and transfer actor runs inside a [`MessageLoop`]: a ractor actor
//! whose mailbox is the private FIFO queue. The loop hands one command at a time
//! to its [`Behavior`] and sends the single reply back to the broker, echoing the
//! command's request id. A failing or panicking handler is reported as an
//! `error` reply and the loop carries on with the next message.
//!
//! Outbound requests go through [`ActorContext`], which registers a correlation
//! entry before asking the broker. The broker answers through [`ActorHandle`],
//! which completes that entry without touching the mailbox.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tracing::{Level, event};

use crate::{
    actor::{
        correlation::Correlator,
        funds::FundsAccount,
        message::{ActorMessage, BrokerMessage, BrokerReply},
        savings::SavingsAccount,
        transfer::TransferCoordinator
    },
    config::RuntimeConfig,
    domain::{
        account::{ActorKind, ActorMeta, InitParams, RequestId},
        constant::message_loop,
        error::LedgerError,
        message::{Command, Envelope, Reply}
    }
};

/// Behaviour plugged into the message loop.
#[async_trait::async_trait]
pub trait Behavior: Send + Sync + 'static {
    /// Private mutable state, touched only by this actor's loop
    type State: Send + 'static;

    const KIND: ActorKind;

    fn init(&self, ctx: &ActorContext, params: InitParams) -> Self::State;

    /// Handle one command and produce exactly one reply.
    ///
    /// Domain failures are `Ok(Reply::Error { .. })`; an `Err` is a fault.
    async fn handle(&self, ctx: &ActorContext, state: &mut Self::State, command: Command)
    -> Result<Reply, LedgerError>;
}

/// An actor's view of the outside world: its identity and the broker.
#[derive(Debug, Clone)]
pub struct ActorContext {
    actor_id:   String,
    account_id: String,
    kind:       ActorKind,
    broker:     ActorRef<BrokerMessage>,
    pending:    Correlator<BrokerReply>,
    config:     Arc<RuntimeConfig>
}

impl ActorContext {
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn kind(&self) -> ActorKind {
        self.kind
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Send a reply to the broker, tagged with the request it answers.
    pub fn emit(&self, request_id: Option<RequestId>, reply: Reply) {
        if let Err(e) = self.broker.cast(BrokerMessage::Emit { source: self.actor_id.clone(), request_id, reply }) {
            event!(Level::WARN, event = message_loop::OUTBOX_CLOSED, actor_id = %self.actor_id, error = %e);
        }
    }

    /// Send an uncorrelated notification to the broker.
    pub fn notify(&self, reply: Reply) {
        self.emit(None, reply);
    }

    /// Ask the broker to deliver `payload` to `target` and return the target's reply.
    pub async fn forward(&self, target: &str, payload: Command, timeout: Duration) -> Result<Reply, LedgerError> {
        let outcome = self
            .round_trip("fwd", timeout, |request_id| BrokerMessage::Forward {
                source: self.actor_id.clone(),
                target: target.to_string(),
                payload,
                request_id
            })
            .await?;

        match outcome {
            BrokerReply::ForwardResult { resp: Some(reply), .. } => Ok(reply),
            BrokerReply::ForwardResult { error, .. } => {
                Err(LedgerError::Remote(error.unwrap_or_else(|| "empty forward result".to_string())))
            }
            other => Err(unexpected(&other))
        }
    }

    /// Stored metadata for `lookup_id`, or `None` if the broker knows nothing about it.
    pub async fn actor_info(&self, lookup_id: &str, timeout: Duration) -> Result<Option<ActorMeta>, LedgerError> {
        let outcome = self
            .round_trip("info", timeout, |request_id| BrokerMessage::GetActorInfo {
                requester: self.actor_id.clone(),
                lookup_id: lookup_id.to_string(),
                request_id
            })
            .await?;

        match outcome {
            BrokerReply::ActorInfo { info, .. } => Ok(info),
            other => Err(unexpected(&other))
        }
    }

    /// Ask the broker to create and register a new actor.
    pub async fn create_actor(
        &self,
        actor_id: &str,
        kind: ActorKind,
        params: InitParams,
        timeout: Duration
    ) -> Result<(), LedgerError> {
        let outcome = self
            .round_trip("create", timeout, |request_id| BrokerMessage::CreateActor {
                requester: self.actor_id.clone(),
                actor_id: actor_id.to_string(),
                kind,
                params,
                request_id
            })
            .await?;

        match outcome {
            BrokerReply::CreateActorResult { success: true, .. } => Ok(()),
            BrokerReply::CreateActorResult { error, .. } => {
                Err(LedgerError::Remote(error.unwrap_or_else(|| format!("could not create {}", actor_id))))
            }
            other => Err(unexpected(&other))
        }
    }

    /// Ask the broker to remove and stop `actor_id`.
    pub async fn delete_actor(&self, actor_id: &str, timeout: Duration) -> Result<(), LedgerError> {
        let outcome = self
            .round_trip("del", timeout, |request_id| BrokerMessage::DeleteActor {
                requester: self.actor_id.clone(),
                actor_id: actor_id.to_string(),
                request_id
            })
            .await?;

        match outcome {
            BrokerReply::DeleteActorResult { success: true, .. } => Ok(()),
            BrokerReply::DeleteActorResult { error, .. } => {
                Err(LedgerError::Remote(error.unwrap_or_else(|| format!("could not delete {}", actor_id))))
            }
            other => Err(unexpected(&other))
        }
    }

    async fn round_trip<F>(&self, prefix: &str, timeout: Duration, build: F) -> Result<BrokerReply, LedgerError>
    where
        F: FnOnce(RequestId) -> BrokerMessage
    {
        let request_id = RequestId::generate(prefix);
        // Register before sending so a fast reply cannot be missed
        let pending = self.pending.register(request_id.clone())?;
        self.broker.cast(build(request_id))?;
        pending.wait(timeout).await
    }
}

fn unexpected(reply: &BrokerReply) -> LedgerError {
    LedgerError::Broker(format!("unexpected broker reply: {}", reply.name()))
}

/// The broker's handle on a live actor.
#[derive(Debug, Clone)]
pub struct ActorHandle {
    actor_id:   String,
    account_id: String,
    kind:       ActorKind,
    actor:      ActorRef<ActorMessage>,
    pending:    Correlator<BrokerReply>
}

impl ActorHandle {
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn kind(&self) -> ActorKind {
        self.kind
    }

    pub fn meta(&self) -> ActorMeta {
        ActorMeta { account_id: self.account_id.clone(), kind: self.kind }
    }

    /// Enqueue a command on the actor's inbound queue.
    pub fn deliver(&self, envelope: Envelope) -> Result<(), LedgerError> {
        self.actor.cast(ActorMessage::Deliver(envelope))?;
        Ok(())
    }

    /// Complete the actor's pending request. Late or unknown replies are dropped.
    pub fn deliver_reply(&self, reply: BrokerReply) -> bool {
        let request_id = reply.request_id().clone();
        self.pending.resolve(&request_id, reply)
    }

    /// Same underlying actor (aliases share one handle).
    pub fn is_same(&self, other: &ActorHandle) -> bool {
        self.actor.get_id() == other.actor.get_id()
    }

    pub(crate) fn actor_ref(&self) -> &ActorRef<ActorMessage> {
        &self.actor
    }

    pub fn stop(&self) {
        self.actor.stop(None);
    }
}

/// Spawn an actor of `kind`, supervised by the broker.
pub async fn spawn_actor(
    kind: ActorKind,
    actor_id: String,
    params: InitParams,
    broker: ActorRef<BrokerMessage>,
    config: Arc<RuntimeConfig>
) -> Result<ActorHandle, LedgerError> {
    match kind {
        ActorKind::Savings => spawn_behavior(SavingsAccount, actor_id, params, broker, config).await,
        ActorKind::Funds => spawn_behavior(FundsAccount, actor_id, params, broker, config).await,
        ActorKind::Transfer => spawn_behavior(TransferCoordinator, actor_id, params, broker, config).await
    }
}

/// Run `behavior` in a message loop supervised by `broker`. The returned handle
/// still has to be registered before other actors can reach it.
pub async fn spawn_behavior<B: Behavior>(
    behavior: B,
    actor_id: String,
    params: InitParams,
    broker: ActorRef<BrokerMessage>,
    config: Arc<RuntimeConfig>
) -> Result<ActorHandle, LedgerError> {
    let account_id = params.logical_id(&actor_id);
    let pending = Correlator::new();
    let ctx = ActorContext {
        actor_id: actor_id.clone(),
        account_id: account_id.clone(),
        kind: B::KIND,
        broker,
        pending: pending.clone(),
        config
    };

    let actor = spawn_loop(behavior, ctx, params).await?;
    Ok(ActorHandle { actor_id, account_id, kind: B::KIND, actor, pending })
}

pub(crate) async fn spawn_loop<B: Behavior>(
    behavior: B,
    ctx: ActorContext,
    params: InitParams
) -> Result<ActorRef<ActorMessage>, LedgerError> {
    let supervisor = ctx.broker.get_cell();
    let (actor, _handle) = Actor::spawn_linked(None, MessageLoop { behavior }, (ctx, params), supervisor).await?;
    Ok(actor)
}

/// Message loop state: identity plus the behaviour's private state
pub struct LoopState<S> {
    ctx:   ActorContext,
    inner: S
}

/// Cooperative single-consumer loop over an actor's mailbox
pub struct MessageLoop<B> {
    behavior: B
}

#[async_trait::async_trait]
impl<B: Behavior> Actor for MessageLoop<B> {
    type Arguments = (ActorContext, InitParams);
    type Msg = ActorMessage;
    type State = LoopState<B::State>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        (ctx, params): Self::Arguments
    ) -> Result<Self::State, ActorProcessingErr> {
        let inner = self.behavior.init(&ctx, params);
        Ok(LoopState { ctx, inner })
    }

    async fn post_start(&self, _myself: ActorRef<Self::Msg>, state: &mut Self::State) -> Result<(), ActorProcessingErr> {
        event!(Level::DEBUG, event = message_loop::ACTOR_STARTED,
               actor_id = %state.ctx.actor_id, kind = %B::KIND);

        state.ctx.notify(Reply::Ready { account_id: state.ctx.account_id.clone(), kind: B::KIND });
        Ok(())
    }

    async fn post_stop(&self, _myself: ActorRef<Self::Msg>, state: &mut Self::State) -> Result<(), ActorProcessingErr> {
        event!(Level::DEBUG, event = message_loop::ACTOR_STOPPED, actor_id = %state.ctx.actor_id);
        Ok(())
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ActorMessage::Deliver(envelope) => self.dispatch(envelope, state).await
        }
        Ok(())
    }
}

impl<B: Behavior> MessageLoop<B> {
    async fn dispatch(&self, envelope: Envelope, state: &mut LoopState<B::State>) {
        let Envelope { request_id, command } = envelope;
        let command_name = command.name();

        event!(Level::DEBUG, event = message_loop::MESSAGE_RECEIVED,
               actor_id = %state.ctx.actor_id, command = %command_name);

        let outcome = AssertUnwindSafe(self.behavior.handle(&state.ctx, &mut state.inner, command)).catch_unwind().await;

        let reply = match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => self.fault(&state.ctx, command_name, LedgerError::HandlerFault(e.to_string())),
            Err(panic) => self.fault(&state.ctx, command_name, LedgerError::HandlerFault(panic_message(panic.as_ref())))
        };

        event!(Level::DEBUG, event = message_loop::MESSAGE_HANDLED,
               actor_id = %state.ctx.actor_id, command = %command_name, reply = %reply.name());

        state.ctx.emit(request_id, reply);
    }

    fn fault(&self, ctx: &ActorContext, command: &str, fault: LedgerError) -> Reply {
        event!(Level::ERROR, event = message_loop::HANDLER_FAULT,
               actor_id = %ctx.actor_id, command = %command, error = %fault);
        Reply::error(&ctx.account_id, fault.to_string())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        actor::{
            events::{ActorEvent, EventLevel},
            ledger::Ledger
        },
        domain::account::Amount
    };

    /// Counts deposits; panics on withdraw, faults on transfer.
    struct Flaky;

    #[async_trait::async_trait]
    impl Behavior for Flaky {
        type State = Amount;

        const KIND: ActorKind = ActorKind::Savings;

        fn init(&self, _ctx: &ActorContext, params: InitParams) -> Self::State {
            params.initial_balance
        }

        async fn handle(&self, ctx: &ActorContext, state: &mut Amount, command: Command) -> Result<Reply, LedgerError> {
            match command {
                Command::Deposit { amount } => {
                    *state += amount;
                    Ok(Reply::BalanceUpdate { account_id: ctx.account_id().to_string(), balance: *state })
                }
                Command::Withdraw { .. } => panic!("ledger corrupted"),
                Command::Transfer { .. } => Err(LedgerError::Broker("no route".to_string())),
                other => Ok(Reply::unknown(ctx.account_id(), &other))
            }
        }
    }

    fn context(ledger: &Ledger, actor_id: &str) -> ActorContext {
        ActorContext {
            actor_id:   actor_id.to_string(),
            account_id: actor_id.to_string(),
            kind:       ActorKind::Savings,
            broker:     ledger.broker().clone(),
            pending:    Correlator::new(),
            config:     Arc::new(ledger.config().clone())
        }
    }

    async fn next_message(events: &mut tokio::sync::broadcast::Receiver<ActorEvent>, actor_id: &str) -> ActorEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), events.recv()).await.unwrap().unwrap();
            if event.actor_id == actor_id && event.level != EventLevel::Debug {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_handler_faults_are_reported_and_loop_continues() {
        let ledger = Ledger::start(RuntimeConfig::default()).await.unwrap();
        let mut events = ledger.subscribe();
        let actor = spawn_loop(Flaky, context(&ledger, "flaky"), InitParams::with_balance(10.0)).await.unwrap();

        actor.cast(ActorMessage::Deliver(Envelope::notify(Command::Withdraw { amount: 1.0 }))).unwrap();
        actor.cast(ActorMessage::Deliver(Envelope::notify(Command::Transfer { amount: 1.0, from: None, to: None }))).unwrap();
        actor.cast(ActorMessage::Deliver(Envelope::notify(Command::Deposit { amount: 5.0 }))).unwrap();

        let panicked = next_message(&mut events, "flaky").await;
        assert_eq!(panicked.level, EventLevel::Error);
        assert!(panicked.message.contains("handler fault: ledger corrupted"));

        let faulted = next_message(&mut events, "flaky").await;
        assert!(faulted.message.contains("handler fault: no route"));

        let deposited = next_message(&mut events, "flaky").await;
        assert_eq!(deposited.level, EventLevel::Info);
        assert!(deposited.message.contains("is 15"));

        actor.stop(None);
        ledger.shutdown();
    }

    #[tokio::test]
    async fn test_messages_processed_in_delivery_order() {
        let ledger = Ledger::start(RuntimeConfig::default()).await.unwrap();
        let mut events = ledger.subscribe();
        let actor = spawn_loop(Flaky, context(&ledger, "ordered"), InitParams::with_balance(0.0)).await.unwrap();

        for amount in 1..=5 {
            actor.cast(ActorMessage::Deliver(Envelope::notify(Command::Deposit { amount: amount as Amount }))).unwrap();
        }

        let mut balances = Vec::new();
        for _ in 0..5 {
            balances.push(next_message(&mut events, "ordered").await.message);
        }

        let expected: Vec<String> = [1, 3, 6, 10, 15].iter().map(|b| format!("New balance for ordered is {}", b)).collect();
        assert_eq!(balances, expected);

        actor.stop(None);
        ledger.shutdown();
    }
}
