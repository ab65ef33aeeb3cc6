//! Ledger - the driver's entry point into the actor system
//!
//! Owns the broker and the notification stream. Every operation is a call into
//! the broker's mailbox, so the driver sees the same serialized view of the
//! registry that actors do.

use std::{sync::Arc, time::Duration};

use ractor::{
    Actor, ActorRef, RpcReplyPort,
    rpc::{CallResult, call}
};
use tokio::sync::broadcast;
use tracing::{Level, event};

use crate::{
    actor::{
        broker::Broker,
        events::{ActorEvent, EventStream},
        message::BrokerMessage,
        runtime::{ActorHandle, Behavior, spawn_behavior}
    },
    config::RuntimeConfig,
    domain::{
        account::{ActorKind, ActorMeta, InitParams},
        constant::driver,
        error::LedgerError,
        message::{Command, Reply}
    }
};

/// Slack on top of the request deadline so the broker's own timeout wins
const CALL_MARGIN: Duration = Duration::from_millis(500);

/// Handle on a running broker and its actors
#[derive(Clone)]
pub struct Ledger {
    broker: ActorRef<BrokerMessage>,
    events: EventStream,
    config: Arc<RuntimeConfig>
}

impl Ledger {
    /// Spawn the broker with the given configuration.
    pub async fn start(config: RuntimeConfig) -> Result<Self, LedgerError> {
        let config = Arc::new(config);
        let events = EventStream::new(config.event_capacity);

        let (broker, _handle) = Actor::spawn(None, Broker, (config.clone(), events.clone())).await?;

        event!(Level::DEBUG, event = driver::LEDGER_STARTED, broker = %broker.get_id());
        Ok(Self { broker, events, config })
    }

    /// Create an actor of `kind` and register it under `actor_id` and its logical account id.
    pub async fn create_and_register(
        &self,
        kind: ActorKind,
        actor_id: impl Into<String>,
        params: InitParams
    ) -> Result<ActorHandle, LedgerError> {
        let actor_id = actor_id.into();
        self.call(|reply| BrokerMessage::CreateAndRegister { kind, actor_id, params, reply }, None).await?
    }

    /// Run a custom behaviour under the broker and register it like a built-in kind.
    pub async fn spawn_and_register<B: Behavior>(
        &self,
        behavior: B,
        actor_id: impl Into<String>,
        params: InitParams
    ) -> Result<ActorHandle, LedgerError> {
        let handle =
            spawn_behavior(behavior, actor_id.into(), params, self.broker.clone(), self.config.clone()).await?;
        if let Err(e) = self.register(handle.clone()).await {
            handle.stop();
            return Err(e);
        }
        Ok(handle)
    }

    /// Register an actor that is already running. Fails if its id or alias is taken.
    pub async fn register(&self, handle: ActorHandle) -> Result<(), LedgerError> {
        self.call(|reply| BrokerMessage::Register { handle, reply }, None).await?
    }

    pub async fn lookup(&self, id: &str) -> Result<Option<ActorHandle>, LedgerError> {
        self.call(|reply| BrokerMessage::Lookup { id: id.to_string(), reply }, None).await
    }

    pub async fn actor_info(&self, id: &str) -> Result<Option<ActorMeta>, LedgerError> {
        self.call(|reply| BrokerMessage::Metadata { id: id.to_string(), reply }, None).await
    }

    /// Fire-and-forget. The actor's reply shows up on the event stream.
    pub async fn tell(&self, target: &str, command: Command) -> Result<(), LedgerError> {
        self.call(|reply| BrokerMessage::Tell { target: target.to_string(), command, reply }, None).await?
    }

    /// Send `command` and wait for the actor's correlated reply.
    pub async fn request(&self, target: &str, command: Command) -> Result<Reply, LedgerError> {
        self.request_with_timeout(target, command, self.config.timeouts.request()).await
    }

    pub async fn request_with_timeout(
        &self,
        target: &str,
        command: Command,
        timeout: Duration
    ) -> Result<Reply, LedgerError> {
        self.call(
            |reply| BrokerMessage::Request { target: target.to_string(), command, timeout, reply },
            Some(timeout + CALL_MARGIN)
        )
        .await?
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActorEvent> {
        self.events.subscribe()
    }

    /// Stop every registered actor. Returns how many were stopped.
    pub async fn terminate_all(&self) -> Result<usize, LedgerError> {
        self.call(|reply| BrokerMessage::TerminateAll { reply }, None).await
    }

    /// Stop the broker without waiting. Its children go down with it.
    pub fn shutdown(&self) {
        self.broker.stop(None);
    }

    /// Stop the broker and wait until it and its children are gone.
    pub async fn stop(self, timeout: Duration) -> Result<(), LedgerError> {
        self.broker.stop_and_wait(None, Some(timeout)).await.map_err(|e| LedgerError::Broker(e.to_string()))?;
        event!(Level::DEBUG, event = driver::LEDGER_STOPPED);
        Ok(())
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub(crate) fn broker(&self) -> &ActorRef<BrokerMessage> {
        &self.broker
    }

    async fn call<T, F>(&self, build: F, timeout: Option<Duration>) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(RpcReplyPort<T>) -> BrokerMessage
    {
        match call(&self.broker, build, timeout).await {
            Ok(CallResult::Success(value)) => Ok(value),
            Ok(CallResult::Timeout) => Err(LedgerError::Timeout("broker".to_string())),
            Ok(CallResult::SenderError) => Err(LedgerError::Broker("broker dropped the request".to_string())),
            Err(e) => Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{events::EventLevel, savings::SavingsAccount};

    #[tokio::test]
    async fn test_lookup_by_id_and_alias_returns_same_actor() {
        let ledger = Ledger::start(RuntimeConfig::default()).await.unwrap();
        let created =
            ledger.create_and_register(ActorKind::Savings, "AccountA", InitParams::account("A", 100.0)).await.unwrap();

        let by_id = ledger.lookup("AccountA").await.unwrap().unwrap();
        let by_alias = ledger.lookup("A").await.unwrap().unwrap();

        assert!(by_id.is_same(&created));
        assert!(by_alias.is_same(&created));
        assert_eq!(by_alias.actor_id(), "AccountA");
        assert_eq!(by_alias.account_id(), "A");
        ledger.shutdown();
    }

    #[tokio::test]
    async fn test_spawned_behavior_is_routable_and_unique() {
        let ledger = Ledger::start(RuntimeConfig::default()).await.unwrap();

        ledger.spawn_and_register(SavingsAccount, "custom", InitParams::account("X", 5.0)).await.unwrap();
        let again = ledger.spawn_and_register(SavingsAccount, "other", InitParams::account("X", 1.0)).await;

        assert_eq!(again.err(), Some(LedgerError::DuplicateActor("X".to_string())));
        assert_eq!(ledger.request("X", Command::GetBalance).await.unwrap().balance(), Some(5.0));
        assert_eq!(
            ledger.actor_info("custom").await.unwrap(),
            Some(ActorMeta { account_id: "X".to_string(), kind: ActorKind::Savings })
        );
        assert!(ledger.lookup("other").await.unwrap().is_none());
        ledger.shutdown();
    }

    #[tokio::test]
    async fn test_new_actor_announces_itself() {
        let ledger = Ledger::start(RuntimeConfig::default()).await.unwrap();
        let mut events = ledger.subscribe();

        ledger.create_and_register(ActorKind::Funds, "fundA", InitParams::account("fA", 100.0)).await.unwrap();

        let ready = tokio::time::timeout(Duration::from_secs(2), events.recv()).await.unwrap().unwrap();
        assert_eq!(ready, ActorEvent::new(EventLevel::Debug, "fundA", "funds actor fA is ready"));
        ledger.shutdown();
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_correlated() {
        let ledger = Ledger::start(RuntimeConfig::default()).await.unwrap();
        ledger.create_and_register(ActorKind::Savings, "A", InitParams::with_balance(0.0)).await.unwrap();
        ledger.create_and_register(ActorKind::Savings, "B", InitParams::with_balance(1000.0)).await.unwrap();

        let (a, b) = tokio::join!(
            ledger.request("A", Command::Deposit { amount: 7.0 }),
            ledger.request("B", Command::Withdraw { amount: 1.0 })
        );

        assert_eq!(a.unwrap(), Reply::BalanceUpdate { account_id: "A".to_string(), balance: 7.0 });
        assert_eq!(b.unwrap(), Reply::BalanceUpdate { account_id: "B".to_string(), balance: 999.0 });
        ledger.shutdown();
    }

    #[tokio::test]
    async fn test_stop_waits_for_broker() {
        let ledger = Ledger::start(RuntimeConfig::default()).await.unwrap();
        ledger.create_and_register(ActorKind::Savings, "A", InitParams::with_balance(1.0)).await.unwrap();
        let observer = ledger.clone();

        ledger.stop(Duration::from_secs(2)).await.unwrap();

        assert!(observer.lookup("A").await.is_err());
    }
}
