//! Broker Actor - Registry owner and message router
//!
//! The Broker is the only component that knows where actors live:
//! - Owns the actor table (id and alias -> handle) and the metadata table
//! - Creates actors for the driver and on behalf of other actors
//! - Forwards payloads between actors, relaying replies by correlation id
//! - Tears actors down on request and on shutdown
//! - Turns uncorrelated actor output into notifications on the event stream
//!
//! Both tables are touched only from this actor's handler, so every creation,
//! lookup and forward is serialized through its mailbox. Waiting for a forward
//! target happens in a spawned task so the mailbox keeps draining.

use std::{collections::HashMap, sync::Arc};

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort, SupervisionEvent};
use tracing::{Level, event};

use crate::{
    actor::{
        correlation::{Correlator, Pending},
        events::{ActorEvent, EventLevel, EventStream},
        message::{BrokerMessage, BrokerReply},
        runtime::{ActorHandle, spawn_actor}
    },
    config::RuntimeConfig,
    domain::{
        account::{ActorKind, ActorMeta, InitParams, RequestId},
        constant::broker,
        error::LedgerError,
        message::{Command, Envelope, Reply}
    }
};

/// Broker Actor State - registry, metadata and relays in flight
pub struct BrokerState {
    /// Live actors by actor id and by logical account id
    actors:    HashMap<String, ActorHandle>,
    /// Kind and account id per registered id
    metadata:  HashMap<String, ActorMeta>,
    /// Relays waiting for a target's correlated reply
    in_flight: Correlator<Reply>,
    events:    EventStream,
    config:    Arc<RuntimeConfig>
}

/// Broker Actor - central authority over actor lifecycle and routing
pub struct Broker;

#[async_trait::async_trait]
impl Actor for Broker {
    type Arguments = (Arc<RuntimeConfig>, EventStream);
    type Msg = BrokerMessage;
    type State = BrokerState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        (config, events): Self::Arguments
    ) -> Result<Self::State, ActorProcessingErr> {
        event!(Level::DEBUG, event = broker::BROKER_STARTED);

        Ok(BrokerState {
            actors: HashMap::new(),
            metadata: HashMap::new(),
            in_flight: Correlator::new(),
            events,
            config
        })
    }

    async fn post_stop(&self, _myself: ActorRef<Self::Msg>, state: &mut Self::State) -> Result<(), ActorProcessingErr> {
        self.terminate_all(state);
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State
    ) -> Result<(), ActorProcessingErr> {
        match message {
            BrokerMessage::CreateAndRegister { kind, actor_id, params, reply } => {
                let result = self.create_and_register(&myself, kind, actor_id, params, state).await;
                respond(reply, result);
            }
            BrokerMessage::Register { handle, reply } => respond(reply, self.register(handle, state)),
            BrokerMessage::Lookup { id, reply } => respond(reply, state.actors.get(&id).cloned()),
            BrokerMessage::Metadata { id, reply } => respond(reply, state.metadata.get(&id).cloned()),
            BrokerMessage::Tell { target, command, reply } => {
                let result = match state.actors.get(&target) {
                    Some(handle) => handle.deliver(Envelope::notify(command)),
                    None => Err(LedgerError::ActorNotFound(target))
                };
                respond(reply, result);
            }
            BrokerMessage::Request { target, command, timeout, reply } => {
                match self.relay(&target, command, state) {
                    Ok(pending) => {
                        tokio::spawn(async move {
                            respond(reply, pending.wait(timeout).await);
                        });
                    }
                    Err(e) => respond(reply, Err(e))
                }
            }
            BrokerMessage::TerminateAll { reply } => respond(reply, self.terminate_all(state)),
            BrokerMessage::Emit { source, request_id, reply } => self.handle_emit(source, request_id, reply, state),
            BrokerMessage::Forward { source, target, payload, request_id } => {
                self.handle_forward(source, target, payload, request_id, state)
            }
            BrokerMessage::CreateActor { requester, actor_id, kind, params, request_id } => {
                self.handle_create_actor_request(&myself, requester, actor_id, kind, params, request_id, state).await
            }
            BrokerMessage::GetActorInfo { requester, lookup_id, request_id } => {
                self.handle_actor_info_request(requester, lookup_id, request_id, state)
            }
            BrokerMessage::DeleteActor { requester, actor_id, request_id } => {
                self.handle_delete_actor_request(requester, actor_id, request_id, state)
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State
    ) -> Result<(), ActorProcessingErr> {
        // A child stopping must never take the broker down with it
        match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                if let Some(actor_id) = self.unregister_cell(cell.get_id(), state) {
                    event!(Level::DEBUG, event = broker::ACTOR_TERMINATED, actor_id = %actor_id, reason = ?reason);
                }
            }
            SupervisionEvent::ActorFailed(cell, error) => {
                if let Some(actor_id) = self.unregister_cell(cell.get_id(), state) {
                    event!(Level::ERROR, event = broker::ACTOR_FAILED, actor_id = %actor_id, error = %error);
                    state.events.publish(ActorEvent::new(EventLevel::Error, actor_id, format!("Actor failed: {}", error)));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl Broker {
    /// Instantiate an actor and register it under its id and logical account id.
    async fn create_and_register(
        &self,
        myself: &ActorRef<BrokerMessage>,
        kind: ActorKind,
        actor_id: String,
        params: InitParams,
        state: &mut BrokerState
    ) -> Result<ActorHandle, LedgerError> {
        let account_id = params.logical_id(&actor_id);
        self.ensure_free(&actor_id, &account_id, state)?;

        let handle = match spawn_actor(kind, actor_id.clone(), params, myself.clone(), state.config.clone()).await {
            Ok(handle) => handle,
            Err(e) => {
                event!(Level::ERROR, event = broker::ACTOR_CREATE_FAILED, actor_id = %actor_id, error = %e);
                return Err(e);
            }
        };

        self.insert(handle.clone(), state);
        Ok(handle)
    }

    /// Register an actor spawned outside the broker.
    fn register(&self, handle: ActorHandle, state: &mut BrokerState) -> Result<(), LedgerError> {
        self.ensure_free(handle.actor_id(), handle.account_id(), state)?;
        self.insert(handle, state);
        Ok(())
    }

    fn ensure_free(&self, actor_id: &str, account_id: &str, state: &BrokerState) -> Result<(), LedgerError> {
        match [actor_id, account_id].into_iter().find(|id| state.actors.contains_key(*id)) {
            Some(taken) => {
                event!(Level::WARN, event = broker::ACTOR_CREATE_FAILED,
                       actor_id = %actor_id, reason = "duplicate", id = %taken);
                Err(LedgerError::DuplicateActor(taken.to_string()))
            }
            None => Ok(())
        }
    }

    fn insert(&self, handle: ActorHandle, state: &mut BrokerState) {
        for id in [handle.actor_id(), handle.account_id()] {
            state.actors.insert(id.to_string(), handle.clone());
            state.metadata.insert(id.to_string(), handle.meta());
        }

        event!(Level::INFO, event = broker::ACTOR_CREATED,
               actor_id = %handle.actor_id(), account_id = %handle.account_id(), kind = %handle.kind());
    }

    /// Deliver `command` to `target` tagged with a fresh relay id and return the
    /// waiter for its reply.
    fn relay(&self, target: &str, command: Command, state: &BrokerState) -> Result<Pending<Reply>, LedgerError> {
        let handle = state.actors.get(target).ok_or_else(|| LedgerError::ActorNotFound(target.to_string()))?;

        let relay_id = RequestId::generate("relay");
        let pending = state.in_flight.register(relay_id.clone())?;
        handle.deliver(Envelope::request(relay_id, command))?;
        Ok(pending)
    }

    fn handle_forward(
        &self,
        source: String,
        target: String,
        payload: Command,
        request_id: RequestId,
        state: &mut BrokerState
    ) {
        event!(Level::DEBUG, event = broker::FORWARD_RECEIVED,
               source = %source, target = %target, payload = %payload.name(), request_id = %request_id);

        let Some(requester) = state.actors.get(&source).cloned() else {
            event!(Level::WARN, event = broker::REQUESTER_GONE, source = %source, request_id = %request_id);
            return;
        };

        match self.relay(&target, payload, state) {
            Ok(pending) => {
                let timeout = state.config.timeouts.forward();
                tokio::spawn(async move {
                    let outcome = pending.wait(timeout).await;
                    event!(Level::DEBUG, event = broker::FORWARD_RELAYED,
                           source = %source, target = %target, request_id = %request_id, ok = %outcome.is_ok());
                    requester.deliver_reply(BrokerReply::forwarded(request_id, outcome));
                });
            }
            Err(e) => {
                event!(Level::DEBUG, event = broker::FORWARD_UNROUTABLE, source = %source, target = %target, error = %e);
                requester.deliver_reply(BrokerReply::forwarded(request_id, Err(e)));
            }
        }
    }

    /// Service an actor-initiated creation request.
    #[allow(clippy::too_many_arguments)]
    async fn handle_create_actor_request(
        &self,
        myself: &ActorRef<BrokerMessage>,
        requester: String,
        actor_id: String,
        kind: ActorKind,
        params: InitParams,
        request_id: RequestId,
        state: &mut BrokerState
    ) {
        let reply = match self.create_and_register(myself, kind, actor_id, params, state).await {
            Ok(_) => BrokerReply::CreateActorResult { request_id, success: true, error: None },
            Err(e) => BrokerReply::CreateActorResult { request_id, success: false, error: Some(e.to_string()) }
        };
        self.reply_to(&requester, reply, state);
    }

    fn handle_actor_info_request(
        &self,
        requester: String,
        lookup_id: String,
        request_id: RequestId,
        state: &mut BrokerState
    ) {
        let info = state.metadata.get(&lookup_id).cloned();
        self.reply_to(&requester, BrokerReply::ActorInfo { request_id, actor_id: lookup_id, info }, state);
    }

    /// Remove an actor from both tables, acknowledge, then stop it.
    fn handle_delete_actor_request(
        &self,
        requester: String,
        actor_id: String,
        request_id: RequestId,
        state: &mut BrokerState
    ) {
        // Resolve the requester first: it may be the actor being deleted
        let requester_handle = state.actors.get(&requester).cloned();

        let Some(target) = state.actors.get(&actor_id).cloned() else {
            event!(Level::WARN, event = broker::ACTOR_DELETE_FAILED, actor_id = %actor_id, requester = %requester);
            let error = LedgerError::ActorNotFound(actor_id).to_string();
            if let Some(handle) = requester_handle {
                handle.deliver_reply(BrokerReply::DeleteActorResult { request_id, success: false, error: Some(error) });
            }
            return;
        };

        self.unregister(&target, state);

        if let Some(handle) = requester_handle {
            handle.deliver_reply(BrokerReply::DeleteActorResult { request_id, success: true, error: None });
        }
        target.stop();

        event!(Level::INFO, event = broker::ACTOR_DELETED, actor_id = %target.actor_id(), requester = %requester);
        state.events.publish(ActorEvent::new(EventLevel::Info, target.actor_id(), "Actor removed"));
    }

    fn handle_emit(&self, source: String, request_id: Option<RequestId>, reply: Reply, state: &mut BrokerState) {
        if let Reply::Ready { account_id, kind } = &reply {
            self.refresh_metadata(&source, account_id, *kind, state);
        }

        match request_id {
            Some(request_id) if state.in_flight.resolve(&request_id, reply.clone()) => {}
            Some(request_id) => {
                event!(Level::DEBUG, event = broker::REPLY_LATE, source = %source, request_id = %request_id);
                self.publish_notification(&source, &reply, state);
            }
            None => self.publish_notification(&source, &reply, state)
        }
    }

    /// Metadata announced by a running actor replaces what was seeded at creation.
    fn refresh_metadata(&self, source: &str, account_id: &str, kind: ActorKind, state: &mut BrokerState) {
        let Some(handle) = state.actors.get(source) else {
            return;
        };
        if handle.actor_id() != source {
            return;
        }

        let meta = ActorMeta { account_id: account_id.to_string(), kind };
        state.metadata.insert(source.to_string(), meta.clone());
        if state.actors.get(account_id).is_some_and(|alias| alias.is_same(handle)) {
            state.metadata.insert(account_id.to_string(), meta);
        }
        event!(Level::DEBUG, event = broker::METADATA_UPDATED, actor_id = %source, kind = %kind);
    }

    fn publish_notification(&self, source: &str, reply: &Reply, state: &BrokerState) {
        let (level, message) = match reply {
            Reply::BalanceUpdate { account_id, balance } => {
                (EventLevel::Info, format!("New balance for {} is {}", account_id, balance))
            }
            Reply::BalanceInfo { account_id, balance, .. } => {
                (EventLevel::Info, format!("Balance for {} is {}", account_id, balance))
            }
            Reply::Error { account_id: Some(account_id), error } => {
                (EventLevel::Error, format!("Error in {}: {}", account_id, error))
            }
            Reply::Error { account_id: None, error } => (EventLevel::Error, format!("Error: {}", error)),
            Reply::TransferResult { success: true, from, to, .. } => (
                EventLevel::Info,
                format!("Transfer from {} to {} succeeded", from.as_deref().unwrap_or("?"), to.as_deref().unwrap_or("?"))
            ),
            Reply::TransferResult { success: false, error, .. } => {
                (EventLevel::Error, format!("Transfer failed: {}", error.as_deref().unwrap_or("unknown error")))
            }
            Reply::Info { message, .. } => (EventLevel::Info, message.clone()),
            Reply::Ready { account_id, kind } => (EventLevel::Debug, format!("{} actor {} is ready", kind, account_id))
        };
        state.events.publish(ActorEvent::new(level, source, message));
    }

    fn reply_to(&self, requester: &str, reply: BrokerReply, state: &BrokerState) {
        match state.actors.get(requester) {
            Some(handle) => {
                handle.deliver_reply(reply);
            }
            None => {
                event!(Level::WARN, event = broker::REQUESTER_GONE, requester = %requester, reply = %reply.name());
            }
        }
    }

    /// Drop every id and alias pointing at `target`, along with their metadata.
    fn unregister(&self, target: &ActorHandle, state: &mut BrokerState) {
        let ids: Vec<String> =
            state.actors.iter().filter(|(_, handle)| handle.is_same(target)).map(|(id, _)| id.clone()).collect();
        for id in ids {
            state.actors.remove(&id);
            state.metadata.remove(&id);
        }
    }

    fn unregister_cell(&self, cell_id: ractor::ActorId, state: &mut BrokerState) -> Option<String> {
        let target = state.actors.values().find(|handle| handle.actor_ref().get_id() == cell_id).cloned()?;
        self.unregister(&target, state);
        Some(target.actor_id().to_string())
    }

    /// Stop every registered actor and clear both tables.
    fn terminate_all(&self, state: &mut BrokerState) -> usize {
        event!(Level::DEBUG, event = broker::SHUTDOWN_STARTED, registered = %state.actors.len());

        let mut stopped: Vec<ActorHandle> = Vec::new();
        for handle in state.actors.values() {
            if !stopped.iter().any(|done| done.is_same(handle)) {
                handle.stop();
                stopped.push(handle.clone());
            }
        }
        state.actors.clear();
        state.metadata.clear();
        state.in_flight.reject_all(LedgerError::Broker("broker shutting down".to_string()));

        event!(Level::INFO, event = broker::SHUTDOWN_COMPLETED, stopped = %stopped.len());
        stopped.len()
    }
}

fn respond<T>(reply: RpcReplyPort<T>, value: T)
where
    T: Send + 'static
{
    if reply.send(value).is_err() {
        event!(Level::DEBUG, event = broker::REQUESTER_GONE, reason = "reply port closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ledger::Ledger;

    async fn ledger() -> Ledger {
        Ledger::start(RuntimeConfig::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_ids_and_aliases_rejected() {
        let ledger = ledger().await;
        ledger.create_and_register(ActorKind::Savings, "AccountA", InitParams::account("A", 100.0)).await.unwrap();

        let same_id = ledger.create_and_register(ActorKind::Savings, "AccountA", InitParams::with_balance(1.0)).await;
        let same_alias = ledger.create_and_register(ActorKind::Funds, "Other", InitParams::account("A", 1.0)).await;
        let id_is_alias = ledger.create_and_register(ActorKind::Savings, "A", InitParams::with_balance(1.0)).await;

        assert_eq!(same_id.err(), Some(LedgerError::DuplicateActor("AccountA".to_string())));
        assert_eq!(same_alias.err(), Some(LedgerError::DuplicateActor("A".to_string())));
        assert_eq!(id_is_alias.err(), Some(LedgerError::DuplicateActor("A".to_string())));
        assert!(ledger.lookup("Other").await.unwrap().is_none());
        ledger.shutdown();
    }

    #[tokio::test]
    async fn test_metadata_seeded_for_id_and_alias() {
        let ledger = ledger().await;
        ledger.create_and_register(ActorKind::Funds, "fundA", InitParams::account("fA", 100.0)).await.unwrap();
        ledger.create_and_register(ActorKind::Transfer, "ActionActor", InitParams::transfer("A", "B")).await.unwrap();

        let expected = ActorMeta { account_id: "fA".to_string(), kind: ActorKind::Funds };
        assert_eq!(ledger.actor_info("fundA").await.unwrap(), Some(expected.clone()));
        assert_eq!(ledger.actor_info("fA").await.unwrap(), Some(expected));
        assert_eq!(
            ledger.actor_info("ActionActor").await.unwrap(),
            Some(ActorMeta { account_id: "ActionActor".to_string(), kind: ActorKind::Transfer })
        );
        assert_eq!(ledger.actor_info("nobody").await.unwrap(), None);
        ledger.shutdown();
    }

    #[tokio::test]
    async fn test_request_to_missing_actor() {
        let ledger = ledger().await;

        assert_eq!(ledger.request("ghost", Command::GetBalance).await, Err(LedgerError::ActorNotFound("ghost".to_string())));
        assert_eq!(ledger.tell("ghost", Command::GetBalance).await, Err(LedgerError::ActorNotFound("ghost".to_string())));
        ledger.shutdown();
    }

    #[tokio::test]
    async fn test_tell_surfaces_reply_as_notification() {
        let ledger = ledger().await;
        ledger.create_and_register(ActorKind::Savings, "AccountB", InitParams::account("B", 50.0)).await.unwrap();
        let mut events = ledger.subscribe();

        ledger.tell("B", Command::Withdraw { amount: 30.0 }).await.unwrap();
        ledger.tell("B", Command::Withdraw { amount: 30.0 }).await.unwrap();

        let mut seen = Vec::new();
        while seen.len() < 2 {
            let notification = tokio::time::timeout(std::time::Duration::from_secs(2), events.recv()).await.unwrap().unwrap();
            if notification.level != EventLevel::Debug {
                seen.push(notification);
            }
        }

        assert_eq!(seen[0], ActorEvent::new(EventLevel::Info, "AccountB", "New balance for B is 20"));
        assert_eq!(seen[1], ActorEvent::new(EventLevel::Error, "AccountB", "Error in B: Insufficient funds"));
        ledger.shutdown();
    }

    #[tokio::test]
    async fn test_terminate_all_empties_registry() {
        let ledger = ledger().await;
        ledger.create_and_register(ActorKind::Savings, "AccountA", InitParams::account("A", 100.0)).await.unwrap();
        ledger.create_and_register(ActorKind::Savings, "C", InitParams::with_balance(0.0)).await.unwrap();
        ledger.create_and_register(ActorKind::Transfer, "ActionActor", InitParams::transfer("A", "C")).await.unwrap();

        assert_eq!(ledger.terminate_all().await.unwrap(), 3);

        for id in ["AccountA", "A", "C", "ActionActor"] {
            assert!(ledger.lookup(id).await.unwrap().is_none(), "{} still registered", id);
            assert_eq!(ledger.actor_info(id).await.unwrap(), None);
        }
        assert_eq!(ledger.request("A", Command::GetBalance).await, Err(LedgerError::ActorNotFound("A".to_string())));
        ledger.shutdown();
    }

    #[tokio::test]
    async fn test_id_can_be_reused_after_deletion() {
        let ledger = ledger().await;
        ledger.create_and_register(ActorKind::Savings, "A", InitParams::with_balance(10.0)).await.unwrap();
        ledger.create_and_register(ActorKind::Funds, "fund", InitParams::with_balance(0.0)).await.unwrap();

        ledger.request("fund", Command::Mature { target_id: Some("A".to_string()) }).await.unwrap();
        ledger.create_and_register(ActorKind::Savings, "fund", InitParams::with_balance(3.0)).await.unwrap();

        assert_eq!(ledger.request("fund", Command::GetBalance).await.unwrap().balance(), Some(3.0));
        assert_eq!(
            ledger.actor_info("fund").await.unwrap(),
            Some(ActorMeta { account_id: "fund".to_string(), kind: ActorKind::Savings })
        );
        ledger.shutdown();
    }
}
