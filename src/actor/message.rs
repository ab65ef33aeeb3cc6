//! Typed messages for actor communication

use std::time::Duration;

use ractor::{Message, RpcReplyPort};
use serde::Serialize;

use crate::{
    actor::runtime::ActorHandle,
    domain::{
        account::{ActorKind, ActorMeta, InitParams, RequestId},
        error::LedgerError,
        message::{Command, Envelope, Reply}
    }
};

/// Messages on an account/transfer actor's inbound queue
#[derive(Debug)]
pub enum ActorMessage {
    /// Process a command (FIFO, one at a time)
    Deliver(Envelope)
}

/// Broker answers to actor-initiated requests. These bypass the actor's queue
/// and complete its pending correlation entry directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BrokerReply {
    ForwardResult {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        #[serde(skip_serializing_if = "Option::is_none")]
        resp:       Option<Reply>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error:      Option<String>
    },
    CreateActorResult {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        success:    bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error:      Option<String>
    },
    ActorInfo {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        #[serde(rename = "actorId")]
        actor_id:   String,
        info:       Option<ActorMeta>
    },
    DeleteActorResult {
        #[serde(rename = "requestId")]
        request_id: RequestId,
        success:    bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error:      Option<String>
    }
}

impl BrokerReply {
    pub fn request_id(&self) -> &RequestId {
        match self {
            BrokerReply::ForwardResult { request_id, .. }
            | BrokerReply::CreateActorResult { request_id, .. }
            | BrokerReply::ActorInfo { request_id, .. }
            | BrokerReply::DeleteActorResult { request_id, .. } => request_id
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BrokerReply::ForwardResult { .. } => "forwardResult",
            BrokerReply::CreateActorResult { .. } => "createActorResult",
            BrokerReply::ActorInfo { .. } => "actorInfo",
            BrokerReply::DeleteActorResult { .. } => "deleteActorResult"
        }
    }

    pub(crate) fn forwarded(request_id: RequestId, outcome: Result<Reply, LedgerError>) -> Self {
        match outcome {
            Ok(reply) => BrokerReply::ForwardResult { request_id, resp: Some(reply), error: None },
            Err(error) => BrokerReply::ForwardResult { request_id, resp: None, error: Some(error.to_string()) }
        }
    }
}

/// Messages for the Broker actor (registry owner and router)
#[derive(Debug)]
pub enum BrokerMessage {
    /// Driver: instantiate and register an actor
    CreateAndRegister {
        kind:     ActorKind,
        actor_id: String,
        params:   InitParams,
        reply:    RpcReplyPort<Result<ActorHandle, LedgerError>>
    },
    /// Driver: register an already running actor under its id and alias
    Register { handle: ActorHandle, reply: RpcReplyPort<Result<(), LedgerError>> },
    /// Driver: live handle for an id or alias
    Lookup { id: String, reply: RpcReplyPort<Option<ActorHandle>> },
    /// Driver: stored metadata for an id or alias
    Metadata { id: String, reply: RpcReplyPort<Option<ActorMeta>> },
    /// Driver: fire-and-forget command; its reply becomes a notification
    Tell { target: String, command: Command, reply: RpcReplyPort<Result<(), LedgerError>> },
    /// Driver: command whose correlated reply is returned
    Request {
        target:  String,
        command: Command,
        timeout: Duration,
        reply:   RpcReplyPort<Result<Reply, LedgerError>>
    },
    /// Driver: stop every registered actor
    TerminateAll { reply: RpcReplyPort<usize> },

    /// Actor outbound: a reply or notification, echoing the request id if any
    Emit { source: String, request_id: Option<RequestId>, reply: Reply },
    /// Actor: deliver `payload` to `target` and relay its reply back
    Forward { source: String, target: String, payload: Command, request_id: RequestId },
    /// Actor: create a new actor on its behalf
    CreateActor { requester: String, actor_id: String, kind: ActorKind, params: InitParams, request_id: RequestId },
    /// Actor: metadata lookup
    GetActorInfo { requester: String, lookup_id: String, request_id: RequestId },
    /// Actor: remove and tear down an actor
    DeleteActor { requester: String, actor_id: String, request_id: RequestId }
}

// Implement Message trait for Ractor
impl Message for ActorMessage {}
impl Message for BrokerMessage {}
