//! Domain Events - Structured event names for internal monitoring and debugging

/// Broker Actor Events
pub mod broker {
    pub const BROKER_STARTED: &str = "broker.started";
    pub const ACTOR_CREATED: &str = "actor.created";
    pub const ACTOR_CREATE_FAILED: &str = "actor.create_failed";
    pub const ACTOR_DELETED: &str = "actor.deleted";
    pub const ACTOR_DELETE_FAILED: &str = "actor.delete_failed";
    pub const ACTOR_TERMINATED: &str = "actor.terminated";
    pub const ACTOR_FAILED: &str = "actor.failed";
    pub const METADATA_UPDATED: &str = "metadata.updated";
    pub const FORWARD_RECEIVED: &str = "forward.received";
    pub const FORWARD_UNROUTABLE: &str = "forward.unroutable";
    pub const FORWARD_RELAYED: &str = "forward.relayed";
    pub const REPLY_LATE: &str = "reply.late";
    pub const REQUESTER_GONE: &str = "requester.gone";
    pub const NOTIFICATION: &str = "notification";
    pub const SHUTDOWN_STARTED: &str = "shutdown.started";
    pub const SHUTDOWN_COMPLETED: &str = "shutdown.completed";
}

/// Message loop Events (every actor)
pub mod message_loop {
    pub const ACTOR_STARTED: &str = "actor.started";
    pub const ACTOR_STOPPED: &str = "actor.stopped";
    pub const MESSAGE_RECEIVED: &str = "message.received";
    pub const MESSAGE_HANDLED: &str = "message.handled";
    pub const HANDLER_FAULT: &str = "handler.fault";
    pub const OUTBOX_CLOSED: &str = "outbox.closed";
}

/// Correlation table Events
pub mod correlation {
    pub const REQUEST_TIMED_OUT: &str = "request.timed_out";
    pub const REPLY_DROPPED: &str = "reply.dropped";
}

/// Account (savings and funds) Events
pub mod account {
    pub const DEPOSITED: &str = "account.deposited";
    pub const WITHDRAWN: &str = "account.withdrawn";
    pub const WITHDRAW_REJECTED: &str = "account.withdraw_rejected";
    pub const MATURE_STARTED: &str = "mature.started";
    pub const MATURE_FAILED: &str = "mature.failed";
    pub const MATURED: &str = "mature.completed";
}

/// Transfer Actor Events
pub mod transfer {
    pub const TRANSFER_STARTED: &str = "transfer.started";
    pub const ELIGIBILITY_REJECTED: &str = "transfer.eligibility_rejected";
    pub const METADATA_LOOKUP_FAILED: &str = "transfer.metadata_lookup_failed";
    pub const DESTINATION_CREATING: &str = "transfer.destination_creating";
    pub const DESTINATION_CREATED: &str = "transfer.destination_created";
    pub const LEG_FAILED: &str = "transfer.leg_failed";
    pub const COMPENSATION_APPLIED: &str = "transfer.compensation_applied";
    pub const COMPENSATION_FAILED: &str = "transfer.compensation_failed";
    pub const TRANSFER_COMPLETED: &str = "transfer.completed";
}

/// Process driver Events
pub mod driver {
    pub const LEDGER_STARTED: &str = "ledger.started";
    pub const DEMO_PHASE: &str = "demo.phase";
    pub const LEDGER_STOPPED: &str = "ledger.stopped";
}
