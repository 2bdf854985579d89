//! The error taxonomy of §7: typed outcomes of a single signal dispatch.

use thiserror::Error;

use crate::signal::SignalId;

/// Everything that can go wrong while registering dispatchers, routes, or
/// handlers, or while dispatching, transacting, or delivering a signal.
#[derive(Debug, Error)]
pub enum Error {
    /// A unicast bus (e.g. the command bus) already has a dispatcher for
    /// this message class (§4.1).
    #[error("duplicate dispatcher registered for message class {class}")]
    DuplicateHandler { class: String },

    /// A dispatcher was registered with an empty class set (§4.1).
    #[error("dispatcher exposes no message classes")]
    InvalidDispatcher,

    /// `RoutingTable::set` was called for a class that already has a route
    /// (§4.2).
    #[error("route already set for message class {class}")]
    DuplicateRoute { class: String },

    /// `RoutingTable::remove` was called for a class with no route (§4.2).
    #[error("no route set for message class {class}")]
    RouteNotFound { class: String },

    /// Command routing did not resolve to exactly one target id (§4.2, §8 P6).
    #[error("command routing for {class} resolved to {found} targets, expected exactly 1")]
    RoutingFailed { class: String, found: usize },

    /// A default-valued payload reached the bus boundary (§3 invariant).
    #[error("default-valued payload for message class {class} was rejected")]
    DefaultPayloadRejected { class: String },

    /// The host application's schema registry rejected a payload (§4.1 step 2).
    #[error("schema validation failed for message class {class}: {reason}")]
    SchemaViolation { class: String, reason: String },

    /// A transaction phase's builder failed an invariant (§4.5).
    #[error("constraint violated while applying phase to entity {entity}: {reason}")]
    ConstraintViolated { entity: String, reason: String },

    /// A handler raised or otherwise failed unexpectedly during a phase (§4.5, §7).
    #[error("handler failed unexpectedly for signal {signal}: {source}")]
    HandlerFailedUnexpectedly {
        signal: SignalId,
        #[source]
        source: anyhow::Error,
    },

    /// The entity's persisted state could not be reconciled with its
    /// version/flags after a commit attempt (§7 diagnostic event).
    #[error("entity {entity} state corrupted: {reason}")]
    EntityStateCorrupted { entity: String, reason: String },

    /// A version did not strictly increase within its producer (§3 invariant, §8 P4).
    #[error("version did not advance for producer {producer}: prev={prev}, next={next}")]
    VersionNotMonotonic {
        producer: String,
        prev: u64,
        next: u64,
    },

    /// An earlier signal in the same inbox page failed, so this one was
    /// never attempted (§4.6, §7 `Interrupted`).
    #[error("signal {signal} was interrupted by prior failure of {blocked_by}")]
    Interrupted {
        signal: SignalId,
        blocked_by: SignalId,
    },

    /// Infrastructure (storage, transport) failed and retries were
    /// exhausted (§7).
    #[error("infrastructure failure: {0}")]
    Infrastructure(#[source] anyhow::Error),

    /// An entity's repository has no handler registered for this message class.
    #[error("no handler registered on this entity for message class {class}")]
    NoHandlerRegistered { class: String },
}

/// Why a signal was silently skipped by design, rather than failed (§7 `Ignored`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// An earlier filter in the chain dropped the signal.
    FilteredOut,
    /// The signal id was already `DELIVERED` within the idempotence window (§4.6, §8 P2).
    Duplicate,
    /// Routing for this (multicast) message class resolved to zero targets (§4.2).
    OutOfScope,
}

/// The outcome of dispatching a single signal (§7).
#[derive(Debug)]
pub enum Outcome<T> {
    /// Handling completed and produced `T` (events, commands, or nothing,
    /// depending on the call site).
    Success(T),
    /// The handler or framework detected a failure; see `Error` for cause.
    Error(Error),
    /// Not reached, because an earlier signal in the same inbox page failed
    /// transactionally.
    Interrupted { blocked_by: SignalId },
    /// Silently skipped by design.
    Ignored(IgnoreReason),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(t) => Outcome::Success(f(t)),
            Outcome::Error(e) => Outcome::Error(e),
            Outcome::Interrupted { blocked_by } => Outcome::Interrupted { blocked_by },
            Outcome::Ignored(r) => Outcome::Ignored(r),
        }
    }
}

/// A acknowledgement reported back for one signal after passing through a
/// bus (§4.1 step 6, §6 wire format).
#[derive(Debug)]
pub struct Ack {
    pub signal_id: SignalId,
    pub status: AckStatus,
}

#[derive(Debug)]
pub enum AckStatus {
    Ok,
    Error { code: &'static str, message: String },
    Rejection { type_url: &'static str },
}

impl Ack {
    pub fn ok(signal_id: SignalId) -> Self {
        Self {
            signal_id,
            status: AckStatus::Ok,
        }
    }

    pub fn error(signal_id: SignalId, err: &Error) -> Self {
        Self {
            signal_id,
            status: AckStatus::Error {
                code: error_code(err),
                message: err.to_string(),
            },
        }
    }

    pub fn rejection(signal_id: SignalId, type_url: &'static str) -> Self {
        Self {
            signal_id,
            status: AckStatus::Rejection { type_url },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, AckStatus::Ok)
    }
}

fn error_code(err: &Error) -> &'static str {
    match err {
        Error::DuplicateHandler { .. } => "duplicate_handler",
        Error::InvalidDispatcher => "invalid_dispatcher",
        Error::DuplicateRoute { .. } => "duplicate_route",
        Error::RouteNotFound { .. } => "route_not_found",
        Error::RoutingFailed { .. } => "routing_failed",
        Error::DefaultPayloadRejected { .. } => "default_payload_rejected",
        Error::SchemaViolation { .. } => "schema_violation",
        Error::ConstraintViolated { .. } => "constraint_violated",
        Error::HandlerFailedUnexpectedly { .. } => "handler_failed_unexpectedly",
        Error::EntityStateCorrupted { .. } => "entity_state_corrupted",
        Error::VersionNotMonotonic { .. } => "version_not_monotonic",
        Error::Interrupted { .. } => "interrupted",
        Error::Infrastructure(_) => "infrastructure",
        Error::NoHandlerRegistered { .. } => "no_handler_registered",
    }
}
