//! `CatchUpState` and its request (§4.7, §1 GLOSSARY).

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::inbox::ShardIndex;
use crate::signal::EntityId;

/// Identifies one catch-up process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CatchUpId(Uuid);

impl CatchUpId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CatchUpId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CatchUpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `status ∈ {UNDEFINED, STARTED, FINALIZING, COMPLETED}` (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchUpStatus {
    Undefined,
    Started,
    Finalizing,
    Completed,
}

/// What a catch-up process was asked to recall: a projection type, the
/// event types it folds, the window start, and optionally specific target
/// ids. Empty `target_ids` means targets are derived round-by-round from
/// the events' producer ids via projection routing (§4.7 last contract).
#[derive(Debug, Clone)]
pub struct CatchUpRequest {
    pub projection_type: &'static str,
    pub event_types: Vec<&'static str>,
    pub target_ids: Vec<EntityId>,
    pub since_when: DateTime<Utc>,
}

/// `(id, projection_type, request, status, when_last_read, current_round,
/// affected_shards, total_shards)` (§1 GLOSSARY).
#[derive(Debug, Clone)]
pub struct CatchUpState {
    pub id: CatchUpId,
    pub projection_type: &'static str,
    pub request: CatchUpRequest,
    pub status: CatchUpStatus,
    pub when_last_read: DateTime<Utc>,
    pub current_round: u64,
    pub affected_shards: HashSet<ShardIndex>,
    pub total_shards: u32,
}

impl CatchUpState {
    pub fn new(request: CatchUpRequest, total_shards: u32) -> Self {
        let when_last_read = request.since_when;
        Self {
            id: CatchUpId::new(),
            projection_type: request.projection_type,
            request,
            status: CatchUpStatus::Started,
            when_last_read,
            current_round: 0,
            affected_shards: HashSet::new(),
            total_shards,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, CatchUpStatus::Completed)
    }
}

/// Notifications emitted by a catch-up round (§4.7 transition labels).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatchUpEvent {
    HistoryEventsRecalled { count: usize },
    HistoryFullyRecalled,
    LiveEventsPickedUp { count: usize },
    CatchUpCompleted,
    ShardProcessingRequested { shard: ShardIndex },
}
