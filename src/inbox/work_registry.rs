//! The `ShardedWorkRegistry` session model (§4.6, §6): CAS-based shard
//! leases so that at most one session exists per shard across the fleet
//! (§3 invariant, §8 P3).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::message::ShardIndex;

/// Proof of exclusive ownership of one shard for a bounded time. `token`
/// distinguishes this acquisition from any later one on the same shard, so
/// a holder whose lease already expired and was re-granted elsewhere can be
/// detected before it marks anything delivered (§4.6: "the owner must check
/// the session token before marking delivered").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub shard: ShardIndex,
    pub token: u64,
    pub lease_until: DateTime<Utc>,
}

/// Grants shard leases to nodes. All mutating operations must be
/// linearizable per shard (§4.8).
#[async_trait]
pub trait ShardedWorkRegistry: Send + Sync {
    /// Atomic CAS: acquire the shard's lease if it is free or expired.
    /// Returns `None` if another node currently holds an unexpired lease
    /// (§4.6: caller retries later or defers).
    async fn pick_up(&self, shard: ShardIndex, node_id: &str, lease: StdDuration) -> Option<Session>;

    /// Release the lease. A no-op if `session`'s token no longer matches
    /// the live lease (already expired and reassigned).
    async fn release(&self, session: Session);

    /// Extend a still-held lease; returns `None` if the token is stale.
    async fn extend_lease(&self, session: Session, lease: StdDuration) -> Option<Session>;
}

struct LeaseEntry {
    node_id: String,
    token: u64,
    lease_until: DateTime<Utc>,
}

/// In-memory `ShardedWorkRegistry`, sufficient for single-process testing
/// and for the zero-dependency demo path; production deployments supply a
/// linearizable external implementation (§6).
pub struct InMemoryWorkRegistry {
    leases: Mutex<HashMap<u32, LeaseEntry>>,
    next_token: AtomicU64,
}

impl InMemoryWorkRegistry {
    pub fn new() -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }
}

impl Default for InMemoryWorkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShardedWorkRegistry for InMemoryWorkRegistry {
    async fn pick_up(&self, shard: ShardIndex, node_id: &str, lease: StdDuration) -> Option<Session> {
        let now = Utc::now();
        let mut leases = self.leases.lock().expect("work registry lock poisoned");
        if let Some(existing) = leases.get(&shard.index) {
            if existing.lease_until > now {
                return None;
            }
        }
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let lease_until = now + chrono::Duration::from_std(lease).unwrap_or(chrono::Duration::zero());
        leases.insert(
            shard.index,
            LeaseEntry {
                node_id: node_id.to_string(),
                token,
                lease_until,
            },
        );
        Some(Session { shard, token, lease_until })
    }

    async fn release(&self, session: Session) {
        let mut leases = self.leases.lock().expect("work registry lock poisoned");
        if let Some(existing) = leases.get(&session.shard.index) {
            if existing.token == session.token {
                leases.remove(&session.shard.index);
            }
        }
    }

    async fn extend_lease(&self, session: Session, lease: StdDuration) -> Option<Session> {
        let mut leases = self.leases.lock().expect("work registry lock poisoned");
        let entry = leases.get_mut(&session.shard.index)?;
        if entry.token != session.token {
            return None;
        }
        entry.lease_until = Utc::now() + chrono::Duration::from_std(lease).unwrap_or(chrono::Duration::zero());
        Some(Session {
            shard: session.shard,
            token: session.token,
            lease_until: entry.lease_until,
        })
    }
}
