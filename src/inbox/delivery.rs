//! The delivery worker pool (§4.6, §5): per shard, pick up the lease, read
//! one page, dispatch sequentially with page-level dedup, mark delivered,
//! release. Workers run on a bounded `tokio::task` pool and back off when
//! every shard's lease is currently held elsewhere.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::future::BoxFuture;

use super::message::{MessageStatus, ShardIndex};
use super::storage::InboxStorage;
use super::work_registry::{ShardedWorkRegistry, Session};
use crate::error::{Error, IgnoreReason};
use crate::signal::{Envelope, SignalId};

/// The stateless method-object binding `(repository, envelope)` that the
/// repository hands the inbox (§4.4): runs the full transaction lifecycle
/// for one signal and returns whatever it produced.
pub type DispatchEndpoint = Arc<dyn Fn(Envelope) -> BoxFuture<'static, Result<Vec<Envelope>, Error>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStats {
    pub shard: ShardIndex,
    pub delivered_count: usize,
    pub ignored_count: usize,
}

/// Notified after each completed page (§4.6).
#[async_trait]
pub trait DeliveryMonitor: Send + Sync {
    async fn on_page(&self, stats: DeliveryStats);
}

pub struct NoopMonitor;

#[async_trait]
impl DeliveryMonitor for NoopMonitor {
    async fn on_page(&self, _stats: DeliveryStats) {}
}

pub struct DeliveryWorkerPool {
    node_id: String,
    shard_count: u32,
    page_size: usize,
    idempotence_window: Duration,
    lease_duration: StdDuration,
    backoff: StdDuration,
    storage: Arc<dyn InboxStorage>,
    work_registry: Arc<dyn ShardedWorkRegistry>,
    monitor: Arc<dyn DeliveryMonitor>,
    /// Keyed by the target entity's `type_url` (§4.4's per-class endpoint).
    endpoints: HashMap<String, DispatchEndpoint>,
    /// Shards currently under catch-up `FINALIZING`, whose live delivery is
    /// paused until the projection observes `COMPLETED` (§4.7).
    suspended_shards: std::sync::Mutex<HashSet<u32>>,
}

impl DeliveryWorkerPool {
    pub fn new(
        node_id: impl Into<String>,
        shard_count: u32,
        page_size: usize,
        idempotence_window: Duration,
        storage: Arc<dyn InboxStorage>,
        work_registry: Arc<dyn ShardedWorkRegistry>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            shard_count,
            page_size,
            idempotence_window,
            lease_duration: StdDuration::from_secs(30),
            backoff: StdDuration::from_millis(50),
            storage,
            work_registry,
            monitor: Arc::new(NoopMonitor),
            endpoints: HashMap::new(),
            suspended_shards: std::sync::Mutex::new(HashSet::new()),
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn DeliveryMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_lease_duration(mut self, lease: StdDuration) -> Self {
        self.lease_duration = lease;
        self
    }

    pub fn register_endpoint(&mut self, target_type_url: impl Into<String>, endpoint: DispatchEndpoint) {
        self.endpoints.insert(target_type_url.into(), endpoint);
    }

    pub fn suspend_shard(&self, shard: ShardIndex) {
        self.suspended_shards.lock().expect("suspended shard lock poisoned").insert(shard.index);
    }

    pub fn resume_shard(&self, shard: ShardIndex) {
        self.suspended_shards.lock().expect("suspended shard lock poisoned").remove(&shard.index);
    }

    fn is_suspended(&self, shard: ShardIndex) -> bool {
        self.suspended_shards.lock().expect("suspended shard lock poisoned").contains(&shard.index)
    }

    /// Attempt one pick-up/page/dispatch/release cycle for `shard`.
    /// `None` if the lease could not be acquired or the shard is suspended
    /// for catch-up finalization (§4.6, §4.7).
    pub async fn deliver_one_page(&self, shard: ShardIndex) -> Option<DeliveryStats> {
        if self.is_suspended(shard) {
            return None;
        }

        let session = self.work_registry.pick_up(shard, &self.node_id, self.lease_duration).await?;
        let stats = self.process_page(shard, session).await;
        self.work_registry.release(session).await;
        self.monitor.on_page(stats).await;
        Some(stats)
    }

    async fn process_page(&self, shard: ShardIndex, session: Session) -> DeliveryStats {
        let now = Utc::now();
        let page = match self.storage.read_page(shard, self.page_size).await {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(shard = shard.index, error = %e, "failed to read inbox page");
                return DeliveryStats { shard, delivered_count: 0, ignored_count: 0 };
            }
        };

        let mut delivered_ids = Vec::new();
        let mut ignored_count = 0usize;
        let mut seen_in_page: HashSet<SignalId> = HashSet::new();

        for msg in &page {
            debug_assert_eq!(msg.status, MessageStatus::ToDeliver);
            let id = msg.signal_id();

            if !seen_in_page.insert(id) {
                tracing::debug!(signal = %id, reason = ?IgnoreReason::Duplicate, "duplicate signal id within page");
                ignored_count += 1;
                delivered_ids.push(id);
                continue;
            }

            match self.storage.is_delivered_within_window(id, now).await {
                Ok(true) => {
                    tracing::debug!(signal = %id, reason = ?IgnoreReason::Duplicate, "already delivered within idempotence window");
                    ignored_count += 1;
                    delivered_ids.push(id);
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(signal = %id, error = %e, "failed to check delivery window; treating as not yet delivered");
                }
            }

            let endpoint = self.endpoints.get(msg.target_entity_id.type_url()).cloned();
            let Some(endpoint) = endpoint else {
                tracing::error!(signal = %id, target_type = msg.target_entity_id.type_url(), "no dispatch endpoint registered for target entity type");
                break;
            };

            match endpoint(msg.signal.clone()).await {
                Ok(_produced) => {
                    delivered_ids.push(id);
                }
                Err(e) => {
                    tracing::warn!(
                        shard = shard.index,
                        signal = %id,
                        error = %e,
                        "page interrupted by fatal handler failure; remaining messages deferred to next round"
                    );
                    break;
                }
            }
        }

        if !delivered_ids.is_empty() {
            // Re-validate the lease's fencing token before committing
            // delivery: if it expired and was reassigned mid-page (shard
            // rebalancing), this worker's view is stale and must not mark
            // anything delivered, or the new owner's redelivery would be a
            // second, duplicate application of the same page (§5, §8 P2).
            if self.work_registry.extend_lease(session, self.lease_duration).await.is_none() {
                tracing::warn!(shard = shard.index, node = %self.node_id, "lease lost mid-page; abandoning delivery without marking anything delivered");
                return DeliveryStats { shard, delivered_count: 0, ignored_count: 0 };
            }

            if let Err(e) = self
                .storage
                .mark_delivered(shard, &delivered_ids, now, self.idempotence_window)
                .await
            {
                tracing::error!(shard = shard.index, error = %e, "failed to mark page delivered");
            }
        }

        DeliveryStats {
            shard,
            delivered_count: delivered_ids.len() - ignored_count,
            ignored_count,
        }
    }

    /// Spawn `worker_count` tasks that loop over every shard, picking up
    /// whatever lease is free, delivering one page, and backing off when
    /// nothing is available (§5: "a worker that fails to acquire any lease
    /// sleeps for a small backoff").
    pub fn spawn_workers(self: Arc<Self>, worker_count: usize) -> Vec<tokio::task::JoinHandle<()>> {
        (0..worker_count)
            .map(|worker_index| {
                let pool = self.clone();
                tokio::spawn(async move {
                    loop {
                        let mut made_progress = false;
                        for shard in ShardIndex::all(pool.shard_count) {
                            if pool.deliver_one_page(shard).await.is_some() {
                                made_progress = true;
                            }
                        }
                        if !made_progress {
                            tracing::trace!(worker = worker_index, "no lease available; backing off");
                            tokio::time::sleep(pool.backoff).await;
                        }
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbox::message::InboxMessage;
    use crate::inbox::storage::InMemoryInboxStorage;
    use crate::inbox::work_registry::InMemoryWorkRegistry;
    use crate::signal::{Context, EntityId, Payload};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicI64, Ordering};

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct AddNumber(i64);
    impl Payload for AddNumber {
        const TYPE_URL: &'static str = "test.AddNumber";
    }

    fn register_sum_endpoint(pool: &mut DeliveryWorkerPool, sum: Arc<AtomicI64>) {
        pool.register_endpoint(
            "test.AddNumber",
            Arc::new(move |envelope: Envelope| {
                let sum = sum.clone();
                Box::pin(async move {
                    let payload: AddNumber = envelope.decode()?;
                    sum.fetch_add(payload.0, Ordering::SeqCst);
                    Ok(Vec::new())
                })
            }),
        );
    }

    fn pool_with_sum_endpoint(storage: Arc<InMemoryInboxStorage>, sum: Arc<AtomicI64>) -> DeliveryWorkerPool {
        let work_registry = Arc::new(InMemoryWorkRegistry::new());
        let mut pool = DeliveryWorkerPool::new("node-a", 1, 10, Duration::hours(1), storage, work_registry);
        register_sum_endpoint(&mut pool, sum);
        pool
    }

    #[tokio::test]
    async fn single_shard_page_delivers_every_signal_once() {
        let storage = Arc::new(InMemoryInboxStorage::new());
        let sum = Arc::new(AtomicI64::new(0));
        let shard = ShardIndex::new(0, 1);
        let target = EntityId::new("test.AddNumber", b"calc-1".to_vec());

        for n in [3, 5, -2] {
            let envelope = Envelope::command(&AddNumber(n), Context::root("calc-1"));
            storage.write(InboxMessage::new(shard, target.clone(), envelope, Utc::now())).await.unwrap();
        }

        let pool = pool_with_sum_endpoint(storage.clone(), sum.clone());
        let stats = pool.deliver_one_page(shard).await.unwrap();

        assert_eq!(stats.delivered_count, 3);
        assert_eq!(sum.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn duplicate_signal_id_within_one_page_is_applied_once() {
        let storage = Arc::new(InMemoryInboxStorage::new());
        let sum = Arc::new(AtomicI64::new(0));
        let shard = ShardIndex::new(0, 1);
        let target = EntityId::new("test.AddNumber", b"calc-1".to_vec());

        let envelope = Envelope::command(&AddNumber(10), Context::root("calc-1"));
        let duplicate = InboxMessage {
            shard,
            target_entity_id: target.clone(),
            signal: envelope.clone(),
            status: MessageStatus::ToDeliver,
            received_at: envelope.context.timestamp + Duration::milliseconds(1),
            keep_until: None,
        };
        storage.write(InboxMessage::new(shard, target.clone(), envelope, Utc::now())).await.unwrap();
        storage.write(duplicate).await.unwrap();

        let pool = pool_with_sum_endpoint(storage.clone(), sum.clone());
        let stats = pool.deliver_one_page(shard).await.unwrap();

        assert_eq!(sum.load(Ordering::SeqCst), 10);
        assert_eq!(stats.ignored_count, 1);
    }

    #[tokio::test]
    async fn a_shard_with_no_lease_available_yields_none() {
        let storage = Arc::new(InMemoryInboxStorage::new());
        let shard = ShardIndex::new(0, 1);
        let work_registry = Arc::new(InMemoryWorkRegistry::new());
        let held = work_registry.pick_up(shard, "other-node", StdDuration::from_secs(60)).await.unwrap();

        let pool = DeliveryWorkerPool::new("node-a", 1, 10, Duration::hours(1), storage, work_registry.clone());
        assert!(pool.deliver_one_page(shard).await.is_none());
        work_registry.release(held).await;
    }

    /// A lease lost mid-page (reassigned to another node during rebalancing)
    /// must not let the original holder mark the page delivered, even though
    /// its dispatch already ran against the stale session. The page stays
    /// available for the new owner, whose delivery is the one the ledger
    /// ultimately records (§5, §8 P2).
    #[tokio::test]
    async fn a_lease_lost_mid_page_abandons_delivery_without_marking_anything() {
        let storage = Arc::new(InMemoryInboxStorage::new());
        let shard = ShardIndex::new(0, 1);
        let target = EntityId::new("test.AddNumber", b"calc-1".to_vec());
        for n in [1, 2, 3] {
            let envelope = Envelope::command(&AddNumber(n), Context::root("calc-1"));
            storage.write(InboxMessage::new(shard, target.clone(), envelope, Utc::now())).await.unwrap();
        }

        let registry = Arc::new(InMemoryWorkRegistry::new());
        let session_a = registry.pick_up(shard, "node-a", StdDuration::from_millis(1)).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        // Rebalancing: node-b reclaims the now-expired lease while node-a is
        // still mid-page, unaware its session is stale.
        let session_b = registry.pick_up(shard, "node-b", StdDuration::from_secs(60)).await.unwrap();

        let sum_a = Arc::new(AtomicI64::new(0));
        let mut pool_a = DeliveryWorkerPool::new("node-a", 1, 10, Duration::hours(1), storage.clone(), registry.clone());
        register_sum_endpoint(&mut pool_a, sum_a.clone());
        let stats_a = pool_a.process_page(shard, session_a).await;

        assert_eq!(stats_a.delivered_count, 0, "a worker with a stale session must not claim delivery");
        assert_eq!(sum_a.load(Ordering::SeqCst), 6, "dispatch already ran before the staleness was discovered");

        // The page must still be there, unmarked, for node-b to deliver.
        registry.release(session_b).await;
        let sum_b = Arc::new(AtomicI64::new(0));
        let mut pool_b = DeliveryWorkerPool::new("node-b", 1, 10, Duration::hours(1), storage.clone(), registry.clone());
        register_sum_endpoint(&mut pool_b, sum_b.clone());
        let stats_b = pool_b.deliver_one_page(shard).await.unwrap();

        assert_eq!(stats_b.delivered_count, 3, "the rightful owner must still see the abandoned page as undelivered");
        assert_eq!(sum_b.load(Ordering::SeqCst), 6);
        assert!(storage.read_page(shard, 10).await.unwrap().is_empty(), "once node-b commits, the ledger must not offer the page again");
    }
}
