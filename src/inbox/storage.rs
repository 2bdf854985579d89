//! Per-shard inbox storage (§4.6, §6): `write`, `read_page`,
//! `mark_delivered`, `delete_expired`, plus the delivered-id index
//! page-level dedup needs to recognize a duplicate from an *earlier* page.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::message::{InboxMessage, MessageStatus, ShardIndex};
use crate::error::Error;
use crate::signal::SignalId;

#[async_trait]
pub trait InboxStorage: Send + Sync {
    /// Persist `msg` with `status = TO_DELIVER`. Must be acknowledged
    /// before the bus returns an ack for the originating signal (§4.6).
    async fn write(&self, msg: InboxMessage) -> Result<(), Error>;

    /// The oldest `limit` `TO_DELIVER` messages for `shard`, ordered by
    /// `(received_at, signal_id)` (§4.6 ordering guarantee, §8 P1).
    async fn read_page(&self, shard: ShardIndex, limit: usize) -> Result<Vec<InboxMessage>, Error>;

    /// Transition `ids` in `shard` from `TO_DELIVER` to `DELIVERED`,
    /// stamping `keep_until = now + idempotence_window`.
    async fn mark_delivered(&self, shard: ShardIndex, ids: &[SignalId], now: DateTime<Utc>, idempotence_window: Duration) -> Result<(), Error>;

    /// Delete messages with `status = DELIVERED AND keep_until < now`.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize, Error>;

    /// `true` if `id` was marked delivered and its `keep_until` has not yet
    /// passed `now` — the cross-page half of the dedup rule in §4.6/§8 P2.
    async fn is_delivered_within_window(&self, id: SignalId, now: DateTime<Utc>) -> Result<bool, Error>;
}

#[derive(Default)]
struct ShardState {
    // keyed by (received_at, signal_id) for FIFO iteration order.
    queue: BTreeMap<(DateTime<Utc>, SignalId), InboxMessage>,
}

/// In-memory `InboxStorage`, sufficient for single-process testing; a
/// production deployment supplies a durable, linearizable-per-shard
/// implementation via `StorageFactory` (§6, out of scope for this core).
#[derive(Default)]
pub struct InMemoryInboxStorage {
    shards: Mutex<HashMap<u32, ShardState>>,
    delivered_index: Mutex<HashMap<SignalId, DateTime<Utc>>>,
}

impl InMemoryInboxStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InboxStorage for InMemoryInboxStorage {
    async fn write(&self, msg: InboxMessage) -> Result<(), Error> {
        let mut shards = self.shards.lock().expect("inbox storage lock poisoned");
        let shard = shards.entry(msg.shard.index).or_default();
        shard.queue.insert((msg.received_at, msg.signal_id()), msg);
        Ok(())
    }

    async fn read_page(&self, shard: ShardIndex, limit: usize) -> Result<Vec<InboxMessage>, Error> {
        let shards = self.shards.lock().expect("inbox storage lock poisoned");
        let page = shards
            .get(&shard.index)
            .map(|s| {
                s.queue
                    .values()
                    .filter(|m| m.status == MessageStatus::ToDeliver)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(page)
    }

    async fn mark_delivered(&self, shard: ShardIndex, ids: &[SignalId], now: DateTime<Utc>, idempotence_window: Duration) -> Result<(), Error> {
        let keep_until = now + idempotence_window;
        let mut shards = self.shards.lock().expect("inbox storage lock poisoned");
        if let Some(s) = shards.get_mut(&shard.index) {
            for msg in s.queue.values_mut() {
                if ids.contains(&msg.signal_id()) {
                    msg.status = MessageStatus::Delivered;
                    msg.keep_until = Some(keep_until);
                }
            }
        }
        drop(shards);
        let mut index = self.delivered_index.lock().expect("delivered index lock poisoned");
        for id in ids {
            index.insert(*id, keep_until);
        }
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize, Error> {
        let mut removed = 0;
        let mut shards = self.shards.lock().expect("inbox storage lock poisoned");
        for shard in shards.values_mut() {
            let before = shard.queue.len();
            shard.queue.retain(|_, m| !(m.status == MessageStatus::Delivered && m.keep_until.map(|k| k < now).unwrap_or(false)));
            removed += before - shard.queue.len();
        }
        drop(shards);
        let mut index = self.delivered_index.lock().expect("delivered index lock poisoned");
        index.retain(|_, keep_until| *keep_until >= now);
        Ok(removed)
    }

    async fn is_delivered_within_window(&self, id: SignalId, now: DateTime<Utc>) -> Result<bool, Error> {
        let index = self.delivered_index.lock().expect("delivered index lock poisoned");
        Ok(index.get(&id).map(|keep_until| *keep_until >= now).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{Context, Envelope, Payload};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct AddNumber(i64);
    impl Payload for AddNumber {
        const TYPE_URL: &'static str = "test.AddNumber";
    }

    fn msg(shard: ShardIndex, n: i64, at: DateTime<Utc>) -> InboxMessage {
        InboxMessage::new(
            shard,
            crate::signal::EntityId::new("calc", b"calc-1".to_vec()),
            Envelope::command(&AddNumber(n), Context::root("actor")),
            at,
        )
    }

    #[tokio::test]
    async fn page_reads_are_fifo_by_received_at() {
        let storage = InMemoryInboxStorage::new();
        let shard = ShardIndex::new(0, 1);
        let t0 = Utc::now();
        storage.write(msg(shard, 1, t0)).await.unwrap();
        storage.write(msg(shard, 2, t0 + Duration::seconds(1))).await.unwrap();

        let page = storage.read_page(shard, 10).await.unwrap();
        assert_eq!(page.len(), 2);
        assert!(page[0].received_at <= page[1].received_at);
    }

    #[tokio::test]
    async fn delivered_messages_are_excluded_from_later_pages() {
        let storage = InMemoryInboxStorage::new();
        let shard = ShardIndex::new(0, 1);
        let m = msg(shard, 1, Utc::now());
        let id = m.signal_id();
        storage.write(m).await.unwrap();
        storage.mark_delivered(shard, &[id], Utc::now(), Duration::hours(1)).await.unwrap();

        assert!(storage.read_page(shard, 10).await.unwrap().is_empty());
        assert!(storage.is_delivered_within_window(id, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn expired_delivered_messages_are_swept() {
        let storage = InMemoryInboxStorage::new();
        let shard = ShardIndex::new(0, 1);
        let m = msg(shard, 1, Utc::now());
        let id = m.signal_id();
        storage.write(m).await.unwrap();
        storage.mark_delivered(shard, &[id], Utc::now() - Duration::hours(2), Duration::hours(1)).await.unwrap();

        let removed = storage.delete_expired(Utc::now()).await.unwrap();
        assert_eq!(removed, 1);
        assert!(!storage.is_delivered_within_window(id, Utc::now()).await.unwrap());
    }
}
