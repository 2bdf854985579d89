//! Bridges a `Bus` to the inbox: routes an incoming signal to its target
//! entity, assigns it a shard, and enqueues it, acknowledging as soon as
//! the write is durable (§4.6: "enqueue MUST be acknowledged before
//! returning to the bus").

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::message::InboxMessage;
use super::sharding::ShardingStrategy;
use super::storage::InboxStorage;
use crate::error::Ack;
use crate::registry::Dispatcher;
use crate::routing::RoutingTable;
use crate::signal::{Envelope, MessageClass, MessageKind};

pub struct InboxDispatcher {
    classes: Vec<MessageClass>,
    routes: RoutingTable,
    sharding: Arc<dyn ShardingStrategy>,
    shard_count: u32,
    storage: Arc<dyn InboxStorage>,
}

impl InboxDispatcher {
    pub fn new(
        classes: Vec<MessageClass>,
        routes: RoutingTable,
        sharding: Arc<dyn ShardingStrategy>,
        shard_count: u32,
        storage: Arc<dyn InboxStorage>,
    ) -> Self {
        Self {
            classes,
            routes,
            sharding,
            shard_count,
            storage,
        }
    }
}

#[async_trait]
impl Dispatcher<Envelope> for InboxDispatcher {
    fn message_classes(&self) -> &[MessageClass] {
        &self.classes
    }

    /// Routes, shards, and enqueues `message` for every target it resolves
    /// to. Command routing yields exactly one target; event/rejection
    /// routing may fan out to zero or many (§4.2 line 101, §4.6 line 120),
    /// each enqueued as its own inbox write. Zero targets is not an error.
    async fn dispatch(&self, message: Envelope) -> Ack {
        let signal_id = message.id;
        let targets = match message.class.kind {
            MessageKind::Command => self.routes.apply_command(&message).map(|t| vec![t]),
            MessageKind::Event | MessageKind::Rejection => Ok(self.routes.apply(&message)),
        };

        let targets = match targets {
            Ok(t) => t,
            Err(e) => return Ack::error(signal_id, &e),
        };

        for target in targets {
            let shard = self.sharding.shard_for(&target, self.shard_count);
            let inbox_message = InboxMessage::new(shard, target, message.clone(), Utc::now());
            if let Err(e) = self.storage.write(inbox_message).await {
                return Ack::error(signal_id, &e);
            }
        }
        Ack::ok(signal_id)
    }
}
