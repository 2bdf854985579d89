//! Sharded inbox delivery (C8): the per-shard queue, its `ShardedWorkRegistry`
//! lease model, pluggable sharding, and the worker pool that drives delivery.

mod delivery;
mod dispatcher;
mod message;
mod sharding;
mod storage;
mod work_registry;

pub use delivery::{DeliveryMonitor, DeliveryStats, DeliveryWorkerPool, DispatchEndpoint, NoopMonitor};
pub use dispatcher::InboxDispatcher;
pub use message::{InboxMessage, MessageStatus, ShardIndex};
pub use sharding::{uniform_hash, ShardingStrategy, UniformHash};
pub use storage::{InMemoryInboxStorage, InboxStorage};
pub use work_registry::{InMemoryWorkRegistry, ShardedWorkRegistry, Session};
