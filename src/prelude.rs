//! Convenience re-exports for downstream crates wiring up a bus, a handful
//! of entities, and the inbox delivery pipeline.

pub use crate::bus::Bus;
pub use crate::catchup::{CatchUpEvent, CatchUpProcess, CatchUpRequest, CatchUpState, CatchUpStatus};
pub use crate::config::DeliveryConfig;
pub use crate::entity::{
    AggregateRepository, Builder, Commit, Entity, EntityKind, LifecycleFlags, NoOpListener, PhaseFailAction,
    ProcessManagerRepository, ProjectionRepository, PropagationRequiredListener, Transaction, TransactionListener,
};
pub use crate::error::{Ack, AckStatus, Error, IgnoreReason, Outcome};
pub use crate::external::{
    EventStore, EventStorePage, EventStoreQuery, PermissiveSchemaRegistry, Publisher, RecordStorage, SchemaRegistry, StorageFactory,
    Subscriber, TransportFactory,
};
pub use crate::filter::{Filter, FilterChain, FilterDecision, FilterOutcome};
pub use crate::inbox::{
    uniform_hash, DeliveryMonitor, DeliveryStats, DeliveryWorkerPool, InMemoryInboxStorage, InMemoryWorkRegistry, InboxDispatcher,
    InboxMessage, InboxStorage, MessageStatus, NoopMonitor, ShardIndex, ShardedWorkRegistry, ShardingStrategy, UniformHash,
};
pub use crate::integration::{InboundBridge, OutboundBridge};
pub use crate::registry::{Cardinality, Dispatcher, DispatcherRegistry};
pub use crate::repository::{OutboundBuses, Repository};
pub use crate::routing::{RouteFn, RoutingTable};
pub use crate::signal::{Context, EntityId, Envelope, MessageClass, MessageKind, Payload, ProducerId, SignalId, Version, VersionStrategy};
