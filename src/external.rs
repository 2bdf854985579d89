//! External collaborator interfaces (§6).
//!
//! These traits describe the systems this crate consumes but does not
//! implement: schema validation, durable storage, and cross-context
//! transport. Per §1 they are out of scope for this core — the crate
//! depends only on the trait, never a concrete production backend. The
//! exceptions are `InboxStorage` and `ShardedWorkRegistry`, which get
//! in-memory default implementations in `inbox/` because the sharded
//! delivery logic built on top of them is in-scope core behavior that must
//! be testable on its own (see `inbox/storage.rs`, `inbox/work_registry.rs`).

use async_trait::async_trait;

use crate::entity::Entity;
use crate::error::Error;
use crate::inbox::{InboxStorage, ShardedWorkRegistry};
use crate::signal::EntityId;

/// Validates payloads and exposes the field metadata routing/filters need.
///
/// A no-op implementation that accepts everything is provided for tests;
/// production applications supply a schema/IDL-backed implementation.
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    /// Validate a payload's bytes against its declared `type_url`.
    async fn validate(&self, type_url: &str, payload_bytes: &[u8]) -> Result<(), Error>;

    /// The stable `type_url` registered for a given Rust type, if known.
    fn type_url_for(&self, rust_type_name: &str) -> Option<&'static str>;
}

/// Accepts every payload; useful for tests and for applications that
/// validate at the edges (HTTP/gRPC layer) instead of in the bus.
#[derive(Debug, Clone, Default)]
pub struct PermissiveSchemaRegistry;

#[async_trait]
impl SchemaRegistry for PermissiveSchemaRegistry {
    async fn validate(&self, _type_url: &str, _payload_bytes: &[u8]) -> Result<(), Error> {
        Ok(())
    }

    fn type_url_for(&self, _rust_type_name: &str) -> Option<&'static str> {
        None
    }
}

/// A page of events read from the durable event store.
#[derive(Debug, Clone)]
pub struct EventStorePage<Ev> {
    pub events: Vec<Ev>,
    /// The timestamp of the last event in `events`, stripped so the caller
    /// re-reads anything else sharing that instant on the next round (§4.7).
    pub last_timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

/// A query against the durable event store, as used by catch-up (§4.7).
#[derive(Debug, Clone)]
pub struct EventStoreQuery {
    pub event_types: Vec<&'static str>,
    pub since: chrono::DateTime<chrono::Utc>,
    pub until: chrono::DateTime<chrono::Utc>,
    pub limit: usize,
}

/// Append-only, ordered-read event storage (§6).
#[async_trait]
pub trait EventStore<Ev: Send>: Send + Sync {
    /// Read events matching `query`, ordered by timestamp ascending.
    async fn read(&self, query: EventStoreQuery) -> Result<EventStorePage<Ev>, Error>;

    /// Append events atomically.
    async fn append(&self, events: Vec<Ev>) -> Result<(), Error>;
}

/// Persists an aggregate/process-manager/projection's durable record: its
/// state, version, and lifecycle flags together (§4.4, §4.5).
#[async_trait]
pub trait RecordStorage<S: Send>: Send + Sync {
    async fn load(&self, id: &EntityId) -> Result<Option<Entity<S>>, Error>;
    async fn store(&self, id: &EntityId, entity: &Entity<S>) -> Result<(), Error>;
}

/// Publishes to, and subscribes from, an external channel for the
/// integration bus (§4.1, §6, C10).
#[async_trait]
pub trait Publisher<M: Send>: Send + Sync {
    async fn publish(&self, message: M) -> Result<(), Error>;
}

#[async_trait]
pub trait Subscriber<M: Send>: Send + Sync {
    /// Pull the next externally-published message, if any is ready.
    async fn poll(&self) -> Result<Option<M>, Error>;
}

/// Builds publishers/subscribers for named channels, bridging this
/// context's integration bus to the outside world (§6).
pub trait TransportFactory<M: Send>: Send + Sync {
    fn create_publisher(&self, channel_id: &str) -> Box<dyn Publisher<M>>;
    fn create_subscriber(&self, channel_id: &str) -> Box<dyn Subscriber<M>>;
}

/// Produces every durable-storage collaborator the core needs (§6). Out of
/// scope for this core beyond the trait declaration — a hosting application
/// supplies the concrete on-disk/remote implementation.
///
/// `create_record_storage` covers aggregate, process-manager, and
/// projection records alike: §4.4/§4.5 persist all three the same way
/// (state + version + flags), so there is no separate `AggregateStorage`/
/// `ProjectionStorage` trait, only `RecordStorage<S>` keyed by the entity
/// class it backs. `create_event_store`/`create_record_storage` are generic
/// rather than object-safe methods, since a factory must mint a differently
/// typed store per concrete `S`/`Ev` the application registers.
pub trait StorageFactory: Send + Sync {
    fn create_inbox_storage(&self, multitenant: bool) -> Box<dyn InboxStorage>;
    fn create_work_registry(&self) -> Box<dyn ShardedWorkRegistry>;
    fn create_event_store<Ev: Send + 'static>(&self, context: &str) -> Box<dyn EventStore<Ev>>;
    fn create_record_storage<S: Send + 'static>(&self, context: &str, entity_class: &str) -> Box<dyn RecordStorage<S>>;
}
