//! Repository (C7): class metadata, routing-table-backed dispatch, and the
//! glue between an entity's in-memory transaction lifecycle (C6) and its
//! durable record (§4.4) and the buses it posts produced signals to (§4.1).

use std::sync::Arc;

use async_trait::async_trait;

use crate::entity::{AggregateRepository, Entity, ProcessManagerRepository, ProjectionRepository};
use crate::error::{Ack, Error};
use crate::external::RecordStorage;
use crate::registry::Dispatcher;
use crate::routing::RoutingTable;
use crate::signal::{EntityId, Envelope, MessageClass, MessageKind};

/// Which of the three repository shapes backs a `Repository<S>` instance.
pub enum RepositoryLogic<S> {
    Aggregate(AggregateRepository<S>),
    ProcessManager(ProcessManagerRepository<S>),
    Projection(ProjectionRepository<S>),
}

impl<S: Clone + Send + Sync + 'static> RepositoryLogic<S> {
    async fn receive(&self, entity: &mut Entity<S>, signal: Envelope, label: String) -> Result<Vec<Envelope>, Error> {
        match self {
            RepositoryLogic::Aggregate(r) => r.handle_command(entity, signal, label).await,
            RepositoryLogic::ProcessManager(r) => r.dispatch(entity, signal, label).await,
            RepositoryLogic::Projection(r) => {
                if !r.subscribes_to(&signal.class) {
                    return Ok(Vec::new());
                }
                r.apply_event(entity, signal, label).await?;
                Ok(Vec::new())
            }
        }
    }
}

/// Posts a repository's produced signals onward to the bus matching their
/// kind (§4.1: a command handler's events go to the event bus, a process
/// manager's follow-up commands go back to the command bus, and so on).
pub struct OutboundBuses {
    pub commands: Arc<crate::bus::Bus>,
    pub events: Arc<crate::bus::Bus>,
    pub rejections: Arc<crate::bus::Bus>,
}

impl OutboundBuses {
    async fn post(&self, envelope: Envelope) -> Ack {
        match envelope.class.kind {
            MessageKind::Command => self.commands.publish(envelope).await,
            MessageKind::Event => self.events.publish(envelope).await,
            MessageKind::Rejection => self.rejections.publish(envelope).await,
        }
    }

    async fn post_all(&self, envelopes: Vec<Envelope>) {
        for envelope in envelopes {
            let ack = self.post(envelope).await;
            if !ack.is_ok() {
                tracing::warn!(signal = %ack.signal_id, "produced signal was not acknowledged cleanly");
            }
        }
    }
}

/// One entity class's repository: resolves an incoming signal's target
/// entity id via `routes`, loads or default-constructs that entity's
/// record, runs it through `logic`, persists the result, and posts
/// whatever the transaction produced.
pub struct Repository<S> {
    classes: Vec<MessageClass>,
    logic: RepositoryLogic<S>,
    storage: Arc<dyn RecordStorage<S>>,
    routes: RoutingTable,
    outbound: OutboundBuses,
}

impl<S: Clone + Send + Sync + Default + 'static> Repository<S> {
    pub fn new(
        classes: Vec<MessageClass>,
        logic: RepositoryLogic<S>,
        storage: Arc<dyn RecordStorage<S>>,
        routes: RoutingTable,
        outbound: OutboundBuses,
    ) -> Self {
        Self {
            classes,
            logic,
            storage,
            routes,
            outbound,
        }
    }

    /// Load the entity's record, or construct a fresh default one if this
    /// is its first signal (§4.4 `find_or_create`).
    pub async fn find_or_create(&self, id: &EntityId) -> Result<Entity<S>, Error> {
        match self.storage.load(id).await? {
            Some(entity) => Ok(entity),
            None => Ok(Entity::default()),
        }
    }

    pub async fn store(&self, id: &EntityId, entity: &Entity<S>) -> Result<(), Error> {
        self.storage.store(id, entity).await
    }

    /// Route, load, run, persist, and post-onward for one signal (§4.2, §4.4, §4.5).
    ///
    /// Command routing resolves to exactly one target (§4.2 / §8 P6). Event
    /// and rejection routing may fan out to zero or many targets (§4.2 line
    /// 101, §4.6 line 120); each target gets its own entity, transaction,
    /// and produced signals, and an empty route set is simply ignored, not
    /// an error.
    pub async fn receive(&self, signal: Envelope) -> Result<Vec<Envelope>, Error> {
        let targets = match signal.class.kind {
            MessageKind::Command => vec![self.routes.apply_command(&signal)?],
            MessageKind::Event | MessageKind::Rejection => self.routes.apply(&signal),
        };

        let mut all_produced = Vec::new();
        for target in targets {
            let mut entity = self.find_or_create(&target).await?;
            let produced = self.logic.receive(&mut entity, signal.clone(), target.to_string()).await?;
            self.store(&target, &entity).await?;
            self.outbound.post_all(produced.clone()).await;
            all_produced.extend(produced);
        }
        Ok(all_produced)
    }
}

/// Registers a `Repository<S>` as a `Dispatcher<Envelope>` on a `Bus` (§4.1):
/// the bus resolves which message classes this dispatcher owns from the
/// repository's own class table, rather than the repository re-declaring
/// them.
#[async_trait]
impl<S: Clone + Send + Sync + Default + 'static> Dispatcher<Envelope> for Repository<S> {
    fn message_classes(&self) -> &[MessageClass] {
        &self.classes
    }

    async fn dispatch(&self, message: Envelope) -> Ack {
        let signal_id = message.id;
        match self.receive(message).await {
            Ok(_) => Ack::ok(signal_id),
            Err(e) => Ack::error(signal_id, &e),
        }
    }
}
