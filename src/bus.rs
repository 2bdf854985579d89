//! The bus pipeline (C3): envelope → validate → filter → route → dispatch → ack.
//!
//! One `Bus` instance serves one signal family. The command bus is
//! constructed with `Cardinality::Unicast`; event, rejection, and
//! integration buses use `Cardinality::Multicast` (§4.1).

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{Ack, Error, IgnoreReason};
use crate::external::SchemaRegistry;
use crate::filter::{FilterChain, FilterOutcome};
use crate::registry::{Cardinality, Dispatcher, DispatcherRegistry};
use crate::signal::Envelope;

/// A runtime processor for one signal family.
pub struct Bus {
    cardinality: Cardinality,
    schema: Arc<dyn SchemaRegistry>,
    filters: FilterChain<Envelope>,
    registry: RwLock<DispatcherRegistry<Envelope>>,
}

impl Bus {
    pub fn new(cardinality: Cardinality, schema: Arc<dyn SchemaRegistry>) -> Self {
        Self {
            cardinality,
            schema,
            filters: FilterChain::new(),
            registry: RwLock::new(DispatcherRegistry::new(cardinality)),
        }
    }

    pub fn with_filters(mut self, filters: FilterChain<Envelope>) -> Self {
        self.filters = filters;
        self
    }

    pub async fn register(&self, dispatcher: Arc<dyn Dispatcher<Envelope>>) -> Result<(), Error> {
        self.registry.write().await.register(dispatcher)
    }

    pub async fn unregister(&self, dispatcher: &Arc<dyn Dispatcher<Envelope>>) {
        self.registry.write().await.unregister(dispatcher);
    }

    /// Run the six-stage pipeline of §4.1 for a single signal.
    pub async fn publish(&self, envelope: Envelope) -> Ack {
        let signal_id = envelope.id;

        // 1. Envelope the raw message; reject a default payload immediately.
        if envelope.is_default_payload {
            let err = Error::DefaultPayloadRejected {
                class: envelope.class.to_string(),
            };
            tracing::warn!(signal = %signal_id, class = %envelope.class, "rejected default-valued payload");
            return Ack::error(signal_id, &err);
        }

        // 2. Validate against the schema registry.
        if let Err(e) = self
            .schema
            .validate(envelope.class.type_url, &envelope.payload_bytes)
            .await
        {
            tracing::warn!(signal = %signal_id, error = %e, "schema validation failed");
            return Ack::error(signal_id, &e);
        }

        // 3. Filter chain.
        let envelope = match self.filters.run(envelope).await {
            Ok(envelope) => envelope,
            Err(FilterOutcome::Acked(ack)) => return ack,
            Err(FilterOutcome::Dropped(_reason)) => return Ack::ok(signal_id),
        };

        // 4. Resolve dispatchers.
        let class = envelope.class.clone();
        let dispatchers = {
            let registry = self.registry.read().await;
            registry.lookup(&class).to_vec()
        };

        // 5. Dispatch.
        match self.cardinality {
            Cardinality::Unicast => {
                if dispatchers.len() != 1 {
                    let err = Error::RoutingFailed {
                        class: class.to_string(),
                        found: dispatchers.len(),
                    };
                    tracing::error!(signal = %signal_id, error = %err, "unicast dispatch requires exactly one dispatcher");
                    return Ack::error(signal_id, &err);
                }
                dispatchers[0].dispatch(envelope).await
            }
            Cardinality::Multicast => {
                if dispatchers.is_empty() {
                    tracing::debug!(signal = %signal_id, class = %class, reason = ?IgnoreReason::OutOfScope, "no dispatcher registered for class");
                    return Ack::ok(signal_id);
                }
                let mut last = Ack::ok(signal_id);
                for dispatcher in dispatchers {
                    last = dispatcher.dispatch(envelope.clone()).await;
                }
                last
            }
        }
    }

    /// Publish a batch of signals, sequentially, returning one ack per signal.
    pub async fn publish_batch(&self, envelopes: Vec<Envelope>) -> Vec<Ack> {
        let mut acks = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            acks.push(self.publish(envelope).await);
        }
        acks
    }
}
