//! Event-sourced aggregates (§1 GLOSSARY, §4.5): a command handler produces
//! events without mutating state; each produced event then folds through
//! its own phase via the registered event applier, and the entity's
//! version is taken from the event stream itself (`VersionStrategy::FromEvent`).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::error::Error;
use crate::signal::{Envelope, MessageClass, Payload, Version};

use super::kind::EntityKind;
use super::transaction::{Builder, NoOpListener, Transaction, TransactionListener};
use super::Entity;

type CommandHandlerFn<S> = Arc<dyn Fn(&S, &Envelope) -> Result<Vec<Envelope>, Error> + Send + Sync>;
type EventApplierFn<S> = Arc<dyn Fn(&mut Builder<'_, S>, &Envelope) -> Result<(), Error> + Send + Sync>;
type ValidateFn<S> = Arc<dyn Fn(&S) -> Result<(), Error> + Send + Sync>;

/// Drives the command-handler/event-applier pair that makes up one
/// aggregate's behavior, keyed by message class (§4.3, §4.5).
pub struct AggregateRepository<S> {
    command_handlers: HashMap<MessageClass, CommandHandlerFn<S>>,
    event_appliers: HashMap<MessageClass, EventApplierFn<S>>,
    validate: ValidateFn<S>,
    listener: Arc<dyn TransactionListener<S>>,
}

impl<S: Clone + Send + Sync + 'static> AggregateRepository<S> {
    pub fn new() -> Self {
        Self {
            command_handlers: HashMap::new(),
            event_appliers: HashMap::new(),
            validate: Arc::new(|_| Ok(())),
            listener: Arc::new(NoOpListener),
        }
    }

    pub fn with_validate(mut self, validate: impl Fn(&S) -> Result<(), Error> + Send + Sync + 'static) -> Self {
        self.validate = Arc::new(validate);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn TransactionListener<S>>) -> Self {
        self.listener = listener;
        self
    }

    pub fn register_command_handler<P: Payload>(
        &mut self,
        handler: impl Fn(&S, &Envelope) -> Result<Vec<Envelope>, Error> + Send + Sync + 'static,
    ) -> Result<(), Error> {
        let class = MessageClass::command::<P>();
        if self.command_handlers.contains_key(&class) {
            return Err(Error::DuplicateHandler { class: class.to_string() });
        }
        self.command_handlers.insert(class, Arc::new(handler));
        Ok(())
    }

    pub fn register_event_applier<P: Payload>(
        &mut self,
        applier: impl Fn(&mut Builder<'_, S>, &Envelope) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Result<(), Error> {
        let class = MessageClass::event::<P>();
        if self.event_appliers.contains_key(&class) {
            return Err(Error::DuplicateHandler { class: class.to_string() });
        }
        self.event_appliers.insert(class, Arc::new(applier));
        Ok(())
    }

    /// §4.5's full cycle for a command: produce events (no mutation yet),
    /// then apply each as its own transaction phase, then commit atomically.
    /// Returns the events to post to the event bus; on any phase failure
    /// nothing is mutated and the produced events are discarded.
    pub async fn handle_command(&self, entity: &mut Entity<S>, command: Envelope, entity_label: impl Into<String>) -> Result<Vec<Envelope>, Error> {
        let handler = self
            .command_handlers
            .get(&command.class)
            .ok_or_else(|| Error::NoHandlerRegistered { class: command.class.to_string() })?;
        let events = handler(&entity.state, &command)?;

        let mut tx = Transaction::start(entity_label, entity.state.clone(), entity.version, entity.flags);

        for event in &events {
            let applier = self
                .event_appliers
                .get(&event.class)
                .ok_or_else(|| Error::NoHandlerRegistered { class: event.class.to_string() })?
                .clone();
            let event_for_step = event.clone();
            let phase_result = tx
                .apply_phase(
                    event.clone(),
                    event.version,
                    self.listener.as_ref(),
                    move |b| applier(b, &event_for_step),
                    self.validate.as_ref(),
                )
                .await;
            if phase_result.is_err() {
                return Err(Error::HandlerFailedUnexpectedly {
                    signal: event.id,
                    source: anyhow::anyhow!("event applier for {} failed; transaction aborted", event.class),
                });
            }
            tx.record_produced(event.clone());
        }

        let commit = tx.commit(EntityKind::Aggregate.default_version_strategy(), self.listener.as_ref(), Utc::now()).await?;
        entity.state = commit.state;
        entity.version = commit.version;
        entity.flags = commit.flags;
        Ok(commit.events)
    }
}

impl<S: Clone + Send + Sync + 'static> Default for AggregateRepository<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{Context, ProducerId};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct AddNumber(i64);
    impl Payload for AddNumber {
        const TYPE_URL: &'static str = "test.AddNumber";
    }

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct NumberAdded(i64);
    impl Payload for NumberAdded {
        const TYPE_URL: &'static str = "test.NumberAdded";
    }

    #[tokio::test]
    async fn command_produces_and_applies_one_event() {
        let mut repo = AggregateRepository::<i64>::new();
        repo.register_command_handler::<AddNumber>(|_state, cmd| {
            let payload: AddNumber = cmd.decode()?;
            Ok(vec![Envelope::event(
                &NumberAdded(payload.0),
                cmd.context.clone(),
                ProducerId::new("calc-1"),
                Version::new(1, Utc::now()),
            )])
        })
        .unwrap();
        repo.register_event_applier::<NumberAdded>(|b, ev| {
            let payload: NumberAdded = ev.decode()?;
            *b.state += payload.0;
            Ok(())
        })
        .unwrap();

        let mut entity = Entity::<i64>::new();
        let command = Envelope::command(&AddNumber(7), Context::root("actor"));
        let events = repo.handle_command(&mut entity, command, "calc-1").await.unwrap();

        assert_eq!(entity.state, 7);
        assert_eq!(entity.version.number, 1);
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn missing_command_handler_is_reported() {
        let repo = AggregateRepository::<i64>::new();
        let mut entity = Entity::<i64>::new();
        let command = Envelope::command(&AddNumber(1), Context::root("actor"));
        let err = repo.handle_command(&mut entity, command, "calc-1").await.unwrap_err();
        assert!(matches!(err, Error::NoHandlerRegistered { .. }));
    }
}
