//! Process managers (§1 GLOSSARY): react to commands, events, or rejections,
//! mutate their own state directly in a single phase per dispatch, and may
//! emit follow-up commands (e.g. `PlaceOrder` fanning out to
//! `ReserveStock` + `ChargeCard`). Versioned with `AutoIncrement`, since a
//! process manager's version has no intrinsic relationship to the signal
//! that produced it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;

use crate::error::Error;
use crate::signal::{Envelope, MessageClass, Payload};

use super::kind::EntityKind;
use super::lifecycle::LifecycleFlags;
use super::transaction::{NoOpListener, Transaction, TransactionListener};
use super::Entity;

/// A process manager handler: given the entity's current state, flags, and
/// the signal driving this dispatch, asynchronously compute the next state,
/// flags, and any follow-up signals to post. Runs outside the transaction;
/// its result is staged as the sole phase once it resolves (§4.5).
type HandlerFn<S> =
    Arc<dyn Fn(S, LifecycleFlags, Envelope) -> BoxFuture<'static, Result<(S, LifecycleFlags, Vec<Envelope>), Error>> + Send + Sync>;
type ValidateFn<S> = Arc<dyn Fn(&S) -> Result<(), Error> + Send + Sync>;

/// Drives a process manager's single-phase-per-dispatch handlers, keyed by
/// the message class each one consumes (§4.3, §4.5).
pub struct ProcessManagerRepository<S> {
    handlers: HashMap<MessageClass, HandlerFn<S>>,
    validate: ValidateFn<S>,
    listener: Arc<dyn TransactionListener<S>>,
}

impl<S: Clone + Send + Sync + 'static> ProcessManagerRepository<S> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
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

    pub fn register_command_handler<P: Payload>(&mut self, handler: HandlerFn<S>) -> Result<(), Error> {
        self.register(MessageClass::command::<P>(), handler)
    }

    pub fn register_event_handler<P: Payload>(&mut self, handler: HandlerFn<S>) -> Result<(), Error> {
        self.register(MessageClass::event::<P>(), handler)
    }

    pub fn register_rejection_handler<P: Payload>(&mut self, handler: HandlerFn<S>) -> Result<(), Error> {
        self.register(MessageClass::rejection::<P>(), handler)
    }

    fn register(&mut self, class: MessageClass, handler: HandlerFn<S>) -> Result<(), Error> {
        if self.handlers.contains_key(&class) {
            return Err(Error::DuplicateHandler { class: class.to_string() });
        }
        self.handlers.insert(class, handler);
        Ok(())
    }

    /// Dispatch one signal: run its handler to completion, then stage the
    /// resulting state/flags as the transaction's single phase and commit
    /// (§4.5). A handler error never touches the transaction at all, so the
    /// entity's persisted state is untouched.
    pub async fn dispatch(&self, entity: &mut Entity<S>, signal: Envelope, entity_label: impl Into<String>) -> Result<Vec<Envelope>, Error> {
        let handler = self
            .handlers
            .get(&signal.class)
            .ok_or_else(|| Error::NoHandlerRegistered { class: signal.class.to_string() })?
            .clone();

        let (next_state, next_flags, produced) = handler(entity.state.clone(), entity.flags, signal.clone()).await?;

        let mut tx = Transaction::start(entity_label, entity.state.clone(), entity.version, entity.flags);
        let phase_result = tx
            .apply_phase(
                signal.clone(),
                None,
                self.listener.as_ref(),
                move |b| {
                    *b.state = next_state;
                    *b.flags = next_flags;
                    Ok(())
                },
                self.validate.as_ref(),
            )
            .await;

        if phase_result.is_err() {
            return Err(Error::HandlerFailedUnexpectedly {
                signal: signal.id,
                source: anyhow::anyhow!("process manager validation for {} failed; transaction aborted", signal.class),
            });
        }

        for p in &produced {
            tx.record_produced(p.clone());
        }

        let commit = tx.commit(EntityKind::ProcessManager.default_version_strategy(), self.listener.as_ref(), Utc::now()).await?;
        entity.state = commit.state;
        entity.version = commit.version;
        entity.flags = commit.flags;
        Ok(commit.events)
    }
}

impl<S: Clone + Send + Sync + 'static> Default for ProcessManagerRepository<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Context;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct PlaceOrder {
        customer: String,
    }
    impl Payload for PlaceOrder {
        const TYPE_URL: &'static str = "test.PlaceOrder";
    }

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct ReserveStock {
        customer: String,
    }
    impl Payload for ReserveStock {
        const TYPE_URL: &'static str = "test.ReserveStock";
    }

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct ChargeCard {
        customer: String,
    }
    impl Payload for ChargeCard {
        const TYPE_URL: &'static str = "test.ChargeCard";
    }

    #[tokio::test]
    async fn place_order_fans_out_into_two_commands() {
        let mut repo = ProcessManagerRepository::<u32>::new();
        repo.register_command_handler::<PlaceOrder>(Arc::new(|state, flags, cmd| {
            Box::pin(async move {
                let payload: PlaceOrder = cmd.decode()?;
                Ok((
                    state + 1,
                    flags,
                    vec![
                        Envelope::command(&ReserveStock { customer: payload.customer.clone() }, cmd.context.clone()),
                        Envelope::command(&ChargeCard { customer: payload.customer }, cmd.context.clone()),
                    ],
                ))
            })
        }))
        .unwrap();

        let mut entity = Entity::<u32>::new();
        let command = Envelope::command(&PlaceOrder { customer: "alice".into() }, Context::root("actor"));
        let produced = repo.dispatch(&mut entity, command, "order-1").await.unwrap();

        assert_eq!(entity.state, 1);
        assert_eq!(produced.len(), 2);
    }

    #[tokio::test]
    async fn dispatch_with_no_handler_fails_without_mutation() {
        let repo = ProcessManagerRepository::<u32>::new();
        let mut entity = Entity::<u32>::new();
        let command = Envelope::command(&PlaceOrder { customer: "bob".into() }, Context::root("actor"));
        let err = repo.dispatch(&mut entity, command, "order-2").await.unwrap_err();
        assert!(matches!(err, Error::NoHandlerRegistered { .. }));
        assert_eq!(entity.state, 0);
    }
}
