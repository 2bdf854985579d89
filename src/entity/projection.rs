//! Projections (§1 GLOSSARY): fold events into a read-optimized view, one
//! phase per event, producing nothing. Versioned with `AutoIncrement`
//! since a projection's version is purely a progress marker for catch-up
//! (§4.7), not derived from the folded event's own version.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::error::Error;
use crate::signal::{Envelope, MessageClass, Payload};

use super::kind::EntityKind;
use super::transaction::{Builder, NoOpListener, Transaction, TransactionListener};
use super::Entity;

type EventFolderFn<S> = Arc<dyn Fn(&mut Builder<'_, S>, &Envelope) -> Result<(), Error> + Send + Sync>;
type ValidateFn<S> = Arc<dyn Fn(&S) -> Result<(), Error> + Send + Sync>;

/// Drives a projection's event folders, keyed by the event class each one
/// consumes. A projection never emits follow-up signals.
pub struct ProjectionRepository<S> {
    folders: HashMap<MessageClass, EventFolderFn<S>>,
    validate: ValidateFn<S>,
    listener: Arc<dyn TransactionListener<S>>,
}

impl<S: Clone + Send + Sync + 'static> ProjectionRepository<S> {
    pub fn new() -> Self {
        Self {
            folders: HashMap::new(),
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

    pub fn register_event_folder<P: Payload>(
        &mut self,
        folder: impl Fn(&mut Builder<'_, S>, &Envelope) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Result<(), Error> {
        let class = MessageClass::event::<P>();
        if self.folders.contains_key(&class) {
            return Err(Error::DuplicateHandler { class: class.to_string() });
        }
        self.folders.insert(class, Arc::new(folder));
        Ok(())
    }

    /// Fold one event into the view, or return `NoHandlerRegistered` if this
    /// projection is not subscribed to the event's class (catch-up, C9,
    /// skips such events rather than treating them as an error).
    pub async fn apply_event(&self, entity: &mut Entity<S>, event: Envelope, entity_label: impl Into<String>) -> Result<(), Error> {
        let folder = self
            .folders
            .get(&event.class)
            .ok_or_else(|| Error::NoHandlerRegistered { class: event.class.to_string() })?
            .clone();

        let mut tx = Transaction::start(entity_label, entity.state.clone(), entity.version, entity.flags);
        let event_for_step = event.clone();
        let phase_result = tx
            .apply_phase(
                event.clone(),
                None,
                self.listener.as_ref(),
                move |b| folder(b, &event_for_step),
                self.validate.as_ref(),
            )
            .await;

        if phase_result.is_err() {
            return Err(Error::HandlerFailedUnexpectedly {
                signal: event.id,
                source: anyhow::anyhow!("projection folder for {} failed; transaction aborted", event.class),
            });
        }

        let commit = tx.commit(EntityKind::Projection.default_version_strategy(), self.listener.as_ref(), Utc::now()).await?;
        entity.state = commit.state;
        entity.version = commit.version;
        entity.flags = commit.flags;
        Ok(())
    }

    /// `true` if this projection has a folder for `class` (used by catch-up
    /// to silently skip events it does not subscribe to).
    pub fn subscribes_to(&self, class: &MessageClass) -> bool {
        self.folders.contains_key(class)
    }
}

impl<S: Clone + Send + Sync + 'static> Default for ProjectionRepository<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{Context, ProducerId, Version};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct NumberAdded(i64);
    impl Payload for NumberAdded {
        const TYPE_URL: &'static str = "test.NumberAdded";
    }

    #[tokio::test]
    async fn folding_an_event_auto_increments_version() {
        let mut repo = ProjectionRepository::<i64>::new();
        repo.register_event_folder::<NumberAdded>(|b, ev| {
            let payload: NumberAdded = ev.decode()?;
            *b.state += payload.0;
            Ok(())
        })
        .unwrap();

        let mut entity = Entity::<i64>::new();
        let event = Envelope::event(&NumberAdded(4), Context::root("actor"), ProducerId::new("p"), Version::new(9, Utc::now()));
        repo.apply_event(&mut entity, event, "view-1").await.unwrap();

        assert_eq!(entity.state, 4);
        assert_eq!(entity.version.number, 1);
    }

    #[tokio::test]
    async fn unsubscribed_event_class_is_reported() {
        let repo = ProjectionRepository::<i64>::new();
        assert!(!repo.subscribes_to(&MessageClass::event::<NumberAdded>()));
    }
}
