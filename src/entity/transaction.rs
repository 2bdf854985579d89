//! The entity transaction lifecycle (§4.5): `start` → per-phase
//! before/apply/validate/after → `before_commit` → atomic commit, or abort
//! on the first failed phase with nothing persisted and every produced
//! signal discarded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::signal::{Envelope, Version, VersionStrategy};

use super::lifecycle::LifecycleFlags;

/// A mutable view into an in-flight transaction's working state, handed to
/// event appliers and command handlers instead of `&mut S` directly so they
/// can also flip lifecycle bits (§4.5: "transaction... may also update the
/// entity's lifecycle_flags").
pub struct Builder<'a, S> {
    pub state: &'a mut S,
    pub flags: &'a mut LifecycleFlags,
}

/// One step applied within a transaction: the signal that drove it, and
/// (for event-sourced phases) the version that signal carried.
struct Phase {
    signal: Envelope,
    event_version: Option<Version>,
}

/// What a listener's `on_phase_fail` hook decides should happen to the
/// error (§4.5: "a configurable listener policy decides whether the error
/// is rethrown to the repository").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseFailAction {
    /// Propagate the error to the repository as-is (the default).
    Propagate,
    /// Swallow the error; the transaction still aborts (nothing commits),
    /// but the repository reports success rather than failure.
    Suppress,
}

/// Observes a transaction's phases and commit, and may redirect a phase
/// failure (§4.5).
#[async_trait]
pub trait TransactionListener<S>: Send + Sync {
    async fn on_before_phase(&self, _signal: &Envelope) {}
    async fn on_after_phase(&self, _signal: &Envelope) {}
    async fn on_before_commit(&self, _state: &S, _version: Version, _flags: LifecycleFlags) {}
    async fn on_phase_fail(&self, _signal: &Envelope, _error: &Error) -> PhaseFailAction {
        PhaseFailAction::Propagate
    }
}

/// The default listener: every hook is a no-op, every failure propagates.
pub struct NoOpListener;

#[async_trait]
impl<S: Send + Sync> TransactionListener<S> for NoOpListener {}

/// A listener that logs every phase transition and insists failures always
/// propagate, even if a future listener on the same entity tries to
/// suppress them. Intended as the outermost listener in a composed chain.
pub struct PropagationRequiredListener;

#[async_trait]
impl<S: Send + Sync> TransactionListener<S> for PropagationRequiredListener {
    async fn on_before_phase(&self, signal: &Envelope) {
        tracing::debug!(signal = %signal.id, class = %signal.class, "phase starting");
    }

    async fn on_phase_fail(&self, signal: &Envelope, error: &Error) -> PhaseFailAction {
        tracing::warn!(signal = %signal.id, %error, "phase failed; propagating");
        PhaseFailAction::Propagate
    }
}

/// The result of a successfully committed transaction, handed back to the
/// repository to persist and to post `events` onward.
pub struct Commit<S> {
    pub state: S,
    pub version: Version,
    pub flags: LifecycleFlags,
    pub events: Vec<Envelope>,
}

/// One entity's in-flight transaction. `S` is the entity's state type.
///
/// Phases apply in order against a working copy (`builder`); `state0` is
/// kept untouched so that if any phase fails, the caller simply never calls
/// `commit` and `state0` is what remains persisted — the failed
/// transaction's mutations and produced signals are dropped along with it.
pub struct Transaction<S> {
    entity_id_label: String,
    version0: Version,
    builder_state: S,
    builder_flags: LifecycleFlags,
    phases: Vec<Phase>,
    produced: Vec<Envelope>,
}

impl<S> Transaction<S> {
    pub fn start(entity_id_label: impl Into<String>, state0: S, version0: Version, flags0: LifecycleFlags) -> Self {
        Self {
            entity_id_label: entity_id_label.into(),
            version0,
            builder_state: state0,
            builder_flags: flags0,
            phases: Vec::new(),
            produced: Vec::new(),
        }
    }

    fn builder(&mut self) -> Builder<'_, S> {
        Builder {
            state: &mut self.builder_state,
            flags: &mut self.builder_flags,
        }
    }

    /// Apply one phase: run `step` against the working builder, validate
    /// the result, and record the phase on success. On failure the listener
    /// is notified and the error (or `Ok(())` if suppressed) is returned;
    /// callers must not call `commit` after a suppressed or propagated
    /// failure.
    pub async fn apply_phase(
        &mut self,
        signal: Envelope,
        event_version: Option<Version>,
        listener: &(dyn TransactionListener<S>),
        step: impl FnOnce(&mut Builder<'_, S>) -> Result<(), Error>,
        validate: &dyn Fn(&S) -> Result<(), Error>,
    ) -> Result<(), PhaseFailAction> {
        listener.on_before_phase(&signal).await;

        let step_result = step(&mut self.builder());
        let result = step_result.and_then(|_| validate(&self.builder_state));

        match result {
            Ok(()) => {
                listener.on_after_phase(&signal).await;
                self.phases.push(Phase { signal, event_version });
                Ok(())
            }
            Err(e) => {
                let action = listener.on_phase_fail(&signal, &e).await;
                tracing::warn!(
                    entity = %self.entity_id_label,
                    signal = %signal.id,
                    error = %e,
                    "transaction phase failed; aborting without committing"
                );
                Err(action)
            }
        }
    }

    /// Stage a follow-up signal produced by a phase. Discarded along with
    /// everything else if the transaction is never committed.
    pub fn record_produced(&mut self, envelope: Envelope) {
        self.produced.push(envelope);
    }

    /// Finalize the transaction: compute the new version via `strategy`,
    /// notify `on_before_commit`, and return the committed state. The
    /// caller is responsible for atomically persisting `Commit::state` /
    /// `version` / `flags` and then posting `Commit::events`.
    ///
    /// Fails without persisting anything if `strategy` rejects the computed
    /// version (§3 monotonicity invariant) — same as a failed phase, the
    /// transaction is simply dropped by the caller.
    pub async fn commit(
        self,
        strategy: VersionStrategy,
        listener: &(dyn TransactionListener<S>),
        now: DateTime<Utc>,
    ) -> Result<Commit<S>, Error> {
        let event_version = self.phases.iter().rev().find_map(|p| p.event_version);
        let version = strategy.next(self.entity_id_label.clone(), self.version0, event_version, now)?;
        listener.on_before_commit(&self.builder_state, version, self.builder_flags).await;
        Ok(Commit {
            state: self.builder_state,
            version,
            flags: self.builder_flags,
            events: self.produced,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{Context, Payload, ProducerId};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct Counted(i64);
    impl Payload for Counted {
        const TYPE_URL: &'static str = "test.Counted";
    }

    fn no_validate(_: &i64) -> Result<(), Error> {
        Ok(())
    }

    #[tokio::test]
    async fn successful_phases_commit_with_from_event_version() {
        let mut tx = Transaction::start("counter-1", 0i64, Version::none(), LifecycleFlags::default());
        let listener = NoOpListener;
        let event = Envelope::event(&Counted(5), Context::root("actor"), ProducerId::new("p"), Version::new(7, Utc::now()));

        tx.apply_phase(
            event,
            Some(Version::new(7, Utc::now())),
            &listener,
            |b| {
                *b.state += 5;
                Ok(())
            },
            &no_validate,
        )
        .await
        .unwrap();

        let commit = tx.commit(VersionStrategy::FromEvent, &listener, Utc::now()).await.unwrap();
        assert_eq!(commit.state, 5);
        assert_eq!(commit.version.number, 7);
    }

    #[tokio::test]
    async fn failed_phase_is_never_committed() {
        let mut tx = Transaction::start("counter-1", 10i64, Version::new(1, Utc::now()), LifecycleFlags::default());
        let listener = NoOpListener;
        let event = Envelope::event(&Counted(1), Context::root("actor"), ProducerId::new("p"), Version::new(2, Utc::now()));

        let result = tx
            .apply_phase(
                event,
                Some(Version::new(2, Utc::now())),
                &listener,
                |_b| Err(Error::ConstraintViolated { entity: "counter-1".into(), reason: "boom".into() }),
                &no_validate,
            )
            .await;

        assert_eq!(result.unwrap_err(), PhaseFailAction::Propagate);
        // The transaction is simply dropped by the caller here; state0 (10)
        // remains whatever the repository already persisted.
    }

    #[tokio::test]
    async fn commit_fails_on_a_non_advancing_event_version() {
        let mut tx = Transaction::start("counter-1", 0i64, Version::new(5, Utc::now()), LifecycleFlags::default());
        let listener = NoOpListener;
        let event = Envelope::event(&Counted(1), Context::root("actor"), ProducerId::new("p"), Version::new(3, Utc::now()));

        tx.apply_phase(
            event,
            Some(Version::new(3, Utc::now())),
            &listener,
            |b| {
                *b.state += 1;
                Ok(())
            },
            &no_validate,
        )
        .await
        .unwrap();

        let err = tx.commit(VersionStrategy::FromEvent, &listener, Utc::now()).await.unwrap_err();
        assert!(matches!(err, Error::VersionNotMonotonic { prev: 5, next: 3, .. }));
    }
}
