//! Entity sub-kinds as a tagged enum (§9 REDESIGN FLAGS: tagged variants
//! instead of a deep Aggregate/ProcessManager/Projection class hierarchy).
//!
//! The "capability interfaces" half of that redesign note is realized as
//! per-message-class closure registries on each repository
//! (`register_event_applier`, `register_command_handler`, ...) rather than
//! as marker traits: a repository's capability to apply a given event class
//! or handle a given command class is data (an entry in its handler map),
//! not a trait a concrete type opts into, since each repository already
//! multiplexes over many classes rather than owning exactly one.
//! `EntityKind` only tags which *shape* of repository (`aggregate`,
//! `process_manager`, `projection`) drives an entity, for diagnostics and
//! for picking a default versioning strategy.

use crate::signal::VersionStrategy;

/// Which of the three repository shapes owns an entity (§1 GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Event-sourced: commands produce events, events fold into state.
    Aggregate,
    /// Reacts to commands/events/rejections, mutates state directly, may
    /// produce follow-up commands.
    ProcessManager,
    /// Folds events into a read-optimized view; produces nothing.
    Projection,
}

impl EntityKind {
    /// The versioning strategy a repository of this kind applies at commit
    /// time by default (§3): aggregates copy the event's own version,
    /// everything else auto-increments.
    pub fn default_version_strategy(self) -> VersionStrategy {
        match self {
            EntityKind::Aggregate => VersionStrategy::FromEvent,
            EntityKind::ProcessManager | EntityKind::Projection => VersionStrategy::AutoIncrement,
        }
    }
}
