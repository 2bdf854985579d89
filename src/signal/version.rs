use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A monotonically increasing stamp applied to an entity at commit time.
///
/// `number` is strictly increasing within one producer (§3 invariant); the
/// timestamp is advisory and exists for observability and tie-breaking in
/// storage, not for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub number: u64,
    pub timestamp: DateTime<Utc>,
}

impl Version {
    pub fn new(number: u64, timestamp: DateTime<Utc>) -> Self {
        Self { number, timestamp }
    }

    /// The version an entity has before it has ever been committed.
    pub fn none() -> Self {
        Self {
            number: 0,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// `true` if `other` is a valid successor of `self`, i.e. `other.number > self.number`.
    pub fn precedes(&self, other: &Version) -> bool {
        other.number > self.number
    }
}

/// How an entity's `Version` is advanced at commit time (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionStrategy {
    /// Stamp `prev.number + 1` and `now()`. Used by projections and process
    /// managers, whose version has no intrinsic relationship to the signal
    /// that produced it.
    AutoIncrement,
    /// Copy the version carried by the applied event. Used by aggregates,
    /// whose version is the event stream's own sequence number.
    FromEvent,
}

impl VersionStrategy {
    /// Compute the next version given the previous one and, for
    /// `FromEvent`, the version carried by the event being applied.
    ///
    /// `AutoIncrement` always advances. `FromEvent` copies the event's own
    /// version and enforces monotonicity (§3 invariant, §8 P4): an event
    /// version that does not strictly advance `prev` fails the commit rather
    /// than being repaired, since for an aggregate the version IS the event
    /// stream's sequence number — the §9 "advisory" allowance for a
    /// conflicting version is scoped to `AutoIncrement` only.
    pub fn next(&self, producer: impl Into<String>, prev: Version, event_version: Option<Version>, now: DateTime<Utc>) -> Result<Version, Error> {
        match self {
            VersionStrategy::AutoIncrement => Ok(Version::new(prev.number + 1, now)),
            VersionStrategy::FromEvent => match event_version {
                Some(v) if prev.precedes(&v) => Ok(v),
                Some(v) => Err(Error::VersionNotMonotonic {
                    producer: producer.into(),
                    prev: prev.number,
                    next: v.number,
                }),
                None => Ok(Version::new(prev.number + 1, now)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_increment_always_advances_by_one() {
        let prev = Version::new(5, Utc::now());
        let next = VersionStrategy::AutoIncrement.next("p", prev, None, Utc::now()).unwrap();
        assert_eq!(next.number, 6);
    }

    #[test]
    fn from_event_copies_a_valid_successor() {
        let prev = Version::new(5, Utc::now());
        let event_version = Version::new(9, Utc::now());
        let next = VersionStrategy::FromEvent.next("p", prev, Some(event_version), Utc::now()).unwrap();
        assert_eq!(next.number, 9);
    }

    #[test]
    fn from_event_rejects_a_non_advancing_version() {
        let prev = Version::new(5, Utc::now());
        let stale = Version::new(3, Utc::now());
        let err = VersionStrategy::FromEvent.next("p", prev, Some(stale), Utc::now()).unwrap_err();
        assert!(matches!(err, Error::VersionNotMonotonic { prev: 5, next: 3, .. }));
    }
}
