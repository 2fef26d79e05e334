//! Revision identifiers.
//!
//! A revision is made of three parts, compared in this order:
//! - a wall-clock timestamp in milliseconds
//! - the origin id of the node that generated it
//! - a per-origin sequence number
//!
//! Revisions from one [`RevisionClock`] are strictly increasing, and two
//! clocks with different origins can never produce equal revisions.

use crate::error::{Result, VersionError};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// A totally ordered, globally unique version identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Revision {
    timestamp: u64,
    origin: u16,
    sequence: u32,
}

static DEFAULT_CLOCK: OnceLock<RevisionClock> = OnceLock::new();

impl Revision {
    /// Generate a fresh revision from the process-wide clock.
    ///
    /// The process-wide clock is created on first use with a random origin.
    /// Use a dedicated [`RevisionClock`] when the origin must be stable.
    pub fn new() -> Self {
        DEFAULT_CLOCK.get_or_init(RevisionClock::random).next()
    }

    /// Assemble a revision from its parts.
    pub fn from_parts(timestamp: u64, origin: u16, sequence: u32) -> Self {
        Revision {
            timestamp,
            origin,
            sequence,
        }
    }

    /// Milliseconds since the Unix epoch at generation time.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Id of the node that generated this revision.
    pub fn origin(&self) -> u16 {
        self.origin
    }

    /// Sequence number within the origin and timestamp.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Truncated display (sequence part only), handy in logs.
    pub fn short(&self) -> String {
        format!("{:04x}:{:x}", self.origin, self.sequence)
    }
}

impl Default for Revision {
    fn default() -> Self {
        Revision::new()
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:012x}-{:04x}-{:08x}",
            self.timestamp, self.origin, self.sequence
        )
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Revision({})", self)
    }
}

impl FromStr for Revision {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || VersionError::InvalidRevision(s.to_string());

        let mut parts = s.split('-');
        let (Some(timestamp), Some(origin), Some(sequence), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        if timestamp.is_empty() || origin.is_empty() || sequence.is_empty() {
            return Err(invalid());
        }

        Ok(Revision {
            timestamp: u64::from_str_radix(timestamp, 16).map_err(|_| invalid())?,
            origin: u16::from_str_radix(origin, 16).map_err(|_| invalid())?,
            sequence: u32::from_str_radix(sequence, 16).map_err(|_| invalid())?,
        })
    }
}

impl Serialize for Revision {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Revision {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Generates strictly increasing revisions for a single origin.
///
/// If the wall clock stalls or moves backwards, the last timestamp is reused
/// and the sequence is bumped instead.
#[derive(Debug)]
pub struct RevisionClock {
    origin: u16,
    last: Mutex<Option<(u64, u32)>>,
}

impl RevisionClock {
    /// Create a clock for the given origin id.
    pub fn new(origin: u16) -> Self {
        RevisionClock {
            origin,
            last: Mutex::new(None),
        }
    }

    /// Create a clock with a random origin id.
    pub fn random() -> Self {
        Self::new(rand::random())
    }

    /// The origin id stamped on every revision of this clock.
    pub fn origin(&self) -> u16 {
        self.origin
    }

    /// Generate the next revision.
    pub fn next(&self) -> Revision {
        self.next_at(now_millis())
    }

    /// Generate the next revision as if the wall clock read `now`.
    pub fn next_at(&self, now: u64) -> Revision {
        let mut last = self.last.lock();
        let (timestamp, sequence) = match *last {
            Some((timestamp, _)) if now > timestamp => (now, 0),
            Some((timestamp, u32::MAX)) => (timestamp + 1, 0),
            Some((timestamp, sequence)) => (timestamp, sequence + 1),
            None => (now, 0),
        };
        *last = Some((timestamp, sequence));

        Revision {
            timestamp,
            origin: self.origin,
            sequence,
        }
    }
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
