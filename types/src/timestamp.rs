//! Millisecond-precision UTC instants.

use std::fmt::{self, Display, Formatter};

/// A UTC instant with millisecond precision, stored as a signed millisecond
/// count relative to the Unix epoch.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from a millisecond count.
    pub const fn from_millis(millis: i64) -> Self {
        Timestamp(millis)
    }

    /// The millisecond count.
    pub const fn millis(self) -> i64 {
        self.0
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
