//! Regular expression values.

/// A regular expression as a pattern plus a flag string.
///
/// The pattern is carried verbatim; it is never compiled or validated.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Regexp {
    pattern: String,
    flags: String,
}

impl Regexp {
    /// Creates a regular expression value.
    pub fn new(pattern: impl Into<String>, flags: impl Into<String>) -> Self {
        Regexp {
            pattern: pattern.into(),
            flags: flags.into(),
        }
    }

    /// The pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The flag string.
    pub fn flags(&self) -> &str {
        &self.flags
    }
}
