//! URL values.

use std::fmt::{self, Display, Formatter};

/// A URL carried in string form.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Url(String);

impl Url {
    /// Creates a URL value.
    pub fn new(url: impl Into<String>) -> Self {
        Url(url.into())
    }

    /// The string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Url {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
