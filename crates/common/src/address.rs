use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Separator used when rendering or parsing an address as a single string
pub const SEPARATOR: char = '/';

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address segment {0} is empty")]
    EmptySegment(usize),
}

/// Location of a bucket within the namespace tree.
///
/// An address is an ordered list of non-empty path segments,
///  e.g. `peer` or `pri/<identity>/addresses`. The empty
///  address denotes the root bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Address(Vec<String>);

impl Address {
    /// The root of the namespace
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build an address from its segments, rejecting empty ones
    pub fn new<I, S>(segments: I) -> Result<Self, AddressError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        Self::try_from(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A new address one level below this one
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    /// Split into (parent, last segment). `None` for the root.
    pub fn split_last(&self) -> Option<(Address, &str)> {
        let (last, parent) = self.0.split_last()?;
        Some((Address(parent.to_vec()), last.as_str()))
    }
}

impl TryFrom<Vec<String>> for Address {
    type Error = AddressError;

    fn try_from(segments: Vec<String>) -> Result<Self, Self::Error> {
        if let Some(index) = segments.iter().position(|s| s.is_empty()) {
            return Err(AddressError::EmptySegment(index));
        }
        Ok(Self(segments))
    }
}

impl From<Address> for Vec<String> {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl FromStr for Address {
    type Err = AddressError;

    /// Parse `a/b/c`. Leading and trailing separators are ignored,
    ///  so `/peer/` and `peer` are the same address.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim_matches(SEPARATOR);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        Self::new(trimmed.split(SEPARATOR))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "{}", SEPARATOR);
        }
        write!(f, "{}", self.0.join(&SEPARATOR.to_string()))
    }
}
