//! Common types used throughout dropmedia.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A key addressing one media object, independent of the backend.
///
/// Keys look like absolute paths, for example
/// `/media/2014/9/540a3ff0e30ddfb9e60000be-1409957872680.jpg`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MediaPath {
    components: Vec<String>,
}

impl MediaPath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Build a path from components that must be non-empty and free of
    /// separators.
    fn from_components(components: Vec<String>) -> crate::Result<Self> {
        for comp in &components {
            if comp.is_empty() {
                return Err(crate::Error::InvalidInput(
                    "Path component cannot be empty".to_string(),
                ));
            }
            if comp.contains('/') || comp.contains('\\') {
                return Err(crate::Error::InvalidInput(
                    "Path component cannot contain separators".to_string(),
                ));
            }
        }
        Ok(Self { components })
    }

    /// Parse a key string into a MediaPath.
    ///
    /// Uses '/' as separator. Leading and trailing separators are ignored.
    pub fn parse(path: &str) -> crate::Result<Self> {
        let path = path.trim_start_matches('/').trim_end_matches('/');
        if path.is_empty() {
            return Ok(Self::root());
        }

        let components: Vec<String> = path.split('/').map(String::from).collect();
        Self::from_components(components)
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the object name (last component).
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Convert to a string representation.
    pub fn to_string_path(&self) -> String {
        if self.is_root() {
            "/".to_string()
        } else {
            format!("/{}", self.components.join("/"))
        }
    }
}

impl fmt::Display for MediaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_path())
    }
}

impl TryFrom<String> for MediaPath {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<MediaPath> for String {
    fn from(path: MediaPath) -> Self {
        path.to_string_path()
    }
}
