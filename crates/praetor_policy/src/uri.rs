//! Derived registry identifiers.
//!
//! Rules and graphs are keyed by `"{name}:{version}-{release_tag}"`. The string
//! is always derived from its three parts and never set on its own.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// A `{name}:{version}-{release_tag}` identifier.
///
/// `name` and `release_tag` may not contain `:`; `version` may contain neither
/// `:` nor `-`. These restrictions make [`parse`](Self::parse) the exact inverse
/// of [`Display`](fmt::Display).
///
/// ```
/// use praetor_policy::VersionedUri;
///
/// let uri = VersionedUri::new("ip-allowlist", "1.2", "stable").unwrap();
/// assert_eq!(uri.to_string(), "ip-allowlist:1.2-stable");
/// assert_eq!(VersionedUri::parse("ip-allowlist:1.2-stable").unwrap(), uri);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionedUri {
    name: String,
    version: String,
    release_tag: String,
}

/// Identifier of a policy rule.
pub type PolicyRuleUri = VersionedUri;

impl VersionedUri {
    /// Builds a uri from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidUri`] if a part is empty or contains a
    /// reserved separator.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        release_tag: impl Into<String>,
    ) -> Result<Self, PolicyError> {
        let uri = Self {
            name: name.into(),
            version: version.into(),
            release_tag: release_tag.into(),
        };
        uri.check()?;
        Ok(uri)
    }

    /// Parses `"{name}:{version}-{release_tag}"`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidUri`] if the shape does not match.
    pub fn parse(raw: &str) -> Result<Self, PolicyError> {
        let invalid = |reason| PolicyError::InvalidUri {
            uri: raw.to_string(),
            reason,
        };
        let (name, rest) = raw.split_once(':').ok_or_else(|| invalid("missing ':'"))?;
        let (version, release_tag) = rest
            .split_once('-')
            .ok_or_else(|| invalid("missing '-' between version and release tag"))?;
        Self::new(name, version, release_tag)
    }

    fn check(&self) -> Result<(), PolicyError> {
        let invalid = |reason| PolicyError::InvalidUri {
            uri: self.to_string(),
            reason,
        };
        if self.name.is_empty() || self.version.is_empty() || self.release_tag.is_empty() {
            return Err(invalid("name, version and release tag must be non-empty"));
        }
        if self.name.contains(':') || self.release_tag.contains(':') {
            return Err(invalid("':' is reserved"));
        }
        if self.version.contains([':', '-']) {
            return Err(invalid("version may not contain ':' or '-'"));
        }
        Ok(())
    }

    /// The rule or graph name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The version component.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The release tag component.
    #[must_use]
    pub fn release_tag(&self) -> &str {
        &self.release_tag
    }
}

impl fmt::Display for VersionedUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.name, self.version, self.release_tag)
    }
}

impl FromStr for VersionedUri {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionedUri {
    type Error = PolicyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionedUri> for String {
    fn from(uri: VersionedUri) -> Self {
        uri.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_tag_may_contain_dashes() {
        let uri = VersionedUri::parse("funcA:2-rc-1").unwrap();
        assert_eq!(uri.version(), "2");
        assert_eq!(uri.release_tag(), "rc-1");
        assert_eq!(uri.to_string(), "funcA:2-rc-1");
    }

    #[test]
    fn rejects_malformed() {
        for raw in ["noversion", "name:1", ":1-x", "a:b:1-x", "a:-x", "a:1-"] {
            assert!(
                matches!(VersionedUri::parse(raw), Err(PolicyError::InvalidUri { .. })),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn version_with_dash_is_rejected_at_construction() {
        assert!(VersionedUri::new("a", "1-2", "x").is_err());
    }

    #[test]
    fn serializes_as_string() {
        let uri = VersionedUri::new("graph", "1", "prod").unwrap();
        let json = serde_json::to_value(&uri).unwrap();
        assert_eq!(json, serde_json::json!("graph:1-prod"));
        let back: VersionedUri = serde_json::from_value(json).unwrap();
        assert_eq!(back, uri);
    }
}
