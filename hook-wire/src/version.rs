//! Protocol versioning.
//!
//! Peers exchange their semantic version during registration. The broker's
//! reply carries its own version; a client rejects the connection on strict
//! inequality.

use crate::WireError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A semantic version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Major version (breaking changes).
    pub major: u16,
    /// Minor version (new features).
    pub minor: u16,
    /// Patch version (bug fixes).
    pub patch: u16,
}

impl Version {
    /// Creates a new version.
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for Version {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '.');
        let mut next = || {
            parts
                .next()
                .and_then(|p| p.parse::<u16>().ok())
                .ok_or_else(|| WireError::InvalidVersion(s.to_string()))
        };
        Ok(Self {
            major: next()?,
            minor: next()?,
            patch: next()?,
        })
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parse_and_display() {
        let v: Version = "1.2.3".parse().unwrap();
        assert_eq!(v, Version::new(1, 2, 3));
        assert_eq!(v.to_string(), "1.2.3");
    }

    #[test]
    fn version_parse_rejects_garbage() {
        assert!("1.2".parse::<Version>().is_err());
        assert!("1.2.x".parse::<Version>().is_err());
        assert!("".parse::<Version>().is_err());
    }

    #[test]
    fn strict_inequality_distinguishes_patch_levels() {
        let ours = Version::new(1, 2, 3);
        let theirs = Version::new(1, 2, 4);
        assert_ne!(ours, theirs);
    }
}
