//! Semantic version values as published by the registry.

use crate::error::MirrorError;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static VERSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.(\d+)\.(\d+)(?:-(.*))?$").unwrap());

/// A semantic version: `major.minor.patch` with an optional pre-release tag.
///
/// Versions form a total order. A version carrying a pre-release tag is
/// strictly less than the same triple without one; two pre-release tags
/// on the same triple compare lexicographically.
///
/// # Example
///
/// ```
/// use npmsync::SemVer;
///
/// let stable: SemVer = "1.2.0".parse().unwrap();
/// let alpha: SemVer = "1.2.0-alpha.1".parse().unwrap();
/// assert!(alpha < stable);
/// assert!(alpha.is_pre_release());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// Pre-release tag (the part after `-`), if any.
    pub pre_release: Option<String>,
}

impl SemVer {
    /// Returns true if the version carries a pre-release tag.
    pub fn is_pre_release(&self) -> bool {
        self.pre_release.is_some()
    }
}

impl FromStr for SemVer {
    type Err = MirrorError;

    fn from_str(version: &str) -> Result<Self, Self::Err> {
        let captures = VERSION_REGEX
            .captures(version)
            .ok_or_else(|| MirrorError::InvalidVersion(version.to_string()))?;

        // The three numeric groups are guaranteed digit-only by the regex;
        // parse can still overflow u64 on absurd input.
        let part = |i: usize| -> Result<u64, MirrorError> {
            captures[i]
                .parse::<u64>()
                .map_err(|_| MirrorError::InvalidVersion(version.to_string()))
        };

        Ok(SemVer {
            major: part(1)?,
            minor: part(2)?,
            patch: part(3)?,
            pre_release: captures.get(4).map(|m| m.as_str().to_string()),
        })
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre_release {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.patch.cmp(&other.patch))
            .then_with(|| match (&self.pre_release, &other.pre_release) {
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
                (None, None) => Ordering::Equal,
            })
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> SemVer {
        s.parse().unwrap()
    }

    #[test]
    fn parses_plain_version() {
        let version = v("1.22.333");
        assert_eq!(version.major, 1);
        assert_eq!(version.minor, 22);
        assert_eq!(version.patch, 333);
        assert_eq!(version.pre_release, None);
    }

    #[test]
    fn parses_pre_release_tag() {
        let version = v("2.0.0-beta.3");
        assert_eq!(version.pre_release.as_deref(), Some("beta.3"));
        assert!(version.is_pre_release());
    }

    #[test]
    fn rejects_malformed_versions() {
        for bad in ["", "1", "1.2", "1.2.x", "v1.2.3", "1.2.3.4"] {
            assert!(bad.parse::<SemVer>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn orders_by_triple() {
        assert!(v("2.0.0") > v("1.9.9"));
        assert!(v("1.3.0") > v("1.2.9"));
        assert!(v("1.2.10") > v("1.2.9"));
        assert_eq!(v("1.2.3"), v("1.2.3"));
    }

    #[test]
    fn pre_release_sorts_below_release() {
        assert!(v("1.0.0-alpha") < v("1.0.0"));
        assert!(v("1.0.0") > v("1.0.0-rc.1"));
        // Between pre-releases the tags compare lexicographically.
        assert!(v("1.0.0-alpha") < v("1.0.0-beta"));
    }

    #[test]
    fn display_round_trips() {
        for s in ["0.0.1", "10.20.30", "1.0.0-alpha.beta-x"] {
            assert_eq!(v(s).to_string(), s);
        }
    }
}
