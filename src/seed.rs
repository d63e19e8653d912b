//! Crawl targets: a package name plus an optional pre-release predicate.

use regex::Regex;
use std::fmt;
use tracing::warn;

/// A crawl target provided by the operator or discovered as a dependency.
///
/// Serialized as `name` or `name|pattern`, where `pattern` is a regular
/// expression deciding which pre-release tags are acceptable for this
/// seed. The serialized form (the *fingerprint*) is what the crawl state
/// and the state file key on: two seeds with the same name but different
/// predicates are distinct crawl targets.
#[derive(Debug, Clone)]
pub struct SeedDescriptor {
    name: String,
    allowed_pre_release: Option<Regex>,
    fingerprint: String,
}

impl SeedDescriptor {
    /// Parses a descriptor from its `name` or `name|pattern` form.
    ///
    /// A pattern that fails to compile degrades to "no predicate"; a
    /// warning is emitted so a seed that silently downloads no
    /// pre-releases can be diagnosed.
    pub fn parse(input: &str) -> Self {
        let (name, pattern) = match input.split_once('|') {
            Some((name, pattern)) if !pattern.is_empty() => (name, Some(pattern)),
            Some((name, _)) => (name, None),
            None => (input, None),
        };

        let allowed_pre_release = pattern.and_then(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(err) => {
                warn!("Ignoring invalid pre-release pattern {:?} for {}: {}", p, name, err);
                None
            }
        });

        let fingerprint = match &allowed_pre_release {
            Some(re) => format!("{}|{}", name, re.as_str()),
            None => name.to_string(),
        };

        SeedDescriptor {
            name: name.to_string(),
            allowed_pre_release,
            fingerprint,
        }
    }

    /// The package name (without any predicate).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The stable `name` / `name|pattern` form used as the dedup key.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Returns true if the descriptor's predicate accepts the given
    /// pre-release tag. Without a predicate no tag is accepted.
    pub fn matches_pre_release(&self, tag: &str) -> bool {
        match &self.allowed_pre_release {
            Some(re) => re.is_match(tag),
            None => false,
        }
    }
}

impl fmt::Display for SeedDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint)
    }
}
