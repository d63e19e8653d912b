//! Seed-list readers: plain text files and dependency manifests.

use crate::error::MirrorError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Reads a seed-list file: one package name per line, `#` comment lines
/// and blank lines skipped. Entries may carry a pre-release predicate
/// (`name|pattern`).
pub fn read_seed_file(path: impl AsRef<Path>) -> Result<Vec<String>, MirrorError> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// The dependency blocks of a `package.json` manifest.
#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    dependencies: HashMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: HashMap<String, String>,
    #[serde(default, rename = "peerDependencies")]
    peer_dependencies: HashMap<String, String>,
}

/// Collects package names from a manifest's `dependencies`,
/// `devDependencies`, and `peerDependencies` blocks. The declared
/// version ranges are ignored: the engine enumerates published
/// versions, it does not solve ranges.
pub fn read_manifest(path: impl AsRef<Path>) -> Result<Vec<String>, MirrorError> {
    let content = std::fs::read_to_string(path)?;
    let manifest: Manifest = serde_json::from_str(&content)?;

    let mut names: Vec<String> = manifest
        .dependencies
        .into_keys()
        .chain(manifest.dev_dependencies.into_keys())
        .chain(manifest.peer_dependencies.into_keys())
        .collect();
    names.sort();
    names.dedup();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn seed_file_skips_comments_and_blanks() {
        let file = write_temp("# mirror these\nlodash\n\n  express  \nfoo|^alpha\n");
        let seeds = read_seed_file(file.path()).unwrap();
        assert_eq!(seeds, vec!["lodash", "express", "foo|^alpha"]);
    }

    #[test]
    fn missing_seed_file_is_an_error() {
        assert!(read_seed_file("/nonexistent/seeds.txt").is_err());
    }

    #[test]
    fn manifest_collects_all_dependency_blocks() {
        let file = write_temp(
            r#"{
                "name": "app",
                "dependencies": {"express": "^4.0.0", "lodash": "*"},
                "devDependencies": {"jest": "^29.0.0"},
                "peerDependencies": {"react": ">=17"}
            }"#,
        );
        let seeds = read_manifest(file.path()).unwrap();
        assert_eq!(seeds, vec!["express", "jest", "lodash", "react"]);
    }

    #[test]
    fn manifest_without_dependency_blocks_is_empty() {
        let file = write_temp(r#"{"name": "app", "version": "1.0.0"}"#);
        assert!(read_manifest(file.path()).unwrap().is_empty());
    }

    #[test]
    fn malformed_manifest_is_an_error() {
        let file = write_temp("{broken");
        assert!(read_manifest(file.path()).is_err());
    }
}
