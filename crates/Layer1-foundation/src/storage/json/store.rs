//! Config directories holding JSON documents
//!
//! Overseer reads its layered configuration from two of these: the user's
//! config directory and the project's `.overseer/`. The files are written
//! by hand, so the store only reads.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Directory name under the platform config directory
pub const APP_DIR: &str = "overseer";

/// Project-local configuration directory
pub const PROJECT_DIR: &str = ".overseer";

/// A directory of JSON documents
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<config_dir>/overseer/`; `None` on platforms without a config dir
    pub fn global() -> Option<Self> {
        dirs::config_dir().map(|dir| Self::new(dir.join(APP_DIR)))
    }

    /// `<root>/.overseer/`
    pub fn project(root: impl Into<PathBuf>) -> Self {
        Self::new(root.into().join(PROJECT_DIR))
    }

    pub fn current_project() -> Result<Self> {
        Ok(Self::project(std::env::current_dir()?))
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Parse `name`, or `Ok(None)` when the file does not exist.
    ///
    /// Unparsable content is a `Config` error naming the file.
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.file_path(name);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::path::Path;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn test_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("sample.json"),
            r#"{ "name": "generation", "count": 3 }"#,
        )
        .unwrap();
        let store = JsonStore::new(dir.path());

        let loaded: Option<Sample> = store.read("sample.json").unwrap();
        assert_eq!(
            loaded,
            Some(Sample {
                name: "generation".to_string(),
                count: 3
            })
        );
    }

    #[test]
    fn test_missing_file_and_dir() {
        let dir = tempfile::tempdir().unwrap();

        let store = JsonStore::new(dir.path());
        assert!(store.read::<Sample>("missing.json").unwrap().is_none());

        let store = JsonStore::new(dir.path().join("not-created"));
        assert!(store.read::<Sample>("missing.json").unwrap().is_none());
    }

    #[test]
    fn test_malformed_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        let store = JsonStore::new(dir.path());

        match store.read::<Sample>("bad.json") {
            Err(Error::Config(message)) => assert!(message.contains("bad.json")),
            other => panic!("expected a config error, got {:?}", other),
        }
    }

    #[test]
    fn test_project_dir() {
        let store = JsonStore::project("/srv/app");
        assert_eq!(
            store.file_path("supervisor.json"),
            Path::new("/srv/app/.overseer/supervisor.json")
        );
    }
}
