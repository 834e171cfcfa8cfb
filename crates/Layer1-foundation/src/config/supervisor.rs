//! Supervisor Config - background job settings
//!
//! Grace periods, drain budget, retention policy and the per-category
//! commands that collaborators launch by name.
//!
//! Each config file is a sparse layer: only the keys it names override the
//! layer below, so a project file can restore a value the global file changed.

use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Config file name
pub const SUPERVISOR_CONFIG_FILE: &str = "supervisor.json";

/// Category name for data-generation jobs
pub const GENERATION_CATEGORY: &str = "generation";

/// Category name for training jobs
pub const TRAINING_CATEGORY: &str = "training";

const DEFAULT_GRACE_PERIOD_SECS: u64 = 5;
const GENERATION_GRACE_PERIOD_SECS: u64 = 3;
const TRAINING_GRACE_PERIOD_SECS: u64 = 5;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_MAX_DRAIN_BYTES: usize = 1024 * 1024;
const DEFAULT_CANCEL_MARKER: &str = "\n[task interrupted by user]\n";

// ============================================================================
// Supervisor Config
// ============================================================================

/// Effective supervisor settings
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorConfig {
    /// Grace period for categories that do not set their own
    pub default_grace_period_secs: u64,

    /// Wait granularity inside cancel, and the CLI status loop interval
    pub poll_interval_ms: u64,

    /// Per-poll read budget for process output; 0 means unbounded
    pub max_drain_bytes: usize,

    /// Drop the previous terminal task of a category when a new one registers
    pub evict_superseded: bool,

    /// Appended to a task's output when the user cancels it
    pub cancel_marker: String,

    /// Known job categories
    pub categories: BTreeMap<String, CategoryConfig>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            default_grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_drain_bytes: DEFAULT_MAX_DRAIN_BYTES,
            evict_superseded: true,
            cancel_marker: DEFAULT_CANCEL_MARKER.to_string(),
            categories: default_categories(),
        }
    }
}

/// One config file; absent keys leave the layer below untouched
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ConfigLayer {
    default_grace_period_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
    max_drain_bytes: Option<usize>,
    evict_superseded: Option<bool>,
    cancel_marker: Option<String>,
    #[serde(default)]
    categories: BTreeMap<String, CategoryConfig>,
}

impl SupervisorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// Defaults, then the global file, then the project file
    pub fn load() -> Result<Self> {
        let mut stores: Vec<JsonStore> = JsonStore::global().into_iter().collect();
        stores.push(JsonStore::current_project()?);
        Self::load_layered(&stores)
    }

    /// Defaults overlaid with each store's config file in order; later stores win
    pub fn load_layered(stores: &[JsonStore]) -> Result<Self> {
        let mut config = Self::default();
        for store in stores {
            if let Some(layer) = store.read::<ConfigLayer>(SUPERVISOR_CONFIG_FILE)? {
                config.apply(layer).map_err(|reason| {
                    Error::Config(format!(
                        "{}: {}",
                        store.file_path(SUPERVISOR_CONFIG_FILE).display(),
                        reason
                    ))
                })?;
            }
        }
        Ok(config)
    }

    fn apply(&mut self, layer: ConfigLayer) -> std::result::Result<(), String> {
        if layer.max_drain_bytes == Some(0) {
            return Err("maxDrainBytes must be greater than zero".to_string());
        }

        if let Some(secs) = layer.default_grace_period_secs {
            self.default_grace_period_secs = secs;
        }
        if let Some(ms) = layer.poll_interval_ms {
            self.poll_interval_ms = ms;
        }
        if let Some(bytes) = layer.max_drain_bytes {
            self.max_drain_bytes = bytes;
        }
        if let Some(evict) = layer.evict_superseded {
            self.evict_superseded = evict;
        }
        if let Some(marker) = layer.cancel_marker {
            self.cancel_marker = marker;
        }

        for (name, category) in layer.categories {
            match self.categories.get_mut(&name) {
                Some(existing) => existing.merge(category),
                None => {
                    self.categories.insert(name, category);
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn category(&self, name: &str) -> Option<&CategoryConfig> {
        self.categories.get(name)
    }

    /// Grace period between the graceful and the forceful signal
    pub fn grace_period_for(&self, category: &str) -> Duration {
        let secs = self
            .categories
            .get(category)
            .and_then(|c| c.grace_period_secs)
            .unwrap_or(self.default_grace_period_secs);
        Duration::from_secs(secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Read budget for one poll; `None` reads until the pipe is empty
    pub fn drain_limit(&self) -> Option<usize> {
        (self.max_drain_bytes > 0).then_some(self.max_drain_bytes)
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn with_category(mut self, name: impl Into<String>, category: CategoryConfig) -> Self {
        self.categories.insert(name.into(), category);
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_drain_bytes(mut self, bytes: usize) -> Self {
        self.max_drain_bytes = bytes;
        self
    }

    pub fn with_evict_superseded(mut self, evict: bool) -> Self {
        self.evict_superseded = evict;
        self
    }
}

// ============================================================================
// Category Config
// ============================================================================

/// One job category: its grace period and, optionally, the command it runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CategoryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_secs: Option<u64>,

    /// Executable launched by `start_configured`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Overlaid on the inherited environment
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl CategoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grace_period_secs(mut self, secs: u64) -> Self {
        self.grace_period_secs = Some(secs);
        self
    }

    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    fn merge(&mut self, other: CategoryConfig) {
        if other.grace_period_secs.is_some() {
            self.grace_period_secs = other.grace_period_secs;
        }
        if other.program.is_some() {
            self.program = other.program;
            self.args = other.args;
        }
        if other.working_dir.is_some() {
            self.working_dir = other.working_dir;
        }
        self.env.extend(other.env);
    }
}

fn default_categories() -> BTreeMap<String, CategoryConfig> {
    let mut categories = BTreeMap::new();
    categories.insert(
        GENERATION_CATEGORY.to_string(),
        CategoryConfig::new().grace_period_secs(GENERATION_GRACE_PERIOD_SECS),
    );
    categories.insert(
        TRAINING_CATEGORY.to_string(),
        CategoryConfig::new().grace_period_secs(TRAINING_GRACE_PERIOD_SECS),
    );
    categories
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_layer(dir: &std::path::Path, json: &str) -> JsonStore {
        std::fs::write(dir.join(SUPERVISOR_CONFIG_FILE), json).unwrap();
        JsonStore::new(dir)
    }

    #[test]
    fn test_default_grace_periods() {
        let config = SupervisorConfig::default();
        assert_eq!(
            config.grace_period_for(GENERATION_CATEGORY),
            Duration::from_secs(3)
        );
        assert_eq!(
            config.grace_period_for(TRAINING_CATEGORY),
            Duration::from_secs(5)
        );
        assert_eq!(config.grace_period_for("other"), Duration::from_secs(5));
    }

    #[test]
    fn test_missing_files_give_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let stores = [JsonStore::new(dir.path()), JsonStore::project(dir.path())];
        assert_eq!(
            SupervisorConfig::load_layered(&stores).unwrap(),
            SupervisorConfig::default()
        );
    }

    #[test]
    fn test_sparse_layer_keeps_other_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_layer(dir.path(), r#"{ "pollIntervalMs": 20 }"#);

        let config = SupervisorConfig::load_layered(&[store]).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(20));
        assert_eq!(config.max_drain_bytes, DEFAULT_MAX_DRAIN_BYTES);
        assert!(config.evict_superseded);
        assert!(config.category(GENERATION_CATEGORY).is_some());
    }

    #[test]
    fn test_later_layer_overrides_and_extends() {
        let global = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let stores = [
            write_layer(
                global.path(),
                r#"{
                    "defaultGracePeriodSecs": 9,
                    "evictSuperseded": false,
                    "categories": {
                        "generation": { "program": "/opt/gen.sh", "args": ["--fast"] },
                        "export": { "gracePeriodSecs": 1 }
                    }
                }"#,
            ),
            write_layer(
                project.path(),
                r#"{ "categories": { "training": { "env": { "CUDA_VISIBLE_DEVICES": "0" } } } }"#,
            ),
        ];

        let config = SupervisorConfig::load_layered(&stores).unwrap();
        assert_eq!(config.default_grace_period_secs, 9);
        assert!(!config.evict_superseded);

        let generation = config.category(GENERATION_CATEGORY).unwrap();
        assert_eq!(generation.program.as_deref(), Some("/opt/gen.sh"));
        assert_eq!(generation.args, vec!["--fast".to_string()]);
        // grace period survives because the overlay entry left it unset
        assert_eq!(generation.grace_period_secs, Some(3));

        assert_eq!(config.grace_period_for("export"), Duration::from_secs(1));
        assert_eq!(
            config.category(TRAINING_CATEGORY).unwrap().env.get("CUDA_VISIBLE_DEVICES"),
            Some(&"0".to_string())
        );
        assert_eq!(config.grace_period_for(TRAINING_CATEGORY), Duration::from_secs(5));
    }

    #[test]
    fn test_project_can_restore_default_values() {
        let global = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let stores = [
            write_layer(
                global.path(),
                r#"{ "defaultGracePeriodSecs": 10, "evictSuperseded": false }"#,
            ),
            write_layer(
                project.path(),
                r#"{ "defaultGracePeriodSecs": 5, "evictSuperseded": true }"#,
            ),
        ];

        let config = SupervisorConfig::load_layered(&stores).unwrap();
        assert_eq!(config.default_grace_period_secs, 5);
        assert!(config.evict_superseded);
    }

    #[test]
    fn test_zero_drain_budget_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_layer(dir.path(), r#"{ "maxDrainBytes": 0 }"#);

        match SupervisorConfig::load_layered(&[store]) {
            Err(Error::Config(message)) => assert!(message.contains("maxDrainBytes")),
            other => panic!("expected a config error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_layer(dir.path(), r#"{ "gracePeriod": 3 }"#);
        assert!(matches!(
            SupervisorConfig::load_layered(&[store]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_drain_limit() {
        assert_eq!(
            SupervisorConfig::default().drain_limit(),
            Some(DEFAULT_MAX_DRAIN_BYTES)
        );
        assert_eq!(
            SupervisorConfig::default()
                .with_max_drain_bytes(0)
                .drain_limit(),
            None
        );
    }
}
