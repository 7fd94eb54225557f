use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::backend::KeyValueBackend;
use crate::error::{Result, StoreError};
use crate::local_store::{LocalStore, DEFAULT_BATCH_PADDING};
use crate::log::{LogBackend, LogConfig, SyncMode};
use crate::memory::InMemoryBackend;

/// Which raw backend carries the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Volatile, in-process maps.
    Memory,
    /// Append-only log file in `path`.
    Log { path: PathBuf },
}

/// Store configuration, usually loaded from a TOML file:
///
/// ```toml
/// sync_mode = "every_write"
/// defer_reads = true
///
/// [backend]
/// kind = "log"
/// path = "/var/lib/arbor"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Durability of the log backend. Ignored by the memory backend.
    pub sync_mode: SyncMode,
    /// Run lookups on the tokio blocking pool when the backend does I/O.
    pub defer_reads: bool,
    /// Extra bytes reserved when a single-object write opens its own batch.
    pub batch_padding: usize,
    pub backend: BackendConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::default(),
            defer_reads: false,
            batch_padding: DEFAULT_BATCH_PADDING,
            backend: BackendConfig::Memory,
        }
    }
}

impl StoreConfig {
    /// Configuration for a log backend in `path`, other settings default.
    pub fn log(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendConfig::Log { path: path.into() },
            ..Default::default()
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Read and parse a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Open the configured backend and build a store over it.
    ///
    /// With `defer_reads`, lookups use the tokio runtime the caller is
    /// running in; outside a runtime they complete synchronously.
    pub fn open(&self) -> Result<LocalStore> {
        let backend: Arc<dyn KeyValueBackend> = match &self.backend {
            BackendConfig::Memory => Arc::new(InMemoryBackend::new()),
            BackendConfig::Log { path } => Arc::new(LogBackend::open(
                path,
                LogConfig {
                    sync_mode: self.sync_mode,
                },
            )?),
        };
        debug!(backend = ?self.backend, "opened store backend");

        let mut store = LocalStore::new(backend).with_batch_padding(self.batch_padding);
        if self.defer_reads {
            match Handle::try_current() {
                Ok(handle) => store = store.with_executor(handle),
                Err(_) => warn!("defer_reads is set but no tokio runtime is running"),
            }
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyspace::KeySpace;
    use arbor_types::Hash;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.backend, BackendConfig::Memory);
        assert_eq!(c.sync_mode, SyncMode::OsDefault);
        assert!(!c.defer_reads);
        assert_eq!(c.batch_padding, 64);
    }

    #[test]
    fn parse_log_config() {
        let c = StoreConfig::from_toml_str(
            r#"
            sync_mode = "every_write"
            defer_reads = true

            [backend]
            kind = "log"
            path = "/tmp/arbor"
            "#,
        )
        .unwrap();
        assert_eq!(
            c.backend,
            BackendConfig::Log {
                path: PathBuf::from("/tmp/arbor")
            }
        );
        assert_eq!(c.sync_mode, SyncMode::EveryWrite);
        assert!(c.defer_reads);
        assert_eq!(c.batch_padding, 64);
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(StoreConfig::from_toml_str("").unwrap(), StoreConfig::default());
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = StoreConfig::from_toml_str("sync_mode = \"sometimes\"").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn toml_roundtrip() {
        let c = StoreConfig::log("/data/store");
        let text = toml::to_string(&c).unwrap();
        assert_eq!(StoreConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = StoreConfig::load(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn open_log_store_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("arbor.toml");
        let store_dir = dir.path().join("store");
        std::fs::write(
            &config_path,
            format!(
                "[backend]\nkind = \"log\"\npath = {:?}\n",
                store_dir.display().to_string()
            ),
        )
        .unwrap();

        let store = StoreConfig::load(&config_path).unwrap().open().unwrap();
        let id = Hash::sha1(b"k");
        store.put(KeySpace::ProxyHash, &id, b"v").unwrap();
        assert!(store_dir.join(LogBackend::FILE_NAME).exists());
    }

    #[tokio::test]
    async fn defer_reads_picks_up_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            defer_reads: true,
            ..StoreConfig::log(dir.path())
        };
        let store = config.open().unwrap();
        assert!(!store.get_future(KeySpace::Blob, &Hash::zero()).is_ready());
    }

    #[test]
    fn defer_reads_outside_runtime_is_synchronous() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            defer_reads: true,
            ..StoreConfig::log(dir.path())
        };
        let store = config.open().unwrap();
        assert!(store.get_future(KeySpace::Blob, &Hash::zero()).is_ready());
    }
}
