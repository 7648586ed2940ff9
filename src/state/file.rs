//! JSON file store under the data directory
//!
//! Layout:
//! - `cycles/<commitment hash>.json` - one file per cycle
//! - `active` - commitment hash of the active cycle

use super::StateStore;
use crate::coordination::Cycle;
use crate::error::{CoordinatorError, CoordinatorResult};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    /// Open the store, creating the data directory if needed
    pub async fn open(data_dir: impl AsRef<Path>) -> CoordinatorResult<Self> {
        let root = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(root.join("cycles")).await?;
        info!("File state store at {:?}", root);
        Ok(Self { root })
    }

    fn cycle_path(&self, key: &str) -> PathBuf {
        self.root.join("cycles").join(format!("{}.json", key))
    }

    fn active_path(&self) -> PathBuf {
        self.root.join("active")
    }

    /// Write through a temporary file so readers never see a partial file
    async fn write_atomic(&self, path: &Path, contents: &[u8]) -> CoordinatorResult<()> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, contents).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> CoordinatorResult<Option<Cycle>> {
        let key = match fs::read_to_string(self.active_path()).await {
            Ok(key) => key.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let contents = fs::read(self.cycle_path(&key)).await?;
        let cycle: Cycle = serde_json::from_slice(&contents)
            .map_err(|e| CoordinatorError::Storage(format!("corrupt cycle {}: {}", key, e)))?;

        debug!("Loaded cycle {} at revision {}", cycle.id, cycle.revision);
        Ok(Some(cycle))
    }

    async fn save(&self, cycle: &Cycle) -> CoordinatorResult<()> {
        let key = format!("{:?}", cycle.commitment);
        let contents = serde_json::to_vec_pretty(cycle)
            .map_err(|e| CoordinatorError::Internal(e.to_string()))?;

        self.write_atomic(&self.cycle_path(&key), &contents).await?;
        self.write_atomic(&self.active_path(), key.as_bytes()).await?;

        debug!("Saved cycle {} at revision {}", cycle.id, cycle.revision);
        Ok(())
    }

    async fn health_check(&self) -> CoordinatorResult<()> {
        fs::metadata(self.root.join("cycles")).await?;
        Ok(())
    }
}
