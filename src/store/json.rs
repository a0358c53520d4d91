use super::{BatchStore, USER_KEY_LEN};
use crate::feed::Batch;
use anyhow::{bail, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Stores each batch at `<root>/<key[..2]>/<key[2..]>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a batch for `user_key` lives at, whether or not it exists.
    pub fn path_for(&self, user_key: &str) -> Result<PathBuf> {
        if user_key.len() < USER_KEY_LEN {
            bail!(
                "user key must be at least {USER_KEY_LEN} characters, got {}",
                user_key.len()
            );
        }
        if !user_key.bytes().all(|b| b.is_ascii_hexdigit()) {
            bail!("user key must be hex encoded");
        }

        let (shard, rest) = user_key.split_at(2);
        Ok(self.root.join(shard).join(format!("{rest}.json")))
    }
}

impl BatchStore for JsonFileStore {
    fn locate(&self, user_key: &str) -> Result<PathBuf> {
        let path = self.path_for(user_key)?;
        if !path.is_file() {
            bail!("no batch file at {}", path.display());
        }
        Ok(path)
    }

    fn load(&self, location: &Path) -> Result<Batch> {
        let raw = fs::read(location)
            .with_context(|| format!("failed to read batch file {}", location.display()))?;
        serde_json::from_slice(&raw)
            .with_context(|| format!("failed to decode batch file {}", location.display()))
    }

    fn save(&self, batch: &Batch, location: &Path) -> Result<()> {
        let dir = match location.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create batch directory {}", dir.display()))?;

        let encoded = serde_json::to_vec(batch).context("failed to encode batch")?;

        let mut staged = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        staged
            .write_all(&encoded)
            .context("failed to write staged batch")?;
        staged
            .as_file()
            .sync_all()
            .context("failed to sync staged batch")?;
        staged
            .persist(location)
            .map_err(|err| err.error)
            .with_context(|| format!("failed to move batch into {}", location.display()))?;

        Ok(())
    }
}
