//! Batch persistence.
//!
//! A user's batch is addressed by a key derived from the user identifier;
//! [`BatchStore`] maps that key to a location and loads or saves the batch
//! there. [`JsonFileStore`] keeps one JSON document per user on disk.

pub mod json;

pub use json::JsonFileStore;

use crate::feed::Batch;
use anyhow::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Length of a hex-encoded SHA-256 user key.
pub const USER_KEY_LEN: usize = 64;

/// Derives the storage key for `user_id`: the lowercase hex SHA-256 digest.
pub fn user_key(user_id: &str) -> String {
    hex::encode(Sha256::digest(user_id.as_bytes()))
}

pub trait BatchStore: Send + Sync {
    /// Resolves the location of an existing batch for `user_key`.
    fn locate(&self, user_key: &str) -> Result<PathBuf>;

    fn load(&self, location: &Path) -> Result<Batch>;

    /// Replaces the batch at `location`. Readers never observe a partial write.
    fn save(&self, batch: &Batch, location: &Path) -> Result<()>;
}
