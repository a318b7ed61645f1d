//! File-based checkpointer
//!
//! Directory structure:
//! ```text
//! {data_dir}/
//!   threads/
//!     {hex(thread_id)}.json          # Thread snapshot
//!     sha256-{hex(digest)}.json      # Snapshot of a thread with a long id
//! ```
//!
//! Thread ids are opaque, so file names are hex-encoded ids. Ids whose
//! encoding would not fit in a file name are hashed instead; the real id is
//! kept inside the snapshot and checked on load.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::checkpointer::Checkpointer;
use crate::thread::Thread;
use crate::{Error, Result};

/// Longest hex-encoded id used directly as a file stem
const MAX_HEX_STEM_LEN: usize = 128;

/// Checkpointer storing one JSON file per thread
#[derive(Debug, Clone)]
pub struct FileCheckpointer {
    /// Base directory for thread snapshots
    base_dir: PathBuf,
}

impl FileCheckpointer {
    /// Create a new file checkpointer
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: data_dir.as_ref().join("threads"),
        }
    }

    /// Get the path to a thread's snapshot file
    fn thread_path(&self, thread_id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", file_stem(thread_id)))
    }
}

fn file_stem(thread_id: &str) -> String {
    let encoded = hex::encode(thread_id.as_bytes());
    if encoded.len() <= MAX_HEX_STEM_LEN {
        encoded
    } else {
        format!("sha256-{}", hex::encode(Sha256::digest(thread_id.as_bytes())))
    }
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    async fn load(&self, thread_id: &str) -> Result<Option<Thread>> {
        let path = self.thread_path(thread_id);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let thread: Thread = serde_json::from_str(&content).map_err(|e| {
            Error::Checkpoint(format!("Failed to deserialize thread {}: {}", thread_id, e))
        })?;

        if thread.id != thread_id {
            return Err(Error::Checkpoint(format!(
                "Snapshot at {} belongs to thread {}",
                path.display(),
                thread.id
            )));
        }

        debug!("Loaded thread {} from {}", thread_id, path.display());
        Ok(Some(thread))
    }

    async fn save(&self, thread_id: &str, thread: &Thread) -> Result<()> {
        if thread.id != thread_id {
            return Err(Error::InvalidInput(format!(
                "Cannot save thread {} under id {}",
                thread.id, thread_id
            )));
        }

        tokio::fs::create_dir_all(&self.base_dir).await?;

        let path = self.thread_path(thread_id);
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(thread)?;

        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        debug!("Saved thread {} ({} messages)", thread_id, thread.len());
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> Result<bool> {
        let path = self.thread_path(thread_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted checkpoint for thread {}", thread_id);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
