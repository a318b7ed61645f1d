//! Checkpointer trait
//!
//! Defines the interface for thread persistence.

use async_trait::async_trait;

use crate::thread::Thread;
use crate::Result;

/// Storage for thread snapshots, keyed by an opaque thread id
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Load the last saved snapshot of a thread
    async fn load(&self, thread_id: &str) -> Result<Option<Thread>>;

    /// Save a snapshot, replacing any previous one
    async fn save(&self, thread_id: &str, thread: &Thread) -> Result<()>;

    /// Delete a thread's snapshot
    async fn delete(&self, thread_id: &str) -> Result<bool>;
}
