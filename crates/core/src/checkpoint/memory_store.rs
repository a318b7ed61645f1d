//! In-memory checkpointer

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::checkpointer::Checkpointer;
use crate::thread::Thread;
use crate::Result;

/// Checkpointer that keeps snapshots for the life of the process
#[derive(Default)]
pub struct MemoryCheckpointer {
    threads: RwLock<HashMap<String, Thread>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored threads
    pub async fn len(&self) -> usize {
        self.threads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.threads.read().await.is_empty()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn load(&self, thread_id: &str) -> Result<Option<Thread>> {
        let threads = self.threads.read().await;
        Ok(threads.get(thread_id).cloned())
    }

    async fn save(&self, thread_id: &str, thread: &Thread) -> Result<()> {
        let mut threads = self.threads.write().await;
        threads.insert(thread_id.to_string(), thread.clone());
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> Result<bool> {
        let mut threads = self.threads.write().await;
        Ok(threads.remove(thread_id).is_some())
    }
}
