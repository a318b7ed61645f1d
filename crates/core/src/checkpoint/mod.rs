//! Checkpoint module
//!
//! Persistence of conversation threads between turns.

mod checkpointer;
mod file_store;
mod memory_store;

pub use checkpointer::Checkpointer;
pub use file_store::FileCheckpointer;
pub use memory_store::MemoryCheckpointer;
