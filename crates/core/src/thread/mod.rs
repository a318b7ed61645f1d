//! Thread module
//!
//! Conversation threads and the messages they hold.

mod message;
mod model;

pub use message::*;
pub use model::{Scratch, Thread};
