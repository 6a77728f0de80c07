pub mod codec;
pub mod consumer;
pub mod error;
pub mod memory;

pub use codec::{decode, encode};
pub use consumer::{JobHandle, JobQueue, QueueConsumer, QueueHealth, QueueMessage};
pub use error::QueueError;
pub use memory::MemoryQueue;
