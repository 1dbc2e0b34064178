pub mod fs;
pub mod memory;

pub use fs::{FsCheckpointStore, FsObjectStore};
pub use memory::{MemoryCheckpointStore, MemoryObjectStore};
