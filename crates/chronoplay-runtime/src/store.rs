//! Concrete [`SavestateStore`](chronoplay_core::SavestateStore) backends.

mod file;
mod memory;

pub use file::FileSavestateStore;
pub use memory::MemorySavestateStore;
