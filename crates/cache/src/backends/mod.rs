pub mod filesystem;
pub mod memory;

pub use filesystem::FilesystemBackend;
pub use memory::MemoryBackend;
