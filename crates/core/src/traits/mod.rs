pub mod cache_backend;
pub mod engine;

pub use cache_backend::CacheBackend;
pub use engine::{BatchSimulator, ModelInspector};
