pub mod config;
pub mod error;
pub mod retry;
pub mod storage;
pub mod types;

pub use config::EngineConfig;
pub use error::{PopupError, PopupResult};
pub use retry::RetryPolicy;
pub use storage::{DeniedStore, KeyValueStore, MemoryStore};
