pub mod store;
pub mod cache;
pub mod sled_store;
pub mod factory;

pub use store::*;
pub use cache::*;
pub use sled_store::SledHistoryStore;
pub use factory::{create_history_store, create_in_memory_history_store};
