//! Database module

pub mod lock;
pub mod memory;
pub mod operations;
pub mod schema;
pub mod traits;

// Re-export for convenience
pub use lock::QueueLock;
pub use memory::MemoryStore;
pub use operations::DatabaseManager;
pub use schema::initialize_database;
pub use traits::QueueStore;
