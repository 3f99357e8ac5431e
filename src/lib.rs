//! dkrutil library
//!
//! Convenience operations over the Docker Engine API: volume backup/restore,
//! image tag queries, write-once secrets, and container listing.

pub mod container;
pub mod engine;
pub mod registry;
pub mod secret;
pub mod utils;
pub mod volume;

// Re-export commonly used types
pub use engine::Engine;
pub use utils::errors::DkrError;
pub type Result<T> = std::result::Result<T, DkrError>;
