//! In-memory storage backend for account events.
//!
//! This crate implements the `kitsune-storage` traits on top of papaya
//! lock-free maps. It is the default backend and the one used by tests.
//!
//! # Example
//!
//! ```ignore
//! use kitsune_db_memory::InMemoryStorage;
//! use kitsune_storage::{NewProfile, ProfileStorage};
//!
//! let storage = InMemoryStorage::new();
//! let profile = storage
//!     .create_profile(NewProfile::new("fox").with_fxa_uid("54321"))
//!     .await?;
//! ```

mod account_impl;
pub mod storage;

pub use kitsune_storage::{AccountStorage, DynAccountStorage, StorageError};
pub use storage::InMemoryStorage;

/// Creates a new shared in-memory storage instance.
pub fn create_account_storage() -> DynAccountStorage {
    std::sync::Arc::new(InMemoryStorage::new())
}
