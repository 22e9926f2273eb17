//! # kitsune-storage
//!
//! Data model and storage abstraction for account security events.
//!
//! This crate defines the records the webhook writes, the canonical text
//! encoding of a token's `events` claim, and the traits storage backends
//! implement. Backends live in separate crates.
//!
//! ## Example
//!
//! ```ignore
//! use kitsune_storage::{DynAccountStorage, NewAccountEvent, StorageError};
//!
//! async fn record(
//!     storage: &DynAccountStorage,
//!     events: &serde_json::Map<String, serde_json::Value>,
//! ) -> Result<i64, StorageError> {
//!     let profile = storage.find_profile_by_fxa_uid("54321").await?;
//!     let new = NewAccountEvent::new(events, "54321", "jti", "1565720808")?
//!         .with_profile(profile.map(|p| p.id));
//!     Ok(storage.create_event(new).await?.id)
//! }
//! ```

pub mod canonical;
mod error;
mod traits;
mod types;

pub use canonical::{decode_events, encode_events};
pub use error::{ErrorCategory, StorageError};
pub use traits::{AccountEventStorage, AccountStorage, ProfileStorage};
pub use types::{
    AccountEvent, AccountEventStatus, EVENT_URI_PREFIX, EventType, NewAccountEvent, NewProfile,
    Profile,
};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared storage trait object.
pub type DynAccountStorage = std::sync::Arc<dyn AccountStorage>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::traits::{AccountEventStorage, AccountStorage, ProfileStorage};
    pub use crate::types::{
        AccountEvent, AccountEventStatus, EventType, NewAccountEvent, NewProfile, Profile,
    };
    pub use crate::{DynAccountStorage, StorageResult};
}
