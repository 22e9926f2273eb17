//! Storage traits for account events and profiles.
//!
//! Backends implement [`AccountEventStorage`] and [`ProfileStorage`], then opt
//! into [`AccountStorage`] to be usable behind a [`crate::DynAccountStorage`].

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{
    AccountEvent, AccountEventStatus, EventType, NewAccountEvent, NewProfile, Profile,
};

/// Persistence of inbound security events.
///
/// # Example
///
/// ```ignore
/// use kitsune_storage::{AccountEventStorage, AccountEventStatus, StorageError};
///
/// async fn mark_done(storage: &dyn AccountEventStorage, id: i64) -> Result<(), StorageError> {
///     storage.transition(id, AccountEventStatus::Processed, None).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait AccountEventStorage: Send + Sync {
    /// Persists a new event with status `Unprocessed` and no event type.
    ///
    /// The backend assigns `id`, `created_at` and `last_modified`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidRecord` if `profile_id` references an
    /// unknown profile, or an infrastructure error.
    async fn create_event(&self, event: NewAccountEvent) -> Result<AccountEvent, StorageError>;

    /// Reads an event by id. Returns `None` if it does not exist.
    async fn get_event(&self, id: i64) -> Result<Option<AccountEvent>, StorageError>;

    /// Returns every event carrying the given token identifier, oldest first.
    ///
    /// More than one result means the same token was delivered twice.
    async fn find_by_jwt_id(&self, jwt_id: &str) -> Result<Vec<AccountEvent>, StorageError>;

    /// Lists events, oldest first, optionally filtered by status.
    async fn list_events(
        &self,
        status: Option<AccountEventStatus>,
        limit: usize,
    ) -> Result<Vec<AccountEvent>, StorageError>;

    /// Moves an event to a new status, optionally recording its type.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the event does not exist and
    /// `StorageError::InvalidTransition` unless the event is `Unprocessed` and
    /// `status` is `Processed` or `Error`.
    async fn transition(
        &self,
        id: i64,
        status: AccountEventStatus,
        event_type: Option<EventType>,
    ) -> Result<AccountEvent, StorageError>;

    /// Returns the total number of stored events.
    async fn count_events(&self) -> Result<u64, StorageError>;
}

/// Lookup and creation of local profiles.
#[async_trait]
pub trait ProfileStorage: Send + Sync {
    /// Creates a profile.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if another profile already has
    /// the same `fxa_uid`.
    async fn create_profile(&self, profile: NewProfile) -> Result<Profile, StorageError>;

    /// Reads a profile by id.
    async fn get_profile(&self, id: i64) -> Result<Option<Profile>, StorageError>;

    /// Finds the profile linked to an FxA subject.
    async fn find_profile_by_fxa_uid(&self, fxa_uid: &str)
    -> Result<Option<Profile>, StorageError>;
}

/// A complete storage backend.
#[async_trait]
pub trait AccountStorage: AccountEventStorage + ProfileStorage {
    /// Name of the backend, for logs.
    fn backend_name(&self) -> &'static str;

    /// Performs a round-trip to the backend.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if the backend is unreachable.
    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
