//! `kitsune-storage` trait implementations for [`InMemoryStorage`].

use async_trait::async_trait;
use kitsune_storage::{
    AccountEvent, AccountEventStatus, AccountEventStorage, AccountStorage, EventType,
    NewAccountEvent, NewProfile, Profile, ProfileStorage, StorageError,
};
use time::OffsetDateTime;

use crate::storage::InMemoryStorage;

#[async_trait]
impl AccountEventStorage for InMemoryStorage {
    async fn create_event(&self, event: NewAccountEvent) -> Result<AccountEvent, StorageError> {
        if let Some(profile_id) = event.profile_id
            && self.profiles.pin().get(&profile_id).is_none()
        {
            return Err(StorageError::invalid_record(format!(
                "unknown profile id {profile_id}"
            )));
        }

        let id = self.next_event_id();
        let stored = AccountEvent::from_new(id, event, OffsetDateTime::now_utc());
        self.events.pin().insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_event(&self, id: i64) -> Result<Option<AccountEvent>, StorageError> {
        Ok(self.events.pin().get(&id).cloned())
    }

    async fn find_by_jwt_id(&self, jwt_id: &str) -> Result<Vec<AccountEvent>, StorageError> {
        Ok(self.collect_events(|event| event.jwt_id == jwt_id))
    }

    async fn list_events(
        &self,
        status: Option<AccountEventStatus>,
        limit: usize,
    ) -> Result<Vec<AccountEvent>, StorageError> {
        let mut events = self.collect_events(|event| status.is_none_or(|s| event.status == s));
        events.truncate(limit);
        Ok(events)
    }

    async fn transition(
        &self,
        id: i64,
        status: AccountEventStatus,
        event_type: Option<EventType>,
    ) -> Result<AccountEvent, StorageError> {
        let _lock = self.write_lock.lock().await;

        let guard = self.events.pin();
        let current = guard
            .get(&id)
            .ok_or_else(|| StorageError::not_found("AccountEvent", id))?;

        if !current.status.can_transition_to(status) {
            return Err(StorageError::invalid_transition(current.status, status));
        }

        let mut updated = current.clone();
        updated.status = status;
        if event_type.is_some() {
            updated.event_type = event_type;
        }
        updated.last_modified = OffsetDateTime::now_utc();

        guard.insert(id, updated.clone());
        Ok(updated)
    }

    async fn count_events(&self) -> Result<u64, StorageError> {
        Ok(self.events.len() as u64)
    }
}

#[async_trait]
impl ProfileStorage for InMemoryStorage {
    async fn create_profile(&self, profile: NewProfile) -> Result<Profile, StorageError> {
        let _lock = self.write_lock.lock().await;

        let by_uid = self.profiles_by_fxa_uid.pin();
        if let Some(fxa_uid) = &profile.fxa_uid
            && by_uid.get(fxa_uid).is_some()
        {
            return Err(StorageError::already_exists("Profile", fxa_uid));
        }

        let stored = Profile {
            id: self.next_profile_id(),
            username: profile.username,
            fxa_uid: profile.fxa_uid,
        };
        if let Some(fxa_uid) = &stored.fxa_uid {
            by_uid.insert(fxa_uid.clone(), stored.id);
        }
        self.profiles.pin().insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_profile(&self, id: i64) -> Result<Option<Profile>, StorageError> {
        Ok(self.profiles.pin().get(&id).cloned())
    }

    async fn find_profile_by_fxa_uid(
        &self,
        fxa_uid: &str,
    ) -> Result<Option<Profile>, StorageError> {
        let Some(id) = self.profiles_by_fxa_uid.pin().get(fxa_uid).copied() else {
            return Ok(None);
        };
        Ok(self.profiles.pin().get(&id).cloned())
    }
}

#[async_trait]
impl AccountStorage for InMemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
