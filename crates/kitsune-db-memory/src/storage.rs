use std::sync::atomic::{AtomicI64, Ordering};

use kitsune_storage::{AccountEvent, AccountEventStatus, Profile};
use papaya::HashMap as PapayaHashMap;
use tokio::sync::Mutex;

/// In-memory account storage backend using papaya lock-free HashMaps.
///
/// Reads never block. Writes that must check-then-insert (status transitions,
/// profile creation) are serialized through `write_lock` so two concurrent
/// transitions of the same event cannot both succeed.
#[derive(Debug)]
pub struct InMemoryStorage {
    pub(crate) events: PapayaHashMap<i64, AccountEvent>,
    pub(crate) profiles: PapayaHashMap<i64, Profile>,
    /// fxa_uid -> profile id
    pub(crate) profiles_by_fxa_uid: PapayaHashMap<String, i64>,
    event_counter: AtomicI64,
    profile_counter: AtomicI64,
    pub(crate) write_lock: Mutex<()>,
}

impl InMemoryStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self {
            events: PapayaHashMap::new(),
            profiles: PapayaHashMap::new(),
            profiles_by_fxa_uid: PapayaHashMap::new(),
            event_counter: AtomicI64::new(1),
            profile_counter: AtomicI64::new(1),
            write_lock: Mutex::new(()),
        }
    }

    pub(crate) fn next_event_id(&self) -> i64 {
        self.event_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn next_profile_id(&self) -> i64 {
        self.profile_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Returns matching events ordered by id.
    pub(crate) fn collect_events<F>(&self, filter: F) -> Vec<AccountEvent>
    where
        F: Fn(&AccountEvent) -> bool,
    {
        let guard = self.events.pin();
        let mut events: Vec<AccountEvent> = guard
            .iter()
            .filter(|(_, event)| filter(event))
            .map(|(_, event)| event.clone())
            .collect();
        events.sort_by_key(|event| event.id);
        events
    }

    /// Number of events with the given status.
    pub fn count_with_status(&self, status: AccountEventStatus) -> usize {
        self.events
            .pin()
            .iter()
            .filter(|(_, event)| event.status == status)
            .count()
    }

    /// Removes every event and profile.
    pub fn clear(&self) {
        self.events.pin().clear();
        self.profiles.pin().clear();
        self.profiles_by_fxa_uid.pin().clear();
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}
