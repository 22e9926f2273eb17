//! Record types for account events and local profiles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::canonical;
use crate::error::StorageError;

/// Prefix shared by all FxA security event type URIs.
pub const EVENT_URI_PREFIX: &str = "https://schemas.accounts.firefox.com/event/";

/// Processing status of an [`AccountEvent`].
///
/// Events are created as `Unprocessed` and move exactly once to either
/// `Processed` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountEventStatus {
    Unprocessed,
    Processed,
    Error,
}

impl AccountEventStatus {
    /// Returns the storage representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unprocessed => "unprocessed",
            Self::Processed => "processed",
            Self::Error => "error",
        }
    }

    /// Returns `true` if moving from `self` to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(&self, next: AccountEventStatus) -> bool {
        matches!(
            (self, next),
            (Self::Unprocessed, Self::Processed) | (Self::Unprocessed, Self::Error)
        )
    }

    /// Returns `true` for statuses that can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Unprocessed)
    }
}

impl fmt::Display for AccountEventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountEventStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unprocessed" => Ok(Self::Unprocessed),
            "processed" => Ok(Self::Processed),
            "error" => Ok(Self::Error),
            other => Err(StorageError::invalid_record(format!(
                "unknown account event status: {other}"
            ))),
        }
    }
}

/// Classification of a security event, resolved after ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    PasswordChange,
    ProfileChange,
    SubscriptionStateChange,
    DeleteUser,
}

impl EventType {
    /// All known event types.
    pub const ALL: [EventType; 4] = [
        Self::PasswordChange,
        Self::ProfileChange,
        Self::SubscriptionStateChange,
        Self::DeleteUser,
    ];

    /// Returns the short name used in storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PasswordChange => "password-change",
            Self::ProfileChange => "profile-change",
            Self::SubscriptionStateChange => "subscription-state-change",
            Self::DeleteUser => "delete-user",
        }
    }

    /// Returns the full event type URI as it appears in a token's `events` claim.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("{EVENT_URI_PREFIX}{}", self.as_str())
    }

    /// Maps an event type URI to a known type.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        uri.strip_prefix(EVENT_URI_PREFIX)
            .and_then(|name| name.parse().ok())
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| StorageError::invalid_record(format!("unknown event type: {s}")))
    }
}

/// A persisted record of one inbound security event token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountEvent {
    pub id: i64,
    /// Canonical text of the token's `events` claim.
    pub events: String,
    pub event_type: Option<EventType>,
    pub status: AccountEventStatus,
    /// Subject (`sub`) of the token.
    pub fxa_uid: String,
    /// Token identifier (`jti`).
    pub jwt_id: String,
    /// Raw `iat` claim, kept as text.
    pub issued_at: String,
    /// Local profile owning the event, if one matched `fxa_uid`.
    pub profile_id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
}

impl AccountEvent {
    /// Builds a stored record from a new event, as a backend does on insert.
    #[must_use]
    pub fn from_new(id: i64, new: NewAccountEvent, now: OffsetDateTime) -> Self {
        Self {
            id,
            events: new.events,
            event_type: None,
            status: AccountEventStatus::Unprocessed,
            fxa_uid: new.fxa_uid,
            jwt_id: new.jwt_id,
            issued_at: new.issued_at,
            profile_id: new.profile_id,
            created_at: now,
            last_modified: now,
        }
    }

    /// Parses the stored `events` text back into a mapping.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidRecord` if the text is not a JSON object.
    pub fn events_map(&self) -> Result<Map<String, Value>, StorageError> {
        canonical::decode_events(&self.events)
    }

    /// Returns the known event types present in the `events` mapping.
    ///
    /// Unknown URIs are skipped.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidRecord` if the stored text cannot be parsed.
    pub fn event_types(&self) -> Result<Vec<EventType>, StorageError> {
        Ok(self
            .events_map()?
            .keys()
            .filter_map(|uri| EventType::from_uri(uri))
            .collect())
    }
}

/// Fields of an account event supplied at creation time.
///
/// `status` and `event_type` are not part of this struct: every new event
/// starts unprocessed and unclassified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccountEvent {
    pub events: String,
    pub fxa_uid: String,
    pub jwt_id: String,
    pub issued_at: String,
    pub profile_id: Option<i64>,
}

impl NewAccountEvent {
    /// Creates a new event, encoding `events` canonically.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidRecord` if `events` cannot be encoded.
    pub fn new(
        events: &Map<String, Value>,
        fxa_uid: impl Into<String>,
        jwt_id: impl Into<String>,
        issued_at: impl Into<String>,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            events: canonical::encode_events(events)?,
            fxa_uid: fxa_uid.into(),
            jwt_id: jwt_id.into(),
            issued_at: issued_at.into(),
            profile_id: None,
        })
    }

    /// Attaches the owning profile.
    #[must_use]
    pub fn with_profile(mut self, profile_id: Option<i64>) -> Self {
        self.profile_id = profile_id;
        self
    }
}

/// A local user profile that account events can be attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub username: String,
    pub fxa_uid: Option<String>,
}

/// Fields of a profile supplied at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfile {
    pub username: String,
    pub fxa_uid: Option<String>,
}

impl NewProfile {
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            fxa_uid: None,
        }
    }

    #[must_use]
    pub fn with_fxa_uid(mut self, fxa_uid: impl Into<String>) -> Self {
        self.fxa_uid = Some(fxa_uid.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_transitions() {
        use AccountEventStatus::*;

        assert!(Unprocessed.can_transition_to(Processed));
        assert!(Unprocessed.can_transition_to(Error));
        assert!(!Unprocessed.can_transition_to(Unprocessed));
        assert!(!Processed.can_transition_to(Unprocessed));
        assert!(!Processed.can_transition_to(Error));
        assert!(!Error.can_transition_to(Processed));
        assert!(!Error.can_transition_to(Unprocessed));

        assert!(!Unprocessed.is_terminal());
        assert!(Processed.is_terminal());
        assert!(Error.is_terminal());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(
            "processed".parse::<AccountEventStatus>().unwrap(),
            AccountEventStatus::Processed
        );
        assert!("done".parse::<AccountEventStatus>().is_err());
        assert_eq!(AccountEventStatus::Unprocessed.to_string(), "unprocessed");
    }

    #[test]
    fn test_event_type_uri() {
        let uri = "https://schemas.accounts.firefox.com/event/subscription-state-change";
        assert_eq!(
            EventType::from_uri(uri),
            Some(EventType::SubscriptionStateChange)
        );
        assert_eq!(EventType::SubscriptionStateChange.uri(), uri);
        assert_eq!(EventType::from_uri("https://example.com/event/delete-user"), None);
        assert_eq!(
            EventType::from_uri("https://schemas.accounts.firefox.com/event/unknown"),
            None
        );
    }

    #[test]
    fn test_new_account_event_encodes_events() {
        let events = json!({
            "https://schemas.accounts.firefox.com/event/password-change": {
                "changeTime": 1565721242227_i64
            }
        });
        let new = NewAccountEvent::new(events.as_object().unwrap(), "54321", "jti-1", "1565720808")
            .unwrap()
            .with_profile(Some(7));

        assert_eq!(
            new.events,
            r#"{"https://schemas.accounts.firefox.com/event/password-change": {"changeTime": 1565721242227}}"#
        );
        assert_eq!(new.profile_id, Some(7));

        let stored = AccountEvent::from_new(1, new, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(stored.status, AccountEventStatus::Unprocessed);
        assert_eq!(stored.event_type, None);
        assert_eq!(stored.events_map().unwrap(), *events.as_object().unwrap());
        assert_eq!(stored.event_types().unwrap(), vec![EventType::PasswordChange]);
    }
}
