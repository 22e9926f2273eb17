//! PostgreSQL implementation of the account storage traits.

use async_trait::async_trait;
use kitsune_storage::{
    AccountEvent, AccountEventStatus, AccountEventStorage, AccountStorage, EventType,
    NewAccountEvent, NewProfile, Profile, ProfileStorage, StorageError,
};
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::config::PostgresConfig;
use crate::error::{PG_UNIQUE_VIOLATION, PostgresError, Result as PgResult, has_pg_error_code};
use crate::{migrations, pool};

const EVENT_COLUMNS: &str = "id, events, event_type, status, fxa_uid, jwt_id, issued_at, \
                             profile_id, created_at, last_modified";

type EventRow = (
    i64,
    String,
    Option<String>,
    String,
    String,
    String,
    String,
    Option<i64>,
    OffsetDateTime,
    OffsetDateTime,
);

type ProfileRow = (i64, String, Option<String>);

fn event_from_row(row: EventRow) -> PgResult<AccountEvent> {
    let (
        id,
        events,
        event_type,
        status,
        fxa_uid,
        jwt_id,
        issued_at,
        profile_id,
        created_at,
        last_modified,
    ) = row;

    Ok(AccountEvent {
        id,
        events,
        event_type: event_type.map(|t| t.parse::<EventType>()).transpose()?,
        status: status.parse()?,
        fxa_uid,
        jwt_id,
        issued_at,
        profile_id,
        created_at,
        last_modified,
    })
}

fn profile_from_row((id, username, fxa_uid): ProfileRow) -> Profile {
    Profile {
        id,
        username,
        fxa_uid,
    }
}

/// PostgreSQL account storage backend.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connects to the database and, if configured, applies migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created or a migration fails.
    pub async fn new(config: &PostgresConfig) -> PgResult<Self> {
        let pool = pool::create_pool(config).await?;
        if config.run_migrations {
            migrations::run(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Wraps an existing pool. Migrations are not run.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn current_status(&self, id: i64) -> PgResult<Option<AccountEventStatus>> {
        let status: Option<String> =
            query_scalar("SELECT status FROM account_event WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(status.map(|s| s.parse::<AccountEventStatus>()).transpose()?)
    }
}

#[async_trait]
impl AccountEventStorage for PostgresStorage {
    #[instrument(skip(self, event), fields(jwt_id = %event.jwt_id))]
    async fn create_event(&self, event: NewAccountEvent) -> Result<AccountEvent, StorageError> {
        let sql = format!(
            "INSERT INTO account_event (events, status, fxa_uid, jwt_id, issued_at, profile_id) \
             VALUES ($1, 'unprocessed', $2, $3, $4, $5) RETURNING {EVENT_COLUMNS}"
        );
        let row: EventRow = query_as(&sql)
            .bind(&event.events)
            .bind(&event.fxa_uid)
            .bind(&event.jwt_id)
            .bind(&event.issued_at)
            .bind(event.profile_id)
            .fetch_one(&self.pool)
            .await
            .map_err(PostgresError::from)?;

        let stored = event_from_row(row)?;
        debug!(id = stored.id, "Account event inserted");
        Ok(stored)
    }

    async fn get_event(&self, id: i64) -> Result<Option<AccountEvent>, StorageError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM account_event WHERE id = $1");
        let row: Option<EventRow> = query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(PostgresError::from)?;

        Ok(row.map(event_from_row).transpose()?)
    }

    async fn find_by_jwt_id(&self, jwt_id: &str) -> Result<Vec<AccountEvent>, StorageError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM account_event WHERE jwt_id = $1 ORDER BY id");
        let rows: Vec<EventRow> = query_as(&sql)
            .bind(jwt_id)
            .fetch_all(&self.pool)
            .await
            .map_err(PostgresError::from)?;

        Ok(rows
            .into_iter()
            .map(event_from_row)
            .collect::<PgResult<Vec<_>>>()?)
    }

    async fn list_events(
        &self,
        status: Option<AccountEventStatus>,
        limit: usize,
    ) -> Result<Vec<AccountEvent>, StorageError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM account_event \
             WHERE ($1::text IS NULL OR status = $1) ORDER BY id LIMIT $2"
        );
        let rows: Vec<EventRow> = query_as(&sql)
            .bind(status.map(|s| s.as_str()))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(PostgresError::from)?;

        Ok(rows
            .into_iter()
            .map(event_from_row)
            .collect::<PgResult<Vec<_>>>()?)
    }

    #[instrument(skip(self))]
    async fn transition(
        &self,
        id: i64,
        status: AccountEventStatus,
        event_type: Option<EventType>,
    ) -> Result<AccountEvent, StorageError> {
        if AccountEventStatus::Unprocessed.can_transition_to(status) {
            let sql = format!(
                "UPDATE account_event \
                 SET status = $2, event_type = COALESCE($3, event_type), last_modified = NOW() \
                 WHERE id = $1 AND status = 'unprocessed' RETURNING {EVENT_COLUMNS}"
            );
            let row: Option<EventRow> = query_as(&sql)
                .bind(id)
                .bind(status.as_str())
                .bind(event_type.map(|t| t.as_str()))
                .fetch_optional(&self.pool)
                .await
                .map_err(PostgresError::from)?;

            if let Some(row) = row {
                return Ok(event_from_row(row)?);
            }
        }

        // Either the target status is never reachable or the row was not
        // unprocessed; report which.
        match self.current_status(id).await? {
            Some(current) => Err(StorageError::invalid_transition(current, status)),
            None => Err(StorageError::not_found("AccountEvent", id)),
        }
    }

    async fn count_events(&self) -> Result<u64, StorageError> {
        let count: i64 = query_scalar("SELECT COUNT(*) FROM account_event")
            .fetch_one(&self.pool)
            .await
            .map_err(PostgresError::from)?;

        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[async_trait]
impl ProfileStorage for PostgresStorage {
    async fn create_profile(&self, profile: NewProfile) -> Result<Profile, StorageError> {
        let result: Result<ProfileRow, _> = query_as(
            "INSERT INTO profile (username, fxa_uid) VALUES ($1, $2) \
             RETURNING id, username, fxa_uid",
        )
        .bind(&profile.username)
        .bind(profile.fxa_uid.as_deref())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(profile_from_row(row)),
            Err(e) if has_pg_error_code(&e, PG_UNIQUE_VIOLATION) => Err(
                StorageError::already_exists("Profile", profile.fxa_uid.unwrap_or_default()),
            ),
            Err(e) => Err(PostgresError::from(e).into()),
        }
    }

    async fn get_profile(&self, id: i64) -> Result<Option<Profile>, StorageError> {
        let row: Option<ProfileRow> =
            query_as("SELECT id, username, fxa_uid FROM profile WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(PostgresError::from)?;

        Ok(row.map(profile_from_row))
    }

    async fn find_profile_by_fxa_uid(
        &self,
        fxa_uid: &str,
    ) -> Result<Option<Profile>, StorageError> {
        let row: Option<ProfileRow> =
            query_as("SELECT id, username, fxa_uid FROM profile WHERE fxa_uid = $1")
                .bind(fxa_uid)
                .fetch_optional(&self.pool)
                .await
                .map_err(PostgresError::from)?;

        Ok(row.map(profile_from_row))
    }
}

#[async_trait]
impl AccountStorage for PostgresStorage {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        pool::test_connection(&self.pool).await?;
        Ok(())
    }
}
