//! [`EntityStore`] implementation over a `PgPool`.

use crate::rows::{EventRow, UserRow, event_uuids, user_uuids};
use campus_events_core::entity_store::{
    EntityStore, EntityStoreError, EventFilter, SetMutation, StoreFuture,
};
use campus_events_core::types::{Event, EventId, EventUpdate, User, UserId, UserUpdate};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use std::time::Duration;
use tracing::Instrument;

/// Connection pool sizing and timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections kept open
    pub min_connections: u32,
    /// How long to wait for a connection
    pub connect_timeout: Duration,
    /// Idle connections older than this are closed
    pub idle_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// `PostgreSQL`-backed entity store.
///
/// Cloning is cheap and shares the pool.
#[derive(Debug, Clone)]
pub struct PostgresEntityStore {
    pool: PgPool,
}

impl PostgresEntityStore {
    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::Unavailable`] if no connection can be opened.
    pub async fn connect(database_url: &str, settings: &PoolSettings) -> Result<Self, EntityStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.connect_timeout)
            .idle_timeout(Some(settings.idle_timeout))
            .connect(database_url)
            .await
            .map_err(|e| EntityStoreError::Unavailable(e.to_string()))?;

        tracing::info!(
            max_connections = settings.max_connections,
            "Connected to PostgreSQL"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), EntityStoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| EntityStoreError::Database(format!("migration failed: {e}")))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    async fn event_exists(&self, event_id: EventId) -> Result<bool, EntityStoreError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM events WHERE id = $1)")
            .bind(event_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("event_exists"))
    }

    async fn user_exists(&self, user_id: UserId) -> Result<bool, EntityStoreError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("user_exists"))
    }

    /// Turn the row returned by a conditional update into a [`SetMutation`].
    async fn event_mutation(
        &self,
        row: Option<EventRow>,
        event_id: EventId,
    ) -> Result<SetMutation<Event>, EntityStoreError> {
        match row {
            Some(row) => Ok(SetMutation::Applied(row.try_into()?)),
            None if self.event_exists(event_id).await? => Ok(SetMutation::Unchanged),
            None => Ok(SetMutation::Missing),
        }
    }

    async fn user_mutation(
        &self,
        row: Option<UserRow>,
        user_id: UserId,
    ) -> Result<SetMutation<User>, EntityStoreError> {
        match row {
            Some(row) => Ok(SetMutation::Applied(row.try_into()?)),
            None if self.user_exists(user_id).await? => Ok(SetMutation::Unchanged),
            None => Ok(SetMutation::Missing),
        }
    }
}

/// Map a sqlx error and count it.
fn db_error(operation: &'static str) -> impl Fn(sqlx::Error) -> EntityStoreError {
    move |error| {
        metrics::counter!("entity_store_errors_total", "operation" => operation).increment(1);
        tracing::warn!(operation, %error, "Entity store query failed");
        match error {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                EntityStoreError::Unavailable(error.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                EntityStoreError::Serialization(error.to_string())
            }
            other => EntityStoreError::Database(other.to_string()),
        }
    }
}

impl EntityStore for PostgresEntityStore {
    fn find_event(&self, event_id: EventId) -> StoreFuture<'_, Option<Event>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, EventRow>(concat!(
                "SELECT ",
                event_columns!(),
                " FROM events WHERE id = $1"
            ))
            .bind(event_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find_event"))?;

            row.map(Event::try_from).transpose()
        })
    }

    fn find_user(&self, user_id: UserId) -> StoreFuture<'_, Option<User>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, UserRow>(concat!(
                "SELECT ",
                user_columns!(),
                " FROM users WHERE id = $1"
            ))
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find_user"))?;

            row.map(User::try_from).transpose()
        })
    }

    fn find_users(&self, user_ids: Vec<UserId>) -> StoreFuture<'_, Vec<User>> {
        Box::pin(async move {
            if user_ids.is_empty() {
                return Ok(Vec::new());
            }
            let rows = sqlx::query_as::<_, UserRow>(concat!(
                "SELECT ",
                user_columns!(),
                " FROM users WHERE id = ANY($1)"
            ))
            .bind(user_uuids(&user_ids))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("find_users"))?;

            rows.into_iter().map(User::try_from).collect()
        })
    }

    fn list_events(&self, filter: EventFilter) -> StoreFuture<'_, Vec<Event>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, EventRow>(concat!(
                "SELECT ",
                event_columns!(),
                " FROM events WHERE ($1::TEXT IS NULL OR category = $1) ORDER BY date DESC"
            ))
            .bind(filter.category.map(|category| category.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list_events"))?;

            rows.into_iter().map(Event::try_from).collect()
        })
    }

    fn list_users(&self) -> StoreFuture<'_, Vec<User>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, UserRow>(concat!(
                "SELECT ",
                user_columns!(),
                " FROM users ORDER BY created_at"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list_users"))?;

            rows.into_iter().map(User::try_from).collect()
        })
    }

    fn insert_event(&self, event: Event) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO events (
                    id, name, theme, description, eligibility, category, date, status,
                    registration_required, created_by, details, image, participants,
                    created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                ",
            )
            .bind(event.id.as_uuid())
            .bind(&event.name)
            .bind(&event.theme)
            .bind(&event.description)
            .bind(&event.eligibility)
            .bind(event.category.as_str())
            .bind(event.date)
            .bind(event.status.as_str())
            .bind(event.registration_required)
            .bind(event.created_by.as_uuid())
            .bind(Json(&event.details))
            .bind(&event.image)
            .bind(user_uuids(&event.participants))
            .bind(event.created_at)
            .bind(event.updated_at)
            .execute(&self.pool)
            .await
            .map_err(db_error("insert_event"))?;

            tracing::debug!(event_id = %event.id, "Event inserted");
            Ok(())
        })
    }

    fn insert_user(&self, user: User) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                INSERT INTO users (id, name, email, role, year, bio, registered_events, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ",
            )
            .bind(user.id.as_uuid())
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.role.as_str())
            .bind(user.year.map(|year| year.as_str()))
            .bind(&user.bio)
            .bind(event_uuids(&user.registered_events))
            .bind(user.created_at)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => {
                    tracing::debug!(user_id = %user.id, "User inserted");
                    Ok(())
                }
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    Err(EntityStoreError::DuplicateEmail(user.email))
                }
                Err(error) => Err(db_error("insert_user")(error)),
            }
        })
    }

    fn update_event_details(
        &self,
        event_id: EventId,
        update: EventUpdate,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Event>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_error("update_event_details"))?;

            let row = sqlx::query_as::<_, EventRow>(concat!(
                "SELECT ",
                event_columns!(),
                " FROM events WHERE id = $1 FOR UPDATE"
            ))
            .bind(event_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("update_event_details"))?;

            let Some(row) = row else {
                return Ok(None);
            };
            let mut event = Event::try_from(row)?;
            event.apply_update(update, now);

            // participants is deliberately absent from the SET list
            let row = sqlx::query_as::<_, EventRow>(concat!(
                r"
                UPDATE events SET
                    name = $2, theme = $3, description = $4, eligibility = $5, category = $6,
                    date = $7, status = $8, registration_required = $9, details = $10,
                    image = $11, updated_at = $12
                WHERE id = $1
                RETURNING ",
                event_columns!()
            ))
            .bind(event_id.as_uuid())
            .bind(&event.name)
            .bind(&event.theme)
            .bind(&event.description)
            .bind(&event.eligibility)
            .bind(event.category.as_str())
            .bind(event.date)
            .bind(event.status.as_str())
            .bind(event.registration_required)
            .bind(Json(&event.details))
            .bind(&event.image)
            .bind(event.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error("update_event_details"))?;

            tx.commit().await.map_err(db_error("update_event_details"))?;
            Event::try_from(row).map(Some)
        }
        .instrument(tracing::debug_span!("update_event_details", %event_id)))
    }

    fn update_user_profile(
        &self,
        user_id: UserId,
        update: UserUpdate,
    ) -> StoreFuture<'_, Option<User>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_error("update_user_profile"))?;

            let row = sqlx::query_as::<_, UserRow>(concat!(
                "SELECT ",
                user_columns!(),
                " FROM users WHERE id = $1 FOR UPDATE"
            ))
            .bind(user_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("update_user_profile"))?;

            let Some(row) = row else {
                return Ok(None);
            };
            let mut user = User::try_from(row)?;
            user.apply_update(update);

            // registered_events is deliberately absent from the SET list
            let result = sqlx::query_as::<_, UserRow>(concat!(
                r"
                UPDATE users SET name = $2, email = $3, year = $4, bio = $5
                WHERE id = $1
                RETURNING ",
                user_columns!()
            ))
            .bind(user_id.as_uuid())
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.year.map(|year| year.as_str()))
            .bind(&user.bio)
            .fetch_one(&mut *tx)
            .await;

            let row = match result {
                Ok(row) => row,
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    return Err(EntityStoreError::DuplicateEmail(user.email));
                }
                Err(error) => return Err(db_error("update_user_profile")(error)),
            };

            tx.commit().await.map_err(db_error("update_user_profile"))?;
            User::try_from(row).map(Some)
        }
        .instrument(tracing::debug_span!("update_user_profile", %user_id)))
    }

    fn delete_event(&self, event_id: EventId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM events WHERE id = $1")
                .bind(event_id.as_uuid())
                .execute(&self.pool)
                .await
                .map_err(db_error("delete_event"))?;
            Ok(result.rows_affected() > 0)
        }
        .instrument(tracing::debug_span!("delete_event", %event_id)))
    }

    fn delete_user(&self, user_id: UserId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(user_id.as_uuid())
                .execute(&self.pool)
                .await
                .map_err(db_error("delete_user"))?;
            Ok(result.rows_affected() > 0)
        }
        .instrument(tracing::debug_span!("delete_user", %user_id)))
    }

    fn add_participant(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> StoreFuture<'_, SetMutation<Event>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, EventRow>(concat!(
                r"
                UPDATE events SET participants = array_append(participants, $2)
                WHERE id = $1 AND NOT ($2 = ANY(participants))
                RETURNING ",
                event_columns!()
            ))
            .bind(event_id.as_uuid())
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("add_participant"))?;

            self.event_mutation(row, event_id).await
        }
        .instrument(tracing::debug_span!("add_participant", %event_id, %user_id)))
    }

    fn remove_participant(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> StoreFuture<'_, SetMutation<Event>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, EventRow>(concat!(
                r"
                UPDATE events SET participants = array_remove(participants, $2)
                WHERE id = $1 AND $2 = ANY(participants)
                RETURNING ",
                event_columns!()
            ))
            .bind(event_id.as_uuid())
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("remove_participant"))?;

            self.event_mutation(row, event_id).await
        }
        .instrument(tracing::debug_span!("remove_participant", %event_id, %user_id)))
    }

    fn add_registered_event(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> StoreFuture<'_, SetMutation<User>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, UserRow>(concat!(
                r"
                UPDATE users SET registered_events = array_append(registered_events, $2)
                WHERE id = $1 AND NOT ($2 = ANY(registered_events))
                RETURNING ",
                user_columns!()
            ))
            .bind(user_id.as_uuid())
            .bind(event_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("add_registered_event"))?;

            self.user_mutation(row, user_id).await
        }
        .instrument(tracing::debug_span!("add_registered_event", %user_id, %event_id)))
    }

    fn remove_registered_event(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> StoreFuture<'_, SetMutation<User>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, UserRow>(concat!(
                r"
                UPDATE users SET registered_events = array_remove(registered_events, $2)
                WHERE id = $1 AND $2 = ANY(registered_events)
                RETURNING ",
                user_columns!()
            ))
            .bind(user_id.as_uuid())
            .bind(event_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("remove_registered_event"))?;

            self.user_mutation(row, user_id).await
        }
        .instrument(tracing::debug_span!("remove_registered_event", %user_id, %event_id)))
    }

    fn collapse_participant_duplicates(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> StoreFuture<'_, SetMutation<Event>> {
        Box::pin(async move {
            // Keeps the first occurrence in place; everything else keeps its order.
            let row = sqlx::query_as::<_, EventRow>(concat!(
                r"
                UPDATE events SET participants = ARRAY(
                    SELECT p FROM unnest(participants) WITH ORDINALITY AS t(p, ord)
                    WHERE p <> $2 OR ord = array_position(participants, $2)
                    ORDER BY ord
                )
                WHERE id = $1 AND cardinality(array_positions(participants, $2)) > 1
                RETURNING ",
                event_columns!()
            ))
            .bind(event_id.as_uuid())
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("collapse_participant_duplicates"))?;

            self.event_mutation(row, event_id).await
        }
        .instrument(tracing::debug_span!("collapse_participant_duplicates", %event_id, %user_id)))
    }

    fn collapse_registration_duplicates(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> StoreFuture<'_, SetMutation<User>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, UserRow>(concat!(
                r"
                UPDATE users SET registered_events = ARRAY(
                    SELECT e FROM unnest(registered_events) WITH ORDINALITY AS t(e, ord)
                    WHERE e <> $2 OR ord = array_position(registered_events, $2)
                    ORDER BY ord
                )
                WHERE id = $1 AND cardinality(array_positions(registered_events, $2)) > 1
                RETURNING ",
                user_columns!()
            ))
            .bind(user_id.as_uuid())
            .bind(event_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("collapse_registration_duplicates"))?;

            self.user_mutation(row, user_id).await
        }
        .instrument(tracing::debug_span!("collapse_registration_duplicates", %user_id, %event_id)))
    }

    fn remove_event_from_all_users(&self, event_id: EventId) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE users SET registered_events = array_remove(registered_events, $1)
                WHERE registered_events @> ARRAY[$1]::UUID[]
                ",
            )
            .bind(event_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error("remove_event_from_all_users"))?;
            Ok(result.rows_affected())
        }
        .instrument(tracing::debug_span!("remove_event_from_all_users", %event_id)))
    }

    fn remove_user_from_all_events(&self, user_id: UserId) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE events SET participants = array_remove(participants, $1)
                WHERE participants @> ARRAY[$1]::UUID[]
                ",
            )
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error("remove_user_from_all_events"))?;
            Ok(result.rows_affected())
        }
        .instrument(tracing::debug_span!("remove_user_from_all_events", %user_id)))
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(db_error("ping"))?;
            Ok(())
        })
    }
}
