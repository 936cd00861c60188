//! Postgres-backed storage for guild configuration and birthday records.
//!
//! All guilds share two tables keyed by `guild_id`; identifiers are always
//! bound as query parameters, never interpolated.

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serenity::async_trait;
use sqlx::{FromRow, PgPool};

/// A guild that completed `/setup_birthday_boi`.
///
/// The announcement channel can be absent for a guild whose setup never
/// finished; the scan skips such guilds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildConfig {
    pub guild_id: u64,
    pub announcement_channel: Option<u64>,
}

/// One user's registered birthday in one guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BirthdayRecord {
    pub guild_id: u64,
    pub user_id: u64,
    pub username: String,
    pub day: u32,
    pub month: u32,
    pub year: Option<i32>,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
}

/// Fields written by `/set_birthday` and `/edit_birthday`.
#[derive(Debug, Clone)]
pub struct NewBirthday {
    pub guild_id: u64,
    pub user_id: u64,
    pub username: String,
    pub day: u32,
    pub month: u32,
    pub year: Option<i32>,
    pub timezone: String,
}

/// Read operations the birthday scanner relies on. Failures are retryable
/// I/O errors; the scanner treats one guild's failure as non-fatal.
#[async_trait]
pub trait BirthdayStore: Send + Sync {
    async fn list_guilds(&self) -> Result<Vec<GuildConfig>>;
    async fn list_birthdays(&self, guild_id: u64) -> Result<Vec<BirthdayRecord>>;
    async fn get_birthday(&self, guild_id: u64, user_id: u64) -> Result<Option<BirthdayRecord>>;
}

#[derive(FromRow)]
struct GuildRow {
    guild_id: i64,
    announcement_channel_id: Option<i64>,
}

impl From<GuildRow> for GuildConfig {
    fn from(row: GuildRow) -> Self {
        Self {
            guild_id: row.guild_id as u64,
            announcement_channel: row.announcement_channel_id.map(|id| id as u64),
        }
    }
}

#[derive(FromRow)]
struct BirthdayRow {
    guild_id: i64,
    user_id: i64,
    username: String,
    birth_day: i32,
    birth_month: i32,
    birth_year: Option<i32>,
    timezone: String,
    created_at: DateTime<Utc>,
}

impl From<BirthdayRow> for BirthdayRecord {
    fn from(row: BirthdayRow) -> Self {
        Self {
            guild_id: row.guild_id as u64,
            user_id: row.user_id as u64,
            username: row.username,
            day: row.birth_day as u32,
            month: row.birth_month as u32,
            year: row.birth_year,
            timezone: row.timezone,
            created_at: row.created_at,
        }
    }
}

const SELECT_BIRTHDAY: &str = "SELECT guild_id, user_id, username, birth_day, birth_month, \
     birth_year, timezone, created_at FROM birthdays";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the shared tables if they do not exist yet.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS guilds (
                guild_id BIGINT PRIMARY KEY,
                announcement_channel_id BIGINT
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create guilds table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS birthdays (
                guild_id BIGINT NOT NULL,
                user_id BIGINT NOT NULL,
                username TEXT NOT NULL,
                birth_day INTEGER NOT NULL,
                birth_month INTEGER NOT NULL,
                birth_year INTEGER,
                timezone TEXT NOT NULL DEFAULT 'UTC',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (guild_id, user_id)
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create birthdays table")?;

        Ok(())
    }

    pub async fn get_guild(&self, guild_id: u64) -> Result<Option<GuildConfig>> {
        let row: Option<GuildRow> =
            sqlx::query_as("SELECT guild_id, announcement_channel_id FROM guilds WHERE guild_id = $1")
                .bind(guild_id as i64)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to fetch guild configuration")?;
        Ok(row.map(Into::into))
    }

    pub async fn upsert_guild_config(&self, guild_id: u64, channel_id: u64) -> Result<()> {
        sqlx::query(
            "INSERT INTO guilds (guild_id, announcement_channel_id) VALUES ($1, $2)
             ON CONFLICT (guild_id)
             DO UPDATE SET announcement_channel_id = EXCLUDED.announcement_channel_id",
        )
        .bind(guild_id as i64)
        .bind(channel_id as i64)
        .execute(&self.pool)
        .await
        .context("Failed to upsert guild configuration")?;
        Ok(())
    }

    pub async fn upsert_birthday(&self, birthday: &NewBirthday) -> Result<()> {
        sqlx::query(
            "INSERT INTO birthdays (guild_id, user_id, username, birth_day, birth_month, \
             birth_year, timezone)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (guild_id, user_id)
             DO UPDATE SET username = EXCLUDED.username,
                           birth_day = EXCLUDED.birth_day,
                           birth_month = EXCLUDED.birth_month,
                           birth_year = EXCLUDED.birth_year,
                           timezone = EXCLUDED.timezone",
        )
        .bind(birthday.guild_id as i64)
        .bind(birthday.user_id as i64)
        .bind(&birthday.username)
        .bind(birthday.day as i32)
        .bind(birthday.month as i32)
        .bind(birthday.year)
        .bind(&birthday.timezone)
        .execute(&self.pool)
        .await
        .context("Failed to upsert birthday")?;
        Ok(())
    }

    /// Returns whether a record existed.
    pub async fn delete_birthday(&self, guild_id: u64, user_id: u64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM birthdays WHERE guild_id = $1 AND user_id = $2")
            .bind(guild_id as i64)
            .bind(user_id as i64)
            .execute(&self.pool)
            .await
            .context("Failed to delete birthday")?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes the guild configuration and all of the guild's birthday data
    /// in one transaction, so a partial deletion never becomes visible.
    /// Returns whether the guild was set up at all.
    pub async fn delete_guild_data(&self, guild_id: u64) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("DELETE FROM birthdays WHERE guild_id = $1")
            .bind(guild_id as i64)
            .execute(&mut *tx)
            .await
            .context("Failed to delete guild birthdays")?;

        let result = sqlx::query("DELETE FROM guilds WHERE guild_id = $1")
            .bind(guild_id as i64)
            .execute(&mut *tx)
            .await
            .context("Failed to delete guild configuration")?;

        tx.commit().await.context("Failed to commit guild deletion")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl BirthdayStore for PgStore {
    async fn list_guilds(&self) -> Result<Vec<GuildConfig>> {
        let rows: Vec<GuildRow> =
            sqlx::query_as("SELECT guild_id, announcement_channel_id FROM guilds")
                .fetch_all(&self.pool)
                .await
                .context("Failed to list guilds")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_birthdays(&self, guild_id: u64) -> Result<Vec<BirthdayRecord>> {
        let query = format!("{SELECT_BIRTHDAY} WHERE guild_id = $1 ORDER BY birth_month, birth_day");
        let rows: Vec<BirthdayRow> = sqlx::query_as(&query)
            .bind(guild_id as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list birthdays")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_birthday(&self, guild_id: u64, user_id: u64) -> Result<Option<BirthdayRecord>> {
        let query = format!("{SELECT_BIRTHDAY} WHERE guild_id = $1 AND user_id = $2");
        let row: Option<BirthdayRow> = sqlx::query_as(&query)
            .bind(guild_id as i64)
            .bind(user_id as i64)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch birthday")?;
        Ok(row.map(Into::into))
    }
}
