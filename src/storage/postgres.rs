//! Postgres backend (see `sql/schema.sql`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, Connection, PgPool, Postgres, Row, Transaction};
use tracing::{info_span, Instrument, Span};
use uuid::Uuid;

use crate::auth::{
    role::Role,
    session::Session,
    store::{
        CredentialRecord, CredentialRecordUpdate, LoginRecord, PersistenceLayer, PersistenceTx,
        ProviderKind, SessionStore, UserRecordUpdate,
    },
};

fn query_span(operation: &'static str, statement: &'static str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn session_from_row(row: &PgRow) -> Result<Session> {
    let role: String = row.get("role");
    Ok(Session {
        user_id: row.get("id"),
        email: row.get("email"),
        role: role.parse::<Role>()?,
        must_change_password: row.get("must_change_password"),
        display_name: row.get("name"),
        avatar_ref: row.get("image"),
    })
}

#[async_trait]
impl SessionStore for PgStore {
    async fn get_session(&self, token_hash: &[u8]) -> Result<Option<Session>> {
        // Only unexpired sessions resolve; expired rows are left for cleanup.
        let query = r"
            SELECT users.id, users.email, users.name, users.role,
                   users.must_change_password, users.image
            FROM sessions
            JOIN users ON users.id = sessions.user_id
            WHERE sessions.token_hash = $1
              AND sessions.expires_at > NOW()
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup session")?;

        let Some(row) = row else {
            return Ok(None);
        };

        // Activity only; the expiry is not extended.
        let query = r"
            UPDATE sessions
            SET last_seen_at = NOW()
            WHERE token_hash = $1
        ";
        sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update session last_seen_at")?;

        session_from_row(&row).map(Some)
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        token_hash: &[u8],
        ttl_seconds: i64,
    ) -> Result<()> {
        let query = r"
            INSERT INTO sessions (user_id, token_hash, expires_at)
            VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
        ";
        sqlx::query(query)
            .bind(user_id)
            .bind(token_hash)
            .bind(ttl_seconds)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert session")?;
        Ok(())
    }

    async fn delete_session(&self, token_hash: &[u8]) -> Result<()> {
        // Sign-out is idempotent; it's fine if no rows are deleted.
        let query = "DELETE FROM sessions WHERE token_hash = $1";
        sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete session")?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceLayer for PgStore {
    async fn find_login_record(&self, email: &str) -> Result<Option<LoginRecord>> {
        let query = r"
            SELECT users.id, users.role, users.must_change_password, accounts.password
            FROM users
            JOIN accounts ON accounts.user_id = users.id
            WHERE users.email = $1
              AND accounts.provider_id = 'credential'
              AND accounts.password IS NOT NULL
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup login record")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let role: String = row.get("role");
        Ok(Some(LoginRecord {
            user_id: row.get("id"),
            role: role.parse()?,
            must_change_password: row.get("must_change_password"),
            password_hash: row.get("password"),
        }))
    }

    async fn find_credential_record(
        &self,
        user_id: Uuid,
        provider: &ProviderKind,
    ) -> Result<Option<CredentialRecord>> {
        let query = r"
            SELECT id, user_id, provider_id, password
            FROM accounts
            WHERE user_id = $1 AND provider_id = $2
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(provider.as_str())
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup credential account")?;

        Ok(row.map(|row| {
            let provider: String = row.get("provider_id");
            CredentialRecord {
                id: row.get("id"),
                owner_user_id: row.get("user_id"),
                provider: ProviderKind::from_db(&provider),
                password_hash: row.get("password"),
            }
        }))
    }

    async fn begin(&self) -> Result<Box<dyn PersistenceTx>> {
        let tx = self
            .pool
            .begin()
            .await
            .context("begin password transaction")?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .instrument(info_span!(
                "db.acquire",
                db.system = "postgresql",
                db.operation = "ACQUIRE"
            ))
            .await
            .context("failed to acquire database connection")?;
        conn.ping()
            .instrument(info_span!(
                "db.ping",
                db.system = "postgresql",
                db.operation = "PING"
            ))
            .await
            .context("failed to ping database")
    }
}

/// Open transaction; sqlx rolls back on drop.
struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PersistenceTx for PgTx {
    async fn update_user_record(&mut self, user_id: Uuid, update: &UserRecordUpdate) -> Result<()> {
        let query = r"
            UPDATE users
            SET password = COALESCE($2, password),
                must_change_password = COALESCE($3, must_change_password),
                updated_at = NOW()
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(update.password_hash.as_deref())
            .bind(update.must_change_password)
            .execute(&mut *self.tx)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update user")?;
        anyhow::ensure!(result.rows_affected() == 1, "user {user_id} not found");
        Ok(())
    }

    async fn update_credential_record(
        &mut self,
        credential_id: Uuid,
        update: &CredentialRecordUpdate,
    ) -> Result<()> {
        let query = r"
            UPDATE accounts
            SET password = $2, updated_at = NOW()
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(credential_id)
            .bind(&update.password_hash)
            .execute(&mut *self.tx)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update credential account")?;
        anyhow::ensure!(
            result.rows_affected() == 1,
            "credential account {credential_id} not found"
        );
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .context("commit password transaction")
    }
}
