//! SQL-backed [`UserDirectory`]: the hub's side of the external
//! user-account store. Schema and registration flow (§6 "Persisted state")
//! are owned by that external service; this crate only issues the read and
//! update queries the stream service and the chat handlers need.

use async_trait::async_trait;
use autorc_protocol::CoreError;
use autorc_telegram::{UserDirectory, UserRecord};
use sqlx::SqlitePool;
use tracing::warn;

pub struct SqlUserDirectory {
    pool: SqlitePool,
}

impl SqlUserDirectory {
    pub async fn connect(database_uri: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePool::connect(database_uri).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl UserDirectory for SqlUserDirectory {
    async fn set_chat_id(&self, tg_user: &str, chat_id: i64) -> bool {
        match sqlx::query("UPDATE users SET chat_id = ?1 WHERE tg_user = ?2")
            .bind(chat_id)
            .bind(tg_user)
            .execute(&self.pool)
            .await
        {
            Ok(result) => result.rows_affected() > 0,
            Err(err) => {
                warn!(%err, "set_chat_id query failed");
                false
            },
        }
    }

    async fn set_notification(&self, tg_user: &str, enabled: bool) -> bool {
        match sqlx::query("UPDATE users SET notify_enabled = ?1 WHERE tg_user = ?2")
            .bind(enabled)
            .bind(tg_user)
            .execute(&self.pool)
            .await
        {
            Ok(result) => result.rows_affected() > 0,
            Err(err) => {
                warn!(%err, "set_notification query failed");
                false
            },
        }
    }

    async fn user_exists(&self, tg_user: &str) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1 FROM users WHERE tg_user = ?1")
            .bind(tg_user)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
            .is_some()
    }

    async fn find_by_client_id(&self, cert_id: &str) -> Result<Option<UserRecord>, CoreError> {
        let row = sqlx::query_as::<_, (String, i64, bool)>(
            "SELECT u.tg_user, u.chat_id, u.notify_enabled \
             FROM clients c JOIN users u ON u.id = c.user_id \
             WHERE c.uuid = ?1",
        )
        .bind(cert_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| {
            warn!(%err, "find_by_client_id query failed");
            CoreError::persistence(err)
        })?;

        Ok(row.map(|row| UserRecord {
            tg_user: row.0,
            chat_id: row.1,
            notify_enabled: row.2,
        }))
    }
}
