use async_trait::async_trait;
use autorc_protocol::CoreError;

/// Contract for the external user-account service: a SQL-backed HTTP API
/// (registration/login/JWT) that is explicitly out of scope for this
/// crate. Only this trait's shape matters here; a real deployment wires in
/// an HTTP-client implementation, tests wire in an in-memory fake.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Records the chat id for the first `/menu` interaction. Returns
    /// `false` if `tg_user` has no matching row.
    async fn set_chat_id(&self, tg_user: &str, chat_id: i64) -> bool;

    /// Flips the persisted notification preference. Returns `false` if
    /// `tg_user` has no matching row.
    async fn set_notification(&self, tg_user: &str, enabled: bool) -> bool;

    /// Whether a user row exists for `tg_user`.
    async fn user_exists(&self, tg_user: &str) -> bool;

    /// Looks up the client UUID associated with a validated peer
    /// certificate's `cert_id`, returning the owning `tg_user` and chat id
    /// if the row exists. Mirrors the hub's `FindByClientID` step (§4.3):
    /// `Ok(None)` means no such client id, `Err(_)` means the lookup itself
    /// failed and the caller must not treat that as an unknown client.
    async fn find_by_client_id(&self, cert_id: &str) -> Result<Option<UserRecord>, CoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub tg_user: String,
    pub chat_id: i64,
    pub notify_enabled: bool,
}

/// In-memory [`UserDirectory`] used by tests in this crate and by the hub's
/// own integration tests; never wired into a production binary.
#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use std::collections::HashMap;
    use std::sync::RwLock;

    use super::{CoreError, UserDirectory, UserRecord};

    #[derive(Default)]
    pub struct InMemoryUserDirectory {
        rows: RwLock<HashMap<String, UserRecord>>,
        by_client_id: RwLock<HashMap<String, String>>,
    }

    impl InMemoryUserDirectory {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, cert_id: &str, record: UserRecord) {
            self.by_client_id
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(cert_id.to_string(), record.tg_user.clone());
            self.rows
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(record.tg_user.clone(), record);
        }
    }

    #[async_trait::async_trait]
    impl UserDirectory for InMemoryUserDirectory {
        async fn set_chat_id(&self, tg_user: &str, chat_id: i64) -> bool {
            let mut rows = self
                .rows
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            match rows.get_mut(tg_user) {
                Some(row) => {
                    row.chat_id = chat_id;
                    true
                },
                None => false,
            }
        }

        async fn set_notification(&self, tg_user: &str, enabled: bool) -> bool {
            let mut rows = self
                .rows
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            match rows.get_mut(tg_user) {
                Some(row) => {
                    row.notify_enabled = enabled;
                    true
                },
                None => false,
            }
        }

        async fn user_exists(&self, tg_user: &str) -> bool {
            self.rows
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .contains_key(tg_user)
        }

        async fn find_by_client_id(&self, cert_id: &str) -> Result<Option<UserRecord>, CoreError> {
            let by_client_id = self
                .by_client_id
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let Some(tg_user) = by_client_id.get(cert_id) else {
                return Ok(None);
            };
            Ok(self
                .rows
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(tg_user)
                .cloned())
        }
    }
}
