//! Event persistence. `open` picks the backing store once at startup:
//! a Supabase-backed store with local fallback when the remote is
//! configured, otherwise the local file alone.

mod local;
mod remote;

pub use local::LocalStore;
pub use remote::RemoteStore;

use crate::config::Config;
use crate::models::{AuthSession, Event, EventDraft};
use chrono::{DateTime, Utc};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("You must be signed in to change events")]
    Unauthenticated,

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote store returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Event not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageMode {
    Local,
    Remote,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::Local => "local",
            StorageMode::Remote => "supabase",
        }
    }
}

/// Event CRUD scoped to the signed-in principal. Implementations that do
/// not need a session ignore it.
pub trait EventStore: Send + Sync {
    fn mode(&self) -> StorageMode;

    /// All events visible to `session`, ordered as the backend returns them.
    fn list(&self, session: Option<&AuthSession>) -> StoreResult<Vec<Event>>;

    /// Events starting at or after `from` and ending at or before `to`.
    fn list_range(
        &self,
        session: Option<&AuthSession>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Event>>;

    fn create(&self, session: Option<&AuthSession>, draft: &EventDraft) -> StoreResult<Event>;

    fn update(
        &self,
        session: Option<&AuthSession>,
        id: &str,
        draft: &EventDraft,
    ) -> StoreResult<Event>;

    fn delete(&self, session: Option<&AuthSession>, id: &str) -> StoreResult<()>;

    /// Probes the backend without changing anything.
    fn check(&self, session: Option<&AuthSession>) -> StoreResult<()>;
}

pub fn open(config: &Config) -> Arc<dyn EventStore> {
    let local = LocalStore::new(config.data.events_path.clone());
    if !config.remote.is_configured() {
        return Arc::new(local);
    }
    match RemoteStore::new(&config.remote) {
        Ok(remote) => Arc::new(FallbackStore::new(remote, local)),
        Err(err) => {
            warn!(error = %err, "could not build remote client, using local storage");
            Arc::new(local)
        }
    }
}

pub(crate) fn in_range(event: &Event, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    event.start >= from && event.end <= to
}

/// Remote store that degrades to the local file whenever a call fails.
/// Mutations without a session are rejected rather than written locally.
pub struct FallbackStore {
    remote: RemoteStore,
    local: LocalStore,
}

impl FallbackStore {
    pub fn new(remote: RemoteStore, local: LocalStore) -> Self {
        Self { remote, local }
    }

    fn require_session(session: Option<&AuthSession>) -> StoreResult<&AuthSession> {
        session.ok_or(StoreError::Unauthenticated)
    }
}

impl EventStore for FallbackStore {
    fn mode(&self) -> StorageMode {
        StorageMode::Remote
    }

    fn list(&self, session: Option<&AuthSession>) -> StoreResult<Vec<Event>> {
        let Some(session) = session else {
            return Ok(Vec::new());
        };
        match self.remote.list(session) {
            Ok(events) => Ok(events),
            Err(err) => {
                warn!(error = %err, "remote list failed, falling back to local storage");
                self.local.list(None)
            }
        }
    }

    fn list_range(
        &self,
        session: Option<&AuthSession>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Event>> {
        let Some(session) = session else {
            return Ok(Vec::new());
        };
        match self.remote.list_range(session, from, to) {
            Ok(events) => Ok(events),
            Err(err) => {
                warn!(error = %err, "remote range query failed, falling back to local storage");
                self.local.list_range(None, from, to)
            }
        }
    }

    fn create(&self, session: Option<&AuthSession>, draft: &EventDraft) -> StoreResult<Event> {
        let session = Self::require_session(session)?;
        match self.remote.create(session, draft) {
            Ok(event) => Ok(event),
            Err(err) => {
                warn!(error = %err, "remote create failed, falling back to local storage");
                self.local.create(None, draft)
            }
        }
    }

    fn update(
        &self,
        session: Option<&AuthSession>,
        id: &str,
        draft: &EventDraft,
    ) -> StoreResult<Event> {
        let session = Self::require_session(session)?;
        match self.remote.update(session, id, draft) {
            Ok(event) => Ok(event),
            Err(err) => {
                warn!(id, error = %err, "remote update failed, falling back to local storage");
                self.local.update(None, id, draft)
            }
        }
    }

    fn delete(&self, session: Option<&AuthSession>, id: &str) -> StoreResult<()> {
        let session = Self::require_session(session)?;
        match self.remote.delete(session, id) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(id, error = %err, "remote delete failed, falling back to local storage");
                self.local.delete(None, id)
            }
        }
    }

    fn check(&self, session: Option<&AuthSession>) -> StoreResult<()> {
        self.remote.check(session)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::Principal;
    use chrono::TimeZone;
    use std::path::PathBuf;

    pub fn temp_events_path(label: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        let stamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        dir.push(format!("scheduler-test-{label}-{}-{stamp}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir.join("events.json")
    }

    pub fn draft(title: &str, day: u32) -> EventDraft {
        let start = Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap();
        EventDraft {
            title: title.to_string(),
            start,
            end: start + chrono::Duration::hours(1),
            description: None,
            color: None,
        }
    }

    pub fn session() -> AuthSession {
        AuthSession {
            principal: Principal {
                id: "user-1".to_string(),
                email: "ada@example.com".to_string(),
                display_name: Some("Ada".to_string()),
            },
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now().timestamp() + 3600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::config::RemoteConfig;
    use chrono::TimeZone;

    fn unreachable_fallback(label: &str) -> (FallbackStore, LocalStore) {
        let path = temp_events_path(label);
        // Nothing listens on port 1, so every remote call fails fast.
        let remote = RemoteStore::new(&RemoteConfig {
            url: "http://127.0.0.1:1".to_string(),
            anon_key: "anon".to_string(),
        })
        .expect("client");
        (
            FallbackStore::new(remote, LocalStore::new(path.clone())),
            LocalStore::new(path),
        )
    }

    #[test]
    fn unconfigured_remote_opens_local_store() {
        let mut config = Config::default();
        config.data.events_path = temp_events_path("open");
        let store = open(&config);
        assert_eq!(store.mode(), StorageMode::Local);

        config.remote.url = "http://127.0.0.1:1".to_string();
        config.remote.anon_key = "anon".to_string();
        assert_eq!(open(&config).mode(), StorageMode::Remote);
    }

    #[test]
    fn mutations_without_session_fail_when_remote_configured() {
        let (store, local) = unreachable_fallback("unauth");
        let err = store.create(None, &draft("Standup", 1)).unwrap_err();
        assert!(matches!(err, StoreError::Unauthenticated));
        assert!(matches!(
            store.update(None, "x", &draft("Standup", 1)),
            Err(StoreError::Unauthenticated)
        ));
        assert!(matches!(store.delete(None, "x"), Err(StoreError::Unauthenticated)));
        assert!(local.list(None).expect("local list").is_empty());
    }

    #[test]
    fn list_without_session_is_empty() {
        let (store, local) = unreachable_fallback("anon-list");
        local.create(None, &draft("Private", 2)).expect("seed");
        assert!(store.list(None).expect("list").is_empty());
    }

    #[test]
    fn remote_failures_degrade_to_local_storage() {
        let (store, local) = unreachable_fallback("fallback");
        let session = session();

        let created = store.create(Some(&session), &draft("Review", 3)).expect("create");
        assert_eq!(local.list(None).expect("local").len(), 1);

        let listed = store.list(Some(&session)).expect("list");
        assert_eq!(listed, vec![created.clone()]);

        let mut changed = draft("Review v2", 3);
        changed.color = Some("#ff0000".to_string());
        let updated = store
            .update(Some(&session), &created.id, &changed)
            .expect("update");
        assert_eq!(updated.id, created.id);
        assert_eq!(local.list(None).expect("local")[0].title, "Review v2");

        store.delete(Some(&session), &created.id).expect("delete");
        assert!(local.list(None).expect("local").is_empty());
        assert!(store.check(Some(&session)).is_err());
    }

    #[test]
    fn update_of_row_missing_remotely_falls_back_without_adding() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("PATCH", "/rest/v1/events")
            .match_query(mockito::Matcher::UrlEncoded("id".into(), "eq.gone".into()))
            .with_status(200)
            .with_body("[]")
            .create();
        let path = temp_events_path("patch-empty");
        let remote = RemoteStore::new(&RemoteConfig {
            url: server.url(),
            anon_key: "anon".to_string(),
        })
        .expect("client");
        let store = FallbackStore::new(remote, LocalStore::new(path.clone()));

        let event = store
            .update(Some(&session()), "gone", &draft("Renamed", 4))
            .expect("fallback update");
        assert_eq!(event.id, "gone");
        assert!(LocalStore::new(path).list(None).expect("local").is_empty());
    }

    #[test]
    fn range_query_falls_back_with_same_filter() {
        let (store, local) = unreachable_fallback("range");
        local.create(None, &draft("Inside", 10)).expect("seed");
        local.create(None, &draft("Outside", 20)).expect("seed");
        let from = Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap();
        let events = store.list_range(Some(&session()), from, to).expect("range");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Inside");
    }
}
