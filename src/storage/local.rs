use super::{EventStore, StorageMode, StoreResult, in_range};
use crate::models::{AuthSession, Event, EventDraft};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

const ID_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// The whole event set serialized as one JSON array in a single file.
/// Every mutation rewrites the file.
pub struct LocalStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> StoreResult<Vec<Event>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_all(&self, events: &[Event]) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(events)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Runs a read-modify-write cycle while holding the store lock.
    fn modify<T>(&self, apply: impl FnOnce(&mut Vec<Event>) -> T) -> StoreResult<T> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut events = self.read_all()?;
        let out = apply(&mut events);
        self.write_all(&events)?;
        Ok(out)
    }
}

/// `<unix millis><9 base36 chars>`, unique enough for a single profile.
pub(crate) fn generate_local_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}{}", Utc::now().timestamp_millis(), suffix)
}

impl EventStore for LocalStore {
    fn mode(&self) -> StorageMode {
        StorageMode::Local
    }

    fn list(&self, _session: Option<&AuthSession>) -> StoreResult<Vec<Event>> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.read_all()
    }

    fn list_range(
        &self,
        session: Option<&AuthSession>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Event>> {
        let mut events = self.list(session)?;
        events.retain(|event| in_range(event, from, to));
        Ok(events)
    }

    fn create(&self, _session: Option<&AuthSession>, draft: &EventDraft) -> StoreResult<Event> {
        let event = Event::from_draft(generate_local_id(), draft);
        let stored = event.clone();
        self.modify(move |events| events.push(stored))?;
        debug!(id = %event.id, "created local event");
        Ok(event)
    }

    fn update(
        &self,
        _session: Option<&AuthSession>,
        id: &str,
        draft: &EventDraft,
    ) -> StoreResult<Event> {
        let event = Event::from_draft(id.to_string(), draft);
        let replaced = self.modify(|events| {
            events
                .iter_mut()
                .find(|existing| existing.id == id)
                .map(|existing| *existing = event.clone())
                .is_some()
        })?;
        if !replaced {
            debug!(id, "update for unknown local event left the file untouched");
        }
        Ok(event)
    }

    fn delete(&self, _session: Option<&AuthSession>, id: &str) -> StoreResult<()> {
        let removed = self.modify(|events| {
            let before = events.len();
            events.retain(|event| event.id != id);
            before != events.len()
        })?;
        if !removed {
            debug!(id, "delete for unknown local event");
        }
        Ok(())
    }

    fn check(&self, _session: Option<&AuthSession>) -> StoreResult<()> {
        Ok(())
    }
}
