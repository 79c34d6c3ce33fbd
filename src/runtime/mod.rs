use crate::app::{App, StatusCheck};
use crate::models::Event;
use crate::session::SessionNotice;
use crate::storage::StoreResult;
use chrono::Local;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use tracing::{debug, warn};

pub const LOAD_FAILED_MESSAGE: &str = "Failed to load events. Please try again.";

pub enum StoreOutcome {
    Loaded(StoreResult<Vec<Event>>),
    Created(StoreResult<Event>),
    Updated(StoreResult<Event>),
    Deleted { id: String, result: StoreResult<()> },
    Checked(StoreResult<()>),
}

struct JobResult {
    generation: u64,
    outcome: StoreOutcome,
}

/// Store calls run on their own threads; results come back tagged with the
/// generation that was current when the job started.
pub struct Jobs {
    sender: Sender<JobResult>,
    receiver: Receiver<JobResult>,
    pending: usize,
}

impl Default for Jobs {
    fn default() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            pending: 0,
        }
    }
}

impl Jobs {
    pub fn spawn(&mut self, generation: u64, job: impl FnOnce() -> StoreOutcome + Send + 'static) {
        self.pending += 1;
        let sender = self.sender.clone();
        thread::spawn(move || {
            let _ = sender.send(JobResult {
                generation,
                outcome: job(),
            });
        });
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    fn try_next(&mut self) -> Option<JobResult> {
        match self.receiver.try_recv() {
            Ok(result) => {
                self.pending = self.pending.saturating_sub(1);
                Some(result)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    #[cfg(test)]
    fn wait_next(&mut self) -> Option<JobResult> {
        let result = self
            .receiver
            .recv_timeout(std::time::Duration::from_secs(10))
            .ok()?;
        self.pending = self.pending.saturating_sub(1);
        Some(result)
    }
}

pub fn tick(app: &mut App) {
    handle_session(app);
    while let Some(result) = app.jobs.try_next() {
        handle_job(app, result);
    }
    app.session.refresh_if_needed();

    if let Some(expiry) = app.toast_expiry
        && Local::now() >= expiry
    {
        app.toast_expiry = None;
        app.toast_message = None;
    }
}

fn handle_session(app: &mut App) {
    for notice in app.session.poll() {
        match notice {
            SessionNotice::Toast(message) => app.toast(message),
            SessionNotice::PrincipalChanged => app.on_principal_changed(),
        }
    }
}

fn handle_job(app: &mut App, result: JobResult) {
    if result.generation != app.generation {
        // Started under a different principal.
        return;
    }
    apply_outcome(app, result.outcome);
}

pub fn apply_outcome(app: &mut App, outcome: StoreOutcome) {
    match outcome {
        StoreOutcome::Loaded(Ok(events)) => {
            app.events_loading = false;
            app.events = events;
            app.clamp_event_cursor();
        }
        StoreOutcome::Loaded(Err(err)) => {
            warn!(error = %err, "loading events failed");
            app.events_loading = false;
            app.error_banner = Some(LOAD_FAILED_MESSAGE.to_string());
        }
        StoreOutcome::Created(Ok(event)) => {
            if submitted_form(app, None) {
                app.close_form();
            }
            app.toast(format!("Created \"{}\"", event.title));
            app.events.push(event);
        }
        StoreOutcome::Updated(Ok(event)) => {
            if submitted_form(app, Some(&event.id)) {
                app.close_form();
            }
            app.toast(format!("Saved \"{}\"", event.title));
            // An update never adds to the list; an id missing here was
            // deleted meanwhile and is not persisted anywhere.
            match app.events.iter_mut().find(|e| e.id == event.id) {
                Some(existing) => *existing = event,
                None => debug!(id = %event.id, "updated event is no longer listed"),
            }
        }
        StoreOutcome::Created(Err(err)) | StoreOutcome::Updated(Err(err)) => {
            warn!(error = %err, "saving event failed");
            if let Some(form) = app.form.as_mut().filter(|form| form.saving) {
                form.saving = false;
                form.error = Some(err.to_string());
            }
            app.error_banner = Some(format!("Failed to save event: {err}"));
        }
        StoreOutcome::Deleted { id, result: Ok(()) } => {
            app.events.retain(|event| event.id != id);
            app.clamp_event_cursor();
            app.toast("Event deleted.");
        }
        StoreOutcome::Deleted { id, result: Err(err) } => {
            warn!(id, error = %err, "deleting event failed");
            app.error_banner = Some(format!("Failed to delete event: {err}"));
        }
        StoreOutcome::Checked(result) => {
            app.status_check = Some(match result {
                Ok(()) => StatusCheck::Reachable,
                Err(err) => StatusCheck::Failed(err.to_string()),
            });
        }
    }
}

/// True when the open form is the one whose save just finished: it is
/// still waiting on a save and edits the same event.
fn submitted_form(app: &App, id: Option<&str>) -> bool {
    app.form
        .as_ref()
        .is_some_and(|form| form.saving && form.editing.as_deref() == id)
}

/// Blocks until every spawned store job has reported, applying results as
/// `tick` would.
#[cfg(test)]
pub(crate) fn settle(app: &mut App) {
    while app.jobs.pending() > 0 {
        let Some(result) = app.jobs.wait_next() else {
            break;
        };
        handle_job(app, result);
    }
}
