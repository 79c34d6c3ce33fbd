//! Tracks who is signed in. Network work runs on background threads and
//! reports back over a channel that `poll` drains once per tick.

use crate::config::Config;
use crate::integrations::supabase::{self, AuthClient, AuthError, SignInDisplay};
use crate::models::{AuthSession, Principal};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use tracing::{debug, info, warn};

/// Seconds before expiry at which the access token is refreshed.
const REFRESH_WINDOW_SECS: i64 = 60;

#[derive(Debug)]
pub enum SessionEvent {
    Resolved { epoch: u64, stored: StoredSession },
    SignedIn(AuthSession),
    SignInFailed(AuthError),
    SignedOut,
    Refreshed { epoch: u64, session: AuthSession },
    RefreshFailed { epoch: u64, error: AuthError },
}

/// What the session file turned out to hold at startup.
#[derive(Debug)]
pub enum StoredSession {
    Missing,
    /// Confirmed by the server, possibly with fresh tokens.
    Valid(AuthSession),
    /// Server unreachable; the file is kept as it is.
    Unverified(AuthSession),
    Rejected,
}

/// What the app needs to react to after a `poll`.
#[derive(Debug, PartialEq)]
pub enum SessionNotice {
    PrincipalChanged,
    Toast(String),
}

pub struct SessionManager {
    client: Option<AuthClient>,
    session_path: PathBuf,
    current: Option<AuthSession>,
    /// Bumped whenever the session is replaced by a sign-in or sign-out.
    /// Restore and refresh results from an older epoch are dropped.
    epoch: u64,
    loading: bool,
    refreshing: bool,
    pending_sign_in: Option<SignInDisplay>,
    cancel_sign_in: Option<Arc<AtomicBool>>,
    sender: Sender<SessionEvent>,
    receiver: Receiver<SessionEvent>,
}

impl SessionManager {
    pub fn new(config: &Config) -> Self {
        let client = match AuthClient::new(&config.remote, &config.auth) {
            Ok(client) => Some(client),
            Err(AuthError::NotConfigured) => None,
            Err(err) => {
                warn!(error = %err, "auth client unavailable");
                None
            }
        };
        Self::with_client(client, config.data.session_path.clone())
    }

    fn with_client(client: Option<AuthClient>, session_path: PathBuf) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            client,
            session_path,
            current: None,
            epoch: 0,
            loading: false,
            refreshing: false,
            pending_sign_in: None,
            cancel_sign_in: None,
            sender,
            receiver,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.current.as_ref().map(|session| &session.principal)
    }

    pub fn session(&self) -> Option<&AuthSession> {
        self.current.as_ref()
    }

    /// True until the stored session has been resolved at startup.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn pending_sign_in(&self) -> Option<&SignInDisplay> {
        self.pending_sign_in.as_ref()
    }

    /// Resolves the session persisted by a previous run. Without a remote
    /// backend there is nothing to resolve and no principal ever exists.
    pub fn start(&mut self) {
        let Some(client) = self.client.clone() else {
            return;
        };
        self.loading = true;
        let epoch = self.epoch;
        let path = self.session_path.clone();
        let sender = self.sender.clone();
        thread::spawn(move || {
            let stored = resolve_stored(&client, &path);
            let _ = sender.send(SessionEvent::Resolved { epoch, stored });
        });
    }

    pub fn sign_in(&mut self) -> Result<(), AuthError> {
        let client = self.client.clone().ok_or(AuthError::NotConfigured)?;
        self.cancel_pending_sign_in();

        let flow = client.start_sign_in()?;
        if let Err(err) = open::that(&flow.display.auth_url) {
            warn!(error = %err, "could not open browser, showing the sign-in URL instead");
        }
        self.pending_sign_in = Some(flow.display.clone());
        self.cancel_sign_in = Some(flow.cancel_handle());

        let sender = self.sender.clone();
        thread::spawn(move || {
            let event = match client.finish_sign_in(&flow) {
                Ok(session) => SessionEvent::SignedIn(session),
                Err(err) => SessionEvent::SignInFailed(err),
            };
            let _ = sender.send(event);
        });
        Ok(())
    }

    pub fn cancel_pending_sign_in(&mut self) {
        if let Some(flag) = self.cancel_sign_in.take() {
            flag.store(true, Ordering::Relaxed);
        }
        self.pending_sign_in = None;
    }

    /// Drops the local session right away; revoking the token on the server
    /// happens in the background and its outcome is only logged.
    pub fn sign_out(&mut self) {
        let Some(session) = self.current.take() else {
            return;
        };
        self.epoch += 1;
        self.forget();
        if let Some(client) = self.client.clone() {
            thread::spawn(move || {
                if let Err(err) = client.sign_out(&session.access_token) {
                    warn!(error = %err, "remote sign-out failed");
                }
            });
        }
        let _ = self.sender.send(SessionEvent::SignedOut);
    }

    pub fn refresh_if_needed(&mut self) {
        if self.refreshing || self.loading {
            return;
        }
        let (Some(client), Some(session)) = (self.client.clone(), self.current.as_ref()) else {
            return;
        };
        if !session.expires_within(REFRESH_WINDOW_SECS) {
            return;
        }
        self.refreshing = true;
        let epoch = self.epoch;
        let refresh_token = session.refresh_token.clone();
        let sender = self.sender.clone();
        thread::spawn(move || {
            let event = match client.refresh(&refresh_token) {
                Ok(session) => SessionEvent::Refreshed { epoch, session },
                Err(error) => SessionEvent::RefreshFailed { epoch, error },
            };
            let _ = sender.send(event);
        });
    }

    pub fn poll(&mut self) -> Vec<SessionNotice> {
        let mut notices = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => self.apply(event, &mut notices),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        notices
    }

    fn apply(&mut self, event: SessionEvent, notices: &mut Vec<SessionNotice>) {
        match event {
            SessionEvent::Resolved { epoch, stored } => {
                self.loading = false;
                if epoch != self.epoch {
                    debug!("dropping stored session resolved after a newer sign-in");
                    return;
                }
                let session = match stored {
                    StoredSession::Missing => None,
                    StoredSession::Valid(session) => {
                        self.persist(&session);
                        Some(session)
                    }
                    StoredSession::Unverified(session) => Some(session),
                    StoredSession::Rejected => {
                        self.forget();
                        None
                    }
                };
                if let Some(session) = &session {
                    info!(user = %session.principal.email, "restored session");
                }
                self.replace(session, notices);
            }
            SessionEvent::SignedIn(session) => {
                self.pending_sign_in = None;
                self.cancel_sign_in = None;
                self.epoch += 1;
                self.persist(&session);
                info!(user = %session.principal.email, "signed in");
                notices.push(SessionNotice::Toast(format!(
                    "Signed in as {}",
                    session.principal.label()
                )));
                self.replace(Some(session), notices);
            }
            SessionEvent::SignInFailed(AuthError::Cancelled) => {}
            SessionEvent::SignInFailed(err) => {
                self.pending_sign_in = None;
                self.cancel_sign_in = None;
                warn!(error = %err, "sign-in failed");
                notices.push(SessionNotice::Toast(err.to_string()));
            }
            SessionEvent::SignedOut => {
                info!("signed out");
                notices.push(SessionNotice::Toast("Signed out.".to_string()));
                notices.push(SessionNotice::PrincipalChanged);
            }
            SessionEvent::Refreshed { epoch, session } => {
                self.refreshing = false;
                if epoch != self.epoch {
                    debug!("dropping refreshed tokens for a replaced session");
                    return;
                }
                self.persist(&session);
                self.replace(Some(session), notices);
            }
            SessionEvent::RefreshFailed { epoch, error } => {
                self.refreshing = false;
                if epoch != self.epoch {
                    return;
                }
                warn!(error = %error, "token refresh failed");
                if matches!(error, AuthError::Status { .. }) {
                    self.epoch += 1;
                    self.forget();
                    notices.push(SessionNotice::Toast(
                        "Session expired. Please sign in again.".to_string(),
                    ));
                    self.replace(None, notices);
                }
            }
        }
    }

    fn persist(&self, session: &AuthSession) {
        if let Err(err) = supabase::save_session(&self.session_path, session) {
            warn!(error = %err, "could not persist session");
        }
    }

    fn forget(&self) {
        if let Err(err) = supabase::clear_session(&self.session_path) {
            warn!(error = %err, "could not remove stored session");
        }
    }

    /// Swaps the current session, announcing a change only when the
    /// principal itself differs. Token refreshes stay silent.
    fn replace(&mut self, session: Option<AuthSession>, notices: &mut Vec<SessionNotice>) {
        let before = self.principal().map(|p| p.id.clone());
        let after = session.as_ref().map(|s| s.principal.id.clone());
        self.current = session;
        if before != after {
            notices.push(SessionNotice::PrincipalChanged);
        }
    }

    #[cfg(test)]
    pub(crate) fn disabled() -> Self {
        let path = crate::storage::test_support::temp_events_path("session")
            .with_file_name("session.json");
        Self::with_client(None, path)
    }

    #[cfg(test)]
    pub(crate) fn inject(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }
}

/// Reads the session file and confirms it with the server. Transport
/// failures keep the stored session so an offline start still has one.
/// The file itself is only touched once the result is applied.
fn resolve_stored(client: &AuthClient, path: &std::path::Path) -> StoredSession {
    let stored = match supabase::load_session(path) {
        Ok(Some(stored)) => stored,
        Ok(None) => return StoredSession::Missing,
        Err(err) => {
            warn!(error = %err, "stored session unreadable, ignoring it");
            return StoredSession::Missing;
        }
    };
    match client.revalidate(stored.clone()) {
        Ok(session) => StoredSession::Valid(session),
        Err(err @ AuthError::Status { .. }) => {
            warn!(error = %err, "stored session rejected");
            StoredSession::Rejected
        }
        Err(err) => {
            warn!(error = %err, "could not reach auth server, keeping stored session");
            StoredSession::Unverified(stored)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::{session, temp_events_path};

    fn manager_at(label: &str) -> (SessionManager, PathBuf) {
        let path = temp_events_path(label).with_file_name("session.json");
        (SessionManager::with_client(None, path.clone()), path)
    }

    fn other_user() -> AuthSession {
        let mut other = session();
        other.principal.id = "user-2".to_string();
        other.principal.email = "grace@example.com".to_string();
        other
    }

    #[test]
    fn local_only_mode_has_no_principal() {
        let mut manager = SessionManager::disabled();
        manager.start();
        assert!(!manager.is_enabled());
        assert!(!manager.is_loading());
        assert!(manager.principal().is_none());
        assert!(matches!(manager.sign_in(), Err(AuthError::NotConfigured)));
        assert!(manager.poll().is_empty());
    }

    #[test]
    fn resolution_announces_principal() {
        let (mut manager, path) = manager_at("resolved");
        manager.loading = true;
        manager.inject(SessionEvent::Resolved {
            epoch: 0,
            stored: StoredSession::Valid(session()),
        });
        assert_eq!(manager.poll(), vec![SessionNotice::PrincipalChanged]);
        assert!(!manager.is_loading());
        assert_eq!(manager.principal().map(|p| p.id.as_str()), Some("user-1"));
        assert!(path.exists());
    }

    #[test]
    fn empty_resolution_is_silent() {
        let mut manager = SessionManager::disabled();
        manager.loading = true;
        manager.inject(SessionEvent::Resolved {
            epoch: 0,
            stored: StoredSession::Missing,
        });
        assert!(manager.poll().is_empty());
        assert!(!manager.is_loading());
    }

    #[test]
    fn rejected_resolution_removes_session_file() {
        let (mut manager, path) = manager_at("rejected");
        supabase::save_session(&path, &session()).expect("save");
        manager.loading = true;
        manager.inject(SessionEvent::Resolved {
            epoch: 0,
            stored: StoredSession::Rejected,
        });
        assert!(manager.poll().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn late_resolution_keeps_newer_sign_in() {
        let (mut manager, path) = manager_at("late-resolve");
        manager.loading = true;
        let epoch = manager.epoch;
        manager.inject(SessionEvent::SignedIn(other_user()));
        manager.inject(SessionEvent::Resolved {
            epoch,
            stored: StoredSession::Rejected,
        });
        let notices = manager.poll();
        assert_eq!(
            notices
                .iter()
                .filter(|n| **n == SessionNotice::PrincipalChanged)
                .count(),
            1
        );
        assert!(!manager.is_loading());
        assert_eq!(manager.principal().map(|p| p.id.as_str()), Some("user-2"));
        let stored = supabase::load_session(&path).expect("load").expect("kept");
        assert_eq!(stored.principal.id, "user-2");
    }

    #[test]
    fn refresh_keeps_principal_quiet() {
        let (mut manager, path) = manager_at("refresh");
        manager.current = Some(session());
        manager.refreshing = true;
        let mut refreshed = session();
        refreshed.access_token = "new".to_string();
        manager.inject(SessionEvent::Refreshed {
            epoch: manager.epoch,
            session: refreshed,
        });
        assert!(manager.poll().is_empty());
        assert!(!manager.refreshing);
        assert_eq!(manager.session().map(|s| s.access_token.as_str()), Some("new"));
        let stored = supabase::load_session(&path).expect("load").expect("saved");
        assert_eq!(stored.access_token, "new");
    }

    #[test]
    fn refresh_finishing_after_sign_out_is_dropped() {
        let (mut manager, path) = manager_at("refresh-after-signout");
        supabase::save_session(&path, &session()).expect("save");
        manager.current = Some(session());
        manager.refreshing = true;
        let epoch = manager.epoch;

        manager.sign_out();
        manager.inject(SessionEvent::Refreshed {
            epoch,
            session: session(),
        });
        let notices = manager.poll();
        assert_eq!(
            notices,
            vec![
                SessionNotice::Toast("Signed out.".to_string()),
                SessionNotice::PrincipalChanged,
            ]
        );
        assert!(manager.principal().is_none());
        assert!(!manager.refreshing);
        assert!(!path.exists());
    }

    #[test]
    fn sign_out_clears_session_file_and_principal() {
        let (mut manager, path) = manager_at("signout");
        supabase::save_session(&path, &session()).expect("save");
        manager.current = Some(session());

        manager.sign_out();
        assert!(manager.principal().is_none());
        assert!(!path.exists());
        let notices = manager.poll();
        assert!(notices.contains(&SessionNotice::PrincipalChanged));
    }

    #[test]
    fn rejected_refresh_signs_out() {
        let (mut manager, path) = manager_at("refresh-rejected");
        supabase::save_session(&path, &session()).expect("save");
        manager.current = Some(session());
        manager.inject(SessionEvent::RefreshFailed {
            epoch: manager.epoch,
            error: AuthError::Status {
                status: 400,
                message: "invalid refresh token".to_string(),
            },
        });
        let notices = manager.poll();
        assert!(notices.contains(&SessionNotice::PrincipalChanged));
        assert!(manager.principal().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn stale_refresh_failure_keeps_new_session() {
        let mut manager = SessionManager::disabled();
        let epoch = manager.epoch;
        manager.inject(SessionEvent::SignedIn(other_user()));
        manager.inject(SessionEvent::RefreshFailed {
            epoch,
            error: AuthError::Status {
                status: 400,
                message: "invalid refresh token".to_string(),
            },
        });
        manager.poll();
        assert_eq!(manager.principal().map(|p| p.id.as_str()), Some("user-2"));
    }

    #[test]
    fn cancelled_sign_in_is_silent() {
        let mut manager = SessionManager::disabled();
        manager.inject(SessionEvent::SignInFailed(AuthError::Cancelled));
        assert!(manager.poll().is_empty());
    }
}
