use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Accent colour used when an event carries no colour of its own.
pub const DEFAULT_EVENT_COLOR: &str = "#3b82f6";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    Navigate,
    Form,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Event {
    pub fn from_draft(id: String, draft: &EventDraft) -> Self {
        Self {
            id,
            title: draft.title.clone(),
            start: draft.start,
            end: draft.end,
            description: draft.description.clone(),
            color: draft.color.clone(),
        }
    }

    pub fn color_or_default(&self) -> &str {
        self.color.as_deref().unwrap_or(DEFAULT_EVENT_COLOR)
    }
}

/// Everything an event holds except its identifier, which the store assigns.
#[derive(Clone, Debug, PartialEq)]
pub struct EventDraft {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub description: Option<String>,
    pub color: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Principal {
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(self.email.as_str())
    }
}

/// A signed-in principal together with the tokens the remote store needs.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub principal: Principal,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

impl AuthSession {
    pub fn expires_within(&self, seconds: i64) -> bool {
        self.expires_at <= Utc::now().timestamp() + seconds
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("principal", &self.principal)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn missing_color_falls_back_to_accent() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let event = Event {
            id: "1".to_string(),
            title: "Standup".to_string(),
            start,
            end: start,
            description: None,
            color: None,
        };
        assert_eq!(event.color_or_default(), DEFAULT_EVENT_COLOR);
    }

    #[test]
    fn local_blob_round_trips_iso_timestamps() {
        let json = r##"[{"id":"a","title":"Lunch","start":"2024-01-01T12:00:00Z","end":"2024-01-01T13:00:00.000Z","color":"#ff0000"}]"##;
        let events: Vec<Event> = serde_json::from_str(json).expect("parse");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start, Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        assert_eq!(events[0].description, None);

        let written = serde_json::to_string(&events).expect("serialize");
        assert!(written.contains("2024-01-01T12:00:00Z"));
        assert!(!written.contains("description"));
    }

    #[test]
    fn principal_label_prefers_display_name() {
        let mut principal = Principal {
            id: "u1".to_string(),
            email: "ada@example.com".to_string(),
            display_name: None,
        };
        assert_eq!(principal.label(), "ada@example.com");
        principal.display_name = Some("Ada".to_string());
        assert_eq!(principal.label(), "Ada");
    }
}
