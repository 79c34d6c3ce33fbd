use super::{StoreError, StoreResult};
use crate::config::RemoteConfig;
use crate::models::{AuthSession, DEFAULT_EVENT_COLOR, Event, EventDraft};
use chrono::{DateTime, Utc};
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;
use tracing::debug;

const EVENTS_TABLE: &str = "events";
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// The `events` table behind Supabase's PostgREST endpoint.
pub struct RemoteStore {
    client: Client,
    base_url: String,
    anon_key: String,
}

#[derive(Deserialize)]
struct EventRow {
    id: String,
    title: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    description: Option<String>,
    color: Option<String>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            title: row.title,
            start: row.start,
            end: row.end,
            description: row.description,
            color: Some(row.color.unwrap_or_else(|| DEFAULT_EVENT_COLOR.to_string())),
        }
    }
}

#[derive(Serialize)]
struct EventWrite<'a> {
    title: &'a str,
    start: String,
    end: String,
    description: Option<&'a str>,
    color: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
}

impl<'a> EventWrite<'a> {
    fn from_draft(draft: &'a EventDraft) -> Self {
        Self {
            title: &draft.title,
            start: draft.start.to_rfc3339(),
            end: draft.end.to_rfc3339(),
            description: draft.description.as_deref().filter(|d| !d.trim().is_empty()),
            color: draft.color.as_deref().unwrap_or(DEFAULT_EVENT_COLOR),
            user_id: None,
            updated_at: None,
        }
    }
}

#[derive(Deserialize)]
struct PostgrestError {
    message: Option<String>,
    hint: Option<String>,
}

impl RemoteStore {
    pub fn new(config: &RemoteConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            anon_key: config.anon_key.trim().to_string(),
        })
    }

    fn table_url(&self, params: &[(&str, String)]) -> StoreResult<Url> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, EVENTS_TABLE))
            .map_err(|e| StoreError::Status {
                status: 0,
                message: format!("invalid store URL: {e}"),
            })?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder, session: Option<&AuthSession>) -> RequestBuilder {
        let token = session
            .map(|s| s.access_token.as_str())
            .unwrap_or(self.anon_key.as_str());
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    fn send(&self, builder: RequestBuilder) -> StoreResult<Response> {
        let resp = builder.send()?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().unwrap_or_default();
        Err(StoreError::Status {
            status,
            message: describe_error(&body),
        })
    }

    fn fetch(&self, session: &AuthSession, params: &[(&str, String)]) -> StoreResult<Vec<Event>> {
        let url = self.table_url(params)?;
        let resp = self.send(self.authorized(self.client.get(url), Some(session)))?;
        let rows: Vec<EventRow> = serde_json::from_str(&resp.text()?)?;
        Ok(rows.into_iter().map(Event::from).collect())
    }

    fn owner_filter(session: &AuthSession) -> Vec<(&'static str, String)> {
        vec![
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", session.principal.id)),
        ]
    }

    pub fn list(&self, session: &AuthSession) -> StoreResult<Vec<Event>> {
        let mut params = Self::owner_filter(session);
        params.push(("order", "start.asc".to_string()));
        let events = self.fetch(session, &params)?;
        debug!(count = events.len(), "fetched remote events");
        Ok(events)
    }

    pub fn list_range(
        &self,
        session: &AuthSession,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Event>> {
        let mut params = Self::owner_filter(session);
        params.push(("start", format!("gte.{}", from.to_rfc3339())));
        params.push(("end", format!("lte.{}", to.to_rfc3339())));
        params.push(("order", "start.asc".to_string()));
        self.fetch(session, &params)
    }

    pub fn create(&self, session: &AuthSession, draft: &EventDraft) -> StoreResult<Event> {
        let mut row = EventWrite::from_draft(draft);
        row.user_id = Some(&session.principal.id);
        let url = self.table_url(&[])?;
        let request = self
            .client
            .post(url)
            .header("Prefer", "return=representation")
            .json(&[row]);
        let resp = self.send(self.authorized(request, Some(session)))?;
        single_row(resp, "insert returned no row")
    }

    pub fn update(&self, session: &AuthSession, id: &str, draft: &EventDraft) -> StoreResult<Event> {
        let mut row = EventWrite::from_draft(draft);
        row.updated_at = Some(Utc::now().to_rfc3339());
        let url = self.table_url(&[("id", format!("eq.{id}"))])?;
        let request = self
            .client
            .patch(url)
            .header("Prefer", "return=representation")
            .json(&row);
        let resp = self.send(self.authorized(request, Some(session)))?;
        single_row(resp, id)
    }

    pub fn delete(&self, session: &AuthSession, id: &str) -> StoreResult<()> {
        let url = self.table_url(&[("id", format!("eq.{id}"))])?;
        self.send(self.authorized(self.client.delete(url), Some(session)))?;
        Ok(())
    }

    pub fn check(&self, session: Option<&AuthSession>) -> StoreResult<()> {
        let url = self.table_url(&[("select", "id".to_string()), ("limit", "1".to_string())])?;
        self.send(self.authorized(self.client.get(url), session))?;
        Ok(())
    }
}

fn single_row(resp: Response, missing: &str) -> StoreResult<Event> {
    let rows: Vec<EventRow> = serde_json::from_str(&resp.text()?)?;
    rows.into_iter()
        .next()
        .map(Event::from)
        .ok_or_else(|| StoreError::NotFound(missing.to_string()))
}

fn describe_error(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(err) = serde_json::from_str::<PostgrestError>(trimmed)
        && let Some(message) = err.message
    {
        return match err.hint {
            Some(hint) => format!("{message} ({hint})"),
            None => message,
        };
    }
    let mut out = trimmed.replace(['\n', '\r'], " ");
    if out.len() > 240 {
        let mut cut = 240;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
        out.push_str("...");
    }
    out
}
