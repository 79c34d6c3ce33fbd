use crate::calendar::{self, Step, ViewMode};
use crate::config::Config;
use crate::form::EventForm;
use crate::models::{Event, InputMode};
use crate::runtime::Jobs;
use crate::session::SessionManager;
use crate::storage::{self, EventStore};
use chrono::{Duration, Local, NaiveDate};
use std::sync::Arc;
use tracing::debug;

/// Outcome of the last connectivity probe shown in the status popup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusCheck {
    Pending,
    Reachable,
    Failed(String),
}

pub struct App<'a> {
    pub input_mode: InputMode,
    pub store: Arc<dyn EventStore>,
    pub session: SessionManager,
    pub jobs: Jobs,
    /// Bumped on every principal change; job results from older
    /// generations are dropped.
    pub generation: u64,
    pub events: Vec<Event>,
    pub events_loading: bool,
    pub anchor: NaiveDate,
    pub view: ViewMode,
    /// Index into the anchor day's events.
    pub event_cursor: Option<usize>,
    pub form: Option<EventForm<'a>>,
    pub show_help_popup: bool,
    pub show_account_popup: bool,
    pub show_status_popup: bool,
    pub show_delete_popup: bool,
    pub delete_target: Option<Event>,
    pub status_check: Option<StatusCheck>,
    pub error_banner: Option<String>,
    pub toast_message: Option<String>,
    pub toast_expiry: Option<chrono::DateTime<Local>>,
    pub should_quit: bool,
    pub config: Config,
}

impl<'a> App<'a> {
    pub fn new(config: Config) -> App<'a> {
        let store = storage::open(&config);
        let session = SessionManager::new(&config);
        let mut app = Self::with_parts(config, store, session);

        app.session.start();
        if !app.session.is_enabled() {
            // Local-only mode has no principal to wait for.
            crate::actions::reload_events(&mut app);
        }
        app
    }

    pub fn with_parts(
        config: Config,
        store: Arc<dyn EventStore>,
        session: SessionManager,
    ) -> App<'a> {
        App {
            input_mode: InputMode::Navigate,
            store,
            session,
            jobs: Jobs::default(),
            generation: 0,
            events: Vec::new(),
            events_loading: false,
            anchor: Local::now().date_naive(),
            view: config.calendar.default_view,
            event_cursor: None,
            form: None,
            show_help_popup: false,
            show_account_popup: false,
            show_status_popup: false,
            show_delete_popup: false,
            delete_target: None,
            status_check: None,
            error_banner: None,
            toast_message: None,
            toast_expiry: None,
            should_quit: false,
            config,
        }
    }

    pub fn week_start(&self) -> chrono::Weekday {
        self.config.calendar.week_start.weekday()
    }

    pub fn visible_days(&self) -> Vec<NaiveDate> {
        calendar::visible_days(self.anchor, self.view, self.week_start())
    }

    pub fn header(&self) -> String {
        calendar::header_label(self.anchor, self.view, self.week_start())
    }

    pub fn events_on(&self, day: NaiveDate) -> Vec<&Event> {
        calendar::events_for_day(&self.events, day, &Local)
    }

    pub fn selected_event(&self) -> Option<&Event> {
        let index = self.event_cursor?;
        self.events_on(self.anchor).get(index).copied()
    }

    pub fn set_view(&mut self, view: ViewMode) {
        self.view = view;
    }

    pub fn step(&mut self, step: Step) {
        self.anchor = calendar::shift_anchor(self.anchor, self.view, step);
        self.reset_event_cursor();
    }

    pub fn move_days(&mut self, days: i64) {
        self.anchor += Duration::days(days);
        self.reset_event_cursor();
    }

    pub fn go_today(&mut self) {
        self.anchor = Local::now().date_naive();
        self.reset_event_cursor();
    }

    pub fn select_day(&mut self, day: NaiveDate) {
        self.anchor = day;
        self.reset_event_cursor();
    }

    fn reset_event_cursor(&mut self) {
        self.event_cursor = (!self.events_on(self.anchor).is_empty()).then_some(0);
    }

    pub fn clamp_event_cursor(&mut self) {
        let count = self.events_on(self.anchor).len();
        self.event_cursor = match (count, self.event_cursor) {
            (0, _) => None,
            (_, None) => Some(0),
            (count, Some(i)) => Some(i.min(count - 1)),
        };
    }

    /// Moves the event cursor within the anchor day, wrapping at the ends.
    pub fn cycle_event(&mut self, forward: bool) {
        let count = self.events_on(self.anchor).len();
        if count == 0 {
            self.event_cursor = None;
            return;
        }
        let current = self.event_cursor.unwrap_or(0);
        self.event_cursor = Some(if forward {
            (current + 1) % count
        } else {
            (current + count - 1) % count
        });
    }

    pub fn open_form(&mut self, form: EventForm<'a>) {
        self.form = Some(form);
        self.input_mode = InputMode::Form;
    }

    pub fn close_form(&mut self) {
        self.form = None;
        self.input_mode = InputMode::Navigate;
    }

    /// Drops everything that belonged to the previous principal and starts
    /// loading the new principal's events.
    pub fn on_principal_changed(&mut self) {
        self.generation += 1;
        debug!(generation = self.generation, "principal changed");
        self.events.clear();
        self.event_cursor = None;
        self.close_form();
        self.show_delete_popup = false;
        self.delete_target = None;
        self.show_account_popup = false;
        self.status_check = None;
        self.error_banner = None;
        crate::actions::reload_events(self);
    }

    pub fn dismiss_banner(&mut self) -> bool {
        self.error_banner.take().is_some()
    }

    pub fn toast(&mut self, message: impl Into<String>) {
        self.toast_message = Some(message.into());
        self.toast_expiry = Some(Local::now() + Duration::seconds(2));
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::local_app;
    use super::*;
    use crate::models::EventDraft;
    use chrono::TimeZone;

    fn event_on(id: &str, day: NaiveDate, hour: u32) -> Event {
        let start = Local
            .from_local_datetime(&day.and_hms_opt(hour, 0, 0).unwrap())
            .earliest()
            .unwrap()
            .with_timezone(&chrono::Utc);
        Event::from_draft(
            id.to_string(),
            &EventDraft {
                title: id.to_string(),
                start,
                end: start + Duration::minutes(30),
                description: None,
                color: None,
            },
        )
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn month_view_of_anchor() {
        let mut app = local_app("month");
        app.select_day(date(2024, 3, 15));
        app.set_view(ViewMode::Month);
        let days = app.visible_days();
        assert_eq!(days.first(), Some(&date(2024, 2, 25)));
        assert_eq!(days.last(), Some(&date(2024, 3, 30)));
        assert_eq!(app.header(), "March 2024");
    }

    #[test]
    fn stepping_follows_view() {
        let mut app = local_app("step");
        app.select_day(date(2024, 1, 31));
        app.set_view(ViewMode::Month);
        app.step(Step::Next);
        assert_eq!(app.anchor, date(2024, 2, 29));
        app.set_view(ViewMode::Week);
        app.step(Step::Prev);
        assert_eq!(app.anchor, date(2024, 2, 22));
        app.move_days(1);
        assert_eq!(app.anchor, date(2024, 2, 23));
    }

    #[test]
    fn event_cursor_cycles_within_day() {
        let mut app = local_app("cursor");
        let day = date(2024, 5, 1);
        app.events = vec![event_on("a", day, 9), event_on("b", day, 11)];
        app.select_day(day);
        assert_eq!(app.selected_event().map(|e| e.id.as_str()), Some("a"));
        app.cycle_event(true);
        assert_eq!(app.selected_event().map(|e| e.id.as_str()), Some("b"));
        app.cycle_event(true);
        assert_eq!(app.event_cursor, Some(0));
        app.cycle_event(false);
        assert_eq!(app.event_cursor, Some(1));

        app.events.pop();
        app.clamp_event_cursor();
        assert_eq!(app.event_cursor, Some(0));
        app.move_days(1);
        assert_eq!(app.event_cursor, None);
    }

    #[test]
    fn principal_change_drops_ui_state() {
        let mut app = local_app("drop");
        let day = date(2024, 5, 1);
        app.events = vec![event_on("a", day, 9)];
        app.error_banner = Some("boom".to_string());
        app.show_delete_popup = true;
        app.open_form(EventForm::new_on(day, &app.config.calendar));

        app.on_principal_changed();
        assert!(app.events.is_empty());
        assert!(app.form.is_none());
        assert_eq!(app.input_mode, InputMode::Navigate);
        assert!(!app.show_delete_popup);
        assert!(app.error_banner.is_none());
        assert_eq!(app.generation, 1);
    }
}
