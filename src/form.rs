use crate::config::CalendarConfig;
use crate::date_input::{format_date_input, format_time_input, parse_date_input, parse_time_input};
use crate::models::{Event, EventDraft};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use thiserror::Error;
use tui_textarea::TextArea;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FormError {
    #[error("Title is required")]
    EmptyTitle,
    #[error("Unrecognised date: {0}")]
    InvalidDate(String),
    #[error("Unrecognised time: {0}")]
    InvalidTime(String),
    #[error("Colour must look like #rrggbb: {0}")]
    InvalidColor(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormField {
    Title,
    StartDate,
    StartTime,
    EndDate,
    EndTime,
    Description,
    Color,
}

impl FormField {
    pub const ALL: [FormField; 7] = [
        FormField::Title,
        FormField::StartDate,
        FormField::StartTime,
        FormField::EndDate,
        FormField::EndTime,
        FormField::Description,
        FormField::Color,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FormField::Title => "Title",
            FormField::StartDate => "Start date",
            FormField::StartTime => "Start time",
            FormField::EndDate => "End date",
            FormField::EndTime => "End time",
            FormField::Description => "Description",
            FormField::Color => "Colour",
        }
    }

    fn index(self) -> usize {
        Self::ALL.iter().position(|f| *f == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// The modal create/edit form. Every field is a single-line text area; the
/// description may span several lines.
pub struct EventForm<'a> {
    /// `Some(id)` when editing an existing event.
    pub editing: Option<String>,
    pub focus: FormField,
    pub error: Option<String>,
    /// Set while the store call for this form is in flight.
    pub saving: bool,
    fields: Vec<TextArea<'a>>,
}

fn text_area<'a>(value: &str) -> TextArea<'a> {
    let lines: Vec<String> = if value.is_empty() {
        vec![String::new()]
    } else {
        value.lines().map(str::to_string).collect()
    };
    let mut area = TextArea::new(lines);
    area.move_cursor(tui_textarea::CursorMove::Bottom);
    area.move_cursor(tui_textarea::CursorMove::End);
    area
}

impl<'a> EventForm<'a> {
    /// A blank form on `day`, starting at the configured hour.
    pub fn new_on(day: NaiveDate, calendar: &CalendarConfig) -> Self {
        let start_time =
            NaiveTime::from_hms_opt(calendar.default_start_hour.min(23), 0, 0).unwrap_or_default();
        let start = day.and_time(start_time);
        let end = start + Duration::minutes(calendar.default_duration_minutes.max(1));
        Self::build(None, "", start, end, "", &calendar.default_color)
    }

    pub fn edit(event: &Event) -> Self {
        let start = event.start.with_timezone(&Local).naive_local();
        let end = event.end.with_timezone(&Local).naive_local();
        Self::build(
            Some(event.id.clone()),
            &event.title,
            start,
            end,
            event.description.as_deref().unwrap_or(""),
            event.color.as_deref().unwrap_or(""),
        )
    }

    fn build(
        editing: Option<String>,
        title: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        description: &str,
        color: &str,
    ) -> Self {
        let fields = vec![
            text_area(title),
            text_area(&format_date_input(start.date())),
            text_area(&format_time_input(start.time())),
            text_area(&format_date_input(end.date())),
            text_area(&format_time_input(end.time())),
            text_area(description),
            text_area(color),
        ];
        Self {
            editing,
            focus: FormField::Title,
            error: None,
            saving: false,
            fields,
        }
    }

    pub fn is_edit(&self) -> bool {
        self.editing.is_some()
    }

    pub fn field(&self, field: FormField) -> &TextArea<'a> {
        &self.fields[field.index()]
    }

    pub fn field_mut(&mut self, field: FormField) -> &mut TextArea<'a> {
        &mut self.fields[field.index()]
    }

    pub fn focused_mut(&mut self) -> &mut TextArea<'a> {
        let focus = self.focus;
        self.field_mut(focus)
    }

    pub fn value(&self, field: FormField) -> String {
        self.field(field).lines().join("\n")
    }

    pub fn focus_next(&mut self) {
        self.focus = self.focus.next();
    }

    pub fn focus_prev(&mut self) {
        self.focus = self.focus.prev();
    }

    /// Validates the inputs and builds a draft in the local time zone.
    /// Relative dates ("tomorrow", "+2d") resolve against `today`.
    pub fn to_draft(&self, today: NaiveDate) -> Result<EventDraft, FormError> {
        self.to_draft_in(today, &Local)
    }

    pub(crate) fn to_draft_in<Tz: TimeZone>(
        &self,
        today: NaiveDate,
        tz: &Tz,
    ) -> Result<EventDraft, FormError> {
        let title = self.value(FormField::Title).trim().to_string();
        if title.is_empty() {
            return Err(FormError::EmptyTitle);
        }

        let start_date = self.date(FormField::StartDate, today)?;
        let start = self.instant(start_date, FormField::StartTime, tz)?;
        // The end date is relative to the start so "+1d" means the next day.
        let end_date = self.date(FormField::EndDate, start_date)?;
        let end = self.instant(end_date, FormField::EndTime, tz)?;

        let description = self.value(FormField::Description).trim().to_string();
        let color = normalize_color(&self.value(FormField::Color))?;

        Ok(EventDraft {
            title,
            start,
            end,
            description: (!description.is_empty()).then_some(description),
            color,
        })
    }

    fn date(&self, field: FormField, base: NaiveDate) -> Result<NaiveDate, FormError> {
        let raw = self.value(field);
        parse_date_input(&raw, base).ok_or(FormError::InvalidDate(raw.trim().to_string()))
    }

    fn instant<Tz: TimeZone>(
        &self,
        date: NaiveDate,
        field: FormField,
        tz: &Tz,
    ) -> Result<DateTime<Utc>, FormError> {
        let raw = self.value(field);
        let invalid = || FormError::InvalidTime(raw.trim().to_string());
        let time = parse_time_input(&raw).ok_or_else(invalid)?;
        // Times inside a DST gap do not exist locally.
        let local = tz
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .ok_or_else(invalid)?;
        Ok(local.with_timezone(&Utc))
    }
}

/// Empty means "use the accent colour". Anything else must be `#rrggbb`
/// (or the `#rgb` shorthand) and is stored lowercase.
pub fn normalize_color(raw: &str) -> Result<Option<String>, FormError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let invalid = || FormError::InvalidColor(trimmed.to_string());
    let hex = trimmed.strip_prefix('#').ok_or_else(invalid)?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let expanded = match hex.len() {
        6 => hex.to_string(),
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        _ => return Err(invalid()),
    };
    Ok(Some(format!("#{}", expanded.to_ascii_lowercase())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn set(form: &mut EventForm, field: FormField, value: &str) {
        *form.field_mut(field) = text_area(value);
    }

    #[test]
    fn new_form_uses_calendar_defaults() {
        let form = EventForm::new_on(day(2), &CalendarConfig::default());
        assert!(!form.is_edit());
        assert_eq!(form.value(FormField::StartDate), "2024-01-02");
        assert_eq!(form.value(FormField::StartTime), "09:00");
        assert_eq!(form.value(FormField::EndTime), "10:00");
        assert_eq!(form.value(FormField::Color), "#3b82f6");
    }

    #[test]
    fn empty_title_is_rejected() {
        let mut form = EventForm::new_on(day(2), &CalendarConfig::default());
        set(&mut form, FormField::Title, "   ");
        assert_eq!(form.to_draft_in(day(1), &Utc), Err(FormError::EmptyTitle));
    }

    #[test]
    fn draft_converts_local_time_to_utc() {
        let mut form = EventForm::new_on(day(2), &CalendarConfig::default());
        set(&mut form, FormField::Title, " Standup ");
        set(&mut form, FormField::StartTime, "9:30am");
        set(&mut form, FormField::EndDate, "+1d");
        set(&mut form, FormField::EndTime, "noon");
        set(&mut form, FormField::Description, "  ");
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let draft = form.to_draft_in(day(1), &tz).expect("draft");
        assert_eq!(draft.title, "Standup");
        assert_eq!(draft.start, Utc.with_ymd_and_hms(2024, 1, 2, 7, 30, 0).unwrap());
        assert_eq!(draft.end, Utc.with_ymd_and_hms(2024, 1, 3, 10, 0, 0).unwrap());
        assert_eq!(draft.description, None);
        assert_eq!(draft.color.as_deref(), Some("#3b82f6"));
    }

    #[test]
    fn end_before_start_is_accepted() {
        let mut form = EventForm::new_on(day(5), &CalendarConfig::default());
        set(&mut form, FormField::Title, "Backwards");
        set(&mut form, FormField::EndTime, "08:00");
        let draft = form.to_draft_in(day(1), &Utc).expect("draft");
        assert!(draft.end < draft.start);
    }

    #[test]
    fn bad_inputs_are_reported() {
        let mut form = EventForm::new_on(day(5), &CalendarConfig::default());
        set(&mut form, FormField::Title, "X");
        set(&mut form, FormField::StartDate, "someday");
        assert_eq!(
            form.to_draft_in(day(1), &Utc),
            Err(FormError::InvalidDate("someday".to_string()))
        );
        set(&mut form, FormField::StartDate, "2024-01-05");
        set(&mut form, FormField::StartTime, "25:00");
        assert!(matches!(form.to_draft_in(day(1), &Utc), Err(FormError::InvalidTime(_))));
        set(&mut form, FormField::StartTime, "10:00");
        set(&mut form, FormField::Color, "blue");
        assert!(matches!(form.to_draft_in(day(1), &Utc), Err(FormError::InvalidColor(_))));
    }

    #[test]
    fn edit_form_round_trips_event() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        let event = Event {
            id: "e1".to_string(),
            title: "Review".to_string(),
            start,
            end: start + Duration::hours(2),
            description: Some("line one\nline two".to_string()),
            color: Some("#FF0000".to_string()),
        };
        let form = EventForm::edit(&event);
        assert_eq!(form.editing.as_deref(), Some("e1"));
        let draft = form.to_draft(day(1)).expect("draft");
        assert_eq!(draft.start, event.start);
        assert_eq!(draft.end, event.end);
        assert_eq!(draft.description, event.description);
        assert_eq!(draft.color.as_deref(), Some("#ff0000"));
    }

    #[test]
    fn colours_normalise() {
        assert_eq!(normalize_color(""), Ok(None));
        assert_eq!(normalize_color("#ABC"), Ok(Some("#aabbcc".to_string())));
        assert!(normalize_color("#12345").is_err());
        assert!(normalize_color("#gggggg").is_err());
    }

    #[test]
    fn focus_wraps_around() {
        assert_eq!(FormField::Color.next(), FormField::Title);
        assert_eq!(FormField::Title.prev(), FormField::Color);
    }
}
