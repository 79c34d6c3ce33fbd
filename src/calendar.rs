//! Visible day ranges for the day/week/month grids and event placement.

use crate::models::Event;
use chrono::{
    DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc, Weekday,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Day,
    Week,
    #[default]
    Month,
}

impl ViewMode {
    pub fn all() -> [ViewMode; 3] {
        [ViewMode::Day, ViewMode::Week, ViewMode::Month]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Day => "Day",
            ViewMode::Week => "Week",
            ViewMode::Month => "Month",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Prev,
    Next,
}

pub fn start_of_week(date: NaiveDate, week_start: Weekday) -> NaiveDate {
    let offset = (7 + date.weekday().num_days_from_monday()
        - week_start.num_days_from_monday())
        % 7;
    date - Duration::days(offset as i64)
}

pub fn end_of_week(date: NaiveDate, week_start: Weekday) -> NaiveDate {
    start_of_week(date, week_start) + Duration::days(6)
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn last_of_month(date: NaiveDate) -> NaiveDate {
    first_of_month(date)
        .checked_add_months(Months::new(1))
        .map(|next| next - Duration::days(1))
        .unwrap_or(date)
}

/// Days the grid renders for `anchor`. Month grids are padded to whole weeks.
pub fn visible_days(anchor: NaiveDate, view: ViewMode, week_start: Weekday) -> Vec<NaiveDate> {
    let (start, end) = match view {
        ViewMode::Day => (anchor, anchor),
        ViewMode::Week => (
            start_of_week(anchor, week_start),
            end_of_week(anchor, week_start),
        ),
        ViewMode::Month => (
            start_of_week(first_of_month(anchor), week_start),
            end_of_week(last_of_month(anchor), week_start),
        ),
    };
    start.iter_days().take_while(|day| *day <= end).collect()
}

pub fn header_label(anchor: NaiveDate, view: ViewMode, week_start: Weekday) -> String {
    match view {
        ViewMode::Day => anchor.format("%A, %B %-d, %Y").to_string(),
        ViewMode::Week => {
            let start = start_of_week(anchor, week_start);
            let end = end_of_week(anchor, week_start);
            format!("{} – {}", start.format("%b %-d"), end.format("%b %-d, %Y"))
        }
        ViewMode::Month => anchor.format("%B %Y").to_string(),
    }
}

/// Moves `anchor` by one unit of `view`. Month steps clamp to the target
/// month's length, so Jan 31 -> Feb 29 -> Jan 29 is not a round trip.
pub fn shift_anchor(anchor: NaiveDate, view: ViewMode, step: Step) -> NaiveDate {
    match (view, step) {
        (ViewMode::Day, Step::Prev) => anchor - Duration::days(1),
        (ViewMode::Day, Step::Next) => anchor + Duration::days(1),
        (ViewMode::Week, Step::Prev) => anchor - Duration::weeks(1),
        (ViewMode::Week, Step::Next) => anchor + Duration::weeks(1),
        (ViewMode::Month, Step::Prev) => anchor
            .checked_sub_months(Months::new(1))
            .unwrap_or(anchor),
        (ViewMode::Month, Step::Next) => anchor
            .checked_add_months(Months::new(1))
            .unwrap_or(anchor),
    }
}

pub fn range_bounds(days: &[NaiveDate]) -> Option<(NaiveDate, NaiveDate)> {
    Some((*days.first()?, *days.last()?))
}

fn local_midnight<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let naive = day.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

pub fn event_touches_day<Tz: TimeZone>(event: &Event, day: NaiveDate, tz: &Tz) -> bool {
    if event.start.with_timezone(tz).date_naive() == day {
        return true;
    }
    let midnight = local_midnight(day, tz);
    event.start <= midnight && event.end >= midnight
}

/// Events attributed to `day`, in list order.
pub fn events_for_day<'a, Tz: TimeZone>(
    events: &'a [Event],
    day: NaiveDate,
    tz: &Tz,
) -> Vec<&'a Event> {
    events
        .iter()
        .filter(|event| event_touches_day(event, day, tz))
        .collect()
}

pub fn place_events<'a, Tz: TimeZone>(
    days: &[NaiveDate],
    events: &'a [Event],
    tz: &Tz,
) -> Vec<(NaiveDate, Vec<&'a Event>)> {
    days.iter()
        .map(|day| (*day, events_for_day(events, *day, tz)))
        .collect()
}
