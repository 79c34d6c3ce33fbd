use chrono::{Datelike, Days, Months, NaiveDate, NaiveTime, Weekday};
use regex::Regex;
use std::sync::OnceLock;

/// Parses the date fields of the event form. Accepts `YYYY-MM-DD`,
/// `today`/`tomorrow`/`yesterday`, offsets such as `+3d`, `-1w`, `+2m`,
/// and weekday names (`fri`, `next mon`).
pub(crate) fn parse_date_input(input: &str, base: NaiveDate) -> Option<NaiveDate> {
    let trimmed = input.trim().to_lowercase();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(&trimmed, "%Y-%m-%d") {
        return Some(date);
    }

    match trimmed.as_str() {
        "today" => Some(base),
        "tomorrow" => base.succ_opt(),
        "yesterday" => base.pred_opt(),
        _ => parse_offset(&trimmed, base).or_else(|| parse_weekday_phrase(&trimmed, base)),
    }
}

/// Parses `HH:MM` (24h), `H`, `9am`, `9:30 pm`, `noon` and `midnight`.
pub(crate) fn parse_time_input(input: &str) -> Option<NaiveTime> {
    static TIME_RE: OnceLock<Regex> = OnceLock::new();
    let re = TIME_RE.get_or_init(|| {
        Regex::new(r"^(\d{1,2})(?::(\d{2}))?\s*(am|pm)?$").expect("valid time regex")
    });

    let trimmed = input.trim().to_lowercase();
    match trimmed.as_str() {
        "noon" => return NaiveTime::from_hms_opt(12, 0, 0),
        "midnight" => return Some(NaiveTime::MIN),
        _ => {}
    }

    let caps = re.captures(&trimmed)?;
    let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    match caps.get(3).map(|m| m.as_str()) {
        Some(meridiem) => {
            if hour == 0 || hour > 12 {
                return None;
            }
            if hour == 12 {
                hour = 0;
            }
            if meridiem == "pm" {
                hour += 12;
            }
        }
        None if hour > 23 => return None,
        None => {}
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

pub(crate) fn format_date_input(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn format_time_input(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

fn parse_offset(input: &str, base: NaiveDate) -> Option<NaiveDate> {
    let (negative, rest) = match input.as_bytes().first()? {
        b'+' => (false, &input[1..]),
        b'-' => (true, &input[1..]),
        _ => (false, input),
    };
    let unit = rest.chars().last()?;
    let qty: u32 = rest[..rest.len() - unit.len_utf8()].parse().ok()?;

    match (unit, negative) {
        ('d', false) => base.checked_add_days(Days::new(qty.into())),
        ('d', true) => base.checked_sub_days(Days::new(qty.into())),
        ('w', false) => base.checked_add_days(Days::new(u64::from(qty) * 7)),
        ('w', true) => base.checked_sub_days(Days::new(u64::from(qty) * 7)),
        ('m', false) => base.checked_add_months(Months::new(qty)),
        ('m', true) => base.checked_sub_months(Months::new(qty)),
        _ => None,
    }
}

fn parse_weekday_phrase(input: &str, base: NaiveDate) -> Option<NaiveDate> {
    let mut words = input.split_whitespace();
    let first = words.next()?;
    let (force_next, name) = if first == "next" {
        (true, words.next()?)
    } else {
        (false, first)
    };
    if words.next().is_some() {
        return None;
    }

    let weekday = match name.get(..3)? {
        "mon" => Weekday::Mon,
        "tue" => Weekday::Tue,
        "wed" => Weekday::Wed,
        "thu" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "sat" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => return None,
    };

    let mut delta = (7 + weekday.num_days_from_monday() - base.weekday().num_days_from_monday()) % 7;
    if force_next && delta == 0 {
        delta = 7;
    }
    base.checked_add_days(Days::new(delta.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap() // Wed
    }

    #[test]
    fn parses_keywords_and_explicit_dates() {
        assert_eq!(parse_date_input("today", base()), Some(base()));
        assert_eq!(
            parse_date_input("Tomorrow", base()),
            NaiveDate::from_ymd_opt(2025, 1, 16)
        );
        assert_eq!(
            parse_date_input("2025-02-02", base()),
            NaiveDate::from_ymd_opt(2025, 2, 2)
        );
        assert_eq!(parse_date_input("", base()), None);
        assert_eq!(parse_date_input("someday", base()), None);
    }

    #[test]
    fn parses_offsets() {
        assert_eq!(parse_date_input("+3d", base()), NaiveDate::from_ymd_opt(2025, 1, 18));
        assert_eq!(parse_date_input("2w", base()), NaiveDate::from_ymd_opt(2025, 1, 29));
        assert_eq!(parse_date_input("-1w", base()), NaiveDate::from_ymd_opt(2025, 1, 8));
        let jan31 = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        assert_eq!(parse_date_input("+1m", jan31), NaiveDate::from_ymd_opt(2025, 2, 28));
        assert_eq!(parse_date_input("+d", base()), None);
    }

    #[test]
    fn out_of_range_offsets_are_rejected() {
        assert_eq!(parse_date_input("+99999999d", base()), None);
        assert_eq!(parse_date_input("-99999999d", base()), None);
        assert_eq!(parse_date_input("+4000000000w", base()), None);
        assert_eq!(parse_date_input("tomorrow", NaiveDate::MAX), None);
        assert_eq!(parse_date_input("yesterday", NaiveDate::MIN), None);
    }

    #[test]
    fn parses_weekdays() {
        let next_mon = NaiveDate::from_ymd_opt(2025, 1, 20);
        assert_eq!(parse_date_input("mon", base()), next_mon);
        assert_eq!(parse_date_input("next monday", base()), next_mon);
        assert_eq!(parse_date_input("wed", base()), Some(base()));
        assert_eq!(
            parse_date_input("next wed", base()),
            NaiveDate::from_ymd_opt(2025, 1, 22)
        );
    }

    #[test]
    fn parses_times() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0);
        assert_eq!(parse_time_input("09:30"), t(9, 30));
        assert_eq!(parse_time_input("14"), t(14, 0));
        assert_eq!(parse_time_input("9am"), t(9, 0));
        assert_eq!(parse_time_input("12am"), t(0, 0));
        assert_eq!(parse_time_input("12:15 pm"), t(12, 15));
        assert_eq!(parse_time_input("7:05PM"), t(19, 5));
        assert_eq!(parse_time_input("noon"), t(12, 0));
        assert_eq!(parse_time_input("24:00"), None);
        assert_eq!(parse_time_input("13pm"), None);
        assert_eq!(parse_time_input("9:75"), None);
    }
}
