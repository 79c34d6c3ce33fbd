use chrono::{Datelike, Local, NaiveDate};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use unicode_width::UnicodeWidthStr;

use crate::app::App;
use crate::calendar::{self, ViewMode};
use crate::models::{Event, InputMode};

pub mod color_parser;
pub mod components;
pub mod popups;
pub mod theme;

use color_parser::parse_color;
use components::truncate_to_width;
use popups::{
    render_account_popup, render_delete_popup, render_form_popup, render_help_popup,
    render_status_popup,
};
use theme::ThemeTokens;

pub fn ui(f: &mut Frame, app: &App) {
    let tokens = ThemeTokens::from_theme(&app.config.theme);
    let banner_height = u16::from(app.error_banner.is_some());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(banner_height),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(f.area());

    render_header(f, chunks[0], app, &tokens);
    if let Some(message) = app.error_banner.as_deref() {
        render_banner(f, chunks[1], message, &tokens);
    }
    match app.view {
        ViewMode::Month => render_month(f, chunks[2], app, &tokens),
        ViewMode::Week => render_week(f, chunks[2], app, &tokens),
        ViewMode::Day => render_day(f, chunks[2], app, &tokens),
    }
    render_status_bar(f, chunks[3], app, &tokens);

    if app.form.is_some() {
        render_form_popup(f, app, &tokens);
    }
    if app.show_account_popup {
        render_account_popup(f, app, &tokens);
    }
    if app.show_status_popup {
        render_status_popup(f, app, &tokens);
    }
    if app.show_help_popup {
        render_help_popup(f, app, &tokens);
    }
    if app.show_delete_popup {
        render_delete_popup(f, app);
    }
}

fn is_loading(app: &App) -> bool {
    app.events_loading || app.session.is_loading()
}

fn render_header(f: &mut Frame, area: Rect, app: &App, tokens: &ThemeTokens) {
    let title = Span::styled(
        format!(" {} ", app.header()),
        Style::default().add_modifier(Modifier::BOLD),
    );
    let views = ViewMode::all()
        .iter()
        .flat_map(|view| {
            let style = if *view == app.view {
                Style::default()
                    .fg(tokens.ui_border_focus)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(tokens.ui_muted)
            };
            [Span::styled(view.as_str(), style), Span::raw(" ")]
        })
        .collect::<Vec<_>>();

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(32)])
        .split(area);
    f.render_widget(Paragraph::new(Line::from(title)), columns[0]);

    let mut right = Vec::new();
    let activity = if is_loading(app) {
        Some("Loading… ")
    } else if app.jobs.pending() > 0 {
        Some("Working… ")
    } else {
        None
    };
    if let Some(activity) = activity {
        right.push(Span::styled(activity, Style::default().fg(tokens.ui_today)));
    }
    right.extend(views);
    f.render_widget(
        Paragraph::new(Line::from(right)).alignment(Alignment::Right),
        columns[1],
    );
}

fn render_banner(f: &mut Frame, area: Rect, message: &str, tokens: &ThemeTokens) {
    let line = Line::from(vec![
        Span::styled(
            format!(" ✕ {message}"),
            Style::default()
                .fg(tokens.ui_banner_error)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled("  (Esc to dismiss)", Style::default().fg(tokens.ui_muted)),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn weekday_header(f: &mut Frame, area: Rect, days: &[NaiveDate], tokens: &ThemeTokens) {
    let columns = split_columns(area, days.len());
    for (day, column) in days.iter().zip(columns.iter()) {
        let label = Paragraph::new(day.format("%a").to_string())
            .alignment(Alignment::Center)
            .style(Style::default().fg(tokens.ui_muted));
        f.render_widget(label, *column);
    }
}

fn split_columns(area: Rect, count: usize) -> Vec<Rect> {
    let constraints = vec![Constraint::Ratio(1, count.max(1) as u32); count];
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area)
        .to_vec()
}

fn render_month(f: &mut Frame, area: Rect, app: &App, tokens: &ThemeTokens) {
    let days = app.visible_days();
    let placed = calendar::place_events(&days, &app.events, &Local);
    let weeks = (days.len() / 7).max(1);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(area);
    weekday_header(f, chunks[0], &days[..days.len().min(7)], tokens);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Ratio(1, weeks as u32); weeks])
        .split(chunks[1]);
    for (row, week) in rows.iter().zip(placed.chunks(7)) {
        for (cell, (day, events)) in split_columns(*row, week.len()).iter().zip(week) {
            let outside = day.month() != app.anchor.month();
            render_day_cell(f, *cell, app, *day, events, outside, tokens);
        }
    }
}

fn render_week(f: &mut Frame, area: Rect, app: &App, tokens: &ThemeTokens) {
    let days = app.visible_days();
    let placed = calendar::place_events(&days, &app.events, &Local);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(area);
    weekday_header(f, chunks[0], &days, tokens);
    for (cell, (day, events)) in split_columns(chunks[1], placed.len()).iter().zip(&placed) {
        render_day_cell(f, *cell, app, *day, events, false, tokens);
    }
}

fn cell_block(app: &App, day: NaiveDate, outside: bool, tokens: &ThemeTokens) -> Block<'static> {
    let today = Local::now().date_naive();
    let selected = day == app.anchor;
    let border = if selected {
        tokens.ui_border_focus
    } else {
        tokens.ui_border_default
    };
    let mut title_style = if day == today {
        Style::default()
            .fg(tokens.ui_today)
            .add_modifier(Modifier::BOLD)
    } else if outside {
        Style::default().fg(tokens.ui_muted)
    } else {
        Style::default()
    };
    if selected {
        title_style = title_style.add_modifier(Modifier::REVERSED);
    }
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(Span::styled(format!(" {} ", day.day()), title_style))
}

fn render_day_cell(
    f: &mut Frame,
    area: Rect,
    app: &App,
    day: NaiveDate,
    events: &[&Event],
    outside: bool,
    tokens: &ThemeTokens,
) {
    let block = cell_block(app, day, outside, tokens);
    let inner = block.inner(area);
    f.render_widget(block, area);
    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let capacity = inner.height as usize;
    let width = inner.width as usize;
    let overflow = events.len() > capacity;
    let shown = if overflow {
        capacity.saturating_sub(1)
    } else {
        events.len()
    };

    let mut lines: Vec<Line> = events
        .iter()
        .take(shown)
        .enumerate()
        .map(|(index, event)| {
            let selected = day == app.anchor && app.event_cursor == Some(index);
            let start = event.start.with_timezone(&Local);
            let label = format!("{} {}", start.format("%H:%M"), event.title);
            let label = truncate_to_width(&label, width.saturating_sub(2));
            event_line(event, &label, selected, tokens)
        })
        .collect();
    if overflow {
        lines.push(Line::from(Span::styled(
            format!("+{} more", events.len() - shown),
            Style::default().fg(tokens.ui_muted),
        )));
    }
    f.render_widget(Paragraph::new(lines), inner);
}

fn event_line(event: &Event, label: &str, selected: bool, tokens: &ThemeTokens) -> Line<'static> {
    let mut style = Style::default();
    if selected {
        style = style.bg(tokens.ui_selection_bg).add_modifier(Modifier::BOLD);
    }
    Line::from(vec![
        Span::styled("● ", Style::default().fg(parse_color(event.color_or_default()))),
        Span::styled(label.to_string(), style),
    ])
}

fn render_day(f: &mut Frame, area: Rect, app: &App, tokens: &ThemeTokens) {
    let day = app.anchor;
    let block = cell_block(app, day, false, tokens);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let events = app.events_on(day);
    if events.is_empty() {
        let hint = format!(
            "No events. Press {} to add one.",
            components::fmt_keys(&app.config.keybindings.calendar.add)
        );
        f.render_widget(
            Paragraph::new(hint).style(Style::default().fg(tokens.ui_muted)),
            inner,
        );
        return;
    }

    let width = inner.width.saturating_sub(4).max(1) as usize;
    let mut lines = Vec::new();
    for (index, event) in events.iter().enumerate() {
        let selected = app.event_cursor == Some(index);
        let start = event.start.with_timezone(&Local);
        let end = event.end.with_timezone(&Local);
        let span = if start.date_naive() == end.date_naive() {
            format!("{}–{}", start.format("%H:%M"), end.format("%H:%M"))
        } else {
            format!("{} → {}", start.format("%b %-d %H:%M"), end.format("%b %-d %H:%M"))
        };
        let label = format!("{span}  {}", event.title);
        lines.push(event_line(event, &truncate_to_width(&label, width), selected, tokens));
        if let Some(description) = event.description.as_deref() {
            for wrapped in textwrap::wrap(description, width) {
                lines.push(Line::from(Span::styled(
                    format!("  {wrapped}"),
                    Style::default().fg(tokens.ui_muted),
                )));
            }
        }
    }
    f.render_widget(Paragraph::new(lines), inner);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App, tokens: &ThemeTokens) {
    if area.height == 0 || area.width == 0 {
        return;
    }

    let mode_label = match app.input_mode {
        InputMode::Navigate => app.view.as_str().to_uppercase(),
        InputMode::Form => "FORM".to_string(),
    };
    let account = match app.session.principal() {
        Some(principal) => principal.label().to_string(),
        None if app.session.is_loading() => "restoring session…".to_string(),
        None if app.session.is_enabled() => format!(
            "signed out ({} to sign in)",
            components::fmt_keys(&app.config.keybindings.global.account)
        ),
        None => "offline".to_string(),
    };

    let left_spans = vec![
        Span::styled(
            format!(" {mode_label} "),
            Style::default()
                .fg(tokens.ui_border_focus)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(
            format!("[{}] ", app.store.mode().as_str()),
            Style::default().fg(tokens.ui_muted),
        ),
        Span::raw(account),
    ];

    let toast = app.toast_message.as_deref().filter(|t| !t.is_empty());
    let Some(toast) = toast else {
        f.render_widget(Paragraph::new(Line::from(left_spans)), area);
        return;
    };

    let min_left_width = 10u16;
    let right_width = (UnicodeWidthStr::width(toast) as u16)
        .min(area.width.saturating_sub(min_left_width));
    let status_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(right_width)])
        .split(area);
    f.render_widget(Paragraph::new(Line::from(left_spans)), status_chunks[0]);
    let right = Paragraph::new(Span::styled(
        toast.to_string(),
        Style::default()
            .fg(tokens.ui_toast)
            .add_modifier(Modifier::BOLD),
    ))
    .alignment(Alignment::Right);
    f.render_widget(right, status_chunks[1]);
}
