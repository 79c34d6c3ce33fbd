use crate::app::{App, StatusCheck};
use crate::calendar;
use crate::form::FormField;
use crate::ui::components::{centered_rect, fmt_keys};
use crate::ui::theme::ThemeTokens;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

pub fn render_form_popup(f: &mut Frame, app: &App, tokens: &ThemeTokens) {
    let Some(form) = app.form.as_ref() else {
        return;
    };
    let title = if form.is_edit() {
        " Edit event "
    } else {
        " New event "
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(tokens.ui_border_focus));
    let area = centered_rect(60, 80, f.area());
    f.render_widget(Clear, area);
    f.render_widget(block, area);

    let mut constraints: Vec<Constraint> = FormField::ALL
        .iter()
        .map(|field| match field {
            FormField::Description => Constraint::Length(5),
            _ => Constraint::Length(3),
        })
        .collect();
    constraints.push(Constraint::Min(1));
    constraints.push(Constraint::Length(1));
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .margin(1)
        .split(area);

    for (field, row) in FormField::ALL.iter().zip(rows.iter()) {
        let focused = *field == form.focus;
        let mut textarea = form.field(*field).clone();
        let border = if focused {
            tokens.ui_border_focus
        } else {
            tokens.ui_border_default
        };
        textarea.set_block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", field.label()))
                .border_style(Style::default().fg(border)),
        );
        textarea.set_cursor_line_style(Style::default());
        if !focused {
            textarea.set_cursor_style(Style::default());
        }
        f.render_widget(&textarea, *row);
    }

    let kb = &app.config.keybindings.form;
    let message = if form.saving {
        Line::from(Span::styled("Saving…", Style::default().fg(tokens.ui_muted)))
    } else if let Some(error) = form.error.as_deref() {
        Line::from(Span::styled(
            error.to_string(),
            Style::default()
                .fg(tokens.ui_banner_error)
                .add_modifier(Modifier::BOLD),
        ))
    } else {
        Line::default()
    };
    let status_row = rows[FormField::ALL.len()];
    f.render_widget(Paragraph::new(message).wrap(Wrap { trim: true }), status_row);

    let mut help = format!(
        "{}: save  {}: cancel  {}: next field",
        fmt_keys(&kb.submit),
        fmt_keys(&kb.cancel),
        fmt_keys(&kb.next_field),
    );
    if form.is_edit() {
        help.push_str(&format!("  {}: delete", fmt_keys(&kb.delete)));
    }
    let help_row = rows[FormField::ALL.len() + 1];
    f.render_widget(
        Paragraph::new(help).style(Style::default().fg(tokens.ui_muted)),
        help_row,
    );
}

pub fn render_delete_popup(f: &mut Frame, app: &App) {
    let block = Block::default()
        .title(" Delete this event? ")
        .borders(Borders::ALL)
        .style(Style::default().fg(Color::LightRed));
    let area = centered_rect(50, 20, f.area());
    f.render_widget(Clear, area);
    f.render_widget(block, area);

    let text_area = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .margin(2)
        .split(area);

    let title = app
        .delete_target
        .as_ref()
        .map(|event| event.title.as_str())
        .unwrap_or("<no event>");
    let body = Paragraph::new(format!("Delete \"{title}\"? (y)es / (n)o"))
        .style(Style::default().add_modifier(Modifier::BOLD))
        .wrap(Wrap { trim: true });

    let kb = &app.config.keybindings.popup;
    let help_text = Paragraph::new(format!(
        "{}: delete  {}: cancel",
        fmt_keys(&kb.confirm),
        fmt_keys(&kb.cancel)
    ))
    .style(Style::default().fg(Color::DarkGray));

    f.render_widget(body, text_area[0]);
    f.render_widget(help_text, text_area[1]);
}

fn label_line(label: &str, value: String, tokens: &ThemeTokens) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label:<10}"), Style::default().fg(tokens.ui_muted)),
        Span::raw(value),
    ])
}

pub fn render_account_popup(f: &mut Frame, app: &App, tokens: &ThemeTokens) {
    let block = Block::default()
        .title(" Account ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(tokens.ui_border_focus));
    let area = centered_rect(70, 40, f.area());
    f.render_widget(Clear, area);
    f.render_widget(block, area);

    let inner = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .margin(2)
        .split(area);

    let kb = &app.config.keybindings.popup;
    let (body, help) = if !app.session.is_enabled() {
        (
            vec![
                Line::from("Supabase is not configured; events stay on this machine."),
                Line::default(),
                label_line(
                    "Storage",
                    app.config.data.events_path.display().to_string(),
                    tokens,
                ),
            ],
            format!("{}: close", fmt_keys(&kb.cancel)),
        )
    } else if let Some(principal) = app.session.principal() {
        let mut lines = vec![label_line("Signed in", principal.label().to_string(), tokens)];
        if principal.display_name.is_some() {
            lines.push(label_line("Email", principal.email.clone(), tokens));
        }
        (
            lines,
            format!(
                "{}: sign out  {}: close",
                fmt_keys(&kb.confirm),
                fmt_keys(&kb.cancel)
            ),
        )
    } else if let Some(pending) = app.session.pending_sign_in() {
        (
            vec![
                Line::from("Finish signing in with your browser. If it did not open, visit:"),
                Line::default(),
                Line::from(Span::styled(
                    pending.auth_url.clone(),
                    Style::default().add_modifier(Modifier::UNDERLINED),
                )),
                Line::default(),
                label_line("Listening", pending.listen_addr.clone(), tokens),
                label_line(
                    "Expires",
                    pending.expires_at.format("%H:%M:%S").to_string(),
                    tokens,
                ),
            ],
            format!("{}: cancel", fmt_keys(&kb.cancel)),
        )
    } else {
        (
            vec![
                Line::from("Not signed in. Events are only shown to signed-in users."),
                Line::default(),
                label_line("Provider", app.config.auth.provider.clone(), tokens),
            ],
            format!(
                "{}: sign in  {}: close",
                fmt_keys(&kb.confirm),
                fmt_keys(&kb.cancel)
            ),
        )
    };

    f.render_widget(Paragraph::new(body).wrap(Wrap { trim: false }), inner[0]);
    f.render_widget(
        Paragraph::new(help).style(Style::default().fg(tokens.ui_muted)),
        inner[1],
    );
}

pub fn render_status_popup(f: &mut Frame, app: &App, tokens: &ThemeTokens) {
    let block = Block::default()
        .title(" Status ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(tokens.ui_border_default));
    let area = centered_rect(70, 40, f.area());
    f.render_widget(Clear, area);
    f.render_widget(block, area);

    let inner = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .margin(2)
        .split(area);

    let remote = if app.config.remote.is_configured() {
        app.config.remote.base_url().to_string()
    } else {
        "not configured".to_string()
    };
    let visible = match calendar::range_bounds(&app.visible_days()) {
        Some((first, last)) => format!("{first} to {last}"),
        None => "-".to_string(),
    };
    let session = match app.session.principal() {
        Some(principal) => principal.label().to_string(),
        None if app.session.is_loading() => "resolving…".to_string(),
        None => "signed out".to_string(),
    };
    let (check, check_color) = match &app.status_check {
        None | Some(StatusCheck::Pending) => ("checking…".to_string(), tokens.ui_muted),
        Some(StatusCheck::Reachable) => ("reachable".to_string(), tokens.ui_toast),
        Some(StatusCheck::Failed(message)) => {
            (format!("unreachable: {message}"), tokens.ui_banner_error)
        }
    };

    let body = vec![
        label_line("Storage", app.store.mode().as_str().to_string(), tokens),
        label_line("Remote", remote, tokens),
        label_line(
            "Local file",
            app.config.data.events_path.display().to_string(),
            tokens,
        ),
        label_line("Session", session, tokens),
        label_line("Events", app.events.len().to_string(), tokens),
        label_line("Visible", visible, tokens),
        Line::from(vec![
            Span::styled(format!("{:<10}", "Backend"), Style::default().fg(tokens.ui_muted)),
            Span::styled(check, Style::default().fg(check_color)),
        ]),
    ];
    f.render_widget(Paragraph::new(body).wrap(Wrap { trim: false }), inner[0]);

    let help = format!(
        "{}: check again  {}: close",
        fmt_keys(&app.config.keybindings.global.refresh),
        fmt_keys(&app.config.keybindings.popup.cancel)
    );
    f.render_widget(
        Paragraph::new(help).style(Style::default().fg(tokens.ui_muted)),
        inner[1],
    );
}

struct HelpSection {
    title: &'static str,
    entries: Vec<(String, &'static str)>,
}

fn help_sections(app: &App) -> Vec<HelpSection> {
    let kb = &app.config.keybindings;
    vec![
        HelpSection {
            title: "Calendar",
            entries: vec![
                (
                    format!("{} / {}", fmt_keys(&kb.calendar.prev), fmt_keys(&kb.calendar.next)),
                    "Previous / next period",
                ),
                (fmt_keys(&kb.calendar.today), "Jump to today"),
                (
                    format!(
                        "{} / {} / {}",
                        fmt_keys(&kb.calendar.day_view),
                        fmt_keys(&kb.calendar.week_view),
                        fmt_keys(&kb.calendar.month_view)
                    ),
                    "Day / week / month view",
                ),
                (
                    format!("{} / {}", fmt_keys(&kb.calendar.left), fmt_keys(&kb.calendar.right)),
                    "Previous / next day",
                ),
                (
                    format!("{} / {}", fmt_keys(&kb.calendar.up), fmt_keys(&kb.calendar.down)),
                    "Previous / next week",
                ),
                (
                    format!(
                        "{} / {}",
                        fmt_keys(&kb.calendar.next_event),
                        fmt_keys(&kb.calendar.prev_event)
                    ),
                    "Cycle events on the day",
                ),
            ],
        },
        HelpSection {
            title: "Events",
            entries: vec![
                (fmt_keys(&kb.calendar.add), "New event"),
                (fmt_keys(&kb.calendar.edit), "Edit selected event"),
                (fmt_keys(&kb.calendar.delete), "Delete selected event"),
                (fmt_keys(&kb.form.submit), "Save form"),
                (fmt_keys(&kb.form.cancel), "Close form"),
            ],
        },
        HelpSection {
            title: "General",
            entries: vec![
                (fmt_keys(&kb.global.account), "Account / sign in"),
                (fmt_keys(&kb.global.status), "Storage status"),
                (fmt_keys(&kb.global.refresh), "Reload events"),
                (fmt_keys(&kb.global.dismiss), "Dismiss error"),
                (fmt_keys(&kb.global.help), "Toggle help"),
                (fmt_keys(&kb.global.quit), "Quit"),
            ],
        },
    ]
}

pub fn render_help_popup(f: &mut Frame, app: &App, tokens: &ThemeTokens) {
    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(tokens.ui_border_default));
    let area = centered_rect(80, 80, f.area());
    f.render_widget(Clear, area);
    f.render_widget(block, area);

    let inner_area = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .margin(2)
        .split(area);

    let sections = help_sections(app);
    let key_width = sections
        .iter()
        .flat_map(|section| section.entries.iter())
        .map(|(keys, _)| keys.chars().count())
        .max()
        .unwrap_or(0);

    let mut lines = Vec::new();
    for section in sections {
        if !lines.is_empty() {
            lines.push(Line::default());
        }
        lines.push(Line::from(Span::styled(
            section.title,
            Style::default()
                .fg(tokens.ui_border_focus)
                .add_modifier(Modifier::BOLD),
        )));
        for (keys, description) in section.entries {
            lines.push(Line::from(vec![
                Span::styled(
                    format!("  {keys:<key_width$}  "),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::raw(description),
            ]));
        }
    }
    f.render_widget(Paragraph::new(lines), inner_area[0]);
    f.render_widget(
        Paragraph::new("Esc: close").style(Style::default().fg(tokens.ui_muted)),
        inner_area[1],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions;
    use crate::app::test_support::local_app;
    use ratatui::{Terminal, backend::TestBackend};

    fn render(app: &App, draw: fn(&mut Frame, &App)) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 50)).expect("terminal");
        terminal.draw(|f| draw(f, app)).expect("draw");
        let buffer = terminal.backend().buffer().clone();
        buffer
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect::<String>()
    }

    #[test]
    fn help_lists_bindings() {
        let app = local_app("help-popup");
        let text = render(&app, |f, app| {
            let tokens = ThemeTokens::from_theme(&app.config.theme);
            render_help_popup(f, app, &tokens)
        });
        assert!(text.contains("Day / week / month view"));
        assert!(text.contains("ctrl+q / q"));
    }

    #[test]
    fn form_shows_validation_error() {
        let mut app = local_app("form-popup");
        actions::open_new_event(&mut app);
        actions::submit_form(&mut app);
        let text = render(&app, |f, app| {
            let tokens = ThemeTokens::from_theme(&app.config.theme);
            render_form_popup(f, app, &tokens)
        });
        assert!(text.contains("New event"));
        assert!(text.contains("Title is required"));
    }

    #[test]
    fn account_popup_explains_local_mode() {
        let app = local_app("account-popup");
        let text = render(&app, |f, app| {
            let tokens = ThemeTokens::from_theme(&app.config.theme);
            render_account_popup(f, app, &tokens)
        });
        assert!(text.contains("Supabase is not configured"));
    }
}
