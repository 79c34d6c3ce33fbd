use crate::{
    actions,
    app::App,
    calendar::{Step, ViewMode},
    config::key_match,
};
use crossterm::event::KeyEvent;

pub fn handle_navigate_mode(app: &mut App, key: KeyEvent) {
    let bindings = app.config.keybindings.clone();
    let (global, calendar) = (&bindings.global, &bindings.calendar);

    if key_match(&key, &global.dismiss) {
        app.dismiss_banner();
    } else if key_match(&key, &global.quit) {
        app.should_quit = true;
    } else if key_match(&key, &global.help) {
        app.show_help_popup = true;
    } else if key_match(&key, &global.account) {
        actions::toggle_account_popup(app);
    } else if key_match(&key, &global.status) {
        actions::check_status(app);
    } else if key_match(&key, &global.refresh) {
        app.error_banner = None;
        actions::reload_events(app);
    } else if key_match(&key, &calendar.prev) {
        app.step(Step::Prev);
    } else if key_match(&key, &calendar.next) {
        app.step(Step::Next);
    } else if key_match(&key, &calendar.today) {
        app.go_today();
    } else if key_match(&key, &calendar.day_view) {
        app.set_view(ViewMode::Day);
    } else if key_match(&key, &calendar.week_view) {
        app.set_view(ViewMode::Week);
    } else if key_match(&key, &calendar.month_view) {
        app.set_view(ViewMode::Month);
    } else if key_match(&key, &calendar.left) {
        app.move_days(-1);
    } else if key_match(&key, &calendar.right) {
        app.move_days(1);
    } else if key_match(&key, &calendar.up) {
        move_vertical(app, -1);
    } else if key_match(&key, &calendar.down) {
        move_vertical(app, 1);
    } else if key_match(&key, &calendar.next_event) {
        app.cycle_event(true);
    } else if key_match(&key, &calendar.prev_event) {
        app.cycle_event(false);
    } else if key_match(&key, &calendar.add) {
        actions::open_new_event(app);
    } else if key_match(&key, &calendar.edit) {
        actions::open_edit_selected(app);
    } else if key_match(&key, &calendar.delete) {
        actions::request_delete(app);
    }
}

/// Up/down move a week in the grid views; in the day view they walk the
/// day's events instead.
fn move_vertical(app: &mut App, direction: i64) {
    match app.view {
        ViewMode::Day => app.cycle_event(direction > 0),
        ViewMode::Week | ViewMode::Month => app.move_days(direction * 7),
    }
}
