use crate::{actions, app::App, config::key_match, form::FormField};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

pub fn handle_form_mode(app: &mut App, key: KeyEvent) {
    let bindings = app.config.keybindings.form.clone();

    if key_match(&key, &bindings.submit) {
        actions::submit_form(app);
        return;
    }
    if key_match(&key, &bindings.cancel) {
        actions::cancel_form(app);
        return;
    }
    if key_match(&key, &bindings.delete) {
        if app.form.as_ref().is_some_and(|form| form.is_edit()) {
            actions::request_delete(app);
        }
        return;
    }

    let Some(form) = app.form.as_mut() else {
        return;
    };
    if form.saving {
        return;
    }
    if key_match(&key, &bindings.next_field) {
        form.focus_next();
    } else if key_match(&key, &bindings.prev_field) {
        form.focus_prev();
    } else if inserts_newline(&key) && form.focus != FormField::Description {
        // Only the description holds more than one line.
    } else if form.focused_mut().input(key) {
        form.error = None;
    }
}

fn inserts_newline(key: &KeyEvent) -> bool {
    match key.code {
        KeyCode::Enter => true,
        KeyCode::Char('m') | KeyCode::Char('j') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}
