use crate::{actions, app::App, config::key_match};
use crossterm::event::{KeyCode, KeyEvent};

pub fn handle_popup_events(app: &mut App, key: KeyEvent) -> bool {
    if app.show_delete_popup {
        handle_delete_popup(app, key);
        return true;
    }
    if app.show_help_popup {
        if key.code == KeyCode::Esc || key_match(&key, &app.config.keybindings.global.help) {
            app.show_help_popup = false;
        }
        return true;
    }
    if app.show_account_popup {
        handle_account_popup(app, key);
        return true;
    }
    if app.show_status_popup {
        handle_status_popup(app, key);
        return true;
    }
    false
}

fn handle_delete_popup(app: &mut App, key: KeyEvent) {
    if key_match(&key, &app.config.keybindings.popup.confirm) {
        actions::confirm_delete(app);
    } else if key_match(&key, &app.config.keybindings.popup.cancel) {
        actions::cancel_delete(app);
    }
}

fn handle_account_popup(app: &mut App, key: KeyEvent) {
    if key_match(&key, &app.config.keybindings.popup.confirm) {
        actions::account_confirm(app);
    } else if key_match(&key, &app.config.keybindings.popup.cancel)
        || key_match(&key, &app.config.keybindings.global.account)
    {
        actions::close_account_popup(app);
    }
}

fn handle_status_popup(app: &mut App, key: KeyEvent) {
    if key_match(&key, &app.config.keybindings.global.refresh) {
        actions::check_status(app);
    } else if key_match(&key, &app.config.keybindings.popup.cancel)
        || key_match(&key, &app.config.keybindings.popup.confirm)
        || key_match(&key, &app.config.keybindings.global.status)
    {
        app.show_status_popup = false;
    }
}
