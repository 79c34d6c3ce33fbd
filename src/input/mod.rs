pub(crate) mod form;
pub(crate) mod navigate;
pub(crate) mod popups;

use crate::{app::App, models::InputMode};
use crossterm::event::{Event, KeyEventKind};

pub fn handle_event(app: &mut App, event: Event) {
    if let Event::Key(key) = event
        && key.kind == KeyEventKind::Press
    {
        if popups::handle_popup_events(app, key) {
            return;
        }
        match app.input_mode {
            InputMode::Navigate => navigate::handle_navigate_mode(app, key),
            InputMode::Form => form::handle_form_mode(app, key),
        }
    }
}
