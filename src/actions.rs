use crate::app::{App, StatusCheck};
use crate::form::EventForm;
use crate::integrations::supabase::AuthError;
use crate::runtime::StoreOutcome;
use chrono::Local;
use std::sync::Arc;
use tracing::{debug, warn};

pub fn reload_events(app: &mut App) {
    if app.session.is_loading() {
        // The resolved session triggers its own reload.
        return;
    }
    app.events_loading = true;
    let store = Arc::clone(&app.store);
    let session = app.session.session().cloned();
    debug!(generation = app.generation, "loading events");
    app.jobs.spawn(app.generation, move || {
        StoreOutcome::Loaded(store.list(session.as_ref()))
    });
}

pub fn open_new_event(app: &mut App) {
    let form = EventForm::new_on(app.anchor, &app.config.calendar);
    app.open_form(form);
}

pub fn open_edit_selected(app: &mut App) {
    let Some(event) = app.selected_event() else {
        app.toast("No event selected.");
        return;
    };
    let form = EventForm::edit(event);
    app.open_form(form);
}

/// Validates the form and hands the draft to the store. Invalid input stays
/// in the form and never reaches the store.
pub fn submit_form(app: &mut App) {
    let today = Local::now().date_naive();
    let store = Arc::clone(&app.store);
    let session = app.session.session().cloned();
    let generation = app.generation;

    let Some(form) = app.form.as_mut() else {
        return;
    };
    if form.saving {
        return;
    }
    let draft = match form.to_draft(today) {
        Ok(draft) => draft,
        Err(err) => {
            form.error = Some(err.to_string());
            return;
        }
    };
    form.error = None;
    form.saving = true;

    match form.editing.clone() {
        Some(id) => app.jobs.spawn(generation, move || {
            StoreOutcome::Updated(store.update(session.as_ref(), &id, &draft))
        }),
        None => app.jobs.spawn(generation, move || {
            StoreOutcome::Created(store.create(session.as_ref(), &draft))
        }),
    }
}

pub fn cancel_form(app: &mut App) {
    app.close_form();
}

/// Deletes the event being edited, or the selected one, after confirmation.
pub fn request_delete(app: &mut App) {
    let target = match app.form.as_ref().and_then(|form| form.editing.as_deref()) {
        Some(id) => app.events.iter().find(|event| event.id == id).cloned(),
        None => app.selected_event().cloned(),
    };
    match target {
        Some(event) => {
            app.delete_target = Some(event);
            app.show_delete_popup = true;
        }
        None => app.toast("No event selected."),
    }
}

pub fn confirm_delete(app: &mut App) {
    app.show_delete_popup = false;
    let Some(event) = app.delete_target.take() else {
        return;
    };
    if app.form.as_ref().and_then(|f| f.editing.as_deref()) == Some(event.id.as_str()) {
        app.close_form();
    }
    let store = Arc::clone(&app.store);
    let session = app.session.session().cloned();
    app.jobs.spawn(app.generation, move || {
        let result = store.delete(session.as_ref(), &event.id);
        StoreOutcome::Deleted {
            id: event.id,
            result,
        }
    });
}

pub fn cancel_delete(app: &mut App) {
    app.show_delete_popup = false;
    app.delete_target = None;
}

pub fn sign_in(app: &mut App) {
    match app.session.sign_in() {
        Ok(()) => app.show_account_popup = true,
        Err(err @ AuthError::NotConfigured) => app.toast(err.to_string()),
        Err(err) => {
            warn!(error = %err, "could not start sign-in");
            app.toast(format!("Sign-in failed: {err}"));
        }
    }
}

pub fn sign_out(app: &mut App) {
    if !app.session.is_enabled() {
        app.toast(AuthError::NotConfigured.to_string());
        return;
    }
    app.session.sign_out();
    app.show_account_popup = false;
}

pub fn toggle_account_popup(app: &mut App) {
    if app.show_account_popup {
        close_account_popup(app);
    } else {
        app.show_account_popup = true;
    }
}

pub fn close_account_popup(app: &mut App) {
    app.show_account_popup = false;
    app.session.cancel_pending_sign_in();
}

/// Signs in when signed out and out when signed in.
pub fn account_confirm(app: &mut App) {
    if app.session.principal().is_some() {
        sign_out(app);
    } else if app.session.pending_sign_in().is_none() {
        sign_in(app);
    }
}

pub fn check_status(app: &mut App) {
    app.show_status_popup = true;
    app.status_check = Some(StatusCheck::Pending);
    let store = Arc::clone(&app.store);
    let session = app.session.session().cloned();
    app.jobs.spawn(app.generation, move || {
        StoreOutcome::Checked(store.check(session.as_ref()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_support::local_app;
    use crate::form::FormField;
    use crate::runtime::settle;
    use chrono::NaiveDate;

    fn fill_title(app: &mut App, title: &str) {
        let form = app.form.as_mut().expect("form open");
        let area = form.field_mut(FormField::Title);
        area.select_all();
        area.cut();
        area.insert_str(title);
    }

    #[test]
    fn empty_title_never_reaches_store() {
        let mut app = local_app("empty-title");
        open_new_event(&mut app);
        submit_form(&mut app);
        let form = app.form.as_ref().expect("form stays open");
        assert_eq!(form.error.as_deref(), Some("Title is required"));
        assert!(!form.saving);
        assert_eq!(app.jobs.pending(), 0);
        assert!(app.store.list(None).expect("list").is_empty());
    }

    #[test]
    fn create_edit_delete_cycle() {
        let mut app = local_app("cycle");
        app.select_day(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());

        open_new_event(&mut app);
        fill_title(&mut app, "Planning");
        submit_form(&mut app);
        settle(&mut app);
        assert!(app.form.is_none());
        assert_eq!(app.events.len(), 1);
        app.clamp_event_cursor();
        let id = app.selected_event().expect("selected").id.clone();

        open_edit_selected(&mut app);
        fill_title(&mut app, "Planning v2");
        submit_form(&mut app);
        settle(&mut app);
        assert_eq!(app.events.len(), 1);
        assert_eq!(app.events[0].id, id);
        assert_eq!(app.store.list(None).expect("list")[0].title, "Planning v2");

        request_delete(&mut app);
        assert!(app.show_delete_popup);
        confirm_delete(&mut app);
        settle(&mut app);
        assert!(app.events.is_empty());
        assert!(app.store.list(None).expect("list").is_empty());
    }

    #[test]
    fn cancelled_delete_keeps_event() {
        let mut app = local_app("cancel-delete");
        app.select_day(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        open_new_event(&mut app);
        fill_title(&mut app, "Keep me");
        submit_form(&mut app);
        settle(&mut app);
        app.clamp_event_cursor();

        request_delete(&mut app);
        cancel_delete(&mut app);
        assert!(!app.show_delete_popup);
        assert!(app.delete_target.is_none());
        assert_eq!(app.events.len(), 1);
    }

    #[test]
    fn auth_actions_without_remote_toast() {
        let mut app = local_app("auth");
        sign_in(&mut app);
        assert!(!app.show_account_popup);
        assert!(app.toast_message.as_deref().unwrap_or("").contains("not configured"));
        sign_out(&mut app);
        assert!(app.toast_message.is_some());
    }
}
