use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, Screen};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Action {
    None,
    Quit,
    Refresh,
    /// Run `organisation_service.recycle`(...) for the selected organisation
    Recycle,
    /// Delete the selected organisation or storage, depending on the screen
    DeleteSelected,
    /// Run `organisation_service.delete_all_organisations`()
    DeleteAllOrganisations,
}

pub(crate) fn handle_key_event(key: KeyEvent, app: &mut App) -> Action {
    use KeyCode::{BackTab, Char, Down, Enter, Esc, Left, Tab, Up};

    // Global shortcuts
    if key.code == Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Action::Quit;
    }
    if key.code == Char('q') && key.modifiers.is_empty() {
        return Action::Quit;
    }
    if key.code == Char('r') && key.modifiers.is_empty() {
        return Action::Refresh;
    }
    if matches!(key.code, Tab | BackTab) {
        app.switch_list();
        return Action::None;
    }

    let mut action = Action::None;

    match app.screen {
        Screen::Organisations => match key.code {
            Up | Char('k') => app.move_up(),
            Down | Char('j') => app.move_down(),
            Enter | Char(' ') => action = Action::Recycle,
            Char('x') | KeyCode::Delete => action = Action::DeleteSelected,
            Char('X') => action = Action::DeleteAllOrganisations,
            _ => {}
        },

        Screen::Storages => match key.code {
            Up | Char('k') => app.move_up(),
            Down | Char('j') => app.move_down(),
            Char('x') | KeyCode::Delete => action = Action::DeleteSelected,
            _ => {}
        },

        Screen::RecycleResult => match key.code {
            Left | Esc | Char('b') => app.screen = Screen::Organisations,
            _ => {}
        },
    }
    action
}
