//! Terminal UI for the recycling system: browse organisations and storages, run recycle requests.

mod app;
mod input;
mod seed;
mod system;
mod ui;

use std::path::PathBuf;
use std::sync::Arc;
use std::{io, time::Duration as StdDuration};

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event as CEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use recycling_core::{RecycleResponse, RecyclingConfig, init_logging};

use crate::app::{App, RecycleView, Screen};
use crate::input::Action;
use crate::seed::Seed;
use crate::system::System;

/// Log destination when none is configured; stderr would draw over the UI.
const DEFAULT_LOG_FILE: &str = "recycling-tui.log";

#[tokio::main]
async fn main() -> Result<()> {
    let config = RecyclingConfig::from_env()?;
    let log_file = config
        .log_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));
    init_logging(config.log_format, Some(&log_file))?;

    // Services, broker and fixtures
    let system = System::start(&config).await?;
    let seed = match &config.seed_path {
        Some(path) => Seed::load(path).await?,
        None => Seed::demo()?,
    };
    seed.apply(&system.organisations, &system.storages).await?;

    // App state
    let mut app = App::new(Arc::clone(&system.organisations), Arc::clone(&system.storages));
    app.refresh().await?;

    // Terminal init
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run event loop
    let res = run(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    system.shutdown().await;
    res
}

async fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, mut app: App) -> Result<()> {
    loop {
        terminal.draw(|frame| ui::draw(frame, &app))?;

        // Poll for input (non-blocking, small timeout to keep CPU low)
        if event::poll(StdDuration::from_millis(100))?
            && let CEvent::Key(key) = event::read()?
        {
            let action = input::handle_key_event(key, &mut app);

            match action {
                Action::Quit => break,
                Action::None => {}
                Action::Refresh => {
                    app.clear_messages();
                    reload(&mut app).await;
                }
                Action::Recycle => {
                    let Some(organisation) = app.selected_organisation().cloned() else {
                        app.error_message = Some("No organisation selected".into());
                        continue;
                    };

                    app.is_loading = true;
                    app.clear_messages();
                    terminal.draw(|frame| ui::draw(frame, &app))?;

                    let res = app.organisation_service.recycle(organisation.id).await;

                    app.is_loading = false;
                    match res {
                        Ok(outcome) => {
                            app.last_recycle = Some(RecycleView {
                                organisation: organisation.name,
                                response: RecycleResponse::from(&outcome),
                                failed: outcome.error_kind().is_some(),
                            });
                            app.screen = Screen::RecycleResult;
                        }
                        Err(err) => {
                            app.error_message = Some(format!("Recycle failed: {err}"));
                        }
                    }
                    reload(&mut app).await;
                }
                Action::DeleteSelected => {
                    app.clear_messages();
                    delete_selected(&mut app).await;
                    reload(&mut app).await;
                }
                Action::DeleteAllOrganisations => {
                    app.clear_messages();
                    match app.organisation_service.delete_all_organisations().await {
                        Ok(ids) => app.info_message = Some(format!("Deleted {} organisations", ids.len())),
                        Err(err) => app.error_message = Some(format!("Delete failed: {err}")),
                    }
                    reload(&mut app).await;
                }
            }
        }
    }

    Ok(())
}

async fn delete_selected(app: &mut App) {
    let res = match app.screen {
        Screen::Organisations => match app.selected_organisation().map(|organisation| organisation.id) {
            Some(id) => app
                .organisation_service
                .delete_organisation(id)
                .await
                .map(|organisation| organisation.name),
            None => return,
        },
        Screen::Storages => match app.selected_storage().map(|storage| storage.id) {
            Some(id) => app.storage_service.delete_storage(id).await.map(|storage| storage.name),
            None => return,
        },
        Screen::RecycleResult => return,
    };

    match res {
        Ok(name) => app.info_message = Some(format!("Deleted {name}")),
        Err(err) => app.error_message = Some(format!("Delete failed: {err}")),
    }
}

async fn reload(app: &mut App) {
    if let Err(err) = app.refresh().await {
        tracing::warn!(error = %err, "refresh failed");
        app.error_message = Some(format!("Refresh failed: {err}"));
    }
}
