use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
};
use recycling_core::WasteCapacity;

use crate::app::{App, RecycleView, Screen};

pub(crate) fn draw(frame: &mut Frame<'_>, app: &App) {
    let area = frame.area();

    // Outer layout: title, main content, status line
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [header_area, content_area, status_area] = chunks else {
        return;
    };

    let header = Paragraph::new("Waste recycling: organisations send waste to the nearest storages")
        .block(Block::default().borders(Borders::ALL).title("Recycling"));
    frame.render_widget(header, *header_area);

    match app.screen {
        Screen::Organisations => draw_organisations(frame, app, *content_area),
        Screen::Storages => draw_storages(frame, app, *content_area),
        Screen::RecycleResult => draw_recycle_result(frame, app, *content_area),
    }

    // Status bar
    let nav_hint = match app.screen {
        Screen::Organisations => {
            "↑/↓ move · Enter recycle · x delete · X delete all · r refresh · Tab storages · q quit"
        }
        Screen::Storages => "↑/↓ move · x delete · r refresh · Tab organisations · q quit",
        Screen::RecycleResult => "Esc/←/b back · r refresh · Tab organisations · q quit",
    };

    let status_text = if app.is_loading {
        format!("Working… · {nav_hint}")
    } else if let Some(msg) = app.error_message.as_ref().or(app.info_message.as_ref()) {
        format!("{msg} · {nav_hint}")
    } else {
        nav_hint.to_owned()
    };

    let status_style = if app.error_message.is_some() {
        Style::default().fg(Color::Red)
    } else if app.is_loading {
        Style::default().fg(Color::Yellow)
    } else if app.info_message.is_some() {
        Style::default().fg(Color::Green)
    } else {
        Style::default()
    };

    let status = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .style(status_style)
        .wrap(Wrap { trim: true });

    frame.render_widget(status, *status_area);
}

fn draw_organisations(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let title = "Organisations (waste generated / limit)";
    if app.organisations.is_empty() {
        draw_empty(frame, area, title, "No organisations.");
        return;
    }

    let rows = app.organisations.iter().map(|organisation| {
        let style = if organisation.capacity.is_exhausted() {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };
        Row::new(vec![
            Cell::from(organisation.id.to_string()),
            Cell::from(organisation.name.clone()),
            Cell::from(capacity_label(&organisation.capacity)),
        ])
        .style(style)
    });

    let table = Table::new(
        rows,
        [Constraint::Length(6), Constraint::Length(16), Constraint::Min(20)],
    )
    .header(Row::new(vec!["Id", "Name", "Waste"]).style(Style::default().add_modifier(Modifier::BOLD)))
    .block(Block::default().borders(Borders::ALL).title(title))
    .row_highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    .column_spacing(1);

    let mut state = TableState::default();
    state.select(Some(app.organisation_index));
    frame.render_stateful_widget(table, area, &mut state);
}

fn draw_storages(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let title = "Storages (waste held / capacity)";
    if app.storages.is_empty() {
        draw_empty(frame, area, title, "No storages.");
        return;
    }

    let rows = app.storages.iter().map(|storage| {
        Row::new(vec![
            Cell::from(storage.id.to_string()),
            Cell::from(storage.name.clone()),
            Cell::from(storage.location.clone()),
            Cell::from(capacity_label(&storage.capacity)),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(16),
            Constraint::Length(16),
            Constraint::Min(20),
        ],
    )
    .header(
        Row::new(vec!["Id", "Name", "Location", "Waste"]).style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL).title(title))
    .row_highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    .column_spacing(1);

    let mut state = TableState::default();
    state.select(Some(app.storage_index));
    frame.render_stateful_widget(table, area, &mut state);
}

fn draw_recycle_result(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let Some(RecycleView {
        organisation,
        response,
        failed,
    }) = &app.last_recycle
    else {
        draw_empty(frame, area, "Recycle result", "No recycle request yet.");
        return;
    };

    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // message
            Constraint::Min(0),    // plan
        ])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [message_area, plan_area] = chunks else {
        return;
    };

    let message_style = if *failed {
        Style::default().fg(Color::Red)
    } else {
        Style::default()
    };
    let message = Paragraph::new(response.message.as_str())
        .block(Block::default().borders(Borders::ALL).title(format!("Recycle {organisation}")))
        .style(message_style)
        .wrap(Wrap { trim: true });
    frame.render_widget(message, *message_area);

    if response.plan.is_empty() {
        draw_empty(frame, *plan_area, "Plan", "Nothing was sent.");
        return;
    }

    let rows = response.plan.iter().flat_map(|(storage_id, amounts)| {
        let storage = app.storage_name(*storage_id);
        amounts.iter().map(move |(waste_type, amount)| {
            Row::new(vec![
                Cell::from(storage.clone()),
                Cell::from(waste_type.to_string()),
                Cell::from(amount.to_string()),
            ])
        })
    });

    let table = Table::new(
        rows,
        [Constraint::Length(16), Constraint::Length(16), Constraint::Min(8)],
    )
    .header(
        Row::new(vec!["Storage", "Waste type", "Amount"]).style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL).title("Plan"))
    .column_spacing(1);

    frame.render_widget(table, *plan_area);
}

fn draw_empty(frame: &mut Frame<'_>, area: Rect, title: &str, text: &str) {
    let paragraph = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title(title.to_owned()))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

/// `Glass 10/50 · Plastic 0/20`
fn capacity_label(capacity: &WasteCapacity) -> String {
    capacity
        .iter()
        .map(|(waste_type, entry)| format!("{waste_type} {}/{}", entry.used, entry.total))
        .collect::<Vec<_>>()
        .join(" · ")
}
