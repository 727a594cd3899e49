use crate::app::{settings_summary, AppCommand, AppEvent, AppState, SettingsField};
use crate::session::{self, Session, SharedSession, Turn};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

const TICK_MS: u64 = 100;
const PENDING_LINE: &str = "Composing track…";

const EMPTY_STATE_LINES: &[&str] = &[
    "Describe the music you want to create.",
    "",
    "Try: \"A synthwave track with heavy bass\"",
    "Try: \"Lo-fi hip hop beat for studying\"",
];

pub fn run<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut AppState,
    session: &SharedSession,
    event_rx: &mut UnboundedReceiver<AppEvent>,
    command_tx: UnboundedSender<AppCommand>,
) -> Result<()> {
    loop {
        while let Ok(event) = event_rx.try_recv() {
            app.handle_event(event);
        }

        {
            let guard = session::lock(session);
            terminal.draw(|frame| draw(frame, app, &guard))?;
        }

        if event::poll(Duration::from_millis(TICK_MS))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if !handle_key(key, app, session, &command_tx) {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Returns false when the loop should exit.
fn handle_key(
    key: KeyEvent,
    app: &mut AppState,
    session: &SharedSession,
    command_tx: &UnboundedSender<AppCommand>,
) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') => return false,
            KeyCode::Char('s') => app.show_settings = !app.show_settings,
            KeyCode::Char('p') => toggle_playback(app, session, command_tx),
            KeyCode::Char('o') => open_studio(app, session, command_tx),
            KeyCode::Char('r') => reset_session(app, session),
            _ => {}
        }
        return true;
    }

    match key.code {
        KeyCode::Esc => {
            if app.show_settings {
                app.show_settings = false;
            } else {
                return false;
            }
        }
        KeyCode::Up if app.show_settings => {
            app.selected_setting = app.selected_setting.prev();
        }
        KeyCode::Down if app.show_settings => {
            app.selected_setting = app.selected_setting.next();
        }
        KeyCode::Left if app.show_settings => adjust_setting(app.selected_setting, session, false),
        KeyCode::Right if app.show_settings => adjust_setting(app.selected_setting, session, true),
        KeyCode::Char(c) => app.input.push(c),
        KeyCode::Backspace => {
            app.input.pop();
        }
        KeyCode::Enter => submit_prompt(app, session, command_tx),
        _ => {}
    }
    true
}

fn submit_prompt(
    app: &mut AppState,
    session: &SharedSession,
    command_tx: &UnboundedSender<AppCommand>,
) {
    if app.input.trim().is_empty() {
        return;
    }
    // The send trigger stays disabled while a request is in flight; the
    // controller re-validates regardless.
    if session::lock(session).pending() {
        return;
    }
    let prompt = std::mem::take(&mut app.input);
    let _ = command_tx.send(AppCommand::SubmitPrompt { prompt });
    app.show_settings = false;
}

fn adjust_setting(field: SettingsField, session: &SharedSession, increase: bool) {
    let mut guard = session::lock(session);
    let settings = guard.settings();
    match field {
        SettingsField::Duration => {
            let current = settings.duration_seconds();
            guard.set_duration(if increase { current.saturating_add(1) } else { current.saturating_sub(1) });
        }
        SettingsField::Tempo => {
            let current = settings.tempo_bpm();
            guard.set_tempo(if increase { current.saturating_add(5) } else { current.saturating_sub(5) });
        }
        SettingsField::Density => {
            let current = settings.density();
            guard.set_density(if increase { current + 0.1 } else { current - 0.1 });
        }
    }
}

fn toggle_playback(
    app: &mut AppState,
    session: &SharedSession,
    command_tx: &UnboundedSender<AppCommand>,
) {
    if app.playing_turn.is_some() {
        let _ = command_tx.send(AppCommand::StopPlayback);
        return;
    }
    let latest = session::lock(session).latest_result().map(|(index, _)| index);
    match latest {
        Some(turn) => {
            let _ = command_tx.send(AppCommand::PlayTurn { turn });
        }
        None => app.push_status_line("No track to play yet.".to_string()),
    }
}

fn reset_session(app: &mut AppState, session: &SharedSession) {
    let mut guard = session::lock(session);
    if guard.pending() {
        app.push_status_line("Cannot reset while composing.".to_string());
        return;
    }
    guard.reset();
    drop(guard);
    app.playing_turn = None;
    app.push_status_line("Session reset.".to_string());
}

fn open_studio(
    app: &mut AppState,
    session: &SharedSession,
    command_tx: &UnboundedSender<AppCommand>,
) {
    let latest = session::lock(session).latest_result().map(|(index, _)| index);
    match latest {
        Some(turn) => {
            let _ = command_tx.send(AppCommand::OpenStudio { turn });
        }
        None => app.push_status_line("No track to open yet.".to_string()),
    }
}

fn draw(frame: &mut Frame, app: &AppState, session: &Session) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)].as_ref())
        .split(frame.size());

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(3)].as_ref())
        .split(columns[0]);

    draw_conversation(frame, app, session, left[0]);
    draw_input(frame, app, session, left[1]);

    if app.show_settings {
        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(5)].as_ref())
            .split(columns[1]);
        draw_status(frame, app, right[0]);
        draw_settings(frame, app, session, right[1]);
    } else {
        draw_status(frame, app, columns[1]);
    }
}

fn draw_conversation(frame: &mut Frame, app: &AppState, session: &Session, area: Rect) {
    let mut lines = conversation_lines(app, session);

    let visible = area.height.saturating_sub(2) as usize;
    if lines.len() > visible {
        lines = lines.split_off(lines.len() - visible);
    }

    let block = Block::default().title("Conversation").borders(Borders::ALL);
    frame.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: false }), area);
}

fn conversation_lines(app: &AppState, session: &Session) -> Vec<Line<'static>> {
    let turns = session.log().turns();
    if turns.is_empty() && !session.pending() {
        return EMPTY_STATE_LINES
            .iter()
            .map(|text| Line::styled(text.to_string(), Style::default().fg(Color::DarkGray)))
            .collect();
    }

    let mut lines = Vec::new();
    for (index, turn) in turns.iter().enumerate() {
        match turn {
            Turn::User(user) => {
                lines.push(Line::styled(
                    format!("[{}] You: {}", user.at.format("%H:%M:%S"), user.text),
                    Style::default().fg(Color::Blue),
                ));
            }
            Turn::Result(result) => {
                lines.push(Line::styled(
                    format!("[{}] Cadence: {}", result.at.format("%H:%M:%S"), result.summary),
                    Style::default().fg(Color::Green),
                ));
                let marker = if app.playing_turn == Some(index) { "▶ " } else { "" };
                let name = if result.artifact.suggested_filename().is_empty() {
                    "(unnamed track)"
                } else {
                    result.artifact.suggested_filename()
                };
                let size = result.artifact.handle().len();
                let detail = if size > 0 {
                    format!(
                        "    {marker}{name} · {} · {} KB",
                        settings_summary(result.settings),
                        size.div_ceil(1024),
                    )
                } else {
                    format!("    {marker}{name} · {} · released", settings_summary(result.settings))
                };
                lines.push(Line::styled(detail, Style::default().fg(Color::DarkGray)));
            }
            Turn::Error(error) => {
                lines.push(Line::styled(
                    format!("[{}] Cadence: {}", error.at.format("%H:%M:%S"), error.message),
                    Style::default().fg(Color::Red),
                ));
            }
        }
    }

    if session.pending() {
        lines.push(Line::styled(
            PENDING_LINE.to_string(),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ));
    }

    lines
}

fn draw_input(frame: &mut Frame, app: &AppState, session: &Session, area: Rect) {
    let title = if session.pending() { "Prompt (composing…)" } else { "Prompt" };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    frame.render_widget(Paragraph::new(app.input.as_str()).block(block), area);
}

fn draw_status(frame: &mut Frame, app: &AppState, area: Rect) {
    let mut lines: Vec<Line> =
        app.status_lines.iter().map(|line| Line::from(line.clone())).collect();
    if lines.is_empty() {
        lines.push(Line::from("No activity yet."));
    }
    lines.push(Line::styled(
        "Ctrl+S settings · Ctrl+P play · Ctrl+O studio · Ctrl+R reset",
        Style::default().fg(Color::DarkGray),
    ));

    let block = Block::default().title("Status").borders(Borders::ALL);
    frame.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: true }), area);
}

fn draw_settings(frame: &mut Frame, app: &AppState, session: &Session, area: Rect) {
    let settings = session.settings();
    let rows = [
        (SettingsField::Duration, format!("{} s", settings.duration_seconds())),
        (SettingsField::Tempo, format!("{} BPM", settings.tempo_bpm())),
        (SettingsField::Density, format!("{}", settings.density())),
    ];

    let lines: Vec<Line> = rows
        .into_iter()
        .map(|(field, value)| {
            let selected = field == app.selected_setting;
            let marker = if selected { "> " } else { "  " };
            let style = if selected {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Line::styled(format!("{marker}{:<11} {value}", field.label()), style)
        })
        .collect();

    let block = Block::default().title("Settings (↑↓ ←→)").borders(Borders::ALL);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}
