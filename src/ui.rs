use color_eyre::eyre::Result;
use crossterm::event::{
    Event,
    EventStream,
    KeyCode,
    KeyEventKind,
    KeyModifiers,
};
use crossterm::terminal::{
    disable_raw_mode,
    enable_raw_mode,
};
use futures::StreamExt;
use ratatui::prelude::*;
use ratatui::widgets::*;
use std::io::stdout;
use wave_portal::{
    contract::MAX_WAVE_LEN,
    session::SessionState,
};

pub enum UserEvent {
    Quit,
    Connect,
    Disconnect,
    Submit,
    Input(char),
    Backspace,
    Redraw,
}

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

pub struct UiState {
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
    events: EventStream,
    spinner: usize,
}

impl Default for UiState {
    fn default() -> Self {
        UiState {
            terminal: None,
            events: EventStream::new(),
            spinner: 0,
        }
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // One persistent Terminal so buffers survive across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, snap: &SessionState) -> Result<()> {
    if snap.mining {
        state.spinner = (state.spinner + 1) % SPINNER.len();
    }
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

pub async fn next_event(state: &mut UiState, connected: bool) -> Result<UserEvent> {
    loop {
        let Some(event) = state.events.next().await else {
            return Ok(UserEvent::Quit);
        };
        match event? {
            Event::Resize(_, _) => return Ok(UserEvent::Redraw),
            Event::Key(key) => {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                return Ok(match key.code {
                    KeyCode::Esc => UserEvent::Quit,
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        UserEvent::Quit
                    }
                    KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        UserEvent::Disconnect
                    }
                    KeyCode::Enter => UserEvent::Submit,
                    KeyCode::Backspace => UserEvent::Backspace,
                    KeyCode::Char('c') if !connected => UserEvent::Connect,
                    KeyCode::Char(c) if connected => UserEvent::Input(c),
                    _ => continue,
                });
            }
            _ => continue,
        }
    }
}

fn ui(f: &mut Frame, state: &UiState, snap: &SessionState) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Length(3), // draft
            Constraint::Length(3), // status / mining
            Constraint::Min(5),    // wave history
            Constraint::Length(5), // errors + help
        ])
        .split(f.area());

    draw_header(f, chunks[0], snap);
    draw_draft(f, chunks[1], snap);
    draw_status(f, state, chunks[2], snap);
    draw_waves(f, chunks[3], snap);
    draw_footer(f, chunks[4], snap);
}

fn draw_header(f: &mut Frame, area: Rect, snap: &SessionState) {
    let header = Paragraph::new(identity_line(snap.account))
        .block(Block::default().borders(Borders::ALL).title(" 👋 Wave Portal "));
    f.render_widget(header, area);
}

fn draw_draft(f: &mut Frame, area: Rect, snap: &SessionState) {
    let remaining = MAX_WAVE_LEN.saturating_sub(snap.draft.chars().count());
    let style = if snap.connected {
        Style::default()
    } else {
        Style::default().add_modifier(Modifier::DIM)
    };
    let draft = Paragraph::new(snap.draft.as_str()).style(style).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" message ({remaining} left) ")),
    );
    f.render_widget(draft, area);
}

fn draw_status(f: &mut Frame, state: &UiState, area: Rect, snap: &SessionState) {
    let line = if snap.mining {
        format!("{} mining...", SPINNER[state.spinner])
    } else {
        format!("Total Waves: {} | {}", snap.wave_count, snap.status)
    };
    let status =
        Paragraph::new(line).block(Block::default().borders(Borders::ALL).title(" status "));
    f.render_widget(status, area);
}

fn draw_waves(f: &mut Frame, area: Rect, snap: &SessionState) {
    let items: Vec<ListItem> = snap
        .wave_history
        .iter()
        .rev()
        .map(|wave| {
            ListItem::new(Line::from(vec![
                Span::styled(short_address(wave.address), Style::default().fg(Color::Cyan)),
                Span::raw("  "),
                Span::styled(
                    wave.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                    Style::default().add_modifier(Modifier::DIM),
                ),
                Span::raw("  "),
                Span::raw(wave.message.clone()),
            ]))
        })
        .collect();
    let list =
        List::new(items).block(Block::default().borders(Borders::ALL).title(" waves "));
    f.render_widget(list, area);
}

fn draw_footer(f: &mut Frame, area: Rect, snap: &SessionState) {
    let mut lines: Vec<Line> = snap
        .errors
        .iter()
        .rev()
        .take(3)
        .map(|e| Line::styled(e.clone(), Style::default().fg(Color::Red)))
        .collect();
    lines.push(Line::from(
        "Enter: wave | c: connect | Ctrl-D: disconnect | Esc: quit",
    ));
    let footer =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" log "));
    f.render_widget(footer, area);
}

fn identity_line(account: Option<alloy_primitives::Address>) -> String {
    match account {
        Some(account) => format!("connected: {}", short_address(account)),
        None => String::from("not connected, press c to connect your wallet"),
    }
}

fn short_address(address: alloy_primitives::Address) -> String {
    let hex = address.to_string();
    if hex.len() <= 12 {
        return hex;
    }
    format!("{}...{}", &hex[..6], &hex[hex.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;

    #[test]
    fn short_address__stays_plain_ascii() {
        let shortened = short_address(Address::repeat_byte(0xab));
        assert!(shortened.is_ascii());
        assert!(shortened.contains("..."));
    }

    #[test]
    fn identity_line__stays_plain_ascii() {
        assert!(identity_line(None).is_ascii());
        assert!(identity_line(Some(Address::repeat_byte(0xab))).is_ascii());
    }
}
