//! Rendering of the session view

use ratatui::{
    layout::{Constraint, Direction as LayoutDirection, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::client::session::SessionView;
use crate::client::ui::{UiState, HELP};
use crate::common::{ConnectionState, Direction};

const SIDEBAR_WIDTH: u16 = 28;

pub fn render(frame: &mut Frame, ui: &UiState, view: &SessionView) {
    let columns = Layout::default()
        .direction(LayoutDirection::Horizontal)
        .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(20)])
        .split(frame.area());

    let rows = Layout::default()
        .direction(LayoutDirection::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(columns[1]);

    render_peers(frame, columns[0], view);
    if ui.show_help {
        render_help(frame, rows[0]);
    } else {
        render_transcript(frame, rows[0], view);
    }
    render_input(frame, rows[1], ui);
    render_status(frame, rows[2], ui, view);
}

fn render_peers(frame: &mut Frame, area: Rect, view: &SessionView) {
    let items: Vec<ListItem> = view
        .peers
        .iter()
        .enumerate()
        .map(|(i, peer)| {
            let marker = if view.active == Some(i) { "●" } else { " " };
            let cursor = if view.selected == i { ">" } else { " " };
            let style = if view.selected == i {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(vec![
                Span::raw(format!("{} ", cursor)),
                Span::styled(marker, Style::default().fg(Color::Green)),
                Span::styled(format!(" {}", peer), style),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(" Peers "),
    );
    frame.render_widget(list, area);
}

fn render_transcript(frame: &mut Frame, area: Rect, view: &SessionView) {
    let lines: Vec<Line> = view
        .transcript
        .iter()
        .map(|message| {
            let (prefix, color) = match message.direction {
                Direction::Outbound => ("you", Color::Blue),
                Direction::Inbound => ("peer", Color::Green),
            };
            Line::from(vec![
                Span::styled(
                    format!("[{}] ", message.timestamp.format("%H:%M:%S")),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(
                    format!("{}: ", prefix),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ),
                Span::raw(message.text.as_str()),
            ])
        })
        .collect();

    // keep the newest lines in view
    let visible = area.height.saturating_sub(2) as usize;
    let scroll = lines.len().saturating_sub(visible) as u16;

    let title = match view.endpoint {
        Some(endpoint) => format!(" Chat with {} ", endpoint),
        None => " Chat ".to_string(),
    };
    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(title),
        )
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    frame.render_widget(paragraph, area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let lines: Vec<Line> = HELP.iter().map(|line| Line::from(*line)).collect();
    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Help "),
    );
    frame.render_widget(paragraph, area);
}

fn render_input(frame: &mut Frame, area: Rect, ui: &UiState) {
    let input = Paragraph::new(ui.input.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Message "),
    );
    frame.render_widget(input, area);

    let width = area.width.saturating_sub(2);
    let column = (ui.cursor as u16).min(width.saturating_sub(1));
    frame.set_cursor_position((area.x + column + 1, area.y + 1));
}

fn render_status(frame: &mut Frame, area: Rect, ui: &UiState, view: &SessionView) {
    let color = match view.state {
        ConnectionState::Connected => Color::Green,
        ConnectionState::Connecting => Color::Yellow,
        ConnectionState::Failed(_) => Color::Red,
        ConnectionState::Idle | ConnectionState::Closed => Color::DarkGray,
    };

    let mut spans = vec![Span::styled(
        format!(" {} ", view.state.label()),
        Style::default().fg(Color::Black).bg(color),
    )];
    if let Some(message) = ui.hint.as_deref().or(view.notice) {
        spans.push(Span::raw(format!(" {}", message)));
    } else {
        spans.push(Span::styled(
            " /help for commands",
            Style::default().fg(Color::DarkGray),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
