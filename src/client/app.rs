//! The interactive terminal loop

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::client::session::{ChatSession, Flow};
use crate::client::ui::UiState;
use crate::client::view;

/// How long a tick waits for a key before link events are drained again
const TICK: Duration = Duration::from_millis(100);

/// Runs the chat UI until the user quits. The session's link is closed on the
/// way out, including when the loop ends with an error.
pub fn run(session: &mut ChatSession) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, session);

    session.shutdown();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn event_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    session: &mut ChatSession,
) -> anyhow::Result<()> {
    let mut ui = UiState::new();

    loop {
        session.poll_events();
        terminal.draw(|frame| view::render(frame, &ui, &session.view()))?;

        if !event::poll(TICK)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };

        let (next, intent) = ui.update(key);
        ui = next;
        if let Some(intent) = intent {
            tracing::debug!(?intent, "intent");
            if session.handle(intent) == Flow::Quit {
                return Ok(());
            }
        }
    }
}
