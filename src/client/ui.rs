use std::path::PathBuf;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::client::session::Intent;
use crate::common::PeerEndpoint;

pub const HELP: &[&str] = &[
    "/connect            connect to the selected peer (F5)",
    "/disconnect         close the connection (F6)",
    "/peer host[:port]   add a peer to the list",
    "/save <file>        write the transcript as JSON",
    "/help               toggle this help",
    "/quit               exit (Esc, Ctrl+C)",
    "Up/Down             select a peer",
];

/// Input line state. Every key produces a new value instead of editing in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiState {
    /// Current input text
    pub input: String,
    /// Cursor position, counted in characters
    pub cursor: usize,
    pub show_help: bool,
    /// Local feedback such as a command usage error
    pub hint: Option<String>,
}

/// What a line typed into the input box means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Intent(Intent),
    ToggleHelp,
    Invalid(String),
}

impl UiState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next state after `key`, plus the intent it triggers, if any
    pub fn update(&self, key: KeyEvent) -> (UiState, Option<Intent>) {
        let mut next = self.clone();
        if key.kind == KeyEventKind::Release {
            return (next, None);
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let intent = match key.code {
            KeyCode::Char('c') if ctrl => Some(Intent::Quit),
            KeyCode::Esc => Some(Intent::Quit),
            KeyCode::F(5) => Some(Intent::RequestConnect),
            KeyCode::F(6) => Some(Intent::RequestDisconnect),
            KeyCode::Up => Some(Intent::SelectPrevious),
            KeyCode::Down => Some(Intent::SelectNext),
            KeyCode::Enter => next.submit(),
            KeyCode::Char(c) if !ctrl => {
                let at = next.byte_offset(next.cursor);
                next.input.insert(at, c);
                next.cursor += 1;
                None
            }
            KeyCode::Backspace => {
                if next.cursor > 0 {
                    next.cursor -= 1;
                    let at = next.byte_offset(next.cursor);
                    next.input.remove(at);
                }
                None
            }
            KeyCode::Delete => {
                if next.cursor < next.char_count() {
                    let at = next.byte_offset(next.cursor);
                    next.input.remove(at);
                }
                None
            }
            KeyCode::Left => {
                next.cursor = next.cursor.saturating_sub(1);
                None
            }
            KeyCode::Right => {
                next.cursor = (next.cursor + 1).min(next.char_count());
                None
            }
            KeyCode::Home => {
                next.cursor = 0;
                None
            }
            KeyCode::End => {
                next.cursor = next.char_count();
                None
            }
            _ => None,
        };
        (next, intent)
    }

    /// Consumes the input line on Enter
    fn submit(&mut self) -> Option<Intent> {
        let line = std::mem::take(&mut self.input);
        self.cursor = 0;
        self.hint = None;

        match parse_command(&line)? {
            Command::Intent(intent) => Some(intent),
            Command::ToggleHelp => {
                self.show_help = !self.show_help;
                None
            }
            Command::Invalid(message) => {
                self.hint = Some(message);
                None
            }
        }
    }

    fn char_count(&self) -> usize {
        self.input.chars().count()
    }

    fn byte_offset(&self, chars: usize) -> usize {
        self.input
            .char_indices()
            .nth(chars)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }
}

/// Parses an input line. Text not starting with `/` is a chat message; a blank
/// line means nothing.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(Command::Intent(Intent::SubmitMessage(line.to_string())));
    }

    let (command, arg) = match line.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (line, ""),
    };

    let parsed = match command {
        "/connect" | "/c" => Command::Intent(Intent::RequestConnect),
        "/disconnect" | "/d" => Command::Intent(Intent::RequestDisconnect),
        "/quit" | "/q" => Command::Intent(Intent::Quit),
        "/help" | "/h" => Command::ToggleHelp,
        "/peer" if arg.is_empty() => Command::Invalid("usage: /peer host[:port]".to_string()),
        "/peer" => match arg.parse::<PeerEndpoint>() {
            Ok(endpoint) => Command::Intent(Intent::AddPeer(endpoint)),
            Err(e) => Command::Invalid(format!("invalid peer '{}': {}", arg, e)),
        },
        "/save" if arg.is_empty() => Command::Invalid("usage: /save <file>".to_string()),
        "/save" => Command::Intent(Intent::Export(PathBuf::from(arg))),
        other => Command::Invalid(format!(
            "unknown command '{}', type /help for commands",
            other
        )),
    };
    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(state: UiState, text: &str) -> UiState {
        text.chars()
            .fold(state, |s, c| s.update(key(KeyCode::Char(c))).0)
    }

    #[test]
    fn typing_builds_input_without_intents() {
        let state = type_text(UiState::new(), "hi");
        assert_eq!(state.input, "hi");
        assert_eq!(state.cursor, 2);
    }

    #[test]
    fn update_leaves_previous_state_untouched() {
        let before = type_text(UiState::new(), "ab");
        let (after, _) = before.update(key(KeyCode::Backspace));
        assert_eq!(before.input, "ab");
        assert_eq!(after.input, "a");
    }

    #[test]
    fn enter_submits_message_and_clears_input() {
        let state = type_text(UiState::new(), "hello");
        let (state, intent) = state.update(key(KeyCode::Enter));
        assert_eq!(intent, Some(Intent::SubmitMessage("hello".to_string())));
        assert!(state.input.is_empty());
        assert_eq!(state.cursor, 0);
    }

    #[test]
    fn enter_on_empty_input_does_nothing() {
        let (_, intent) = UiState::new().update(key(KeyCode::Enter));
        assert_eq!(intent, None);
        let state = type_text(UiState::new(), "   ");
        assert_eq!(state.update(key(KeyCode::Enter)).1, None);
    }

    #[test]
    fn editing_handles_multibyte_characters() {
        let state = type_text(UiState::new(), "grüß");
        let (state, _) = state.update(key(KeyCode::Left));
        let (state, _) = state.update(key(KeyCode::Backspace));
        assert_eq!(state.input, "grß");
        let (state, _) = state.update(key(KeyCode::Home));
        let (state, _) = state.update(key(KeyCode::Delete));
        assert_eq!(state.input, "rß");
        let (state, _) = state.update(key(KeyCode::End));
        assert_eq!(state.cursor, 2);
    }

    #[test]
    fn control_keys_map_to_intents() {
        let state = UiState::new();
        assert_eq!(
            state
                .update(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL))
                .1,
            Some(Intent::Quit)
        );
        assert_eq!(state.update(key(KeyCode::Esc)).1, Some(Intent::Quit));
        assert_eq!(state.update(key(KeyCode::F(5))).1, Some(Intent::RequestConnect));
        assert_eq!(state.update(key(KeyCode::F(6))).1, Some(Intent::RequestDisconnect));
        assert_eq!(state.update(key(KeyCode::Down)).1, Some(Intent::SelectNext));
        assert_eq!(state.update(key(KeyCode::Up)).1, Some(Intent::SelectPrevious));
    }

    #[test]
    fn commands_are_parsed() {
        assert_eq!(
            parse_command("/connect"),
            Some(Command::Intent(Intent::RequestConnect))
        );
        assert_eq!(parse_command("/q"), Some(Command::Intent(Intent::Quit)));
        assert_eq!(
            parse_command("/peer 10.0.0.5:6000"),
            Some(Command::Intent(Intent::AddPeer(
                PeerEndpoint::new("10.0.0.5", 6000).unwrap()
            )))
        );
        assert_eq!(
            parse_command("/save chat.json"),
            Some(Command::Intent(Intent::Export(PathBuf::from("chat.json"))))
        );
        assert_eq!(parse_command("/help"), Some(Command::ToggleHelp));
        assert!(matches!(parse_command("/peer"), Some(Command::Invalid(_))));
        assert!(matches!(parse_command("/peer host:0"), Some(Command::Invalid(_))));
        assert!(matches!(parse_command("/bogus"), Some(Command::Invalid(_))));
    }

    #[test]
    fn invalid_command_sets_hint() {
        let state = type_text(UiState::new(), "/bogus");
        let (state, intent) = state.update(key(KeyCode::Enter));
        assert_eq!(intent, None);
        assert!(state.hint.unwrap().contains("/bogus"));
    }

    #[test]
    fn help_command_toggles_help() {
        let state = type_text(UiState::new(), "/help");
        let (state, _) = state.update(key(KeyCode::Enter));
        assert!(state.show_help);
    }
}
