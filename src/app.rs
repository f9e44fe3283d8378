use anyhow::Result;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::api::ApiClient;
use crate::config::Config;
use crate::state::{SessionController, SessionEvent, SessionUpdate};
use crate::types::KNOWN_MODELS;

const DOUBLE_INTERRUPT_EXIT_WINDOW: Duration = Duration::from_secs(2);
const HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Chats,
    New,
    Open(Option<usize>),
    Rename(Option<String>),
    Model(Option<String>),
    Temperature(Option<String>),
    Role(Option<String>),
    Cancel,
    History,
    Help,
    Quit,
    Unknown(String),
    Prompt(String),
}

/// Splits a line of input into a local command or a prompt. Blank lines
/// yield `None`.
fn parse_command(line: &str) -> Option<Command> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !trimmed.starts_with('/') {
        return Some(Command::Prompt(trimmed.to_string()));
    }

    let (name, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (trimmed, ""),
    };
    let argument = (!rest.is_empty()).then(|| rest.to_string());

    let command = match name {
        "/chats" | "/ls" => Command::Chats,
        "/new" => Command::New,
        "/open" => Command::Open(rest.parse().ok()),
        "/rename" => Command::Rename(argument),
        "/model" => Command::Model(argument),
        "/temp" | "/temperature" => Command::Temperature(argument),
        "/role" => Command::Role(argument),
        "/cancel" => Command::Cancel,
        "/history" => Command::History,
        "/help" | "/commands" => Command::Help,
        "/q" | "/quit" | "/exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    };
    Some(command)
}

/// Line-oriented chat front end over a [`SessionController`].
pub struct App {
    controller: SessionController<ApiClient>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    should_quit: bool,
    mid_line: bool,
    last_interrupt_at: Option<Instant>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let client = ApiClient::new(&config)?;
        tracing::info!(
            api_url = client.base_url(),
            local = client.is_local_endpoint(),
            "chat backend configured"
        );
        let (controller, events_rx) =
            SessionController::new(Arc::new(client), config.prompt_settings());

        Ok(Self {
            controller,
            events_rx,
            should_quit: false,
            mid_line: false,
            last_interrupt_at: None,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        let update = self.controller.load_chats().await;
        self.render_update(update)?;
        if self.controller.state().chats.is_empty() {
            self.print_notice("No chats yet. Type /new to start one.")?;
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        if self.controller.state().active_chat.is_none() {
            self.print_prompt()?;
        }

        while !self.should_quit {
            tokio::select! {
                event = self.events_rx.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    let update = self.controller.handle_event(event);
                    self.render_update(update)?;
                }
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    self.clear_interrupt_window();
                    match parse_command(&line) {
                        Some(command) => self.execute(command).await?,
                        None => self.print_prompt()?,
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    self.handle_interrupt()?;
                }
            }
        }

        self.controller.cancel_stream();
        self.ensure_newline()?;
        Ok(())
    }

    async fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Prompt(text) => {
                self.controller.set_input(text);
                let update = self.controller.submit_prompt().await;
                self.render_update(update)?;
                return Ok(());
            }
            Command::Chats => self.print_chats()?,
            Command::New => {
                let update = self.controller.create_chat().await;
                self.render_update(update)?;
            }
            Command::Open(Some(index)) => {
                let chat_id = self
                    .controller
                    .state()
                    .chats
                    .get(index.wrapping_sub(1))
                    .map(|chat| chat.id);
                match chat_id {
                    Some(chat_id) => {
                        let update = self.controller.select_chat(chat_id);
                        if update == SessionUpdate::Ignored {
                            self.print_notice("chat is already open")?;
                            return Ok(());
                        }
                        // The prompt follows the history once it arrives.
                        return self.render_update(update);
                    }
                    None => self.print_error(&format!("no chat #{index}; see /chats"))?,
                }
            }
            Command::Open(None) => self.print_error("usage: /open <number>")?,
            Command::Rename(title) => {
                // Without a title the last draft is saved again, e.g. after a failed rename.
                if let Some(title) = title {
                    self.controller.set_title_draft(title);
                }
                let update = self.controller.save_title_draft().await;
                self.render_update(update)?;
            }
            Command::Model(None) => {
                let current = self.controller.state().settings.model.clone();
                self.print_notice(&format!(
                    "model: {current} (known: {})",
                    KNOWN_MODELS.join(", ")
                ))?;
            }
            Command::Model(Some(model)) => {
                let update = self.controller.set_model(&model);
                self.render_update(update)?;
            }
            Command::Temperature(None) => {
                let current = self.controller.state().settings.temperature;
                self.print_notice(&format!("temperature: {current:.1}"))?;
            }
            Command::Temperature(Some(raw)) => match raw.parse::<f32>() {
                Ok(value) => {
                    let update = self.controller.set_temperature(value);
                    self.render_update(update)?;
                }
                Err(_) => self.print_error(&format!("not a number: {raw}"))?,
            },
            Command::Role(None) => {
                let current = self.controller.state().settings.role.clone();
                self.print_notice(&format!("role: {current}"))?;
            }
            Command::Role(Some(role)) => {
                let update = self.controller.set_role(&role);
                self.render_update(update)?;
            }
            Command::Cancel => {
                let update = self.controller.cancel_stream();
                if update == SessionUpdate::Ignored {
                    self.print_notice("nothing to cancel")?;
                } else {
                    self.render_update(update)?;
                }
            }
            Command::History => self.print_history()?,
            Command::Help => self.print_help()?,
            Command::Quit => {
                self.should_quit = true;
                return Ok(());
            }
            Command::Unknown(name) => {
                self.print_error(&format!("unknown command {name}; try /help"))?
            }
        }
        if !self.controller.is_streaming() {
            self.print_prompt()?;
        }
        Ok(())
    }

    fn render_update(&mut self, update: SessionUpdate) -> Result<()> {
        match update {
            SessionUpdate::Ignored => {}
            SessionUpdate::ChatsLoaded { count } => {
                tracing::debug!(count, "rendering chat list");
            }
            SessionUpdate::ChatCreated(_) | SessionUpdate::ChatSelected(_) => {
                let title = self
                    .controller
                    .state()
                    .active_chat()
                    .map(|chat| chat.title.clone())
                    .unwrap_or_else(|| self.controller.state().title_draft.clone());
                self.print_notice(&format!("Chat: {title}"))?;
            }
            SessionUpdate::TitleSaved(title) => {
                self.print_notice(&format!("Renamed to \"{title}\""))?;
            }
            SessionUpdate::SettingsChanged => {
                let settings = &self.controller.state().settings;
                let line = format!(
                    "model {} | temperature {:.1} | role \"{}\"",
                    settings.model, settings.temperature, settings.role
                );
                self.print_notice(&line)?;
            }
            SessionUpdate::StreamStarted { .. } => {
                self.ensure_newline()?;
                let mut stdout = io::stdout();
                write!(stdout, "Assistant: ")?;
                stdout.flush()?;
                self.mid_line = true;
            }
            SessionUpdate::Fragment(text) => {
                let mut stdout = io::stdout();
                write!(stdout, "{text}")?;
                stdout.flush()?;
                self.mid_line = !text.ends_with('\n');
            }
            SessionUpdate::Reconciling => {
                self.ensure_newline()?;
                if let Some(warning) = self.controller.state().decode_warning {
                    self.print_notice(&format!(
                        "response ended mid-character ({} bytes dropped)",
                        warning.dropped_bytes
                    ))?;
                }
            }
            SessionUpdate::Reconciled => {
                if !self.mid_line {
                    self.print_prompt()?;
                }
            }
            SessionUpdate::HistoryLoaded(_) => {
                self.print_history()?;
                self.print_prompt()?;
            }
            SessionUpdate::Cancelled => {
                self.ensure_newline()?;
                self.print_notice("Cancelled")?;
                self.print_prompt()?;
            }
            SessionUpdate::Failed(error) => {
                let message = self
                    .controller
                    .state()
                    .error
                    .clone()
                    .unwrap_or_else(|| error.user_message());
                self.print_error(&message)?;
                if !self.controller.is_streaming() {
                    self.print_prompt()?;
                }
            }
        }
        Ok(())
    }

    /// Ctrl-C stops the current response; pressed twice while idle it exits.
    fn handle_interrupt(&mut self) -> Result<()> {
        if self.controller.is_streaming() {
            let update = self.controller.cancel_stream();
            self.clear_interrupt_window();
            return self.render_update(update);
        }

        let now = Instant::now();
        let should_exit = self
            .last_interrupt_at
            .is_some_and(|last| now.duration_since(last) <= DOUBLE_INTERRUPT_EXIT_WINDOW);
        self.last_interrupt_at = Some(now);
        if should_exit {
            self.should_quit = true;
            return Ok(());
        }
        self.ensure_newline()?;
        self.print_notice("Press Ctrl-C again to exit")?;
        self.print_prompt()
    }

    fn clear_interrupt_window(&mut self) {
        self.last_interrupt_at = None;
    }

    fn print_chats(&mut self) -> Result<()> {
        let state = self.controller.state();
        let mut lines = vec!["* Chats".to_string()];
        if state.chats.is_empty() {
            lines.push("  └ none yet, /new creates one".to_string());
        }
        for (index, chat) in state.chats.iter().enumerate() {
            let marker = if state.active_chat == Some(chat.id) {
                '>'
            } else {
                ' '
            };
            lines.push(format!(
                " {marker}{:>3}. {} ({})",
                index + 1,
                chat.title,
                chat.created_at
            ));
        }
        self.print_lines(&lines)
    }

    fn print_history(&mut self) -> Result<()> {
        let messages = self.controller.state().messages.messages();
        let start = messages.len().saturating_sub(HISTORY_LIMIT);
        let mut lines = Vec::new();
        if messages.is_empty() {
            lines.push("* No messages yet".to_string());
        }
        for message in &messages[start..] {
            lines.push(format!("You: {}", message.content));
            lines.push(format!("Assistant: {}", message.response));
        }
        self.print_lines(&lines)
    }

    fn print_help(&mut self) -> Result<()> {
        let lines = [
            "* Commands",
            "  └ /chats, /new, /open <n>, /rename [title], /history",
            "    /model [name], /temp [0.0-1.0], /role [text]",
            "    /cancel (or Ctrl-C) stops a response, /quit exits",
        ]
        .map(String::from);
        self.print_lines(&lines)
    }

    fn print_lines(&mut self, lines: &[String]) -> Result<()> {
        self.ensure_newline()?;
        let mut stdout = io::stdout().lock();
        for line in lines {
            writeln!(stdout, "{line}")?;
        }
        stdout.flush()?;
        Ok(())
    }

    fn print_notice(&mut self, message: &str) -> Result<()> {
        self.print_lines(&[format!("* {message}")])
    }

    fn print_error(&mut self, message: &str) -> Result<()> {
        self.ensure_newline()?;
        let mut stderr = io::stderr();
        writeln!(stderr, "error: {message}")?;
        stderr.flush()?;
        Ok(())
    }

    fn print_prompt(&mut self) -> Result<()> {
        self.ensure_newline()?;
        let mut stdout = io::stdout();
        write!(stdout, "You: ")?;
        stdout.flush()?;
        self.mid_line = true;
        Ok(())
    }

    fn ensure_newline(&mut self) -> Result<()> {
        if self.mid_line {
            let mut stdout = io::stdout();
            writeln!(stdout)?;
            stdout.flush()?;
            self.mid_line = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_a_prompt() {
        assert_eq!(
            parse_command("  tell me a joke \n"),
            Some(Command::Prompt("tell me a joke".to_string()))
        );
    }

    #[test]
    fn test_blank_line_is_ignored() {
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn test_open_takes_a_number() {
        assert_eq!(parse_command("/open 2"), Some(Command::Open(Some(2))));
        assert_eq!(parse_command("/open two"), Some(Command::Open(None)));
        assert_eq!(parse_command("/open"), Some(Command::Open(None)));
    }

    #[test]
    fn test_rename_keeps_inner_spaces() {
        assert_eq!(
            parse_command("/rename  Weekend  plans "),
            Some(Command::Rename(Some("Weekend  plans".to_string())))
        );
        assert_eq!(parse_command("/rename"), Some(Command::Rename(None)));
    }

    #[test]
    fn test_settings_commands_with_and_without_argument() {
        assert_eq!(parse_command("/model"), Some(Command::Model(None)));
        assert_eq!(
            parse_command("/model gpt-4"),
            Some(Command::Model(Some("gpt-4".to_string())))
        );
        assert_eq!(
            parse_command("/temp 0.2"),
            Some(Command::Temperature(Some("0.2".to_string())))
        );
        assert_eq!(
            parse_command("/role You are terse."),
            Some(Command::Role(Some("You are terse.".to_string())))
        );
    }

    #[test]
    fn test_quit_aliases_and_unknown_commands() {
        for alias in ["/q", "/quit", "/exit"] {
            assert_eq!(parse_command(alias), Some(Command::Quit));
        }
        assert_eq!(
            parse_command("/frobnicate now"),
            Some(Command::Unknown("/frobnicate".to_string()))
        );
    }
}
