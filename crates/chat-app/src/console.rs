//! Line-oriented front end over a [`SessionRuntime`].
//!
//! Lines are display names while registration is visible and prompts
//! otherwise; `/`-prefixed lines are commands. Output is written as view
//! diffs so a reply is printed exactly once.

use std::io::{self, Write};

use nexus_api::Provider;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::chat::{Message, MessageStatus, Role};
use crate::error::SessionError;
use crate::health::ServerStatus;
use crate::session::{SessionEvent, SessionRuntime, SessionView};

/// How the console interleaves input with request completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// A person is typing: lines are handled as they arrive and a line sent
    /// while a request is pending is rejected.
    Interactive,
    /// Input is piped: each name or prompt waits for its request to finish
    /// before the next line is read.
    Sequential,
}

enum LineAction {
    Continue,
    Dispatched,
    Quit,
}

/// Runs until `/quit` or end of input. Requests still pending at end of
/// input are awaited, so their results are printed and persisted.
pub async fn run<R, W>(
    runtime: &mut SessionRuntime,
    input: R,
    out: W,
    pacing: Pacing,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut console = Console::new(out);
    if pacing == Pacing::Sequential {
        runtime.wait_until_idle().await;
    }
    console.greet(&runtime.view())?;
    console.render(&runtime.view())?;

    let mut lines = input.lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    runtime.wait_until_idle().await;
                    console.render(&runtime.view())?;
                    break;
                };
                match console.handle_line(runtime, &line)? {
                    LineAction::Quit => break,
                    LineAction::Dispatched if pacing == Pacing::Sequential => {
                        runtime.wait_until_idle().await;
                    }
                    LineAction::Dispatched | LineAction::Continue => {}
                }
            }
            alive = runtime.next_update() => {
                if !alive {
                    break;
                }
            }
        }
        console.render(&runtime.view())?;
    }

    console.out.flush()
}

/// Writes a finished assistant message with its details line.
pub fn write_message(out: &mut impl Write, message: &Message) -> io::Result<()> {
    match message.status {
        MessageStatus::Done => {
            writeln!(out, "{}", message.content)?;
            if let Some(details) = message.details() {
                writeln!(out, "  ({details})")?;
            }
            Ok(())
        }
        MessageStatus::Failed => writeln!(out, "! {}", message.content),
    }
}

/// Guard rejections are reported; validation failures already show in the view.
pub fn report_rejection(out: &mut impl Write, result: Result<(), SessionError>) -> io::Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(error) if error.is_validation() => Ok(false),
        Err(error) => {
            writeln!(out, "! {error}")?;
            Ok(false)
        }
    }
}

/// Output sink plus what it has already shown.
struct Console<W> {
    out: W,
    printed: usize,
    server_status: Option<ServerStatus>,
    registration_visible: bool,
    registration_error: Option<String>,
    loading: bool,
}

impl<W: Write> Console<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            printed: 0,
            server_status: None,
            registration_visible: false,
            registration_error: None,
            loading: false,
        }
    }

    fn greet(&mut self, view: &SessionView) -> io::Result<()> {
        if let Some(identity) = &view.identity {
            writeln!(
                self.out,
                "Signed in as {}. Type a message or /help.",
                identity.user_name
            )?;
        }
        Ok(())
    }

    fn handle_line(&mut self, runtime: &mut SessionRuntime, line: &str) -> io::Result<LineAction> {
        let trimmed = line.trim();
        if let Some(command) = trimmed.strip_prefix('/') {
            let (name, argument) = command
                .split_once(char::is_whitespace)
                .map(|(name, argument)| (name, argument.trim()))
                .unwrap_or((command, ""));

            match name {
                "quit" | "exit" => return Ok(LineAction::Quit),
                "switch" => {
                    report_rejection(&mut self.out, runtime.dispatch(SessionEvent::SwitchIdentity))?;
                }
                "status" => self.write_status(&runtime.view())?,
                "provider" => match argument.parse::<Provider>() {
                    Ok(provider) => {
                        let accepted = report_rejection(
                            &mut self.out,
                            runtime.dispatch(SessionEvent::SelectProvider(provider)),
                        )?;
                        if accepted {
                            writeln!(self.out, "using {}", provider.label())?;
                        }
                    }
                    Err(error) => writeln!(self.out, "! {error}")?,
                },
                "help" => self.write_help()?,
                other => writeln!(self.out, "! unknown command `/{other}`, try /help")?,
            }
            return Ok(LineAction::Continue);
        }

        let event = if runtime.view().registration_visible {
            SessionEvent::Register(line.to_string())
        } else {
            SessionEvent::Submit(line.to_string())
        };
        if report_rejection(&mut self.out, runtime.dispatch(event))? {
            Ok(LineAction::Dispatched)
        } else {
            Ok(LineAction::Continue)
        }
    }

    fn write_status(&mut self, view: &SessionView) -> io::Result<()> {
        let user = view
            .identity
            .as_ref()
            .map(|identity| format!("{} ({})", identity.user_name, identity.user_id))
            .unwrap_or_else(|| "not registered".to_string());
        writeln!(
            self.out,
            "server: {} | user: {} | provider: {}",
            view.server_status,
            user,
            view.provider.label()
        )
    }

    fn write_help(&mut self) -> io::Result<()> {
        writeln!(self.out, "/provider <openai|gemini>  choose the provider for new turns")?;
        writeln!(self.out, "/switch                    forget this identity and register again")?;
        writeln!(self.out, "/status                    show server, user and provider")?;
        writeln!(self.out, "/quit                      leave")
    }

    /// Writes only what changed since the previous view.
    fn render(&mut self, view: &SessionView) -> io::Result<()> {
        if self.server_status != Some(view.server_status) {
            writeln!(self.out, "[server {}]", view.server_status)?;
            self.server_status = Some(view.server_status);
        }

        for message in view.messages.iter().skip(self.printed) {
            // The user already sees what they typed.
            if message.role == Role::Assistant {
                write_message(&mut self.out, message)?;
            }
        }
        self.printed = view.messages.len();

        if view.registration_error != self.registration_error {
            if let Some(error) = &view.registration_error {
                writeln!(self.out, "! {error}")?;
            }
            self.registration_error = view.registration_error.clone();
        }

        if view.registration_visible && !self.registration_visible {
            writeln!(self.out, "Enter a display name to start chatting:")?;
        } else if !view.registration_visible
            && self.registration_visible
            && let Some(identity) = &view.identity
        {
            writeln!(
                self.out,
                "Welcome, {}! Type a message or /help.",
                identity.user_name
            )?;
        }
        self.registration_visible = view.registration_visible;

        if view.is_loading && !self.loading {
            writeln!(self.out, "... asking {}", view.provider.label())?;
        }
        self.loading = view.is_loading;

        self.out.flush()
    }
}
