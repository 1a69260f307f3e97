//! Terminal presentation of the talk screen
//!
//! The runner publishes [`UiEvent`]s; [`TerminalUi`] turns them into status
//! lines, the streamed reply, and hint prompts on stdout.

use std::io::{self, Write};

use tokio::sync::mpsc;

use crate::capture::CaptureAvailability;
use crate::prompts::PromptKind;
use crate::turn::Mode;

/// Something the screen should reflect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// Interaction state changed
    Mode(Mode),
    /// Microphone control enabled or disabled
    Availability(CaptureAvailability),
    /// Revealed reply text so far
    ReplyText { text: String, complete: bool },
    /// Reply text removed
    ReplyCleared,
    /// Hint shown or hidden
    Prompt { kind: PromptKind, visible: bool },
}

/// Status line for a state
#[must_use]
pub const fn status_line(mode: Mode, availability: CaptureAvailability) -> &'static str {
    match (mode, availability) {
        (Mode::Listening, _) => "Listening... Press Enter to stop",
        (Mode::AwaitingReply, _) => "Processing...",
        (Mode::Playing, _) => "Playing Response... Press Enter to interrupt",
        (Mode::Idle, CaptureAvailability::Available) => "Voice Assistant: Press Enter to start",
        (Mode::Idle, CaptureAvailability::Denied) => {
            "Microphone Access Denied: allow microphone access and restart"
        }
        (Mode::Idle, CaptureAvailability::Unsupported) => {
            "Speech recognition is not configured: set a recognizer API key"
        }
    }
}

/// Writes talk screen updates to a terminal
pub struct TerminalUi<W> {
    out: W,
    mode: Mode,
    availability: CaptureAvailability,
    revealed: usize,
}

impl<W: Write> TerminalUi<W> {
    pub const fn new(out: W) -> Self {
        Self {
            out,
            mode: Mode::Idle,
            availability: CaptureAvailability::Available,
            revealed: 0,
        }
    }

    /// Render one event
    ///
    /// # Errors
    ///
    /// Returns error if writing to the terminal fails
    pub fn handle(&mut self, event: &UiEvent) -> io::Result<()> {
        match event {
            UiEvent::Mode(mode) => {
                self.mode = *mode;
                self.status()?;
            }
            UiEvent::Availability(availability) => {
                self.availability = *availability;
                self.status()?;
            }
            UiEvent::ReplyText { text, complete } => {
                if self.revealed == 0 {
                    write!(self.out, "\n> ")?;
                }
                let fresh: String = text.chars().skip(self.revealed).collect();
                self.revealed += fresh.chars().count();
                write!(self.out, "{fresh}")?;
                if *complete {
                    writeln!(self.out)?;
                    self.revealed = 0;
                }
            }
            UiEvent::ReplyCleared => self.break_reply()?,
            UiEvent::Prompt {
                kind,
                visible: true,
            } => {
                self.break_reply()?;
                writeln!(self.out, "  ({})", kind.message())?;
            }
            UiEvent::Prompt { visible: false, .. } => {}
        }
        self.out.flush()
    }

    fn status(&mut self) -> io::Result<()> {
        self.break_reply()?;
        writeln!(self.out, "[{}]", status_line(self.mode, self.availability))
    }

    /// End a partially revealed reply line before printing anything else
    fn break_reply(&mut self) -> io::Result<()> {
        if self.revealed > 0 {
            self.revealed = 0;
            writeln!(self.out)?;
        }
        Ok(())
    }
}

/// Render events until the sender side closes
pub async fn present<W: Write>(mut ui: TerminalUi<W>, mut events: mpsc::UnboundedReceiver<UiEvent>) {
    while let Some(event) = events.recv().await {
        if let Err(e) = ui.handle(&event) {
            tracing::warn!(error = %e, "failed to write to terminal");
        }
    }
}
