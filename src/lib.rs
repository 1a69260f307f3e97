//! Brochure Voice - voice client for the talking brochure
//!
//! This library provides the turn-taking loop behind the talking brochure:
//! - Language selection and conversation sessions
//! - Microphone capture as transcripts or recordings
//! - Dialogue requests to the remote conversational endpoint
//! - Reply playback, re-arming capture when it finishes
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Terminal UI                      │
//! │   Status  │  Streamed reply  │  Hint prompts         │
//! └────────────────────┬────────────────────────────────┘
//!                      │ UiEvent
//! ┌────────────────────▼────────────────────────────────┐
//! │                      Runner                          │
//! │   TurnController  │  Timers  │  Capture  │  Player   │
//! └────────────────────┬────────────────────────────────┘
//!                      │ HTTP
//! ┌────────────────────▼────────────────────────────────┐
//! │              Dialogue endpoint (remote)              │
//! │   Reply text  │  Reply speech                        │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod capture;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod prompts;
pub mod recognizer;
pub mod runner;
pub mod session;
pub mod streaming;
pub mod turn;
pub mod ui;
pub mod variant;
pub mod voice;

pub use capture::{Capture, CaptureAvailability, CaptureEvent, RecordingCapture, TranscriptCapture};
pub use config::Config;
pub use dialogue::{Dialogue, DialogueClient, DialogueFailure, DialogueReply, Utterance};
pub use error::{Error, Result};
pub use recognizer::{Recognizer, SpeechToText, SttProvider};
pub use runner::{MicButton, Runner};
pub use session::{Language, Platform, RefreshGuard, Route, SessionId};
pub use turn::{Effect, Mode, TurnController};
pub use ui::{TerminalUi, UiEvent};
pub use variant::{Variant, VariantProfile};
