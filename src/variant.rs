//! Interaction flow variants
//!
//! The three talk screens share one turn-taking controller. What differs
//! between them (capture strategy, request shape, fallback copy, and re-arm
//! timing) is captured here as a [`VariantProfile`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::dialogue::DialogueFailure;
use crate::session::Platform;
use crate::{Error, Result};

/// Delay between a capture result and the dialogue request
pub const DEBOUNCE: Duration = Duration::from_millis(300);

/// Delay before the automatic greeting request in the speech and recording flows
pub const GREETING_DELAY: Duration = Duration::from_millis(1800);

/// Recording ceiling for the manual-recording flow
pub const RECORDING_CEILING: Duration = Duration::from_secs(5);

/// Hard timeout on dialogue requests in the manual-recording flow
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const REARM_AFTER_PLAYBACK: Duration = Duration::from_millis(500);

/// Talk screen flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Speech recognition produces text transcripts
    Speech,
    /// Manual recording produces audio blobs (the iOS flow)
    Recording,
    /// Speech recognition against the avatar chat endpoint
    Avatar,
}

impl Variant {
    /// Flow used on a platform when none is configured
    #[must_use]
    pub const fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Ios => Self::Recording,
            Platform::Android => Self::Speech,
        }
    }

    /// Route path of the talk screen
    #[must_use]
    pub const fn route_path(self) -> &'static str {
        match self {
            Self::Speech => "/talking-brochure",
            Self::Recording => "/talking-iOS-brochure",
            Self::Avatar => "/avatar",
        }
    }

    /// Resolve a route path back to its flow
    #[must_use]
    pub fn from_route_path(path: &str) -> Option<Self> {
        let path = path.trim_end_matches('/');
        [Self::Speech, Self::Recording, Self::Avatar]
            .into_iter()
            .find(|v| v.route_path() == path)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Speech => "speech",
            Self::Recording => "recording",
            Self::Avatar => "avatar",
        })
    }
}

impl FromStr for Variant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "speech" | "android" => Ok(Self::Speech),
            "recording" | "ios" => Ok(Self::Recording),
            "avatar" => Ok(Self::Avatar),
            other => Err(Error::Config(format!("unknown variant: {other}"))),
        }
    }
}

/// What the capture stage produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    /// Text transcript from a speech recognizer
    Transcript,
    /// Recorded audio blob
    Recording,
}

/// Body layout of a dialogue request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestShape {
    /// `{data, language, session_id}` to the process endpoint
    Process,
    /// `{user_text, language, platform, session_id}` to the chat endpoint
    Chat { platform: Platform },
    /// `{session_id, user_text, is_avatar}` to the chat endpoint
    Avatar,
}

/// Reply text shown when the response carries none
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFallback {
    /// Show nothing
    None,
    /// Fixed copy
    Fixed(&'static str),
    /// Prefix followed by the submitted transcript
    Echo(&'static str),
}

impl TextFallback {
    /// Render the fallback for a submitted transcript, if any
    #[must_use]
    pub fn render(self, transcript: Option<&str>) -> Option<String> {
        match self {
            Self::None => None,
            Self::Fixed(text) => Some(text.to_string()),
            Self::Echo(prefix) => Some(format!("{prefix}{}", transcript.unwrap_or_default())),
        }
    }
}

/// Reply text shown when the request fails, by failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureText {
    pub timeout: Option<&'static str>,
    pub network: Option<&'static str>,
    pub other: Option<&'static str>,
}

impl FailureText {
    /// Same copy for every failure
    #[must_use]
    pub const fn uniform(text: &'static str) -> Self {
        Self {
            timeout: Some(text),
            network: Some(text),
            other: Some(text),
        }
    }

    /// No copy at all
    #[must_use]
    pub const fn silent() -> Self {
        Self {
            timeout: None,
            network: None,
            other: None,
        }
    }

    /// Pick the copy for a failure
    #[must_use]
    pub const fn for_failure(&self, failure: &DialogueFailure) -> Option<&'static str> {
        match failure {
            DialogueFailure::Timeout => self.timeout,
            DialogueFailure::Network(_) => self.network,
            DialogueFailure::Status { .. } | DialogueFailure::Malformed(_) => self.other,
        }
    }
}

/// How the reply to one kind of request is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyPolicy {
    pub request: RequestShape,
    pub text_fallback: TextFallback,
    pub failure_text: FailureText,
    /// Re-arm capture after this delay when the reply has no audio
    pub rearm_without_audio: Option<Duration>,
    /// Re-arm capture after this delay when the request failed
    pub rearm_after_failure: Option<Duration>,
}

/// Re-arm behaviour once reply audio finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackRearm {
    /// Always restart capture after the delay
    Always(Duration),
    /// Restart only if the reply that started playback carried audio and
    /// nothing cleared the auto-restart flag since
    WhenAutoRestart(Duration),
}

/// Everything that distinguishes one talk screen from another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantProfile {
    pub variant: Variant,
    pub capture: CaptureKind,
    /// Capture stops on its own after this long
    pub auto_stop: Option<Duration>,
    pub debounce: Duration,
    /// Hard ceiling on each dialogue request
    pub timeout: Option<Duration>,
    pub playback_rearm: PlaybackRearm,
    pub greeting_delay: Duration,
    pub greeting_text: &'static str,
    pub greeting: ReplyPolicy,
    pub turn: ReplyPolicy,
}

impl VariantProfile {
    /// Build the profile for a flow
    #[must_use]
    pub const fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::Speech => Self::speech(),
            Variant::Recording => Self::recording(),
            Variant::Avatar => Self::avatar(),
        }
    }

    const fn speech() -> Self {
        Self {
            variant: Variant::Speech,
            capture: CaptureKind::Transcript,
            auto_stop: None,
            debounce: DEBOUNCE,
            timeout: None,
            playback_rearm: PlaybackRearm::Always(REARM_AFTER_PLAYBACK),
            greeting_delay: GREETING_DELAY,
            greeting_text: "who are you",
            greeting: ReplyPolicy {
                request: RequestShape::Process,
                text_fallback: TextFallback::Fixed("Hello! I'm your voice assistant."),
                failure_text: FailureText::uniform(
                    "Hello! I'm your voice assistant. How can I help you today?",
                ),
                rearm_without_audio: None,
                rearm_after_failure: None,
            },
            turn: ReplyPolicy {
                request: RequestShape::Process,
                text_fallback: TextFallback::Echo("I heard: "),
                failure_text: FailureText::uniform("Sorry, I couldn't process your request."),
                rearm_without_audio: None,
                rearm_after_failure: None,
            },
        }
    }

    const fn recording() -> Self {
        Self {
            variant: Variant::Recording,
            capture: CaptureKind::Recording,
            auto_stop: Some(RECORDING_CEILING),
            debounce: DEBOUNCE,
            timeout: Some(REQUEST_TIMEOUT),
            playback_rearm: PlaybackRearm::WhenAutoRestart(REARM_AFTER_PLAYBACK),
            greeting_delay: GREETING_DELAY,
            greeting_text: "start",
            greeting: ReplyPolicy {
                request: RequestShape::Chat {
                    platform: Platform::Android,
                },
                text_fallback: TextFallback::Fixed(
                    "Hello! I'm your voice assistant. How can I help you today?",
                ),
                failure_text: FailureText {
                    timeout: Some(
                        "Hello! I'm your voice assistant. The connection timed out, but I'm ready to help you.",
                    ),
                    network: Some(
                        "Hello! I'm your voice assistant. I'm having trouble connecting right now, but I'm ready to help you.",
                    ),
                    other: Some("Hello! I'm your voice assistant. How can I help you today?"),
                },
                rearm_without_audio: Some(Duration::from_millis(1000)),
                rearm_after_failure: Some(Duration::from_millis(2000)),
            },
            turn: ReplyPolicy {
                request: RequestShape::Chat {
                    platform: Platform::Ios,
                },
                text_fallback: TextFallback::Fixed("Audio processed successfully"),
                failure_text: FailureText {
                    timeout: Some("Sorry, the request timed out. Please try again."),
                    network: Some(
                        "Sorry, I'm having trouble connecting. Please check your internet connection and try again.",
                    ),
                    other: Some("Sorry, I couldn't process your audio."),
                },
                rearm_without_audio: Some(REARM_AFTER_PLAYBACK),
                rearm_after_failure: Some(Duration::from_millis(2000)),
            },
        }
    }

    const fn avatar() -> Self {
        Self {
            variant: Variant::Avatar,
            capture: CaptureKind::Transcript,
            auto_stop: None,
            debounce: DEBOUNCE,
            timeout: None,
            playback_rearm: PlaybackRearm::Always(Duration::ZERO),
            greeting_delay: Duration::ZERO,
            greeting_text: "start",
            greeting: ReplyPolicy {
                request: RequestShape::Avatar,
                text_fallback: TextFallback::None,
                failure_text: FailureText::silent(),
                rearm_without_audio: None,
                rearm_after_failure: None,
            },
            turn: ReplyPolicy {
                request: RequestShape::Avatar,
                text_fallback: TextFallback::None,
                failure_text: FailureText::uniform("Sorry, I couldn't process your request."),
                rearm_without_audio: None,
                rearm_after_failure: None,
            },
        }
    }

    /// Override the request ceiling, keeping flows without one unbounded
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        if self.timeout.is_some() {
            self.timeout = Some(timeout);
        }
        self
    }
}
