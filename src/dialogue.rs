//! Dialogue endpoint client
//!
//! Posts one captured utterance to the remote conversational API and returns
//! the reply text and synthesized audio. Two endpoint families exist with
//! slightly different field names; [`RequestShape`] picks the layout.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::config::EndpointsConfig;
use crate::session::SessionId;
use crate::variant::RequestShape;

/// Language sent with every request.
///
/// The selection screen passes the chosen language along in the route, but
/// requests always say English. Kept as-is until the endpoint owners say
/// which one they expect.
pub const WIRE_LANGUAGE: &str = "english";

/// One captured user utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Utterance {
    /// Recognized transcript
    Text(String),
    /// Recorded WAV bytes
    Audio(Vec<u8>),
}

impl Utterance {
    /// True when there is nothing worth sending
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Audio(bytes) => bytes.is_empty(),
        }
    }

    /// Transcript, if this is a text utterance
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Audio(_) => None,
        }
    }

    /// Value placed in the request's utterance field (audio is base64)
    #[must_use]
    pub fn wire_value(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text),
            Self::Audio(bytes) => Cow::Owned(STANDARD.encode(bytes)),
        }
    }
}

/// Decoded dialogue reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialogueReply {
    /// Reply text (`answer` or `response`, depending on endpoint)
    pub text: Option<String>,
    /// Reply speech audio
    pub audio: Option<Vec<u8>>,
}

/// Why a dialogue request produced no reply
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DialogueFailure {
    /// The request ceiling elapsed
    #[error("dialogue request timed out")]
    Timeout,

    /// The endpoint could not be reached
    #[error("dialogue endpoint unreachable: {0}")]
    Network(String),

    /// The endpoint answered with a non-success status
    #[error("dialogue endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body was not the expected JSON
    #[error("malformed dialogue response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for DialogueFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Anything that can answer an utterance
#[async_trait]
pub trait Dialogue: Send + Sync {
    /// Send one utterance and wait for the reply
    async fn send(
        &self,
        shape: RequestShape,
        utterance: &Utterance,
        session: &SessionId,
        timeout: Option<Duration>,
    ) -> Result<DialogueReply, DialogueFailure>;
}

#[derive(Serialize)]
struct ProcessBody<'a> {
    data: &'a str,
    language: &'a str,
    session_id: &'a str,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    user_text: &'a str,
    language: &'a str,
    platform: &'a str,
    session_id: &'a str,
}

#[derive(Serialize)]
struct AvatarBody<'a> {
    session_id: &'a str,
    user_text: &'a str,
    is_avatar: bool,
}

#[derive(Debug, Default, Deserialize)]
struct RawReply {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    audio: Option<String>,
}

/// Build the JSON body for a request
///
/// # Errors
///
/// Returns error if serialization fails
pub fn request_body(
    shape: RequestShape,
    utterance: &Utterance,
    session: &SessionId,
) -> serde_json::Result<serde_json::Value> {
    let value = utterance.wire_value();
    match shape {
        RequestShape::Process => serde_json::to_value(ProcessBody {
            data: &value,
            language: WIRE_LANGUAGE,
            session_id: session.as_str(),
        }),
        RequestShape::Chat { platform } => serde_json::to_value(ChatBody {
            user_text: &value,
            language: WIRE_LANGUAGE,
            platform: platform.wire_name(),
            session_id: session.as_str(),
        }),
        RequestShape::Avatar => serde_json::to_value(AvatarBody {
            session_id: session.as_str(),
            user_text: &value,
            is_avatar: true,
        }),
    }
}

/// Turn a response body into a reply
///
/// Empty strings count as absent. Audio that is not valid base64 is dropped
/// with a warning rather than failing the turn.
///
/// # Errors
///
/// Returns error if the body is not a JSON object of the expected shape
pub fn parse_reply(shape: RequestShape, body: &[u8]) -> Result<DialogueReply, DialogueFailure> {
    let raw: RawReply =
        serde_json::from_slice(body).map_err(|e| DialogueFailure::Malformed(e.to_string()))?;

    let text = match shape {
        RequestShape::Process => raw.answer,
        RequestShape::Chat { .. } | RequestShape::Avatar => raw.response,
    }
    .filter(|t| !t.is_empty());

    let audio = raw
        .audio
        .filter(|a| !a.is_empty())
        .and_then(|encoded| match STANDARD.decode(encoded.trim()) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(error = %e, "reply audio is not valid base64, skipping playback");
                None
            }
        })
        .filter(|bytes| !bytes.is_empty());

    Ok(DialogueReply { text, audio })
}

/// HTTP client for the dialogue endpoints
pub struct DialogueClient {
    client: reqwest::Client,
    process_url: String,
    chat_url: String,
}

impl DialogueClient {
    /// Create a client for the configured endpoints
    #[must_use]
    pub fn new(endpoints: &EndpointsConfig) -> Self {
        Self::with_urls(endpoints.process_url.clone(), endpoints.chat_url.clone())
    }

    /// Create a client for explicit endpoint URLs
    #[must_use]
    pub fn with_urls(process_url: String, chat_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            process_url,
            chat_url,
        }
    }

    fn url_for(&self, shape: RequestShape) -> &str {
        match shape {
            RequestShape::Process => &self.process_url,
            RequestShape::Chat { .. } | RequestShape::Avatar => &self.chat_url,
        }
    }

    async fn post(
        &self,
        shape: RequestShape,
        utterance: &Utterance,
        session: &SessionId,
    ) -> Result<DialogueReply, DialogueFailure> {
        let body = request_body(shape, utterance, session)
            .map_err(|e| DialogueFailure::Malformed(e.to_string()))?;
        let url = self.url_for(shape);

        tracing::debug!(url, session = %session, ?shape, "sending dialogue request");

        let response = self.client.post(url).json(&body).send().await.map_err(|e| {
            tracing::error!(error = %e, "dialogue request failed");
            DialogueFailure::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "dialogue endpoint error");
            return Err(DialogueFailure::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let reply = parse_reply(shape, &bytes)?;

        tracing::info!(
            has_text = reply.text.is_some(),
            audio_bytes = reply.audio.as_ref().map_or(0, Vec::len),
            "dialogue reply received"
        );
        Ok(reply)
    }
}

#[async_trait]
impl Dialogue for DialogueClient {
    async fn send(
        &self,
        shape: RequestShape,
        utterance: &Utterance,
        session: &SessionId,
        timeout: Option<Duration>,
    ) -> Result<DialogueReply, DialogueFailure> {
        let request = self.post(shape, utterance, session);
        match timeout {
            Some(limit) => tokio::time::timeout(limit, request).await.unwrap_or_else(|_| {
                tracing::error!(timeout_ms = limit.as_millis(), "dialogue request timed out");
                Err(DialogueFailure::Timeout)
            }),
            None => request.await,
        }
    }
}
