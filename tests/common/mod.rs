//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use brochure_voice::capture::{Capture, CaptureAvailability, CaptureEvent};
use brochure_voice::dialogue::{Dialogue, DialogueFailure, DialogueReply, Utterance};
use brochure_voice::session::SessionId;
use brochure_voice::variant::{CaptureKind, RequestShape};
use brochure_voice::voice::{PlaybackEvent, Player};
use tokio::sync::{Notify, mpsc};

/// Reply carrying both text and audio
#[must_use]
pub fn spoken_reply(text: &str) -> DialogueReply {
    DialogueReply {
        text: Some(text.to_string()),
        audio: Some(b"mp3".to_vec()),
    }
}

#[derive(Default)]
pub struct CaptureState {
    /// Utterances handed out by successive sessions
    pub script: VecDeque<Utterance>,
    /// Sessions that were started
    pub started: Vec<u64>,
    /// Number of stop calls that ended a session
    pub stopped: usize,
    active: Option<(u64, mpsc::UnboundedSender<CaptureEvent>)>,
}

/// Capture that hears its next scripted utterance as soon as it starts
pub struct MockCapture {
    kind: CaptureKind,
    availability: CaptureAvailability,
    pub state: Arc<Mutex<CaptureState>>,
}

impl MockCapture {
    pub fn new(kind: CaptureKind, script: &[&str]) -> Self {
        let state = CaptureState {
            script: script
                .iter()
                .map(|text| Utterance::Text((*text).to_string()))
                .collect(),
            ..CaptureState::default()
        };
        Self {
            kind,
            availability: CaptureAvailability::Available,
            state: Arc::new(Mutex::new(state)),
        }
    }

    #[must_use]
    pub const fn with_availability(mut self, availability: CaptureAvailability) -> Self {
        self.availability = availability;
        self
    }
}

impl Capture for MockCapture {
    fn kind(&self) -> CaptureKind {
        self.kind
    }

    fn availability(&self) -> CaptureAvailability {
        self.availability
    }

    fn start(
        &mut self,
        session: u64,
        events: mpsc::UnboundedSender<CaptureEvent>,
    ) -> brochure_voice::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.started.push(session);
        let _ = events.send(CaptureEvent::EndOfSpeech { session });
        state.active = Some((session, events));
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock().unwrap();
        let Some((session, events)) = state.active.take() else {
            return;
        };
        state.stopped += 1;
        let utterance = state.script.pop_front();
        let _ = events.send(CaptureEvent::Finished { session, utterance });
    }
}

#[derive(Default)]
pub struct PlayerState {
    /// Ids passed to `play`
    pub played: Vec<u64>,
    /// Number of stop calls
    pub stops: usize,
}

/// Player that either finishes instantly or plays until stopped
pub struct MockPlayer {
    finish_immediately: bool,
    pub state: Arc<Mutex<PlayerState>>,
}

impl MockPlayer {
    pub fn new(finish_immediately: bool) -> Self {
        Self {
            finish_immediately,
            state: Arc::default(),
        }
    }
}

impl Player for MockPlayer {
    fn play(
        &mut self,
        id: u64,
        _audio: Vec<u8>,
        events: mpsc::UnboundedSender<PlaybackEvent>,
    ) -> brochure_voice::Result<()> {
        self.state.lock().unwrap().played.push(id);
        if self.finish_immediately {
            let _ = events.send(PlaybackEvent::Finished { id });
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.state.lock().unwrap().stops += 1;
    }
}

/// One recorded dialogue request
#[derive(Debug, Clone)]
pub struct Call {
    pub shape: RequestShape,
    pub utterance: Utterance,
    pub session: SessionId,
    pub timeout: Option<Duration>,
}

/// Dialogue that answers from a script and records every request
pub struct MockDialogue {
    replies: Mutex<VecDeque<Result<DialogueReply, DialogueFailure>>>,
    fallback: DialogueReply,
    pub calls: Mutex<Vec<Call>>,
    notify_after: usize,
    /// Notified once `notify_after` requests have arrived
    pub reached: Notify,
}

impl MockDialogue {
    pub fn new(
        replies: Vec<Result<DialogueReply, DialogueFailure>>,
        fallback: DialogueReply,
        notify_after: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback,
            calls: Mutex::default(),
            notify_after,
            reached: Notify::new(),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dialogue for MockDialogue {
    async fn send(
        &self,
        shape: RequestShape,
        utterance: &Utterance,
        session: &SessionId,
        timeout: Option<Duration>,
    ) -> Result<DialogueReply, DialogueFailure> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call {
                shape,
                utterance: utterance.clone(),
                session: session.clone(),
                timeout,
            });
            calls.len()
        };
        if count == self.notify_after {
            self.reached.notify_one();
        }

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}
