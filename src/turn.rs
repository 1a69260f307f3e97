//! Turn-taking controller
//!
//! Drives the idle → listening → awaiting-reply → playing → idle cycle for
//! every flow. The controller does no IO: each operation returns the
//! [`Effect`]s the runner must carry out, and the runner feeds results
//! (capture output, replies, playback completion, elapsed timers) back in.
//!
//! Timers are identified by tickets. Scheduling a timer bumps its ticket, so
//! a timer that fires after it was superseded is ignored. Requests and
//! playbacks carry ids for the same reason.

use std::time::Duration;

use crate::capture::CaptureAvailability;
use crate::dialogue::{DialogueFailure, DialogueReply, Utterance};
use crate::prompts::PromptKind;
use crate::variant::{PlaybackRearm, ReplyPolicy, RequestShape, VariantProfile};

/// Interaction state; exactly one is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Listening,
    AwaitingReply,
    Playing,
}

/// Why a request was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Automatic opening request
    Greeting,
    /// User utterance
    Turn,
}

/// A dialogue request to issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub request_id: u64,
    pub purpose: Purpose,
    pub utterance: Utterance,
    pub shape: RequestShape,
    pub timeout: Option<Duration>,
}

/// Work for the runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open capture session `session`
    StartCapture { session: u64 },
    /// End the open capture session
    StopCapture,
    /// Call [`TurnController::stop_capture_for`] after `after`
    ScheduleAutoStop { session: u64, after: Duration },
    /// Call [`TurnController::on_debounce_elapsed`] after `after`
    ScheduleDebounce { ticket: u64, after: Duration },
    /// Send a dialogue request and report via [`TurnController::on_reply`]
    Submit(Submission),
    /// Display reply text
    ShowReply(String),
    /// Remove reply text
    ClearReply,
    /// Play reply audio and report via [`TurnController::on_playback_end`]
    Play { id: u64, audio: Vec<u8> },
    /// Silence the current playback
    StopPlayback,
    /// Call [`TurnController::on_rearm_due`] after `after`
    ScheduleRearm { ticket: u64, after: Duration },
}

#[derive(Debug)]
struct InFlight {
    id: u64,
    purpose: Purpose,
    transcript: Option<String>,
}

/// Turn-taking state machine for one talk screen
#[derive(Debug)]
pub struct TurnController {
    profile: VariantProfile,
    mode: Mode,
    availability: CaptureAvailability,
    capture_session: u64,
    last_submitted: Option<Utterance>,
    pending: Option<Utterance>,
    debounce_ticket: u64,
    rearm_ticket: u64,
    next_request: u64,
    in_flight: Option<InFlight>,
    playing: Option<u64>,
    auto_restart: bool,
    reply_visible: bool,
}

impl TurnController {
    #[must_use]
    pub const fn new(profile: VariantProfile, availability: CaptureAvailability) -> Self {
        Self {
            profile,
            mode: Mode::Idle,
            availability,
            capture_session: 0,
            last_submitted: None,
            pending: None,
            debounce_ticket: 0,
            rearm_ticket: 0,
            next_request: 0,
            in_flight: None,
            playing: None,
            auto_restart: false,
            reply_visible: false,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub const fn availability(&self) -> CaptureAvailability {
        self.availability
    }

    #[must_use]
    pub const fn profile(&self) -> &VariantProfile {
        &self.profile
    }

    /// Current capture session counter
    #[must_use]
    pub const fn capture_session(&self) -> u64 {
        self.capture_session
    }

    /// Whether a dialogue request is outstanding
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Whether reply text is on screen
    #[must_use]
    pub const fn reply_visible(&self) -> bool {
        self.reply_visible
    }

    /// Hint that should currently be scheduled, if any
    #[must_use]
    pub const fn active_prompt(&self) -> Option<PromptKind> {
        match self.mode {
            Mode::Playing => Some(PromptKind::Interrupt),
            Mode::Idle
                if self.availability.is_available()
                    && !self.reply_visible
                    && self.in_flight.is_none()
                    && self.pending.is_none() =>
            {
                Some(PromptKind::TapToAsk)
            }
            _ => None,
        }
    }

    /// Start listening, unless busy or capture is unavailable
    pub fn begin_capture(&mut self) -> Vec<Effect> {
        if !self.availability.is_available() {
            tracing::debug!(availability = ?self.availability, "capture unavailable");
            return Vec::new();
        }
        if self.mode != Mode::Idle || self.in_flight.is_some() {
            tracing::debug!(mode = ?self.mode, "begin capture ignored");
            return Vec::new();
        }

        self.capture_session += 1;
        self.rearm_ticket += 1;
        self.debounce_ticket += 1;
        self.last_submitted = None;
        self.pending = None;
        self.auto_restart = false;
        self.mode = Mode::Listening;

        let session = self.capture_session;
        tracing::info!(session, "listening");

        let mut effects = Vec::with_capacity(3);
        if std::mem::take(&mut self.reply_visible) {
            effects.push(Effect::ClearReply);
        }
        effects.push(Effect::StartCapture { session });
        if let Some(after) = self.profile.auto_stop {
            effects.push(Effect::ScheduleAutoStop { session, after });
        }
        effects
    }

    /// Stop listening; the capture result arrives via
    /// [`TurnController::capture_finished`]
    pub fn end_capture(&mut self) -> Vec<Effect> {
        if self.mode != Mode::Listening {
            return Vec::new();
        }
        self.mode = Mode::AwaitingReply;
        tracing::debug!(session = self.capture_session, "capture stopping");
        vec![Effect::StopCapture]
    }

    /// Auto-stop ceiling or end of speech for capture session `session`
    pub fn stop_capture_for(&mut self, session: u64) -> Vec<Effect> {
        if session != self.capture_session {
            return Vec::new();
        }
        self.end_capture()
    }

    /// Capture session `session` produced its result
    pub fn capture_finished(&mut self, session: u64, utterance: Option<Utterance>) -> Vec<Effect> {
        if session != self.capture_session {
            tracing::debug!(session, current = self.capture_session, "stale capture result");
            return Vec::new();
        }
        self.settle();

        match utterance {
            Some(utterance) => self.submit_utterance(session, utterance),
            None => Vec::new(),
        }
    }

    /// The capture backend failed to open the microphone
    pub fn capture_failed(&mut self, session: u64) -> Vec<Effect> {
        if session != self.capture_session {
            return Vec::new();
        }
        tracing::warn!(session, "microphone access denied");
        self.availability = CaptureAvailability::Denied;
        self.settle();
        Vec::new()
    }

    /// Queue an utterance for submission after the debounce delay
    ///
    /// Dropped when it is blank, repeats the last submitted payload, comes
    /// from an older capture session, or a request is already in flight. A
    /// newer payload replaces one still waiting out the debounce.
    pub fn submit_utterance(&mut self, session: u64, utterance: Utterance) -> Vec<Effect> {
        if session != self.capture_session || self.mode == Mode::Listening {
            tracing::debug!(session, "utterance ignored");
            return Vec::new();
        }
        if utterance.is_blank() {
            tracing::debug!(session, "empty utterance dropped");
            return Vec::new();
        }
        if self.last_submitted.as_ref() == Some(&utterance) {
            tracing::debug!(session, "duplicate utterance dropped");
            return Vec::new();
        }
        if self.in_flight.is_some() {
            tracing::debug!(session, "request in flight, utterance dropped");
            return Vec::new();
        }

        self.pending = Some(utterance);
        self.debounce_ticket += 1;
        self.mode = Mode::AwaitingReply;
        vec![Effect::ScheduleDebounce {
            ticket: self.debounce_ticket,
            after: self.profile.debounce,
        }]
    }

    /// Debounce delay elapsed; re-check the guards and send
    pub fn on_debounce_elapsed(&mut self, ticket: u64) -> Vec<Effect> {
        if ticket != self.debounce_ticket {
            return Vec::new();
        }
        let Some(utterance) = self.pending.take() else {
            return Vec::new();
        };
        if self.in_flight.is_some() || self.last_submitted.as_ref() == Some(&utterance) {
            tracing::debug!("utterance superseded during debounce");
            self.settle();
            return Vec::new();
        }

        self.last_submitted = Some(utterance.clone());
        self.dispatch(Purpose::Turn, utterance)
    }

    /// Send the automatic opening request, unless the user got there first
    pub fn start_greeting(&mut self) -> Vec<Effect> {
        if self.mode != Mode::Idle || self.in_flight.is_some() {
            tracing::debug!(mode = ?self.mode, "greeting skipped");
            return Vec::new();
        }
        let text = self.profile.greeting_text.to_string();
        self.dispatch(Purpose::Greeting, Utterance::Text(text))
    }

    /// Dialogue request `request_id` resolved
    pub fn on_reply(
        &mut self,
        request_id: u64,
        result: Result<DialogueReply, DialogueFailure>,
    ) -> Vec<Effect> {
        let Some(flight) = self.in_flight.take_if(|f| f.id == request_id) else {
            tracing::debug!(request_id, "late reply dropped");
            return Vec::new();
        };
        let policy = self.policy(flight.purpose);
        self.mode = Mode::Idle;

        let mut effects = Vec::with_capacity(2);
        match result {
            Ok(reply) => {
                let text = reply
                    .text
                    .or_else(|| policy.text_fallback.render(flight.transcript.as_deref()));
                if let Some(text) = text {
                    self.reply_visible = true;
                    effects.push(Effect::ShowReply(text));
                }

                if let Some(audio) = reply.audio {
                    self.mode = Mode::Playing;
                    self.playing = Some(request_id);
                    self.auto_restart = true;
                    effects.push(Effect::Play {
                        id: request_id,
                        audio,
                    });
                } else if let Some(after) = policy.rearm_without_audio {
                    effects.push(self.schedule_rearm(after));
                }
            }
            Err(failure) => {
                tracing::warn!(request_id, error = %failure, purpose = ?flight.purpose, "dialogue request failed");
                if let Some(text) = policy.failure_text.for_failure(&failure) {
                    self.reply_visible = true;
                    effects.push(Effect::ShowReply(text.to_string()));
                }
                if let Some(after) = policy.rearm_after_failure {
                    effects.push(self.schedule_rearm(after));
                }
            }
        }
        effects
    }

    /// Playback `id` ended, naturally or with an error
    pub fn on_playback_end(&mut self, id: u64) -> Vec<Effect> {
        if self.playing != Some(id) {
            return Vec::new();
        }
        self.playing = None;
        self.mode = Mode::Idle;

        let rearm = match self.profile.playback_rearm {
            PlaybackRearm::Always(after) => Some(after),
            PlaybackRearm::WhenAutoRestart(after) => {
                std::mem::take(&mut self.auto_restart).then_some(after)
            }
        };
        rearm.map(|after| self.schedule_rearm(after)).into_iter().collect()
    }

    /// Re-arm timer fired
    pub fn on_rearm_due(&mut self, ticket: u64) -> Vec<Effect> {
        if ticket != self.rearm_ticket {
            return Vec::new();
        }
        self.begin_capture()
    }

    /// The microphone control
    ///
    /// Playing: stop the audio and listen again. Listening: stop. Idle:
    /// listen. Awaiting a reply: nothing.
    pub fn interrupt(&mut self) -> Vec<Effect> {
        match self.mode {
            Mode::AwaitingReply => {
                tracing::debug!("mic pressed while awaiting reply");
                Vec::new()
            }
            Mode::Listening => self.end_capture(),
            Mode::Playing => {
                tracing::info!("playback interrupted");
                self.playing = None;
                self.mode = Mode::Idle;
                let mut effects = vec![Effect::StopPlayback];
                effects.extend(self.begin_capture());
                effects
            }
            Mode::Idle => self.begin_capture(),
        }
    }

    const fn policy(&self, purpose: Purpose) -> ReplyPolicy {
        match purpose {
            Purpose::Greeting => self.profile.greeting,
            Purpose::Turn => self.profile.turn,
        }
    }

    fn dispatch(&mut self, purpose: Purpose, utterance: Utterance) -> Vec<Effect> {
        self.next_request += 1;
        let request_id = self.next_request;
        self.in_flight = Some(InFlight {
            id: request_id,
            purpose,
            transcript: utterance.as_text().map(str::to_string),
        });
        self.mode = Mode::AwaitingReply;

        tracing::info!(request_id, ?purpose, "submitting utterance");
        vec![Effect::Submit(Submission {
            request_id,
            purpose,
            utterance,
            shape: self.policy(purpose).request,
            timeout: self.profile.timeout,
        })]
    }

    fn schedule_rearm(&mut self, after: Duration) -> Effect {
        self.rearm_ticket += 1;
        Effect::ScheduleRearm {
            ticket: self.rearm_ticket,
            after,
        }
    }

    /// Leave a capture-related state once nothing is pending or in flight
    fn settle(&mut self) {
        let busy = self.pending.is_some() || self.in_flight.is_some();
        if matches!(self.mode, Mode::Listening | Mode::AwaitingReply) && !busy {
            self.mode = Mode::Idle;
        }
    }
}
