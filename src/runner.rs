//! Talk loop driver
//!
//! Owns the [`TurnController`] and carries out its effects: capture and
//! playback calls, dialogue requests, timers, the streamed reply and the
//! hint prompts. Everything funnels back into one `select!` loop, so the
//! controller is only ever touched from one place.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::capture::{Capture, CaptureAvailability, CaptureEvent};
use crate::dialogue::{Dialogue, DialogueFailure, DialogueReply};
use crate::prompts::PromptKind;
use crate::session::SessionId;
use crate::streaming::{CHAR_INTERVAL, stream_reply};
use crate::turn::{Effect, Mode, Submission, TurnController};
use crate::ui::UiEvent;
use crate::variant::VariantProfile;
use crate::voice::{PlaybackEvent, Player};
use crate::{Error, Result};

/// Events posted back to the loop by timers, requests and the mic control
#[derive(Debug)]
enum LoopEvent {
    MicPressed,
    GreetingDue,
    AutoStop {
        session: u64,
    },
    DebounceElapsed {
        ticket: u64,
    },
    RearmDue {
        ticket: u64,
    },
    Reply {
        request_id: u64,
        result: std::result::Result<DialogueReply, DialogueFailure>,
    },
}

/// Handle to the microphone control of a running talk loop
#[derive(Clone)]
pub struct MicButton(mpsc::UnboundedSender<LoopEvent>);

impl MicButton {
    /// Press the mic; returns false once the loop has exited
    pub fn press(&self) -> bool {
        self.0.send(LoopEvent::MicPressed).is_ok()
    }
}

/// One talk screen, from first greeting to shutdown
pub struct Runner {
    driver: Driver,
    events: mpsc::UnboundedReceiver<LoopEvent>,
    captures: mpsc::UnboundedReceiver<CaptureEvent>,
    playbacks: mpsc::UnboundedReceiver<PlaybackEvent>,
}

struct Driver {
    controller: TurnController,
    capture: Box<dyn Capture>,
    player: Box<dyn Player>,
    dialogue: Arc<dyn Dialogue>,
    session: SessionId,
    ui: mpsc::UnboundedSender<UiEvent>,
    events_tx: mpsc::UnboundedSender<LoopEvent>,
    capture_tx: mpsc::UnboundedSender<CaptureEvent>,
    playback_tx: mpsc::UnboundedSender<PlaybackEvent>,
    stream: Option<JoinHandle<()>>,
    prompt: Option<(PromptKind, JoinHandle<()>)>,
    published: Option<(Mode, CaptureAvailability)>,
}

impl Runner {
    /// Assemble a talk loop
    ///
    /// # Errors
    ///
    /// Returns error if the capture strategy does not match the profile
    pub fn new(
        profile: VariantProfile,
        capture: Box<dyn Capture>,
        player: Box<dyn Player>,
        dialogue: Arc<dyn Dialogue>,
        session: SessionId,
        ui: mpsc::UnboundedSender<UiEvent>,
    ) -> Result<Self> {
        if capture.kind() != profile.capture {
            return Err(Error::Config(format!(
                "{} flow needs {:?} capture, got {:?}",
                profile.variant,
                profile.capture,
                capture.kind()
            )));
        }

        let (events_tx, events) = mpsc::unbounded_channel();
        let (capture_tx, captures) = mpsc::unbounded_channel();
        let (playback_tx, playbacks) = mpsc::unbounded_channel();

        let controller = TurnController::new(profile, capture.availability());
        Ok(Self {
            driver: Driver {
                controller,
                capture,
                player,
                dialogue,
                session,
                ui,
                events_tx,
                capture_tx,
                playback_tx,
                stream: None,
                prompt: None,
                published: None,
            },
            events,
            captures,
            playbacks,
        })
    }

    /// Handle for pressing the mic while the loop runs
    #[must_use]
    pub fn mic_button(&self) -> MicButton {
        MicButton(self.driver.events_tx.clone())
    }

    /// Run until `shutdown` fires or its sender is dropped
    ///
    /// The future is not `Send` (it owns the microphone stream); drive it on
    /// the current task rather than spawning it.
    ///
    /// # Errors
    ///
    /// Reserved for unrecoverable loop failures; turn-level errors are
    /// handled inside the loop
    #[allow(clippy::future_not_send)]
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        let Self {
            mut driver,
            mut events,
            mut captures,
            mut playbacks,
        } = self;

        tracing::info!(
            session = %driver.session,
            variant = %driver.controller.profile().variant,
            "talk loop running"
        );

        driver.publish_state();
        driver.schedule(
            driver.controller.profile().greeting_delay,
            LoopEvent::GreetingDue,
        );

        loop {
            let effects = tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                Some(event) = events.recv() => driver.on_event(event),
                Some(event) = captures.recv() => driver.on_capture(event),
                Some(event) = playbacks.recv() => driver.on_playback(event),
                else => break,
            };
            driver.apply(effects);
            driver.publish_state();
        }

        driver.close();
        Ok(())
    }
}

impl Driver {
    fn on_event(&mut self, event: LoopEvent) -> Vec<Effect> {
        match event {
            LoopEvent::MicPressed => self.controller.interrupt(),
            LoopEvent::GreetingDue => self.controller.start_greeting(),
            LoopEvent::AutoStop { session } => self.controller.stop_capture_for(session),
            LoopEvent::DebounceElapsed { ticket } => self.controller.on_debounce_elapsed(ticket),
            LoopEvent::RearmDue { ticket } => self.controller.on_rearm_due(ticket),
            LoopEvent::Reply { request_id, result } => self.controller.on_reply(request_id, result),
        }
    }

    fn on_capture(&mut self, event: CaptureEvent) -> Vec<Effect> {
        match event {
            CaptureEvent::Finished { session, utterance } => {
                self.controller.capture_finished(session, utterance)
            }
            CaptureEvent::EndOfSpeech { session } => self.controller.stop_capture_for(session),
        }
    }

    fn on_playback(&mut self, event: PlaybackEvent) -> Vec<Effect> {
        match event {
            PlaybackEvent::Finished { id } => self.controller.on_playback_end(id),
            PlaybackEvent::Failed { id, error } => {
                tracing::warn!(id, error = %error, "reply playback failed");
                self.controller.on_playback_end(id)
            }
        }
    }

    /// Execute effects, including any the execution itself produces
    fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue = VecDeque::from(effects);
        while let Some(effect) = queue.pop_front() {
            queue.extend(self.execute(effect));
        }
    }

    fn execute(&mut self, effect: Effect) -> Vec<Effect> {
        match effect {
            Effect::StartCapture { session } => {
                match self.capture.start(session, self.capture_tx.clone()) {
                    Ok(()) => Vec::new(),
                    Err(e) => {
                        tracing::error!(error = %e, session, "failed to start capture");
                        self.controller.capture_failed(session)
                    }
                }
            }
            Effect::StopCapture => {
                self.capture.stop();
                Vec::new()
            }
            Effect::ScheduleAutoStop { session, after } => {
                self.schedule(after, LoopEvent::AutoStop { session });
                Vec::new()
            }
            Effect::ScheduleDebounce { ticket, after } => {
                self.schedule(after, LoopEvent::DebounceElapsed { ticket });
                Vec::new()
            }
            Effect::Submit(submission) => {
                self.submit(submission);
                Vec::new()
            }
            Effect::ShowReply(text) => {
                self.cancel_stream();
                self.stream = Some(tokio::spawn(stream_reply(
                    text,
                    CHAR_INTERVAL,
                    self.ui.clone(),
                )));
                Vec::new()
            }
            Effect::ClearReply => {
                self.cancel_stream();
                let _ = self.ui.send(UiEvent::ReplyCleared);
                Vec::new()
            }
            Effect::Play { id, audio } => {
                match self.player.play(id, audio, self.playback_tx.clone()) {
                    Ok(()) => Vec::new(),
                    Err(e) => {
                        tracing::error!(error = %e, id, "failed to start playback");
                        self.controller.on_playback_end(id)
                    }
                }
            }
            Effect::StopPlayback => {
                self.player.stop();
                Vec::new()
            }
            Effect::ScheduleRearm { ticket, after } => {
                self.schedule(after, LoopEvent::RearmDue { ticket });
                Vec::new()
            }
        }
    }

    fn submit(&self, submission: Submission) {
        let dialogue = Arc::clone(&self.dialogue);
        let session = self.session.clone();
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let Submission {
                request_id,
                utterance,
                shape,
                timeout,
                ..
            } = submission;
            let result = dialogue.send(shape, &utterance, &session, timeout).await;
            let _ = events.send(LoopEvent::Reply { request_id, result });
        });
    }

    /// Post `event` back to the loop after `delay`
    fn schedule(&self, delay: Duration, event: LoopEvent) {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(event);
        });
    }

    fn cancel_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.abort();
        }
    }

    /// Push mode and availability changes to the UI and keep the right
    /// prompt schedule running
    fn publish_state(&mut self) {
        let state = (self.controller.mode(), self.controller.availability());
        let previous = self.published.replace(state);
        if previous.map(|(mode, _)| mode) != Some(state.0) {
            let _ = self.ui.send(UiEvent::Mode(state.0));
        }
        if previous.map(|(_, availability)| availability) != Some(state.1) {
            let _ = self.ui.send(UiEvent::Availability(state.1));
        }

        let wanted = self.controller.active_prompt();
        if self.prompt.as_ref().map(|(kind, _)| *kind) == wanted {
            return;
        }
        if let Some((kind, task)) = self.prompt.take() {
            task.abort();
            let _ = self.ui.send(UiEvent::Prompt {
                kind,
                visible: false,
            });
        }
        if let Some(kind) = wanted {
            let task = tokio::spawn(run_prompt(kind, self.ui.clone()));
            self.prompt = Some((kind, task));
        }
    }

    fn close(&mut self) {
        self.capture.stop();
        self.player.stop();
        self.cancel_stream();
        if let Some((_, task)) = self.prompt.take() {
            task.abort();
        }
        tracing::info!(session = %self.session, "talk loop stopped");
    }
}

/// Toggle a hint on its schedule until aborted
async fn run_prompt(kind: PromptKind, ui: mpsc::UnboundedSender<UiEvent>) {
    let schedule = kind.schedule();
    let entered = Instant::now();

    for n in 0_u32.. {
        let opens = entered + schedule.window_start(n);
        tokio::time::sleep_until(opens).await;
        if ui.send(UiEvent::Prompt { kind, visible: true }).is_err() {
            return;
        }
        tokio::time::sleep_until(opens + schedule.visible_for).await;
        if ui.send(UiEvent::Prompt { kind, visible: false }).is_err() {
            return;
        }
    }
}
