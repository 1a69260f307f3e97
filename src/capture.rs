//! Capture strategies behind the talk loop
//!
//! Two implementations share the [`Capture`] trait: [`TranscriptCapture`]
//! listens until the speaker pauses and yields a recognized transcript, and
//! [`RecordingCapture`] records until stopped and yields WAV bytes. Results
//! come back as [`CaptureEvent`]s tagged with the capture session that
//! produced them, so the turn controller can drop stale ones.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::Result;
use crate::dialogue::Utterance;
use crate::recognizer::Recognizer;
use crate::variant::CaptureKind;
use crate::voice::{AudioCapture, Endpoint, Endpointer, SAMPLE_RATE, SampleBuffer, samples_to_wav};

/// How often the endpoint watcher inspects new samples
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Ceiling on one transcription, after which the session yields nothing
const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Result of a capture session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Capture ended; `None` when nothing usable was heard
    Finished {
        session: u64,
        utterance: Option<Utterance>,
    },
    /// The speaker stopped talking, or never started
    EndOfSpeech { session: u64 },
}

/// Whether the microphone control can be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureAvailability {
    Available,
    /// No recognizer is configured for this flow
    Unsupported,
    /// The microphone could not be opened
    Denied,
}

impl CaptureAvailability {
    #[must_use]
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Available)
    }
}

/// A way of getting one utterance out of the microphone
///
/// Implementations hold the cpal input stream, which is not `Send`, so they
/// live on the talk loop's thread.
pub trait Capture {
    /// What a finished capture yields
    fn kind(&self) -> CaptureKind;

    /// Whether capture can start at all
    fn availability(&self) -> CaptureAvailability;

    /// Begin capture session `session`, reporting on `events`
    ///
    /// # Errors
    ///
    /// Returns error if the microphone cannot be opened
    fn start(&mut self, session: u64, events: mpsc::UnboundedSender<CaptureEvent>) -> Result<()>;

    /// End the current session; its [`CaptureEvent::Finished`] follows
    fn stop(&mut self);
}

struct ActiveSession {
    session: u64,
    events: mpsc::UnboundedSender<CaptureEvent>,
    watcher: JoinHandle<()>,
    silent: Arc<AtomicBool>,
}

/// Listens until the speaker pauses, then transcribes what was said
pub struct TranscriptCapture {
    audio: Option<AudioCapture>,
    recognizer: Option<Arc<dyn Recognizer>>,
    active: Option<ActiveSession>,
}

impl TranscriptCapture {
    /// `audio` is `None` when the microphone could not be opened and
    /// `recognizer` is `None` when no speech-to-text engine is configured
    #[must_use]
    pub fn new(audio: Option<AudioCapture>, recognizer: Option<Arc<dyn Recognizer>>) -> Self {
        Self {
            audio,
            recognizer,
            active: None,
        }
    }
}

impl Capture for TranscriptCapture {
    fn kind(&self) -> CaptureKind {
        CaptureKind::Transcript
    }

    fn availability(&self) -> CaptureAvailability {
        match (&self.audio, &self.recognizer) {
            (None, _) => CaptureAvailability::Denied,
            (Some(_), None) => CaptureAvailability::Unsupported,
            (Some(_), Some(_)) => CaptureAvailability::Available,
        }
    }

    fn start(&mut self, session: u64, events: mpsc::UnboundedSender<CaptureEvent>) -> Result<()> {
        let Some(audio) = self.audio.as_mut() else {
            return Err(crate::Error::Capture("microphone unavailable".to_string()));
        };
        audio.start()?;

        let silent = Arc::new(AtomicBool::new(false));
        let watcher = tokio::spawn(watch_for_end(
            audio.buffer(),
            session,
            events.clone(),
            Arc::clone(&silent),
        ));

        tracing::debug!(session, "transcript capture started");
        self.active = Some(ActiveSession {
            session,
            events,
            watcher,
            silent,
        });
        Ok(())
    }

    fn stop(&mut self) {
        let (Some(active), Some(audio)) = (self.active.take(), self.audio.as_mut()) else {
            return;
        };
        active.watcher.abort();
        audio.stop();

        let samples = audio.buffer().take();
        let session = active.session;
        let events = active.events;

        let recognizer = match &self.recognizer {
            Some(r) if !samples.is_empty() && !active.silent.load(Ordering::Relaxed) => {
                Arc::clone(r)
            }
            _ => {
                tracing::debug!(session, "nothing to transcribe");
                let _ = events.send(CaptureEvent::Finished {
                    session,
                    utterance: None,
                });
                return;
            }
        };

        tokio::spawn(async move {
            let utterance = transcribe(recognizer.as_ref(), &samples, session).await;
            let _ = events.send(CaptureEvent::Finished { session, utterance });
        });
    }
}

/// Transcribe one captured segment, giving up after [`TRANSCRIBE_TIMEOUT`]
async fn transcribe(
    recognizer: &dyn Recognizer,
    samples: &[f32],
    session: u64,
) -> Option<Utterance> {
    let wav = samples_to_wav(samples, SAMPLE_RATE)
        .inspect_err(|e| tracing::warn!(error = %e, session, "failed to encode capture"))
        .ok()?;

    match tokio::time::timeout(TRANSCRIBE_TIMEOUT, recognizer.transcribe(wav)).await {
        Ok(Ok(text)) => Some(Utterance::Text(text)),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, session, "transcription failed");
            None
        }
        Err(_) => {
            tracing::warn!(
                session,
                timeout_secs = TRANSCRIBE_TIMEOUT.as_secs(),
                "transcription timed out"
            );
            None
        }
    }
}

/// Watch the capture buffer and report when the speaker is done
async fn watch_for_end(
    buffer: SampleBuffer,
    session: u64,
    events: mpsc::UnboundedSender<CaptureEvent>,
    silent: Arc<AtomicBool>,
) {
    let mut endpointer = Endpointer::new();
    let mut offset = 0;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    loop {
        ticker.tick().await;
        let chunk = buffer.since(offset);
        offset += chunk.len();

        match endpointer.process(&chunk) {
            Endpoint::Continue => {}
            Endpoint::UtteranceComplete => break,
            Endpoint::NoSpeech => {
                silent.store(true, Ordering::Relaxed);
                break;
            }
        }
    }

    tracing::debug!(session, heard = endpointer.heard_speech(), "end of speech");
    let _ = events.send(CaptureEvent::EndOfSpeech { session });
}

/// Records until stopped and yields the raw audio
pub struct RecordingCapture {
    audio: Option<AudioCapture>,
    active: Option<(u64, mpsc::UnboundedSender<CaptureEvent>)>,
}

impl RecordingCapture {
    /// `audio` is `None` when the microphone could not be opened
    #[must_use]
    pub const fn new(audio: Option<AudioCapture>) -> Self {
        Self {
            audio,
            active: None,
        }
    }
}

impl Capture for RecordingCapture {
    fn kind(&self) -> CaptureKind {
        CaptureKind::Recording
    }

    fn availability(&self) -> CaptureAvailability {
        if self.audio.is_some() {
            CaptureAvailability::Available
        } else {
            CaptureAvailability::Denied
        }
    }

    fn start(&mut self, session: u64, events: mpsc::UnboundedSender<CaptureEvent>) -> Result<()> {
        let Some(audio) = self.audio.as_mut() else {
            return Err(crate::Error::Capture("microphone unavailable".to_string()));
        };
        audio.start()?;

        tracing::debug!(session, "recording started");
        self.active = Some((session, events));
        Ok(())
    }

    fn stop(&mut self) {
        let (Some((session, events)), Some(audio)) = (self.active.take(), self.audio.as_mut())
        else {
            return;
        };
        audio.stop();

        let samples = audio.buffer().take();
        let utterance = if samples.is_empty() {
            None
        } else {
            match samples_to_wav(&samples, SAMPLE_RATE) {
                Ok(wav) => Some(Utterance::Audio(wav)),
                Err(e) => {
                    tracing::warn!(error = %e, session, "failed to encode recording");
                    None
                }
            }
        };

        tracing::debug!(session, samples = samples.len(), "recording stopped");
        let _ = events.send(CaptureEvent::Finished { session, utterance });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_without_hardware_or_recognizer() {
        assert_eq!(
            TranscriptCapture::new(None, None).availability(),
            CaptureAvailability::Denied
        );
        assert_eq!(
            RecordingCapture::new(None).availability(),
            CaptureAvailability::Denied
        );
        assert!(!CaptureAvailability::Unsupported.is_available());
    }

    #[test]
    fn start_without_microphone_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(RecordingCapture::new(None).start(1, tx.clone()).is_err());
        assert!(TranscriptCapture::new(None, None).start(1, tx).is_err());
    }

    struct StalledRecognizer;

    #[async_trait::async_trait]
    impl Recognizer for StalledRecognizer {
        async fn transcribe(&self, _wav: Vec<u8>) -> Result<String> {
            std::future::pending().await
        }
    }

    struct EchoRecognizer;

    #[async_trait::async_trait]
    impl Recognizer for EchoRecognizer {
        async fn transcribe(&self, wav: Vec<u8>) -> Result<String> {
            Ok(format!("{} bytes", wav.len()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_transcription_yields_nothing() {
        let start = tokio::time::Instant::now();
        let utterance = transcribe(&StalledRecognizer, &[0.1; 160], 4).await;

        assert_eq!(utterance, None);
        assert!(start.elapsed() >= TRANSCRIBE_TIMEOUT);
    }

    #[tokio::test]
    async fn transcription_returns_text() {
        let utterance = transcribe(&EchoRecognizer, &[0.1; 160], 4).await;
        assert_eq!(utterance, Some(Utterance::Text("364 bytes".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn silence_ends_the_session() {
        let buffer = SampleBuffer::default();
        buffer.extend(&vec![0.0; SAMPLE_RATE as usize * 9]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let silent = Arc::new(AtomicBool::new(false));

        watch_for_end(buffer, 7, tx, Arc::clone(&silent)).await;

        assert_eq!(rx.recv().await, Some(CaptureEvent::EndOfSpeech { session: 7 }));
        assert!(silent.load(Ordering::Relaxed));
    }

    #[tokio::test(start_paused = true)]
    #[allow(clippy::cast_precision_loss)]
    async fn pause_after_speech_ends_the_session() {
        let buffer = SampleBuffer::default();
        let speech: Vec<f32> = (0..8000).map(|i| 0.3 * (i as f32 * 0.2).sin()).collect();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let silent = Arc::new(AtomicBool::new(false));

        let watcher = tokio::spawn(watch_for_end(buffer.clone(), 3, tx, Arc::clone(&silent)));
        buffer.extend(&speech);
        tokio::time::sleep(POLL_INTERVAL * 2).await;
        buffer.extend(&[0.0; 9000]);

        watcher.await.unwrap();
        assert_eq!(rx.recv().await, Some(CaptureEvent::EndOfSpeech { session: 3 }));
        assert!(!silent.load(Ordering::Relaxed));
    }
}
