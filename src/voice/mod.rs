//! Voice processing module
//!
//! Microphone capture, end-of-utterance detection, and reply playback.
//! Transcription lives in [`crate::recognizer`].

mod capture;
mod endpoint;
mod playback;

pub use capture::{AudioCapture, SAMPLE_RATE, SampleBuffer, samples_to_wav};
pub use endpoint::{Endpoint, Endpointer, rms};
pub use playback::{AudioPlayback, DecodedAudio, PlaybackEvent, Player, decode};
