//! End-of-utterance detection
//!
//! Decides when a listening session should stop on its own: after speech
//! followed by a pause, or after a long stretch with no speech at all. Uses
//! RMS energy per chunk, so it needs no model.

use super::SAMPLE_RATE;

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech before a pause can end the utterance (0.3 s)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Pause that ends an utterance (0.5 s at 16 kHz)
const SILENCE_SAMPLES: usize = 8000;

/// Give up when nobody speaks for this long (8 s)
const NO_SPEECH_SAMPLES: usize = SAMPLE_RATE as usize * 8;

/// Hard ceiling on one listening session (30 s)
const MAX_LISTEN_SAMPLES: usize = SAMPLE_RATE as usize * 30;

/// Outcome of feeding a chunk to the endpointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Keep listening
    Continue,
    /// Speech followed by a pause
    UtteranceComplete,
    /// Nothing was said
    NoSpeech,
}

/// Tracks speech and silence across capture chunks
#[derive(Debug, Default)]
pub struct Endpointer {
    speech_samples: usize,
    silence_samples: usize,
    waited_samples: usize,
    total_samples: usize,
}

impl Endpointer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a chunk of 16 kHz mono samples
    ///
    /// A burst too short to count as speech is folded back into the wait
    /// once the following pause is long enough, so a cough in a quiet room
    /// still ends in [`Endpoint::NoSpeech`].
    pub fn process(&mut self, samples: &[f32]) -> Endpoint {
        if samples.is_empty() {
            return Endpoint::Continue;
        }

        let energy = rms(samples);
        let is_speech = energy > ENERGY_THRESHOLD;
        self.total_samples += samples.len();

        if self.total_samples > MAX_LISTEN_SAMPLES {
            tracing::debug!(total = self.total_samples, "listening ceiling reached");
            return if self.speech_samples > MIN_SPEECH_SAMPLES {
                Endpoint::UtteranceComplete
            } else {
                Endpoint::NoSpeech
            };
        }

        if self.speech_samples == 0 {
            if is_speech {
                self.speech_samples = samples.len();
                tracing::trace!(energy, "speech started");
                return Endpoint::Continue;
            }
            return self.wait(samples.len());
        }

        if is_speech {
            self.speech_samples += samples.len();
            self.silence_samples = 0;
        } else {
            self.silence_samples += samples.len();
        }

        if self.silence_samples <= SILENCE_SAMPLES {
            return Endpoint::Continue;
        }

        if self.speech_samples > MIN_SPEECH_SAMPLES {
            tracing::debug!(
                speech = self.speech_samples,
                silence = self.silence_samples,
                "utterance complete"
            );
            return Endpoint::UtteranceComplete;
        }

        tracing::trace!(speech = self.speech_samples, "burst too short, still waiting");
        let burst =
            std::mem::take(&mut self.speech_samples) + std::mem::take(&mut self.silence_samples);
        self.wait(burst)
    }

    fn wait(&mut self, samples: usize) -> Endpoint {
        self.waited_samples += samples;
        if self.waited_samples > NO_SPEECH_SAMPLES {
            tracing::debug!("no speech detected");
            return Endpoint::NoSpeech;
        }
        Endpoint::Continue
    }

    /// True once any speech has been seen
    #[must_use]
    pub const fn heard_speech(&self) -> bool {
        self.speech_samples > 0
    }

    /// Forget everything seen so far
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(clippy::cast_precision_loss)]
    fn tone(samples: usize) -> Vec<f32> {
        (0..samples)
            .map(|i| 0.3 * (i as f32 * 0.2).sin())
            .collect()
    }

    #[test]
    fn energy_calculation() {
        assert!(rms(&[0.0; 100]) < 0.001);
        assert!(rms(&[0.5; 100]) > 0.4);
        assert!(rms(&[]).abs() < f32::EPSILON);
    }

    #[test]
    fn speech_then_pause_completes() {
        let mut endpointer = Endpointer::new();
        assert_eq!(endpointer.process(&tone(8000)), Endpoint::Continue);
        assert_eq!(endpointer.process(&[0.0; 4000]), Endpoint::Continue);
        assert_eq!(endpointer.process(&[0.0; 4001]), Endpoint::UtteranceComplete);
    }

    #[test]
    fn short_blip_does_not_complete() {
        let mut endpointer = Endpointer::new();
        endpointer.process(&tone(1600));
        assert_eq!(endpointer.process(&[0.0; 9000]), Endpoint::Continue);
    }

    #[test]
    fn long_silence_gives_up() {
        let mut endpointer = Endpointer::new();
        let second = vec![0.0; SAMPLE_RATE as usize];
        for _ in 0..8 {
            assert_eq!(endpointer.process(&second), Endpoint::Continue);
        }
        assert_eq!(endpointer.process(&second), Endpoint::NoSpeech);
    }

    #[test]
    fn short_burst_in_silence_still_gives_up() {
        let mut endpointer = Endpointer::new();
        assert_eq!(endpointer.process(&tone(1600)), Endpoint::Continue);

        let second = vec![0.0; SAMPLE_RATE as usize];
        let outcome = (0..10)
            .map(|_| endpointer.process(&second))
            .find(|e| *e != Endpoint::Continue);
        assert_eq!(outcome, Some(Endpoint::NoSpeech));
        assert!(!endpointer.heard_speech());
    }

    #[test]
    fn endless_speech_hits_the_ceiling() {
        let mut endpointer = Endpointer::new();
        let second = tone(SAMPLE_RATE as usize);
        for _ in 0..30 {
            assert_eq!(endpointer.process(&second), Endpoint::Continue);
        }
        assert_eq!(endpointer.process(&second), Endpoint::UtteranceComplete);
    }

    #[test]
    fn reset_forgets_speech() {
        let mut endpointer = Endpointer::new();
        endpointer.process(&tone(8000));
        endpointer.reset();
        assert_eq!(endpointer.process(&[0.0; 9000]), Endpoint::Continue);
    }
}
