//! Transient hint prompts
//!
//! Two cosmetic hints repeat while the loop sits in a qualifying state: an
//! interrupt hint while a reply plays, and a tap-to-ask hint while the loop
//! is idle. Neither affects turn-taking; the runner cancels a schedule as
//! soon as its state ends.

use std::time::Duration;

/// Which hint to show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Shown while reply audio plays
    Interrupt,
    /// Shown while idle with capture available
    TapToAsk,
}

impl PromptKind {
    #[must_use]
    pub const fn schedule(self) -> PromptSchedule {
        match self {
            Self::Interrupt => PromptSchedule {
                first_after: Duration::ZERO,
                period: Duration::from_secs(10),
                visible_for: Duration::from_secs(5),
            },
            Self::TapToAsk => PromptSchedule {
                first_after: Duration::from_secs(3),
                period: Duration::from_secs(10),
                visible_for: Duration::from_secs(5),
            },
        }
    }

    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Interrupt => "Press button to interrupt",
            Self::TapToAsk => "Press to ask anything",
        }
    }
}

/// When a hint is on screen, measured from entering the qualifying state
///
/// The first window opens at `first_after`. Later windows open every
/// `period` counted from state entry, so a delayed first window does not
/// shift the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptSchedule {
    pub first_after: Duration,
    pub period: Duration,
    pub visible_for: Duration,
}

impl PromptSchedule {
    /// Start of the `n`th window (zero-based)
    #[must_use]
    pub fn window_start(&self, n: u32) -> Duration {
        if n == 0 {
            return self.first_after;
        }
        // periodic windows at or before the first one are swallowed by it
        let skipped = u32::try_from(self.first_after.as_nanos() / self.period.as_nanos().max(1))
            .unwrap_or(u32::MAX);
        self.period * n.saturating_add(skipped)
    }

    /// Whether the hint is visible `elapsed` after entering the state
    #[must_use]
    pub fn is_visible(&self, elapsed: Duration) -> bool {
        (0..)
            .map(|n| self.window_start(n))
            .take_while(|start| *start <= elapsed)
            .any(|start| elapsed < start + self.visible_for)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn interrupt_hint_shows_immediately_then_every_ten_seconds() {
        let schedule = PromptKind::Interrupt.schedule();
        assert!(schedule.is_visible(secs(0.0)));
        assert!(schedule.is_visible(secs(4.9)));
        assert!(!schedule.is_visible(secs(5.0)));
        assert!(!schedule.is_visible(secs(9.9)));
        assert!(schedule.is_visible(secs(10.0)));
        assert!(schedule.is_visible(secs(14.9)));
        assert!(!schedule.is_visible(secs(15.1)));
    }

    #[test]
    fn tap_hint_waits_three_seconds() {
        let schedule = PromptKind::TapToAsk.schedule();
        assert!(!schedule.is_visible(secs(0.0)));
        assert!(!schedule.is_visible(secs(2.9)));
        assert!(schedule.is_visible(secs(3.0)));
        assert!(schedule.is_visible(secs(7.9)));
        assert!(!schedule.is_visible(secs(8.1)));
        assert!(schedule.is_visible(secs(10.0)));
        assert!(!schedule.is_visible(secs(15.5)));
        assert!(schedule.is_visible(secs(20.5)));
    }

    #[test]
    fn window_starts() {
        let tap = PromptKind::TapToAsk.schedule();
        assert_eq!(tap.window_start(0), secs(3.0));
        assert_eq!(tap.window_start(1), secs(10.0));
        assert_eq!(tap.window_start(2), secs(20.0));

        let interrupt = PromptKind::Interrupt.schedule();
        assert_eq!(interrupt.window_start(0), Duration::ZERO);
        assert_eq!(interrupt.window_start(1), secs(10.0));
    }
}
