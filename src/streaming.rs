//! Typewriter reveal of reply text
//!
//! Reply text appears one character at a time at a fixed pace, unrelated to
//! audio progress. The runner aborts the task when the reply is cleared.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::ui::UiEvent;

/// Delay between revealed characters
pub const CHAR_INTERVAL: Duration = Duration::from_millis(30);

/// Every non-empty prefix of `text`, one more character each time
pub fn prefixes(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .map(|(i, c)| &text[..i + c.len_utf8()])
}

/// Reveal `text` on `ui`, one character per `interval`
pub async fn stream_reply(text: String, interval: Duration, ui: mpsc::UnboundedSender<UiEvent>) {
    let total = text.chars().count();
    for (n, prefix) in prefixes(&text).enumerate() {
        if n > 0 {
            tokio::time::sleep(interval).await;
        }
        let event = UiEvent::ReplyText {
            text: prefix.to_string(),
            complete: n + 1 == total,
        };
        if ui.send(event).is_err() {
            return;
        }
    }
}
