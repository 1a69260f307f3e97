//! Talk loop integration tests
//!
//! Drive a [`Runner`] with scripted capture, playback and dialogue doubles on
//! a paused clock.

use std::sync::Arc;
use std::time::Duration;

use brochure_voice::capture::CaptureAvailability;
use brochure_voice::dialogue::{DialogueFailure, DialogueReply, Utterance};
use brochure_voice::variant::{CaptureKind, RequestShape, Variant, VariantProfile};
use brochure_voice::{Mode, Platform, Runner, SessionId, UiEvent};
use tokio::sync::mpsc;

mod common;
use common::{MockCapture, MockDialogue, MockPlayer, spoken_reply};

const GREETING_FALLBACK: &str = "Hello! I'm your voice assistant. How can I help you today?";

fn drain(rx: &mut mpsc::UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn texts(calls: &[common::Call]) -> Vec<String> {
    calls
        .iter()
        .map(|call| call.utterance.as_text().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_turns_share_one_session() {
    let capture = MockCapture::new(CaptureKind::Transcript, &["one", "two", "three"]);
    let dialogue = MockDialogue::new(vec![], spoken_reply("ok"), 4);
    let session = SessionId::new();
    let (ui_tx, _ui_rx) = mpsc::unbounded_channel();

    let runner = Runner::new(
        VariantProfile::for_variant(Variant::Speech),
        Box::new(capture),
        Box::new(MockPlayer::new(true)),
        Arc::clone(&dialogue) as _,
        session.clone(),
        ui_tx,
    )
    .unwrap();

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let (result, ()) = tokio::join!(runner.run(shutdown_rx), async {
        dialogue.reached.notified().await;
        shutdown_tx.send(()).await.unwrap();
    });
    result.unwrap();

    let calls = dialogue.calls();
    assert_eq!(texts(&calls), ["who are you", "one", "two", "three"]);
    assert!(calls.iter().all(|call| call.session == session));
    assert!(calls.iter().all(|call| call.shape == RequestShape::Process));
    assert!(calls.iter().all(|call| call.timeout.is_none()));
}

#[tokio::test(start_paused = true)]
async fn test_greeting_failure_shows_fallback_then_mic_works() {
    let capture = MockCapture::new(CaptureKind::Transcript, &[]);
    let capture_state = Arc::clone(&capture.state);
    let dialogue = MockDialogue::new(
        vec![Err(DialogueFailure::Network("connection refused".into()))],
        DialogueReply::default(),
        1,
    );
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();

    let runner = Runner::new(
        VariantProfile::for_variant(Variant::Speech),
        Box::new(capture),
        Box::new(MockPlayer::new(true)),
        Arc::clone(&dialogue) as _,
        SessionId::new(),
        ui_tx,
    )
    .unwrap();
    let mic = runner.mic_button();

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let (result, ()) = tokio::join!(runner.run(shutdown_rx), async {
        dialogue.reached.notified().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(mic.press());
        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown_tx.send(()).await.unwrap();
    });
    result.unwrap();

    let events = drain(&mut ui_rx);
    let shown = events
        .iter()
        .position(|event| {
            *event
                == UiEvent::ReplyText {
                    text: GREETING_FALLBACK.to_string(),
                    complete: true,
                }
        })
        .expect("fallback greeting was not shown");
    let listening = events
        .iter()
        .rposition(|event| *event == UiEvent::Mode(Mode::Listening))
        .expect("mic press did not start listening");
    let cleared = events
        .iter()
        .position(|event| *event == UiEvent::ReplyCleared)
        .expect("reply was not cleared");
    assert!(shown < cleared && cleared < listening);

    assert_eq!(capture_state.lock().unwrap().started, [1]);
    assert_eq!(dialogue.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_stops_playback_and_listens() {
    let capture = MockCapture::new(CaptureKind::Transcript, &[]);
    let capture_state = Arc::clone(&capture.state);
    let player = MockPlayer::new(false);
    let player_state = Arc::clone(&player.state);
    let dialogue = MockDialogue::new(vec![], spoken_reply("hello there"), 1);
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();

    let runner = Runner::new(
        VariantProfile::for_variant(Variant::Speech),
        Box::new(capture),
        Box::new(player),
        Arc::clone(&dialogue) as _,
        SessionId::new(),
        ui_tx,
    )
    .unwrap();
    let mic = runner.mic_button();

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let (result, ()) = tokio::join!(runner.run(shutdown_rx), async {
        dialogue.reached.notified().await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(player_state.lock().unwrap().played, [1]);
        assert_eq!(player_state.lock().unwrap().stops, 0);

        assert!(mic.press());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(player_state.lock().unwrap().stops, 1);
        assert_eq!(capture_state.lock().unwrap().started, [1]);
        shutdown_tx.send(()).await.unwrap();
    });
    result.unwrap();

    let events = drain(&mut ui_rx);
    let playing = events
        .iter()
        .position(|event| *event == UiEvent::Mode(Mode::Playing))
        .expect("reply was never played");
    assert!(events[playing..].contains(&UiEvent::Mode(Mode::Listening)));
}

#[tokio::test(start_paused = true)]
async fn test_denied_capture_disables_mic() {
    let capture = MockCapture::new(CaptureKind::Transcript, &["hello"])
        .with_availability(CaptureAvailability::Denied);
    let capture_state = Arc::clone(&capture.state);
    let dialogue = MockDialogue::new(vec![], DialogueReply::default(), 1);
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();

    let runner = Runner::new(
        VariantProfile::for_variant(Variant::Speech),
        Box::new(capture),
        Box::new(MockPlayer::new(true)),
        Arc::clone(&dialogue) as _,
        SessionId::new(),
        ui_tx,
    )
    .unwrap();
    let mic = runner.mic_button();

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let (result, ()) = tokio::join!(runner.run(shutdown_rx), async {
        assert!(mic.press());
        tokio::time::sleep(Duration::from_secs(3)).await;
        shutdown_tx.send(()).await.unwrap();
    });
    result.unwrap();

    let events = drain(&mut ui_rx);
    assert_eq!(
        &events[..2],
        [
            UiEvent::Mode(Mode::Idle),
            UiEvent::Availability(CaptureAvailability::Denied)
        ]
    );
    assert!(!events.contains(&UiEvent::Mode(Mode::Listening)));
    assert!(capture_state.lock().unwrap().started.is_empty());
    // The greeting does not need the microphone
    assert_eq!(dialogue.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_recording_flow_uses_chat_shapes() {
    let capture = MockCapture::new(CaptureKind::Recording, &["clip"]);
    let dialogue = MockDialogue::new(
        vec![Ok(DialogueReply {
            text: Some("welcome".into()),
            audio: None,
        })],
        DialogueReply::default(),
        2,
    );
    let (ui_tx, _ui_rx) = mpsc::unbounded_channel();

    let runner = Runner::new(
        VariantProfile::for_variant(Variant::Recording),
        Box::new(capture),
        Box::new(MockPlayer::new(true)),
        Arc::clone(&dialogue) as _,
        SessionId::new(),
        ui_tx,
    )
    .unwrap();

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let (result, ()) = tokio::join!(runner.run(shutdown_rx), async {
        dialogue.reached.notified().await;
        shutdown_tx.send(()).await.unwrap();
    });
    result.unwrap();

    let calls = dialogue.calls();
    assert_eq!(
        calls.iter().map(|call| call.shape).collect::<Vec<_>>(),
        [
            RequestShape::Chat {
                platform: Platform::Android
            },
            RequestShape::Chat {
                platform: Platform::Ios
            },
        ]
    );
    assert_eq!(calls[0].utterance, Utterance::Text("start".into()));
    assert_eq!(calls[1].utterance, Utterance::Text("clip".into()));
    assert!(calls.iter().all(|call| call.timeout.is_some()));
}

#[test]
fn test_capture_kind_must_match_flow() {
    let (ui_tx, _ui_rx) = mpsc::unbounded_channel();
    let result = Runner::new(
        VariantProfile::for_variant(Variant::Recording),
        Box::new(MockCapture::new(CaptureKind::Transcript, &[])),
        Box::new(MockPlayer::new(true)),
        MockDialogue::new(vec![], DialogueReply::default(), 1),
        SessionId::new(),
        ui_tx,
    );
    assert!(result.is_err());
}
