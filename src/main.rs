use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dialoguer::Select;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use brochure_voice::capture::{Capture, RecordingCapture, TranscriptCapture};
use brochure_voice::recognizer::{Recognizer, SpeechToText};
use brochure_voice::ui::{TerminalUi, present};
use brochure_voice::variant::CaptureKind;
use brochure_voice::voice::{AudioCapture, AudioPlayback, DecodedAudio, SAMPLE_RATE, rms};
use brochure_voice::{
    Config, DialogueClient, Language, MicButton, RefreshGuard, Route, Runner, SessionId, Variant,
};

/// Delay between picking a language and opening the talk screen
const NAVIGATE_DELAY: Duration = Duration::from_millis(300);

/// Brochure - talking brochure voice client
#[derive(Parser)]
#[command(name = "brochure", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Pick a language, then start talking
    SelectLanguage {
        /// Skip the picker
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Open the talk screen
    Talk {
        /// Talk screen route, e.g. "/talking-brochure?language=Hindi&unique=<id>"
        #[arg(long, conflicts_with_all = ["language", "session", "variant"])]
        route: Option<String>,
        /// Language shown on the selection screen
        #[arg(short, long)]
        language: Option<String>,
        /// Existing session id
        #[arg(short, long)]
        session: Option<String>,
        /// Flow: speech, recording or avatar (defaults to the configured one)
        #[arg(long)]
        variant: Option<String>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

/// Where the user goes next
enum Screen {
    SelectLanguage(Option<Language>),
    Talk(Route),
}

/// How a talk screen ended
enum TalkExit {
    Closed,
    Reloaded,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,brochure_voice=info",
        1 => "info,brochure_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(
        variant = %config.variant(),
        platform = ?config.platform,
        "loaded configuration"
    );

    let mut screen = match cli.command.unwrap_or(Command::SelectLanguage { language: None }) {
        Command::TestMic { duration } => return test_mic(duration).await,
        Command::TestSpeaker => return test_speaker(),
        Command::SelectLanguage { language } => {
            Screen::SelectLanguage(language.map(|l| l.parse()).transpose()?)
        }
        Command::Talk {
            route,
            language,
            session,
            variant,
        } => Screen::Talk(match route {
            Some(route) => Route::parse(&route)?,
            None => Route::new(
                variant
                    .map(|v| v.parse::<Variant>())
                    .transpose()?
                    .unwrap_or_else(|| config.variant()),
                language.map(|l| l.parse()).transpose()?.unwrap_or_default(),
                session.map(|s| s.parse()).transpose()?.unwrap_or_default(),
            ),
        }),
    };

    loop {
        screen = match screen {
            Screen::SelectLanguage(language) => {
                Screen::Talk(select_language(&config, language).await?)
            }
            Screen::Talk(route) => match talk(&config, route).await? {
                TalkExit::Closed => return Ok(()),
                TalkExit::Reloaded => Screen::SelectLanguage(None),
            },
        };
    }
}

/// Language selection screen: opens a session and routes to the talk screen
async fn select_language(config: &Config, language: Option<Language>) -> anyhow::Result<Route> {
    let language = match language {
        Some(language) => language,
        None => {
            let names: Vec<&str> = Language::ALL.iter().map(|l| l.name()).collect();
            let idx = tokio::task::spawn_blocking(move || {
                Select::new()
                    .with_prompt("Choose Language")
                    .items(&names)
                    .default(0)
                    .interact()
            })
            .await??;
            Language::ALL[idx]
        }
    };

    let route = Route::new(config.variant(), language, SessionId::new());
    tracing::info!(language = %language, session = %route.session, "session opened");
    println!("Opening {route}");

    tokio::time::sleep(NAVIGATE_DELAY).await;
    Ok(route)
}

/// Talk screen: runs the turn-taking loop until the user quits
#[allow(clippy::future_not_send)]
async fn talk(config: &Config, route: Route) -> anyhow::Result<TalkExit> {
    let guard = RefreshGuard::new(&config.data_dir);
    if guard.take_reload(&route.session)? {
        println!("This session was reloaded. Returning to language selection.");
        return Ok(TalkExit::Reloaded);
    }

    let profile = config.profile(route.variant);
    tracing::info!(
        variant = %route.variant,
        language = %route.language,
        session = %route.session,
        "opening talk screen"
    );

    let capture = build_capture(config, profile.capture);
    let player = AudioPlayback::new()?;
    let dialogue = Arc::new(DialogueClient::new(&config.endpoints));

    let (ui_tx, ui_rx) = mpsc::unbounded_channel();
    let presenter = tokio::spawn(present(TerminalUi::new(std::io::stdout()), ui_rx));

    let runner = Runner::new(
        profile,
        capture,
        Box::new(player),
        dialogue,
        route.session.clone(),
        ui_tx,
    )?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let mic = runner.mic_button();

    println!("Press Enter to use the microphone, q to quit.");
    let (result, ()) = tokio::join!(
        runner.run(shutdown_rx),
        read_controls(spawn_line_reader(), mic, shutdown_tx)
    );

    let _ = presenter.await;
    guard.mark_unload(&route.session)?;
    result?;

    Ok(TalkExit::Closed)
}

/// Pick the capture strategy for a flow, degrading to an unavailable
/// control when the microphone or recognizer is missing
fn build_capture(config: &Config, kind: CaptureKind) -> Box<dyn Capture> {
    let audio = AudioCapture::new()
        .inspect_err(|e| tracing::warn!(error = %e, "microphone unavailable"))
        .ok();

    match kind {
        CaptureKind::Recording => Box::new(RecordingCapture::new(audio)),
        CaptureKind::Transcript => {
            let recognizer = config.recognizer_key().and_then(|key| {
                SpeechToText::new(
                    config.recognizer.provider,
                    key.to_string(),
                    config.recognizer.model.clone(),
                )
                .inspect_err(|e| tracing::warn!(error = %e, "speech recognizer unavailable"))
                .ok()
                .map(|stt| Arc::new(stt) as Arc<dyn Recognizer>)
            });
            if recognizer.is_none() {
                tracing::warn!(
                    provider = %config.recognizer.provider,
                    "no recognizer API key configured, speech capture disabled"
                );
            }
            Box::new(TranscriptCapture::new(audio, recognizer))
        }
    }
}

/// Forward stdin lines from a dedicated thread
///
/// A blocking stdin read inside the runtime would hold up shutdown, so the
/// reader lives on its own thread and is left behind when the process exits.
fn spawn_line_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Enter presses the mic, `q` or Ctrl-C quits
async fn read_controls(
    mut lines: mpsc::UnboundedReceiver<String>,
    mic: MicButton,
    shutdown: mpsc::Sender<()>,
) {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.recv() => match line {
                Some(line) if matches!(line.trim(), "q" | "quit") => break,
                Some(_) => {
                    if !mic.press() {
                        return;
                    }
                }
                None => break,
            },
        }
    }

    let _ = shutdown.send(()).await;
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;
    let buffer = capture.buffer();

    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = buffer.take();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    playback.play_blocking(DecodedAudio {
        samples,
        sample_rate,
    })?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}
