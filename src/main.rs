//! Application entry point: AACommu terminal composer.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime.
//! 4. Build the gateway (remote or offline), fallback table and speech output.
//! 5. Open the microphone and feed it into the [`Recorder`].
//! 6. Spawn the composer and the event printer on the runtime.
//! 7. Read commands from stdin on the main thread until `quit` or EOF.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::mpsc;

use aacommu::{
    audio::{AudioChunk, CaptureDevice, Microphone, Recorder, StreamHandle},
    composer::{lock_conversation, new_shared_conversation, Composer, ComposerCommand, ComposerEvent},
    config::{AppConfig, AppPaths, GatewayMode},
    conversation::QUICK_PHRASES,
    fallback::FallbackEngine,
    gateway::{HttpGateway, OfflineGateway, SuggestionGateway},
    repl::{self, Input},
    speech,
};

// ---------------------------------------------------------------------------
// Microphone
// ---------------------------------------------------------------------------

/// Open the default input and forward its chunks to `recorder`.
///
/// Returns the stream handle, which must stay alive (and on this thread) for
/// as long as audio is wanted.  On failure the recorder is marked
/// unavailable so `rec` reports the reason.
fn start_microphone(recorder: Arc<Recorder>) -> Option<StreamHandle> {
    let microphone = match Microphone::open() {
        Ok(microphone) => microphone,
        Err(e) => {
            log::warn!("Audio capture unavailable: {e}");
            recorder.mark_unavailable(e.to_string());
            return None;
        }
    };

    let (chunk_tx, chunk_rx) = std::sync::mpsc::channel::<AudioChunk>();
    let feeder = Arc::clone(&recorder);
    let spawned = std::thread::Builder::new()
        .name("audio-feed".into())
        .spawn(move || {
            while let Ok(chunk) = chunk_rx.recv() {
                feeder.feed(&chunk);
            }
        });
    if let Err(e) = spawned {
        log::warn!("Failed to spawn audio-feed thread: {e}");
        recorder.mark_unavailable(e.to_string());
        return None;
    }

    match microphone.start(chunk_tx) {
        Ok(handle) => {
            log::info!(
                "Audio capture started ({} Hz, {} ch)",
                microphone.sample_rate(),
                microphone.channels()
            );
            Some(handle)
        }
        Err(e) => {
            log::warn!("Failed to start audio stream: {e}");
            recorder.mark_unavailable(e.to_string());
            None
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("AACommu starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    log::debug!("config dir: {}", AppPaths::new().config_dir.display());

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Collaborators
    let table_file = config.fallback.resolved_table_file();
    let fallback = Arc::new(FallbackEngine::load_with_overrides(&table_file).unwrap_or_else(
        |e| {
            log::warn!("Ignoring suggestion overrides ({e:#}); using built-in table");
            FallbackEngine::builtin()
        },
    ));

    let gateway: Arc<dyn SuggestionGateway> = match config.gateway.mode {
        GatewayMode::Remote => {
            let gateway = HttpGateway::from_config(&config.gateway);
            log::info!("Suggestion service: {}", gateway.base_url());
            Arc::new(gateway)
        }
        GatewayMode::Offline => {
            log::info!("Suggestion service: offline simulation");
            Arc::new(OfflineGateway::new(Arc::clone(&fallback)))
        }
    };

    let speech: Arc<dyn speech::SpeechOutput> = Arc::from(speech::from_config(&config.speech));

    // 5. Microphone → recorder
    let recorder = Arc::new(Recorder::new(&config.capture));
    let _stream_handle = if config.capture.enabled {
        start_microphone(Arc::clone(&recorder))
    } else {
        recorder.mark_unavailable("disabled in settings");
        None
    };
    let capture: Arc<dyn CaptureDevice> = recorder;

    // 6. Composer + event printer
    let state = new_shared_conversation();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ComposerEvent>();
    let (command_tx, command_rx) = mpsc::channel::<ComposerCommand>(16);

    let composer = Composer::new(
        Arc::clone(&state),
        gateway,
        fallback,
        speech,
        capture,
        event_tx,
    );
    let composer_task = rt.spawn(composer.run(command_rx));

    rt.spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("{}", repl::render_event(&event));
        }
    });

    let history_limit = config.session.history_display_limit;
    let initial = ComposerCommand::SelectContext {
        context: config.session.default_context,
        role: Some(config.starting_role()),
    };
    command_tx
        .blocking_send(initial)
        .context("composer stopped before startup")?;

    println!("{}", repl::HELP);
    println!("quick: {}", repl::numbered(QUICK_PHRASES));

    // 7. Input loop
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let input = match repl::parse_line(&line) {
            Ok(input) => input,
            Err(e) => {
                println!("! {e}");
                continue;
            }
        };
        let input = match input {
            Input::Quit => break,
            Input::Help => {
                println!("{}", repl::HELP);
                continue;
            }
            Input::History(None) => Input::History(Some(history_limit)),
            other => other,
        };

        let snapshot = lock_conversation(&state).snapshot();
        match input.into_command(&snapshot) {
            Ok(Some(command)) => {
                if command_tx.blocking_send(command).is_err() {
                    log::error!("composer stopped unexpectedly");
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => println!("! {e}"),
        }
        let _ = io::stdout().flush();
    }

    drop(command_tx);
    if let Err(e) = rt.block_on(composer_task) {
        log::warn!("composer task ended abnormally: {e}");
    }
    log::info!("AACommu shut down");
    Ok(())
}
