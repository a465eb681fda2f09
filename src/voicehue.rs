use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use voicehue::color;
use voicehue::display::ColorList;
use voicehue::permission::CpalPermission;
use voicehue::process::{ColorPipeline, drive};
use voicehue::session::{SessionDeps, SessionEvent, SessionOptions, SpeechSession};
use voicehue::{
    APP_NAME_PRETTY, ConfigManager, DEFAULT_LOG_LEVEL, LOG_ENV, RecordStore, SessionState,
    VERSION,
};
use voicehue_audio::CpalCapture;
use voicehue_recognize::{OpenAIClient, OpenAIConfig, TranscriberEngine};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL)),
        )
        .init();

    // Load config
    let config_manager = ConfigManager::new()?;
    let config = config_manager.load()?;
    // save back the config to create the file if it doesn't exist
    config_manager.save(&config)?;

    // Without the store there is nothing to record into.
    let database_path = config.database_path()?;
    let store = Arc::new(
        RecordStore::open(&database_path)
            .with_context(|| format!("Failed to open color store {}", database_path.display()))?,
    );

    let (openai, have_key) = match OpenAIConfig::from_config(&config) {
        Ok(openai) => (openai, true),
        Err(e) => {
            warn!(
                "{}, recording disabled until `openai_key` is set in {}",
                e,
                config_manager.config_path().display()
            );
            (OpenAIConfig::new(String::new()), false)
        }
    };
    let engine = TranscriberEngine::new(OpenAIClient::new(
        openai.with_prompt(color::vocabulary_prompt()),
    ))
        .with_language(config.language().map(str::to_string))
        .with_retries(config.retries);

    let (session, events) = SpeechSession::spawn(
        SessionDeps {
            permission: Arc::new(CpalPermission),
            engine: Arc::new(engine),
            capture: Box::new(CpalCapture::new(config.tap_buffer_size)),
        },
        SessionOptions::from_config(&config),
    );
    if !have_key {
        session.engine_availability_changed(false);
    }
    session.setup();

    let mut colors = ColorList::load(&store).context("Failed to read stored colors")?;
    let mut feed = store.subscribe();

    let (pipeline, _) = ColorPipeline::new(store.clone());
    let driver = tokio::spawn(async move {
        drive(events, &pipeline, |event| match event {
            SessionEvent::StateChanged(state) => println!("[{}]", state_label(*state)),
            SessionEvent::PartialTranscript(text) => println!("  … {text}"),
            SessionEvent::FinalTranscript(text) => println!("  \"{text}\""),
            SessionEvent::Failure(e) => error!("{e}"),
        })
        .await;
    });

    println!(
        "{APP_NAME_PRETTY} {VERSION}: {} colors stored. Press Enter to start or stop recording, `list` to show colors, `quit` to exit.",
        colors.len()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match line.trim() {
                    "" => session.start_stop(),
                    "list" | "l" => print!("{}", colors.render_all()),
                    "quit" | "q" => break,
                    other => warn!("Unknown command: {other}"),
                }
            }
            Some(event) = feed.recv() => {
                let added = colors.apply(event);
                print!("{}", colors.render(added));
            }
        }
    }

    info!("Shutting down");
    session.shutdown();
    if let Err(e) = driver.await {
        error!("Session driver failed: {:?}", e);
    }
    store.close();

    Ok(())
}

fn state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::NoPermission => "waiting for permission",
        SessionState::Available => "ready",
        SessionState::NotAvailable => "unavailable",
        SessionState::Recording => "recording",
        SessionState::Stopping => "transcribing",
    }
}
