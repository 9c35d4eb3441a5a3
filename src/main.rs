//! Prompter binary: wires the coordinator to the console.
//!
//! All tracing output goes to stderr; stdout carries the event feed so the
//! binary can be piped into a UI process.

use prompter::{AppConfig, ControlCommand, Coordinator, RuntimeEvent, Severity};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = AppConfig::default_config_path();
    let mut config = if config_path.exists() {
        AppConfig::from_file(&config_path)
            .map_err(|e| anyhow::anyhow!("cannot load {}: {e}", config_path.display()))?
    } else {
        AppConfig::default()
    };
    config.apply_env_overrides();

    let coordinator = Coordinator::new(config);
    let mut events = coordinator.subscribe();
    let cancel = coordinator.cancel_token();

    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let runner = tokio::spawn(coordinator.run(control_rx));

    // Start transcribing immediately; the watcher (if configured) is
    // already polling.
    let _ = control_tx.send(ControlCommand::StartSession);

    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(&event);
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    let _ = control_tx.send(ControlCommand::StopSession);
    cancel.cancel();

    runner.await?.map_err(|e| anyhow::anyhow!("pipeline failed: {e}"))?;
    printer.abort();
    Ok(())
}

fn print_event(event: &RuntimeEvent) {
    match event {
        RuntimeEvent::Status { message, severity } => {
            let tag = match severity {
                Severity::Info => "info",
                Severity::Success => "ok",
                Severity::Notice => "note",
                Severity::Warning => "warn",
                Severity::Error => "error",
            };
            println!("[{tag}] {message}");
        }
        RuntimeEvent::Transcript(text) => println!("[you] {text}"),
        RuntimeEvent::ClearTranscript => println!("[clear]"),
        RuntimeEvent::Answer(text) => println!("[answer]\n{text}"),
        RuntimeEvent::ImageAnswer {
            text, image_name, ..
        } => println!("[image {image_name}]\n{text}"),
        RuntimeEvent::ImageListItem { name, timestamp } => {
            println!("[new image] {name} at {timestamp}");
        }
        RuntimeEvent::RecordingState { active } => println!("[recording: {active}]"),
        RuntimeEvent::FreezeState { frozen } => println!("[frozen: {frozen}]"),
    }
}
