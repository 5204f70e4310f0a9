mod args;
mod console;

use anyhow::{bail, Context};
use args::{Cli, Commands};
use clap::Parser;
use console::{parse_line, Input, StatusLine, HELP};
use keyline_core::{
    format_time, Command, DriverExit, Event, FrameDriver, PlaybackSession, SchedulerConfig,
    SessionConfig, SynthInstrumentFactory,
};
use keyline_domain_score::{import_midi_path, EventStream};
use keyline_infra_audio_cpal::CpalAudioOutputPort;
use keyline_infra_storage_fs::{FsSource, FsStorage};
use keyline_infra_synth_rustysynth::SoundFontSynth;
use keyline_ports::audio::AudioOutputPort;
use keyline_ports::instrument::InstrumentFactory;
use keyline_ports::source::{SourcePort, SourceRef};
use keyline_ports::storage::{PlayerSettings, StoragePort};
use keyline_ports::synth::SynthPort;
use keyline_ports::types::DeviceId;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let storage = FsStorage::default();
    let mut settings = storage.load_settings().unwrap_or_else(|err| {
        warn!("could not read settings, using defaults: {err}");
        PlayerSettings::default()
    });
    cli.overrides.apply(&mut settings);
    if cli.overrides.save_settings {
        storage
            .save_settings(&settings)
            .context("failed to save settings")?;
        info!(path = %storage.settings_path().display(), "settings saved");
    }

    match cli.command {
        Commands::Play { file, keep_open } => play(file, settings, keep_open).await,
        Commands::Devices {} => devices(),
        Commands::Inspect { file } => inspect(&file),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn play(file: String, mut settings: PlayerSettings, keep_open: bool) -> anyhow::Result<()> {
    let audio_port: Arc<dyn AudioOutputPort> = Arc::new(CpalAudioOutputPort::new());
    if let Some(device) = settings.selected_audio_out.take() {
        settings.selected_audio_out = Some(resolve_device(audio_port.as_ref(), &device)?);
    }
    let synth: Arc<dyn SynthPort> = Arc::new(SoundFontSynth::new(settings.sample_rate_hz, 64));

    let session_config = SessionConfig {
        scheduler: SchedulerConfig {
            gap_policy: settings.gap_policy,
        },
        emit_note_events: false,
    };
    let driver = FrameDriver::new(Duration::from_millis(settings.frame_interval_ms))
        .exit_on_finish(!keep_open);
    let factory = SynthInstrumentFactory::new(audio_port, synth, settings);
    let mut session = PlaybackSession::new(FsSource::new(), factory, session_config);

    start_playback(&mut session, SourceRef::new(file)).await?;

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (quit_tx, quit_rx) = oneshot::channel();
    spawn_stdin_reader(cmd_tx.clone(), quit_tx);

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_status(event_rx));

    eprintln!("{HELP}");
    let exit = tokio::select! {
        exit = driver.run(&mut session, cmd_rx, Some(event_tx)) => Some(exit),
        _ = quit_rx => None,
        _ = tokio::signal::ctrl_c() => None,
    };
    session.dispose();
    drop(session);
    drop(cmd_tx);

    let last_error = printer.await.context("status printer failed")?;
    println!();

    match exit {
        Some(DriverExit::Failed) => bail!(last_error.unwrap_or_else(|| "playback failed".into())),
        Some(exit) => {
            info!(?exit, "player stopped");
            Ok(())
        }
        None => Ok(()),
    }
}

/// Loads and starts the file given on the command line. Failures here end the
/// run instead of leaving an idle player waiting for input.
async fn start_playback<S, F>(
    session: &mut PlaybackSession<S, F>,
    source: SourceRef,
) -> anyhow::Result<()>
where
    S: SourcePort,
    F: InstrumentFactory,
{
    session
        .load(source.clone())
        .await
        .with_context(|| format!("failed to load {source}"))?;
    session.play().await.context("failed to start playback")?;
    Ok(())
}

// Blocking stdin on its own thread; it is not joined so the process can exit
// while a read is pending.
fn spawn_stdin_reader(commands: mpsc::Sender<Command>, quit: oneshot::Sender<()>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match parse_line(&line) {
                Some(Input::Command(cmd)) => {
                    if commands.blocking_send(cmd).is_err() {
                        return;
                    }
                }
                Some(Input::Quit) => {
                    let _ = quit.send(());
                    return;
                }
                Some(Input::Help) => eprintln!("{HELP}"),
                Some(Input::Unknown(line)) => eprintln!("unknown command: {line}  ({HELP})"),
                None => {}
            }
        }
    });
}

/// Prints the status line until the session's event channel closes and
/// returns the last error message seen.
async fn print_status(mut events: mpsc::UnboundedReceiver<Event>) -> Option<String> {
    let mut status = StatusLine::new();
    let mut last_error = None;
    let mut stdout = std::io::stdout();

    while let Some(event) = events.recv().await {
        if let Event::Error { message } = &event {
            eprintln!("\nerror: {message}");
            last_error = Some(message.clone());
        }
        if status.apply(&event) {
            let _ = write!(stdout, "\r{:<72}", status.render());
            let _ = stdout.flush();
        }
    }
    last_error
}

fn resolve_device(port: &dyn AudioOutputPort, wanted: &DeviceId) -> anyhow::Result<DeviceId> {
    let outputs = port.list_outputs().context("failed to list audio outputs")?;
    if let Some(device) = outputs.iter().find(|device| &device.id == wanted) {
        return Ok(device.id.clone());
    }
    let by_name = outputs
        .iter()
        .find(|device| device.name.eq_ignore_ascii_case(&wanted.0));
    match by_name {
        Some(device) => Ok(device.id.clone()),
        None => bail!("no audio output named {wanted}; see `keyline devices`"),
    }
}

fn devices() -> anyhow::Result<()> {
    let port = CpalAudioOutputPort::new();
    let outputs = port.list_outputs().context("failed to list audio outputs")?;
    let default_id = port.default_output().ok().map(|device| device.id);

    if outputs.is_empty() {
        println!("No audio outputs found.");
        return Ok(());
    }

    println!("Audio outputs:");
    for device in outputs {
        let marker = if Some(&device.id) == default_id.as_ref() {
            " (default)"
        } else {
            ""
        };
        println!(
            "- {}{} [{} Hz, {} ch] id={}",
            device.name,
            marker,
            device.default_config.sample_rate_hz,
            device.default_config.channels,
            device.id
        );
    }
    Ok(())
}

fn inspect(file: &Path) -> anyhow::Result<()> {
    let document = import_midi_path(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let stream = EventStream::build(&document);

    println!("File: {}", file.display());
    if let Some(name) = &document.name {
        println!("Title: {name}");
    }
    println!("Ticks per quarter: {}", document.ppq);
    for point in &document.tempo_map {
        let bpm = 60_000_000.0 / point.us_per_quarter as f64;
        println!("Tempo at tick {}: {:.1} bpm", point.tick, bpm);
    }
    for (index, track) in document.tracks.iter().enumerate() {
        println!(
            "Track {}: {} ({} notes)",
            index + 1,
            track.name.as_deref().unwrap_or("untitled"),
            track.notes.len()
        );
    }
    println!(
        "Playable notes: {} of {}",
        stream.len(),
        document.note_count()
    );
    println!("Duration: {}", format_time(stream.total_duration()));
    Ok(())
}
