use crate::error::PlaybackError;
use crate::frame::{FrameRequests, FrameToken};
use crate::ipc::{Command, Event, PlaybackSnapshot};
use crate::scheduler::{Progress, Scheduler, SchedulerConfig, StepOutcome, StepReport};
use crate::transport::{Transport, TransportPhase};
use keyline_domain_score::{import_midi_bytes, EventStream};
use keyline_ports::instrument::{Instrument, InstrumentFactory};
use keyline_ports::source::{SourcePort, SourceRef};
use keyline_ports::types::Volume01;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, Default)]
pub struct SessionConfig {
    pub scheduler: SchedulerConfig,
    /// Queue an `Event::NoteTriggered` for every attacked note.
    pub emit_note_events: bool,
}

/// One player: its event stream, transport, instrument handle and pending
/// frame request. Nothing here is shared with other sessions.
pub struct PlaybackSession<S, F>
where
    S: SourcePort,
    F: InstrumentFactory,
{
    source_port: S,
    factory: F,
    config: SessionConfig,
    scheduler: Scheduler,
    transport: Transport,
    stream: EventStream,
    source: Option<SourceRef>,
    title: Option<String>,
    instrument: Option<F::Instrument>,
    instrument_loading: bool,
    /// Level requested before the instrument existed.
    volume: Option<Volume01>,
    frames: FrameRequests,
    progress: Progress,
    error_message: Option<String>,
    events: VecDeque<Event>,
}

impl<S, F> PlaybackSession<S, F>
where
    S: SourcePort,
    F: InstrumentFactory,
{
    pub fn new(source_port: S, factory: F, config: SessionConfig) -> Self {
        Self {
            source_port,
            factory,
            config,
            scheduler: Scheduler::new(config.scheduler),
            transport: Transport::new(),
            stream: EventStream::empty(),
            source: None,
            title: None,
            instrument: None,
            instrument_loading: false,
            volume: None,
            frames: FrameRequests::new(),
            progress: Progress::default(),
            error_message: None,
            events: VecDeque::new(),
        }
    }

    pub async fn handle_command(&mut self, cmd: Command) -> Result<(), PlaybackError> {
        match cmd {
            Command::Load { source } => self.load(source).await,
            Command::Play => self.play().await,
            Command::Pause => {
                self.pause();
                Ok(())
            }
            Command::TogglePlay => {
                if self.transport.phase() == TransportPhase::Playing {
                    self.pause();
                    Ok(())
                } else {
                    self.play().await
                }
            }
            Command::Reset => {
                self.reset();
                Ok(())
            }
            Command::SetVolume { volume } => {
                self.set_volume(volume);
                Ok(())
            }
        }
    }

    /// Replace the current source. Any running playback is stopped and the
    /// previous stream is discarded before the fetch starts, so a failed load
    /// leaves an empty session in `Error`.
    pub async fn load(&mut self, source: SourceRef) -> Result<(), PlaybackError> {
        self.halt();
        self.stream = EventStream::empty();
        self.title = None;
        self.source = Some(source.clone());
        self.error_message = None;
        self.transport.begin_load();
        self.progress = Progress::default();
        self.emit_phase();
        self.emit_progress();

        info!(%source, "loading MIDI source");
        match fetch_event_stream(&self.source_port, &source).await {
            Ok((stream, title)) => {
                self.transport.finish_load(stream.total_duration())?;
                info!(
                    %source,
                    notes = stream.len(),
                    duration = stream.total_duration(),
                    "MIDI source ready"
                );
                self.stream = stream;
                self.title = title;
                self.events.push_back(Event::DurationChanged {
                    duration: self.stream.total_duration(),
                });
                self.emit_phase();
                self.emit_progress();
                Ok(())
            }
            Err(err) => {
                warn!(%source, "load failed: {err}");
                self.transport.fail(err.to_string());
                self.set_error(err.to_string());
                self.emit_phase();
                Err(err)
            }
        }
    }

    /// Start or resume. The instrument is built on the first call; while it
    /// loads `instrument_loading` is set. A construction failure leaves the
    /// phase unchanged.
    pub async fn play(&mut self) -> Result<(), PlaybackError> {
        match self.transport.phase() {
            TransportPhase::Ready | TransportPhase::Paused => {}
            TransportPhase::Playing => return Ok(()),
            TransportPhase::Finished => self.rewind()?,
            phase => {
                return Err(PlaybackError::Rejected {
                    command: "play",
                    phase,
                })
            }
        }

        if self.instrument.is_none() {
            self.set_instrument_loading(true);
            let result = self.factory.construct().await;
            self.set_instrument_loading(false);
            match result {
                Ok(mut instrument) => {
                    info!("instrument ready");
                    if let Some(volume) = self.volume {
                        instrument.set_volume(volume);
                    }
                    self.instrument = Some(instrument);
                }
                Err(err) => {
                    let err = PlaybackError::from(err);
                    warn!("{err}");
                    self.set_error(err.to_string());
                    return Err(err);
                }
            }
        }

        self.transport.start()?;
        self.error_message = None;
        self.frames.request();
        debug!(position = self.transport.position(), "playback started");
        self.emit_phase();
        Ok(())
    }

    /// No-op unless playing.
    pub fn pause(&mut self) {
        if self.transport.phase() != TransportPhase::Playing {
            return;
        }
        self.halt();
        if let Err(err) = self.transport.pause() {
            warn!("pause failed: {err}");
            return;
        }
        debug!(position = self.transport.position(), "playback paused");
        self.emit_phase();
    }

    /// Rewind to the start. No-op when there is nothing to rewind.
    pub fn reset(&mut self) {
        if !matches!(
            self.transport.phase(),
            TransportPhase::Playing | TransportPhase::Paused | TransportPhase::Finished
        ) {
            return;
        }
        if let Err(err) = self.rewind() {
            warn!("reset failed: {err}");
        }
    }

    /// Change the output level. Kept for the instrument when it is built
    /// later.
    pub fn set_volume(&mut self, volume: Volume01) {
        self.volume = Some(volume);
        if let Some(instrument) = self.instrument.as_mut() {
            instrument.set_volume(volume);
        }
    }

    /// Run one scheduler step for `token`. Stale tokens (cancelled by pause,
    /// reset or load) are ignored.
    pub fn on_frame(&mut self, token: FrameToken, timestamp_ms: f64) -> Option<StepReport> {
        if !self.frames.take(token) {
            return None;
        }
        let instrument = self.instrument.as_mut()?;

        let report = self
            .scheduler
            .step(&mut self.transport, &self.stream, timestamp_ms, instrument);

        if report.outcome == StepOutcome::Inactive {
            return Some(report);
        }

        self.progress = report.progress;
        if self.config.emit_note_events {
            for &index in &report.triggered {
                if let Some(event) = self.stream.get(index) {
                    self.events.push_back(Event::NoteTriggered {
                        pitch: event.pitch(),
                        time: event.time(),
                    });
                }
            }
        }
        self.emit_progress();

        match report.outcome {
            StepOutcome::Continue => {
                self.frames.request();
            }
            StepOutcome::Finished => {
                info!(
                    duration = self.transport.total_duration(),
                    "playback finished"
                );
                self.emit_phase();
            }
            StepOutcome::Inactive => {}
        }

        Some(report)
    }

    /// Release and drop the instrument. The loaded stream is kept.
    pub fn dispose(&mut self) {
        self.pause();
        self.frames.cancel();
        if let Some(mut instrument) = self.instrument.take() {
            instrument.release_all();
            instrument.dispose();
        }
    }

    pub fn pending_frame(&self) -> Option<FrameToken> {
        self.frames.pending()
    }

    pub fn phase(&self) -> TransportPhase {
        self.transport.phase()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn stream(&self) -> &EventStream {
        &self.stream
    }

    pub fn instrument(&self) -> Option<&F::Instrument> {
        self.instrument.as_ref()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let phase = self.transport.phase();
        PlaybackSnapshot {
            phase,
            source: self.source.clone(),
            title: self.title.clone(),
            current_time: self.progress.current_time,
            duration: self.transport.total_duration(),
            progress_percent: self.progress.progress_percent,
            error_message: self.error_message.clone(),
            instrument_loading: self.instrument_loading,
            controls_enabled: phase.controls_enabled() && !self.instrument_loading,
            note_count: self.stream.len(),
            next_index: self.transport.next_index(),
        }
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    /// Cancel the pending step before touching the cursor, then silence.
    fn halt(&mut self) {
        self.frames.cancel();
        if let Some(instrument) = self.instrument.as_mut() {
            instrument.release_all();
        }
    }

    fn rewind(&mut self) -> Result<(), PlaybackError> {
        self.halt();
        self.transport.reset()?;
        self.progress = Progress::default();
        self.emit_phase();
        self.emit_progress();
        Ok(())
    }

    fn set_instrument_loading(&mut self, loading: bool) {
        if self.instrument_loading != loading {
            self.instrument_loading = loading;
            self.events.push_back(Event::InstrumentLoading { loading });
        }
    }

    fn set_error(&mut self, message: String) {
        self.error_message = Some(message.clone());
        self.events.push_back(Event::Error { message });
    }

    fn emit_phase(&mut self) {
        self.events.push_back(Event::PhaseChanged {
            phase: self.transport.phase(),
        });
    }

    fn emit_progress(&mut self) {
        self.events.push_back(Event::Progress {
            current_time: self.progress.current_time,
            progress_percent: self.progress.progress_percent,
        });
    }
}

impl<S, F> Drop for PlaybackSession<S, F>
where
    S: SourcePort,
    F: InstrumentFactory,
{
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn fetch_event_stream<S: SourcePort>(
    source_port: &S,
    source: &SourceRef,
) -> Result<(EventStream, Option<String>), PlaybackError> {
    let bytes = source_port.fetch(source).await?;
    let document = import_midi_bytes(&bytes).map_err(|e| PlaybackError::Parse(e.to_string()))?;
    Ok((EventStream::build(&document), document.name))
}
