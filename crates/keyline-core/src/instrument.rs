use crate::audio_graph::{AudioClock, AudioGraph, ScheduledNote};
use crate::audio_params::AudioParams;
use keyline_ports::audio::{AudioOutputPort, AudioStreamHandle};
use keyline_ports::instrument::{Instrument, InstrumentError, InstrumentFactory};
use keyline_ports::storage::PlayerSettings;
use keyline_ports::synth::{SynthEvent, SynthPort};
use keyline_ports::types::{
    AudioConfig, DeviceId, Pitch, SampleTime, Seconds, Velocity01, Volume01,
};
use rtrb::{Producer, RingBuffer};
use std::sync::Arc;
use tracing::{debug, info, warn};

const NOTE_QUEUE_CAPACITY: usize = 4096;
const MAX_RENDER_FRAMES: usize = 4096;

/// Instrument that queues note events for an [`AudioGraph`] running on the
/// audio thread.
pub struct SynthInstrument {
    producer: Producer<ScheduledNote>,
    clock: Arc<AudioClock>,
    params: Arc<AudioParams>,
    sample_rate_hz: u32,
    stream: Option<Box<dyn AudioStreamHandle>>,
}

impl SynthInstrument {
    pub fn new(
        producer: Producer<ScheduledNote>,
        clock: Arc<AudioClock>,
        params: Arc<AudioParams>,
        sample_rate_hz: u32,
        stream: Box<dyn AudioStreamHandle>,
    ) -> Self {
        Self {
            producer,
            clock,
            params,
            sample_rate_hz,
            stream: Some(stream),
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn duration_samples(&self, duration: Seconds) -> SampleTime {
        let samples = (duration.max(0.0) * self.sample_rate_hz as f64).round() as SampleTime;
        samples.max(1)
    }
}

impl Instrument for SynthInstrument {
    fn attack(
        &mut self,
        pitch: Pitch,
        duration: Seconds,
        velocity: Velocity01,
    ) -> Result<(), InstrumentError> {
        if self.stream.is_none() {
            return Err(InstrumentError::NotReady);
        }
        if self.producer.slots() < 2 {
            return Err(InstrumentError::Rejected(format!(
                "note queue full, dropped {pitch}"
            )));
        }

        let note = pitch.midi_number();
        let start = self.clock.get();
        let end = start.saturating_add(self.duration_samples(duration));
        let on = ScheduledNote {
            sample_time: start,
            event: SynthEvent::NoteOn {
                note,
                velocity: velocity.to_midi().max(1),
            },
        };
        let off = ScheduledNote {
            sample_time: end,
            event: SynthEvent::NoteOff { note },
        };

        // Slots were checked above; a failure here means the consumer is gone.
        self.producer
            .push(on)
            .and_then(|_| self.producer.push(off))
            .map_err(|_| InstrumentError::Output("note queue closed".into()))
    }

    fn release_all(&mut self) {
        if self.stream.is_none() {
            return;
        }
        let release = ScheduledNote {
            sample_time: self.clock.get(),
            event: SynthEvent::AllNotesOff,
        };
        if self.producer.push(release).is_err() {
            warn!("note queue full, release dropped");
        }
    }

    fn set_volume(&mut self, volume: Volume01) {
        debug!(volume = volume.get(), "master volume");
        self.params.set_master(volume);
    }

    fn dispose(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!("closing audio output");
            stream.close();
        }
    }
}

impl Drop for SynthInstrument {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Builds a [`SynthInstrument`]: loads the SoundFont (if any), configures the
/// synth and opens the output device. The blocking work runs on tokio's
/// blocking pool.
pub struct SynthInstrumentFactory {
    audio_port: Arc<dyn AudioOutputPort>,
    synth: Arc<dyn SynthPort>,
    settings: PlayerSettings,
}

impl SynthInstrumentFactory {
    pub fn new(
        audio_port: Arc<dyn AudioOutputPort>,
        synth: Arc<dyn SynthPort>,
        settings: PlayerSettings,
    ) -> Self {
        Self {
            audio_port,
            synth,
            settings,
        }
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.settings
    }
}

impl InstrumentFactory for SynthInstrumentFactory {
    type Instrument = SynthInstrument;

    async fn construct(&self) -> Result<SynthInstrument, InstrumentError> {
        let audio_port = self.audio_port.clone();
        let synth = self.synth.clone();
        let settings = self.settings.clone();
        tokio::task::spawn_blocking(move || open_instrument(audio_port, synth, &settings))
            .await
            .map_err(|e| InstrumentError::Backend(e.to_string()))?
    }
}

fn open_instrument(
    audio_port: Arc<dyn AudioOutputPort>,
    synth: Arc<dyn SynthPort>,
    settings: &PlayerSettings,
) -> Result<SynthInstrument, InstrumentError> {
    if let Some(path) = settings.soundfont_path.as_deref() {
        let info = synth
            .load_soundfont_from_path(path)
            .map_err(|e| InstrumentError::SampleLoad(e.to_string()))?;
        info!(name = %info.name, presets = info.preset_count, "soundfont loaded");
    }
    synth.set_sample_rate(settings.sample_rate_hz);
    synth.set_release_seconds(settings.release_seconds);

    let device_id = resolve_device(audio_port.as_ref(), settings)?;
    let config = AudioConfig {
        sample_rate_hz: settings.sample_rate_hz,
        channels: 2,
        buffer_size_frames: settings.audio_buffer_size_frames,
    };

    let (producer, consumer) = RingBuffer::new(NOTE_QUEUE_CAPACITY);
    let clock = Arc::new(AudioClock::new());
    let params = Arc::new(AudioParams::new(settings));
    let max_frames = settings
        .audio_buffer_size_frames
        .map(|frames| frames as usize)
        .unwrap_or(MAX_RENDER_FRAMES)
        .max(MAX_RENDER_FRAMES);
    let graph = AudioGraph::new(synth, params.clone(), consumer, clock.clone(), max_frames);

    let stream = audio_port
        .open_output(&device_id, config, Box::new(graph))
        .map_err(|e| InstrumentError::Output(e.to_string()))?;
    info!(device = %device_id, sample_rate = config.sample_rate_hz, "audio output open");

    Ok(SynthInstrument::new(
        producer,
        clock,
        params,
        config.sample_rate_hz,
        stream,
    ))
}

fn resolve_device(
    audio_port: &dyn AudioOutputPort,
    settings: &PlayerSettings,
) -> Result<DeviceId, InstrumentError> {
    if let Some(device_id) = settings.selected_audio_out.clone() {
        return Ok(device_id);
    }
    audio_port
        .default_output()
        .map(|device| device.id)
        .map_err(|e| InstrumentError::Output(e.to_string()))
}
