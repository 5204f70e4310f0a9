#![allow(dead_code)]

use keyline_core::{PlaybackSession, SessionConfig};
use keyline_domain_score::{EventStream, NoteEvent};
use keyline_ports::instrument::{Instrument, InstrumentError, InstrumentFactory};
use keyline_ports::source::{SourceError, SourcePort, SourceRef};
use keyline_ports::types::{Pitch, Seconds, Velocity01, Volume01};
use midly::num::{u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Attack {
        pitch: Pitch,
        duration: Seconds,
        velocity: Velocity01,
    },
    ReleaseAll,
    SetVolume(Volume01),
    Dispose,
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

pub fn attacks(log: &CallLog) -> Vec<Pitch> {
    log.lock()
        .iter()
        .filter_map(|call| match call {
            Call::Attack { pitch, .. } => Some(*pitch),
            _ => None,
        })
        .collect()
}

pub fn pitch(name: &str) -> Pitch {
    name.parse().expect("valid pitch name")
}

pub struct RecordingInstrument {
    log: CallLog,
    reject: Option<Pitch>,
}

impl RecordingInstrument {
    pub fn new(log: CallLog) -> Self {
        Self { log, reject: None }
    }

    pub fn rejecting(log: CallLog, pitch: Pitch) -> Self {
        Self {
            log,
            reject: Some(pitch),
        }
    }
}

impl Instrument for RecordingInstrument {
    fn attack(
        &mut self,
        pitch: Pitch,
        duration: Seconds,
        velocity: Velocity01,
    ) -> Result<(), InstrumentError> {
        if self.reject == Some(pitch) {
            return Err(InstrumentError::Rejected(format!("{pitch} unavailable")));
        }
        self.log.lock().push(Call::Attack {
            pitch,
            duration,
            velocity,
        });
        Ok(())
    }

    fn release_all(&mut self) {
        self.log.lock().push(Call::ReleaseAll);
    }

    fn set_volume(&mut self, volume: Volume01) {
        self.log.lock().push(Call::SetVolume(volume));
    }

    fn dispose(&mut self) {
        self.log.lock().push(Call::Dispose);
    }
}

#[derive(Clone, Default)]
pub struct RecordingFactory {
    pub log: CallLog,
    pub constructed: Arc<AtomicUsize>,
    pub fail: bool,
    pub reject: Option<Pitch>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }
}

impl InstrumentFactory for RecordingFactory {
    type Instrument = RecordingInstrument;

    async fn construct(&self) -> Result<RecordingInstrument, InstrumentError> {
        self.constructed.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(InstrumentError::SampleLoad("no samples".into()));
        }
        Ok(RecordingInstrument {
            log: self.log.clone(),
            reject: self.reject,
        })
    }
}

/// In-memory source keyed by location.
#[derive(Clone, Default)]
pub struct MemorySource {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    pub fetches: Arc<AtomicUsize>,
    watch: Option<CallLog>,
    /// Last instrument call seen when each fetch started.
    pub seen_at_fetch: Arc<Mutex<Vec<Option<Call>>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, location: &str, bytes: Vec<u8>) -> Self {
        self.files.lock().insert(location.to_string(), bytes);
        self
    }

    pub fn watching(mut self, log: CallLog) -> Self {
        self.watch = Some(log);
        self
    }
}

impl SourcePort for MemorySource {
    async fn fetch(&self, source: &SourceRef) -> Result<Vec<u8>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.watch {
            let last = log.lock().last().cloned();
            self.seen_at_fetch.lock().push(last);
        }
        self.files
            .lock()
            .get(source.as_str())
            .cloned()
            .ok_or_else(|| SourceError::NotFound(source.to_string()))
    }
}

pub type TestSession = PlaybackSession<MemorySource, RecordingFactory>;

pub fn session(source: MemorySource, factory: RecordingFactory) -> TestSession {
    PlaybackSession::new(source, factory, SessionConfig::default())
}

pub fn event(time: Seconds, duration: Seconds, name: &str) -> NoteEvent {
    NoteEvent::new(time, duration, pitch(name), Velocity01::new(0.8)).expect("valid note")
}

pub fn stream(events: Vec<NoteEvent>, total_duration: Seconds) -> EventStream {
    EventStream::from_events(events, total_duration)
}

pub const PPQ: u16 = 480;

/// Single-track SMF at the default 120 bpm, so one quarter is 0.5 s.
/// Notes are `(start_tick, length_ticks, key)`.
pub fn midi_file(notes: &[(u32, u32, u8)]) -> Vec<u8> {
    let mut timeline: Vec<(u32, u8, bool)> = Vec::new();
    for &(start, length, key) in notes {
        timeline.push((start, key, true));
        timeline.push((start + length, key, false));
    }
    // Offs before ons on the same tick.
    timeline.sort_by_key(|&(tick, _, on)| (tick, on));

    let mut track = vec![TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(b"Test Piece")),
    }];
    let mut last = 0;
    for (tick, key, on) in timeline {
        let message = if on {
            MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(100),
            }
        } else {
            MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(0),
            }
        };
        track.push(TrackEvent {
            delta: u28::new(tick - last),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message,
            },
        });
        last = tick;
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(PPQ.into()),
        },
        tracks: vec![track],
    };
    let mut data = Vec::new();
    smf.write(&mut data).expect("midi write should succeed");
    data
}

/// C4 E4 G4 as quarters starting at 0.0, 0.5 and 1.0 s; ends at 1.5 s.
pub fn arpeggio() -> Vec<u8> {
    midi_file(&[(0, 480, 60), (480, 480, 64), (960, 480, 67)])
}
