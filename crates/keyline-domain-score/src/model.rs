use keyline_ports::types::{Pitch, Seconds, Velocity01};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoPoint {
    pub tick: u64,
    pub us_per_quarter: u32,
}

/// One note as the container parser reports it, before normalization.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawNote {
    pub tick: u64,
    pub duration_ticks: u64,
    pub time: Seconds,
    pub duration: Seconds,
    pub key: u8,
    pub velocity: u8,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NoteTrack {
    pub name: Option<String>,
    /// In onset order.
    pub notes: Vec<RawNote>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MidiDocument {
    pub name: Option<String>,
    pub ppq: u16,
    pub tempo_map: Vec<TempoPoint>,
    pub tracks: Vec<NoteTrack>,
    /// End of the last note, in seconds.
    pub duration: Seconds,
}

impl MidiDocument {
    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|track| track.notes.len()).sum()
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum NoteEventError {
    #[error("note time must be finite and >= 0, got {0}")]
    InvalidTime(Seconds),
    #[error("note duration must be finite and > 0, got {0}")]
    InvalidDuration(Seconds),
    #[error("invalid pitch: {0}")]
    InvalidPitch(String),
}

/// A single playable note in the event stream.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    time: Seconds,
    duration: Seconds,
    pitch: Pitch,
    velocity: Velocity01,
}

impl NoteEvent {
    pub fn new(
        time: Seconds,
        duration: Seconds,
        pitch: Pitch,
        velocity: Velocity01,
    ) -> Result<Self, NoteEventError> {
        if !time.is_finite() || time < 0.0 {
            return Err(NoteEventError::InvalidTime(time));
        }
        if !duration.is_finite() || duration <= 0.0 {
            return Err(NoteEventError::InvalidDuration(duration));
        }
        Ok(Self {
            time,
            duration,
            pitch,
            velocity,
        })
    }

    pub fn from_raw(raw: &RawNote) -> Result<Self, NoteEventError> {
        let pitch =
            Pitch::from_midi(raw.key).map_err(|e| NoteEventError::InvalidPitch(e.to_string()))?;
        Self::new(
            raw.time,
            raw.duration,
            pitch,
            Velocity01::from_midi(raw.velocity),
        )
    }

    pub fn time(&self) -> Seconds {
        self.time
    }

    pub fn duration(&self) -> Seconds {
        self.duration
    }

    pub fn pitch(&self) -> Pitch {
        self.pitch
    }

    pub fn velocity(&self) -> Velocity01 {
        self.velocity
    }

    pub fn end(&self) -> Seconds {
        self.time + self.duration
    }
}
