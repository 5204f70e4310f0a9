use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub type SampleTime = u64; // audio sample index, monotonic while stream running
pub type Seconds = f64;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioOutputDevice {
    pub id: DeviceId,
    pub name: String,
    pub default_config: AudioConfig,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate_hz: u32,
    pub channels: u16, // fixed 2
    pub buffer_size_frames: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct Volume01(pub f32);

impl Volume01 {
    pub fn new(value: f32) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

/// Note velocity normalized to 0..=1.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct Velocity01(f32);

impl Velocity01 {
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self(0.0);
        }
        Self(value.clamp(0.0, 1.0))
    }

    pub fn from_midi(velocity: u8) -> Self {
        Self::new(velocity.min(127) as f32 / 127.0)
    }

    pub fn get(self) -> f32 {
        self.0
    }

    pub fn to_midi(self) -> u8 {
        (self.0 * 127.0).round().clamp(0.0, 127.0) as u8
    }
}

const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Scientific pitch notation, middle C (MIDI 60) is `C4`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Pitch(u8);

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PitchError {
    #[error("midi key out of range: {0}")]
    OutOfRange(i32),
    #[error("invalid pitch name: {0}")]
    InvalidName(String),
}

impl Pitch {
    pub fn from_midi(key: u8) -> Result<Self, PitchError> {
        if key > 127 {
            return Err(PitchError::OutOfRange(key as i32));
        }
        Ok(Self(key))
    }

    pub fn midi_number(self) -> u8 {
        self.0
    }

    pub fn octave(self) -> i32 {
        self.0 as i32 / 12 - 1
    }

    pub fn frequency_hz(self) -> f32 {
        440.0 * 2.0_f32.powf((self.0 as f32 - 69.0) / 12.0)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SHARP_NAMES[(self.0 % 12) as usize], self.octave())
    }
}

impl FromStr for Pitch {
    type Err = PitchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PitchError::InvalidName(s.to_string());
        let mut chars = s.chars();
        let letter = chars.next().ok_or_else(invalid)?;
        let base: i32 = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(invalid()),
        };

        let rest = chars.as_str();
        let (accidental, octave_str) = if let Some(rest) = rest.strip_prefix('#') {
            (1, rest)
        } else if let Some(rest) = rest.strip_prefix('b') {
            (-1, rest)
        } else {
            (0, rest)
        };

        let octave: i32 = octave_str.parse().map_err(|_| invalid())?;
        let key = (octave + 1) * 12 + base + accidental;
        if !(0..=127).contains(&key) {
            return Err(PitchError::OutOfRange(key));
        }
        Ok(Self(key as u8))
    }
}

impl From<Pitch> for String {
    fn from(pitch: Pitch) -> Self {
        pitch.to_string()
    }
}

impl TryFrom<String> for Pitch {
    type Error = PitchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_names_follow_scientific_notation() {
        assert_eq!(Pitch::from_midi(60).unwrap().to_string(), "C4");
        assert_eq!(Pitch::from_midi(61).unwrap().to_string(), "C#4");
        assert_eq!(Pitch::from_midi(21).unwrap().to_string(), "A0");
        assert_eq!(Pitch::from_midi(0).unwrap().to_string(), "C-1");
        assert_eq!(Pitch::from_midi(127).unwrap().to_string(), "G9");
    }

    #[test]
    fn pitch_parses_sharps_flats_and_negative_octaves() {
        assert_eq!("C4".parse::<Pitch>().unwrap().midi_number(), 60);
        assert_eq!("D#1".parse::<Pitch>().unwrap().midi_number(), 27);
        assert_eq!("Eb1".parse::<Pitch>().unwrap().midi_number(), 27);
        assert_eq!("C-1".parse::<Pitch>().unwrap().midi_number(), 0);
        assert!("H2".parse::<Pitch>().is_err());
        assert!("C".parse::<Pitch>().is_err());
        assert!(matches!(
            "G#9".parse::<Pitch>(),
            Err(PitchError::OutOfRange(128))
        ));
    }

    #[test]
    fn pitch_serializes_as_name() {
        let pitch = Pitch::from_midi(66).unwrap();
        let json = serde_json::to_string(&pitch).unwrap();
        assert_eq!(json, "\"F#4\"");
        let back: Pitch = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pitch);
    }

    #[test]
    fn velocity_is_clamped() {
        assert_eq!(Velocity01::new(1.5).get(), 1.0);
        assert_eq!(Velocity01::new(-0.2).get(), 0.0);
        assert_eq!(Velocity01::new(f32::NAN).get(), 0.0);
        assert_eq!(Velocity01::from_midi(127).get(), 1.0);
        assert_eq!(Velocity01::from_midi(127).to_midi(), 127);
    }

    #[test]
    fn a4_is_440_hz() {
        let a4: Pitch = "A4".parse().unwrap();
        assert!((a4.frequency_hz() - 440.0).abs() < 1e-3);
    }
}
