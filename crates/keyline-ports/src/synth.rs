use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum SynthError {
    #[error("soundfont load failed: {0}")]
    SoundFontLoad(String),
    #[error("unsupported soundfont format")]
    UnsupportedFormat,
    #[error("backend error: {0}")]
    Backend(String),
}

#[derive(Clone, Debug)]
pub struct SoundFontInfo {
    pub name: String,
    pub preset_count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SynthEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    AllNotesOff,
}

/// Thread model:
/// - load_* / set_* are called from the control side (can lock internally)
/// - handle_event/render are called from audio thread (must be realtime-safe)
pub trait SynthPort: Send + Sync {
    fn load_soundfont_from_path(&self, path: &str) -> Result<SoundFontInfo, SynthError>;
    fn set_sample_rate(&self, sample_rate_hz: u32);
    /// Length of the fade after a note is released.
    fn set_release_seconds(&self, seconds: f32);

    /// Called by audio thread
    fn handle_event(&self, event: SynthEvent, at: SampleTime);

    /// Called by audio thread: render frames to out_l/out_r
    fn render(&self, frames: usize, out_l: &mut [f32], out_r: &mut [f32]);
}
