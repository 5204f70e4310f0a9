use crate::playback::GapPolicy;
use crate::types::*;
use serde::{Deserialize, Serialize};

fn default_sample_rate_hz() -> u32 {
    48_000
}

fn default_master_volume() -> Volume01 {
    Volume01::new(0.8)
}

fn default_release_seconds() -> f32 {
    1.2
}

fn default_instrument_gain_db() -> f32 {
    -6.0
}

fn default_frame_interval_ms() -> u64 {
    16
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    pub selected_audio_out: Option<DeviceId>,
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: u32,
    pub audio_buffer_size_frames: Option<u32>,
    #[serde(default = "default_master_volume")]
    pub master_volume: Volume01,
    #[serde(default = "default_release_seconds")]
    pub release_seconds: f32,
    #[serde(default = "default_instrument_gain_db")]
    pub instrument_gain_db: f32,
    pub soundfont_path: Option<String>,
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    pub gap_policy: GapPolicy,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            selected_audio_out: None,
            sample_rate_hz: default_sample_rate_hz(),
            audio_buffer_size_frames: None,
            master_volume: default_master_volume(),
            release_seconds: default_release_seconds(),
            instrument_gain_db: default_instrument_gain_db(),
            soundfont_path: None,
            frame_interval_ms: default_frame_interval_ms(),
            gap_policy: GapPolicy::CatchUp,
        }
    }
}

impl PlayerSettings {
    /// Linear gain applied on top of the master volume.
    pub fn instrument_gain(&self) -> f32 {
        10.0_f32.powf(self.instrument_gain_db / 20.0)
    }
}

pub trait StoragePort: Send + Sync {
    fn load_settings(&self) -> Result<PlayerSettings, StorageError>;
    fn save_settings(&self, s: &PlayerSettings) -> Result<(), StorageError>;
}
