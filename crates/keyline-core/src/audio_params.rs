use keyline_ports::storage::PlayerSettings;
use keyline_ports::types::Volume01;
use std::sync::atomic::{AtomicU32, Ordering};

/// Gain values read by the audio thread. Only the master level changes
/// after construction.
#[derive(Debug)]
pub struct AudioParams {
    master: AtomicU32,
    instrument_gain: AtomicU32,
}

impl AudioParams {
    pub fn new(settings: &PlayerSettings) -> Self {
        Self {
            master: AtomicU32::new(settings.master_volume.get().to_bits()),
            instrument_gain: AtomicU32::new(settings.instrument_gain().to_bits()),
        }
    }

    pub fn set_master(&self, volume: Volume01) {
        self.master.store(volume.get().to_bits(), Ordering::Relaxed);
    }

    pub fn master(&self) -> f32 {
        f32::from_bits(self.master.load(Ordering::Relaxed))
    }

    pub fn instrument_gain(&self) -> f32 {
        f32::from_bits(self.instrument_gain.load(Ordering::Relaxed))
    }
}
