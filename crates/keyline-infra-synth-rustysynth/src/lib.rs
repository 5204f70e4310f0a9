use keyline_infra_synth_simple::SimpleSynth;
use keyline_ports::synth::{SoundFontInfo, SynthError, SynthEvent, SynthPort};
use keyline_ports::types::SampleTime;
use parking_lot::Mutex;
use rustysynth::{SoundFont, Synthesizer, SynthesizerSettings};
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::warn;

/// SoundFont playback through rustysynth. Until a SoundFont is loaded every
/// call goes to the built-in [`SimpleSynth`].
pub struct SoundFontSynth {
    fallback: SimpleSynth,
    sample_rate_hz: AtomicU32,
    enabled: AtomicBool,
    sound_font: Mutex<Option<Arc<SoundFont>>>,
    synth: Mutex<Option<Synthesizer>>,
}

impl Default for SoundFontSynth {
    fn default() -> Self {
        Self::new(48_000, 64)
    }
}

impl SoundFontSynth {
    pub fn new(sample_rate_hz: u32, max_voices: usize) -> Self {
        Self {
            fallback: SimpleSynth::new(sample_rate_hz, max_voices),
            sample_rate_hz: AtomicU32::new(sample_rate_hz),
            enabled: AtomicBool::new(false),
            sound_font: Mutex::new(None),
            synth: Mutex::new(None),
        }
    }

    pub fn has_soundfont(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn rebuild_synthesizer(&self, sound_font: &Arc<SoundFont>) -> Result<(), SynthError> {
        let sample_rate_hz = self.sample_rate_hz.load(Ordering::Relaxed) as i32;
        let mut settings = SynthesizerSettings::new(sample_rate_hz);
        settings.enable_reverb_and_chorus = false;

        let mut synth = Synthesizer::new(sound_font, &settings)
            .map_err(|e| SynthError::Backend(e.to_string()))?;
        synth.set_master_volume(0.25);
        *self.synth.lock() = Some(synth);
        Ok(())
    }

    // Audio thread: never block on the control side.
    fn with_active_synth<T>(&self, f: impl FnOnce(&mut Synthesizer) -> T) -> Option<T> {
        let mut guard = self.synth.try_lock()?;
        let synth = guard.as_mut()?;
        Some(f(synth))
    }
}

impl SynthPort for SoundFontSynth {
    fn load_soundfont_from_path(&self, path: &str) -> Result<SoundFontInfo, SynthError> {
        let mut file = File::open(path).map_err(|e| SynthError::SoundFontLoad(e.to_string()))?;
        let sound_font = Arc::new(
            SoundFont::new(&mut file).map_err(|e| SynthError::SoundFontLoad(e.to_string()))?,
        );

        let name = sound_font.get_info().get_bank_name().trim().to_string();
        let name = if name.is_empty() {
            Path::new(path)
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("SoundFont")
                .to_string()
        } else {
            name
        };
        let preset_count = sound_font.get_presets().len();

        self.rebuild_synthesizer(&sound_font)?;
        *self.sound_font.lock() = Some(sound_font);
        self.enabled.store(true, Ordering::Relaxed);

        Ok(SoundFontInfo { name, preset_count })
    }

    fn set_sample_rate(&self, sample_rate_hz: u32) {
        self.sample_rate_hz.store(sample_rate_hz, Ordering::Relaxed);
        self.fallback.set_sample_rate(sample_rate_hz);

        let sound_font = self.sound_font.lock().clone();
        if let Some(sound_font) = sound_font {
            if let Err(err) = self.rebuild_synthesizer(&sound_font) {
                warn!("rebuilding synthesizer failed: {err}");
            }
        }
    }

    /// SoundFont presets carry their own release envelope; only the fallback
    /// uses this.
    fn set_release_seconds(&self, seconds: f32) {
        self.fallback.set_release_seconds(seconds);
    }

    fn handle_event(&self, event: SynthEvent, at: SampleTime) {
        if !self.enabled.load(Ordering::Relaxed) {
            self.fallback.handle_event(event, at);
            return;
        }

        self.with_active_synth(|synth| match event {
            SynthEvent::NoteOn { note, velocity } => {
                synth.note_on(0, note as i32, velocity as i32);
            }
            SynthEvent::NoteOff { note } => {
                synth.note_off(0, note as i32);
            }
            SynthEvent::AllNotesOff => {
                synth.note_off_all(false);
            }
        });
    }

    fn render(&self, frames: usize, out_l: &mut [f32], out_r: &mut [f32]) {
        if !self.enabled.load(Ordering::Relaxed) {
            self.fallback.render(frames, out_l, out_r);
            return;
        }

        let frames = frames.min(out_l.len()).min(out_r.len());
        out_l[..frames].fill(0.0);
        out_r[..frames].fill(0.0);

        let _ = self.with_active_synth(|synth| {
            synth.render(&mut out_l[..frames], &mut out_r[..frames]);
        });
    }
}
