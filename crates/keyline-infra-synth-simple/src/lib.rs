use keyline_ports::synth::{SoundFontInfo, SynthError, SynthEvent, SynthPort};
use keyline_ports::types::SampleTime;
use parking_lot::Mutex;
use std::f32::consts::TAU;

/// Additive sine voices with a struck-string style decay. Used when no
/// SoundFont is configured.
pub struct SimpleSynth {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    sample_rate_hz: f32,
    max_voices: usize,
    release_seconds: f32,
    voices: Vec<Voice>,
    note_counter: u64,
}

#[derive(Clone, Debug)]
struct Voice {
    note: u8,
    freq: f32,
    phase: f32,
    velocity: f32,
    /// Per-sample multiplier while the key is held.
    decay: f32,
    envelope: f32,
    key_down: bool,
    release_samples_left: u32,
    release_total_samples: u32,
    age: u64,
}

const PARTIALS: [(f32, f32); 3] = [(1.0, 1.0), (2.0, 0.35), (3.0, 0.12)];
const AMPLITUDE: f32 = 0.2;

impl SimpleSynth {
    pub fn new(sample_rate_hz: u32, max_voices: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sample_rate_hz: sample_rate_hz.max(1) as f32,
                max_voices: max_voices.max(8),
                release_seconds: 0.3,
                voices: Vec::new(),
                note_counter: 0,
            }),
        }
    }

    pub fn active_voices(&self) -> usize {
        self.inner.lock().voices.len()
    }
}

impl Default for SimpleSynth {
    fn default() -> Self {
        Self::new(48_000, 64)
    }
}

impl Inner {
    fn release_samples(&self) -> u32 {
        ((self.sample_rate_hz * self.release_seconds) as u32).max(1)
    }

    fn note_on(&mut self, note: u8, velocity: u8) {
        if velocity == 0 {
            self.note_off(note);
            return;
        }
        self.note_counter = self.note_counter.wrapping_add(1);

        // A re-struck key replaces its previous voice.
        self.voices.retain(|voice| voice.note != note);
        if self.voices.len() >= self.max_voices {
            if let Some((idx, _)) = self
                .voices
                .iter()
                .enumerate()
                .min_by_key(|(_, voice)| voice.age)
            {
                self.voices.swap_remove(idx);
            }
        }

        let freq = 440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0);
        // Higher notes die away faster.
        let decay_seconds = (4.0 - (note as f32 - 21.0) * 0.035).clamp(0.6, 4.0);
        let decay = (-1.0 / (decay_seconds * self.sample_rate_hz)).exp();
        let release_total_samples = self.release_samples();
        self.voices.push(Voice {
            note,
            freq,
            phase: 0.0,
            velocity: (velocity as f32 / 127.0).clamp(0.05, 1.0),
            decay,
            envelope: 1.0,
            key_down: true,
            release_samples_left: 0,
            release_total_samples,
            age: self.note_counter,
        });
    }

    fn note_off(&mut self, note: u8) {
        for voice in &mut self.voices {
            if voice.note == note && voice.key_down {
                voice.key_down = false;
                voice.release_samples_left = voice.release_total_samples;
            }
        }
    }

    fn all_notes_off(&mut self) {
        let release = (self.sample_rate_hz * 0.02) as u32;
        for voice in &mut self.voices {
            voice.key_down = false;
            voice.release_total_samples = release.max(1);
            voice.release_samples_left = voice.release_samples_left.min(release).max(1);
        }
    }

    fn render(&mut self, frames: usize, out_l: &mut [f32], out_r: &mut [f32]) {
        out_l[..frames].fill(0.0);
        out_r[..frames].fill(0.0);

        for voice in &mut self.voices {
            let phase_step = TAU * voice.freq / self.sample_rate_hz;
            for i in 0..frames {
                if !voice.key_down && voice.release_samples_left == 0 {
                    break;
                }
                let mut gain = voice.velocity * voice.envelope;
                if !voice.key_down {
                    gain *= voice.release_samples_left as f32 / voice.release_total_samples as f32;
                    voice.release_samples_left -= 1;
                }

                let mut sample = 0.0;
                for (ratio, weight) in PARTIALS {
                    sample += (voice.phase * ratio).sin() * weight;
                }
                let sample = sample * gain * AMPLITUDE;
                out_l[i] += sample;
                out_r[i] += sample;

                voice.envelope *= voice.decay;
                voice.phase += phase_step;
                if voice.phase >= TAU {
                    voice.phase -= TAU;
                }
            }
        }

        self.voices
            .retain(|voice| voice.key_down || voice.release_samples_left > 0);
    }
}

impl SynthPort for SimpleSynth {
    fn load_soundfont_from_path(&self, _path: &str) -> Result<SoundFontInfo, SynthError> {
        Err(SynthError::UnsupportedFormat)
    }

    fn set_sample_rate(&self, sample_rate_hz: u32) {
        let mut inner = self.inner.lock();
        inner.sample_rate_hz = sample_rate_hz.max(1) as f32;
    }

    fn set_release_seconds(&self, seconds: f32) {
        let mut inner = self.inner.lock();
        inner.release_seconds = seconds.clamp(0.01, 10.0);
    }

    fn handle_event(&self, event: SynthEvent, _at: SampleTime) {
        let mut inner = self.inner.lock();
        match event {
            SynthEvent::NoteOn { note, velocity } => inner.note_on(note, velocity),
            SynthEvent::NoteOff { note } => inner.note_off(note),
            SynthEvent::AllNotesOff => inner.all_notes_off(),
        }
    }

    fn render(&self, frames: usize, out_l: &mut [f32], out_r: &mut [f32]) {
        let mut inner = self.inner.lock();
        inner.render(frames, out_l, out_r);
    }
}
