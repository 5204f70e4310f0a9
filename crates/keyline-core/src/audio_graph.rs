use crate::audio_params::AudioParams;
use keyline_ports::audio::AudioRenderCallback;
use keyline_ports::synth::{SynthEvent, SynthPort};
use keyline_ports::types::SampleTime;
use rtrb::Consumer;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledNote {
    pub sample_time: SampleTime,
    pub event: SynthEvent,
}

pub struct AudioClock {
    sample_time: AtomicU64,
}

impl AudioClock {
    pub fn new() -> Self {
        Self {
            sample_time: AtomicU64::new(0),
        }
    }

    pub fn set(&self, sample_time: SampleTime) {
        self.sample_time.store(sample_time, Ordering::Relaxed);
    }

    pub fn get(&self) -> SampleTime {
        self.sample_time.load(Ordering::Relaxed)
    }
}

impl Default for AudioClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Render callback: applies queued note events at their sample positions and
/// mixes the synth into the output.
pub struct AudioGraph {
    synth: Arc<dyn SynthPort>,
    params: Arc<AudioParams>,
    clock: Arc<AudioClock>,
    consumer: Consumer<ScheduledNote>,
    scratch_l: Vec<f32>,
    scratch_r: Vec<f32>,
    /// Not yet due, e.g. note-offs for sounding notes.
    pending: Vec<ScheduledNote>,
    due: Vec<ScheduledNote>,
    limiter_gain: f32,
}

impl AudioGraph {
    pub fn new(
        synth: Arc<dyn SynthPort>,
        params: Arc<AudioParams>,
        consumer: Consumer<ScheduledNote>,
        clock: Arc<AudioClock>,
        max_frames: usize,
    ) -> Self {
        Self {
            synth,
            params,
            clock,
            consumer,
            scratch_l: vec![0.0; max_frames],
            scratch_r: vec![0.0; max_frames],
            pending: Vec::with_capacity(1024),
            due: Vec::with_capacity(256),
            limiter_gain: 1.0,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn collect_events(&mut self, sample_time_start: SampleTime, sample_time_end: SampleTime) {
        while let Ok(note) = self.consumer.pop() {
            if note.event == SynthEvent::AllNotesOff {
                // Everything queued before the release is void.
                self.pending.clear();
                self.synth.handle_event(SynthEvent::AllNotesOff, sample_time_start);
                continue;
            }
            self.pending.push(note);
        }

        self.due.clear();
        let mut idx = 0;
        while idx < self.pending.len() {
            if self.pending[idx].sample_time < sample_time_end {
                self.due.push(self.pending.swap_remove(idx));
            } else {
                idx += 1;
            }
        }

        self.due.sort_by(|a, b| {
            a.sample_time
                .cmp(&b.sample_time)
                .then_with(|| event_rank(&a.event).cmp(&event_rank(&b.event)))
        });
    }

    fn ensure_scratch(&mut self, frames: usize) {
        if self.scratch_l.len() < frames {
            self.scratch_l.resize(frames, 0.0);
            self.scratch_r.resize(frames, 0.0);
        }
    }

    fn render_segment(&mut self, frames: usize, out_l: &mut [f32], out_r: &mut [f32]) {
        let scratch_l = &mut self.scratch_l[..frames];
        let scratch_r = &mut self.scratch_r[..frames];

        self.synth.render(frames, scratch_l, scratch_r);

        let gain = self.params.master() * self.params.instrument_gain();
        for i in 0..frames {
            out_l[i] = scratch_l[i] * gain;
            out_r[i] = scratch_r[i] * gain;
        }

        let limit = 0.98_f32;
        let mut peak = 0.0_f32;
        for i in 0..frames {
            peak = peak.max(out_l[i].abs());
            peak = peak.max(out_r[i].abs());
        }

        let target_gain = if peak > limit { limit / peak } else { 1.0 };
        let current_gain = self.limiter_gain;
        let coeff = if target_gain < current_gain {
            0.25
        } else {
            0.01
        };
        let new_gain = (current_gain + coeff * (target_gain - current_gain)).clamp(0.0, 1.0);
        self.limiter_gain = new_gain;

        if new_gain < 0.999 {
            for i in 0..frames {
                out_l[i] *= new_gain;
                out_r[i] *= new_gain;
            }
        }
    }
}

// Note-offs before note-ons on the same sample so a repeated pitch restarts.
fn event_rank(event: &SynthEvent) -> u8 {
    match event {
        SynthEvent::AllNotesOff => 0,
        SynthEvent::NoteOff { .. } => 1,
        SynthEvent::NoteOn { .. } => 2,
    }
}

impl AudioRenderCallback for AudioGraph {
    fn render(&mut self, sample_time_start: SampleTime, out_l: &mut [f32], out_r: &mut [f32]) {
        let frames = out_l.len().min(out_r.len());
        let sample_time_end = sample_time_start.saturating_add(frames as u64);

        self.ensure_scratch(frames);
        self.collect_events(sample_time_start, sample_time_end);

        let mut cursor_sample = sample_time_start;
        let mut cursor_frame = 0usize;

        for idx in 0..self.due.len() {
            let note = self.due[idx];
            // Late events land on the first frame of this buffer.
            let event_sample = note.sample_time.max(cursor_sample);
            let event_frame = (event_sample - cursor_sample) as usize;
            if event_frame > 0 {
                let end = cursor_frame + event_frame;
                self.render_segment(
                    event_frame,
                    &mut out_l[cursor_frame..end],
                    &mut out_r[cursor_frame..end],
                );
                cursor_frame = end;
                cursor_sample = event_sample;
            }
            self.synth.handle_event(note.event, event_sample);
        }

        if cursor_frame < frames {
            self.render_segment(
                frames - cursor_frame,
                &mut out_l[cursor_frame..frames],
                &mut out_r[cursor_frame..frames],
            );
        }

        self.clock.set(sample_time_end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyline_ports::storage::PlayerSettings;
    use keyline_ports::synth::{SoundFontInfo, SynthError};
    use parking_lot::Mutex;
    use rtrb::RingBuffer;

    #[derive(Default)]
    struct RecordingSynth {
        handled: Mutex<Vec<(SynthEvent, SampleTime)>>,
        rendered_frames: Mutex<Vec<usize>>,
    }

    impl SynthPort for RecordingSynth {
        fn load_soundfont_from_path(&self, _path: &str) -> Result<SoundFontInfo, SynthError> {
            Err(SynthError::UnsupportedFormat)
        }

        fn set_sample_rate(&self, _sample_rate_hz: u32) {}

        fn set_release_seconds(&self, _seconds: f32) {}

        fn handle_event(&self, event: SynthEvent, at: SampleTime) {
            self.handled.lock().push((event, at));
        }

        fn render(&self, frames: usize, out_l: &mut [f32], out_r: &mut [f32]) {
            self.rendered_frames.lock().push(frames);
            out_l[..frames].fill(0.5);
            out_r[..frames].fill(0.5);
        }
    }

    fn graph(
        synth: Arc<RecordingSynth>,
    ) -> (AudioGraph, rtrb::Producer<ScheduledNote>, Arc<AudioClock>) {
        let (producer, consumer) = RingBuffer::new(64);
        let clock = Arc::new(AudioClock::new());
        let params = Arc::new(AudioParams::new(&PlayerSettings::default()));
        let graph = AudioGraph::new(synth, params, consumer, clock.clone(), 128);
        (graph, producer, clock)
    }

    #[test]
    fn events_split_the_buffer_at_their_sample() {
        let synth = Arc::new(RecordingSynth::default());
        let (mut graph, mut producer, clock) = graph(synth.clone());
        producer
            .push(ScheduledNote {
                sample_time: 16,
                event: SynthEvent::NoteOn {
                    note: 60,
                    velocity: 100,
                },
            })
            .unwrap();

        let mut l = vec![0.0; 64];
        let mut r = vec![0.0; 64];
        graph.render(0, &mut l, &mut r);

        assert_eq!(
            *synth.handled.lock(),
            vec![(
                SynthEvent::NoteOn {
                    note: 60,
                    velocity: 100
                },
                16
            )]
        );
        assert_eq!(*synth.rendered_frames.lock(), vec![16, 48]);
        assert_eq!(clock.get(), 64);
    }

    #[test]
    fn future_note_offs_wait_for_their_buffer() {
        let synth = Arc::new(RecordingSynth::default());
        let (mut graph, mut producer, _clock) = graph(synth.clone());
        producer
            .push(ScheduledNote {
                sample_time: 100,
                event: SynthEvent::NoteOff { note: 60 },
            })
            .unwrap();

        let mut l = vec![0.0; 64];
        let mut r = vec![0.0; 64];
        graph.render(0, &mut l, &mut r);
        assert!(synth.handled.lock().is_empty());
        assert_eq!(graph.pending_len(), 1);

        graph.render(64, &mut l, &mut r);
        assert_eq!(
            *synth.handled.lock(),
            vec![(SynthEvent::NoteOff { note: 60 }, 100)]
        );
        assert_eq!(graph.pending_len(), 0);
    }

    #[test]
    fn all_notes_off_drops_queued_events() {
        let synth = Arc::new(RecordingSynth::default());
        let (mut graph, mut producer, _clock) = graph(synth.clone());
        producer
            .push(ScheduledNote {
                sample_time: 500,
                event: SynthEvent::NoteOff { note: 60 },
            })
            .unwrap();
        producer
            .push(ScheduledNote {
                sample_time: 0,
                event: SynthEvent::AllNotesOff,
            })
            .unwrap();

        let mut l = vec![0.0; 64];
        let mut r = vec![0.0; 64];
        graph.render(0, &mut l, &mut r);
        assert_eq!(*synth.handled.lock(), vec![(SynthEvent::AllNotesOff, 0)]);
        assert_eq!(graph.pending_len(), 0);
    }

    #[test]
    fn late_events_apply_at_buffer_start() {
        let synth = Arc::new(RecordingSynth::default());
        let (mut graph, mut producer, _clock) = graph(synth.clone());
        producer
            .push(ScheduledNote {
                sample_time: 10,
                event: SynthEvent::NoteOn {
                    note: 64,
                    velocity: 90,
                },
            })
            .unwrap();

        let mut l = vec![0.0; 32];
        let mut r = vec![0.0; 32];
        graph.render(128, &mut l, &mut r);
        assert_eq!(synth.handled.lock()[0].1, 128);
        assert_eq!(*synth.rendered_frames.lock(), vec![32]);
    }

    #[test]
    fn output_is_scaled_by_master_and_trim() {
        let synth = Arc::new(RecordingSynth::default());
        let (mut graph, _producer, _clock) = graph(synth);
        let mut l = vec![0.0; 8];
        let mut r = vec![0.0; 8];
        graph.render(0, &mut l, &mut r);

        let settings = PlayerSettings::default();
        let expected = 0.5 * settings.master_volume.get() * settings.instrument_gain();
        assert!((l[0] - expected).abs() < 1e-6);
        assert!((r[7] - expected).abs() < 1e-6);
    }
}
