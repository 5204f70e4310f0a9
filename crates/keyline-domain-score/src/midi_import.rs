use crate::model::{MidiDocument, NoteTrack, RawNote, TempoPoint};
use crate::tempo::{TempoMap, DEFAULT_US_PER_QUARTER};
use midly::{Fps, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEventKind};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum MidiImportError {
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
}

pub fn import_midi_path(path: &Path) -> Result<MidiDocument, MidiImportError> {
    let data = std::fs::read(path).map_err(|e| MidiImportError::Io(e.to_string()))?;
    import_midi_bytes(&data)
}

pub fn import_midi_bytes(data: &[u8]) -> Result<MidiDocument, MidiImportError> {
    let smf = Smf::parse(data).map_err(|e| MidiImportError::Parse(e.to_string()))?;
    let (ppq, tempo_override) = match smf.header.timing {
        Timing::Metrical(ticks) => (ticks.as_int(), None),
        Timing::Timecode(fps, ticks_per_frame) => {
            let (ppq, us_per_quarter) = timecode_ppq_and_tempo(fps, ticks_per_frame);
            (ppq, Some(us_per_quarter))
        }
    };
    if ppq == 0 {
        return Err(MidiImportError::Parse(
            "header declares zero ticks per quarter note".to_string(),
        ));
    }

    let tempo_map = TempoMap::new(ppq, collect_tempo_points(&smf.tracks, tempo_override));

    let tracks: Vec<NoteTrack> = smf
        .tracks
        .iter()
        .map(|track| import_track(track, ppq, &tempo_map))
        .collect();

    let duration = tracks
        .iter()
        .flat_map(|track| track.notes.iter())
        .map(|note| note.time + note.duration)
        .fold(0.0_f64, f64::max);

    let name = tracks.first().and_then(|track| track.name.clone());

    Ok(MidiDocument {
        name,
        ppq,
        tempo_map: tempo_map.points(),
        tracks,
        duration,
    })
}

fn collect_tempo_points(
    tracks: &[Track<'_>],
    override_us_per_quarter: Option<u32>,
) -> Vec<TempoPoint> {
    if let Some(us_per_quarter) = override_us_per_quarter {
        return vec![TempoPoint {
            tick: 0,
            us_per_quarter,
        }];
    }

    let mut tempo_points: BTreeMap<u64, u32> = BTreeMap::new();
    for track in tracks {
        let mut tick = 0u64;
        for event in track {
            tick += event.delta.as_int() as u64;
            if let TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter)) = event.kind {
                tempo_points.insert(tick, us_per_quarter.as_int());
            }
        }
    }

    let mut points: Vec<TempoPoint> = tempo_points
        .into_iter()
        .map(|(tick, us_per_quarter)| TempoPoint {
            tick,
            us_per_quarter,
        })
        .collect();
    if points.first().map_or(true, |p| p.tick != 0) {
        points.insert(
            0,
            TempoPoint {
                tick: 0,
                us_per_quarter: DEFAULT_US_PER_QUARTER,
            },
        );
    }
    points
}

struct PendingNote {
    tick: u64,
    key: u8,
    velocity: u8,
    end_tick: Option<u64>,
}

fn import_track(track: &Track<'_>, ppq: u16, tempo_map: &TempoMap) -> NoteTrack {
    let mut name = None;
    let mut pending: Vec<PendingNote> = Vec::new();
    // (channel, key) -> index into pending
    let mut open: BTreeMap<(u8, u8), usize> = BTreeMap::new();
    let mut tick = 0u64;

    for event in track {
        tick += event.delta.as_int() as u64;
        match &event.kind {
            TrackEventKind::Midi { channel, message } => {
                let channel = channel.as_int();
                match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        let key = key.as_int();
                        // A re-struck key ends the note that is still sounding.
                        if let Some(idx) = open.remove(&(channel, key)) {
                            pending[idx].end_tick = Some(tick);
                        }
                        open.insert((channel, key), pending.len());
                        pending.push(PendingNote {
                            tick,
                            key,
                            velocity: vel.as_int(),
                            end_tick: None,
                        });
                    }
                    MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                        if let Some(idx) = open.remove(&(channel, key.as_int())) {
                            pending[idx].end_tick = Some(tick);
                        }
                    }
                    _ => {}
                }
            }
            TrackEventKind::Meta(MetaMessage::TrackName(bytes)) if name.is_none() => {
                let text = String::from_utf8_lossy(bytes).trim().to_string();
                if !text.is_empty() {
                    name = Some(text);
                }
            }
            _ => {}
        }
    }

    let dangling_end = tick.saturating_add(ppq.max(1) as u64);
    let notes = pending
        .into_iter()
        .filter_map(|note| {
            let end_tick = note.end_tick.unwrap_or(dangling_end);
            if end_tick <= note.tick {
                return None;
            }
            let time = tempo_map.tick_to_seconds(note.tick);
            let duration = tempo_map.tick_to_seconds(end_tick) - time;
            if duration <= 0.0 {
                return None;
            }
            Some(RawNote {
                tick: note.tick,
                duration_ticks: end_tick - note.tick,
                time,
                duration,
                key: note.key,
                velocity: note.velocity,
            })
        })
        .collect();

    NoteTrack { name, notes }
}

fn timecode_ppq_and_tempo(fps: Fps, ticks_per_frame: u8) -> (u16, u32) {
    let ticks_per_frame = ticks_per_frame.max(1) as u16;
    match fps {
        Fps::Fps24 => (24 * ticks_per_frame, 1_000_000),
        Fps::Fps25 => (25 * ticks_per_frame, 1_000_000),
        Fps::Fps30 => (30 * ticks_per_frame, 1_000_000),
        Fps::Fps29 => (30 * ticks_per_frame, 1_001_000),
    }
}
