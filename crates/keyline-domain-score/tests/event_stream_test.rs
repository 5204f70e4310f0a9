use keyline_domain_score::{
    EventStream, MidiDocument, NoteEvent, NoteEventError, NoteTrack, RawNote,
};
use keyline_ports::types::{Pitch, Velocity01};

fn raw(time: f64, duration: f64, key: u8) -> RawNote {
    RawNote {
        tick: (time * 960.0) as u64,
        duration_ticks: (duration * 960.0) as u64,
        time,
        duration,
        key,
        velocity: 100,
    }
}

fn document(tracks: Vec<Vec<RawNote>>, duration: f64) -> MidiDocument {
    MidiDocument {
        name: None,
        ppq: 480,
        tempo_map: Vec::new(),
        tracks: tracks
            .into_iter()
            .map(|notes| NoteTrack { name: None, notes })
            .collect(),
        duration,
    }
}

#[test]
fn event_stream_merges_tracks_in_time_order() {
    let doc = document(
        vec![
            vec![raw(1.0, 0.5, 60), raw(0.0, 0.5, 62), raw(2.0, 0.5, 64)],
            vec![raw(0.5, 0.5, 48), raw(1.5, 0.5, 50)],
        ],
        2.5,
    );

    let stream = EventStream::build(&doc);
    let times: Vec<f64> = stream.events().iter().map(|e| e.time()).collect();
    assert_eq!(times, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
    assert!(stream.is_sorted());
    assert_eq!(stream.total_duration(), 2.5);
    assert_eq!(stream.len(), 5);
}

#[test]
fn event_stream_keeps_track_order_for_equal_times() {
    let doc = document(
        vec![
            vec![raw(1.0, 0.5, 60), raw(1.0, 0.5, 61)],
            vec![raw(1.0, 0.5, 40)],
            vec![raw(0.0, 0.5, 70), raw(1.0, 0.5, 30)],
        ],
        1.5,
    );

    let stream = EventStream::build(&doc);
    let keys: Vec<u8> = stream
        .events()
        .iter()
        .map(|e| e.pitch().midi_number())
        .collect();
    assert_eq!(keys, vec![70, 60, 61, 40, 30]);
}

#[test]
fn event_stream_normalizes_pitch_and_velocity() {
    let doc = document(vec![vec![raw(0.25, 0.75, 61)]], 1.0);

    let stream = EventStream::build(&doc);
    let event = stream.get(0).expect("one event");
    assert_eq!(event.pitch().to_string(), "C#4");
    assert!((event.velocity().get() - 100.0 / 127.0).abs() < 1e-6);
    assert_eq!(event.time(), 0.25);
    assert_eq!(event.duration(), 0.75);
    assert_eq!(event.end(), 1.0);
}

#[test]
fn event_stream_skips_unplayable_notes() {
    let doc = document(vec![vec![raw(0.0, 0.0, 60), raw(0.5, 0.5, 200)]], 1.0);

    let stream = EventStream::build(&doc);
    assert!(stream.is_empty());
    assert_eq!(stream.total_duration(), 1.0);
}

#[test]
fn empty_document_yields_empty_stream() {
    let stream = EventStream::build(&document(Vec::new(), 0.0));
    assert!(stream.is_empty());
    assert!(stream.is_sorted());
    assert_eq!(stream.total_duration(), 0.0);
}

#[test]
fn note_event_validates_time_and_duration() {
    let pitch = Pitch::from_midi(60).unwrap();
    let velocity = Velocity01::new(0.5);
    assert_eq!(
        NoteEvent::new(-0.1, 1.0, pitch, velocity),
        Err(NoteEventError::InvalidTime(-0.1))
    );
    assert_eq!(
        NoteEvent::new(0.0, 0.0, pitch, velocity),
        Err(NoteEventError::InvalidDuration(0.0))
    );
    assert!(NoteEvent::new(0.0, f64::INFINITY, pitch, velocity).is_err());
    assert!(NoteEvent::new(0.0, 0.1, pitch, velocity).is_ok());
}

#[test]
fn from_events_sorts_and_clamps_duration() {
    let pitch = Pitch::from_midi(60).unwrap();
    let velocity = Velocity01::new(1.0);
    let events = vec![
        NoteEvent::new(2.0, 0.1, pitch, velocity).unwrap(),
        NoteEvent::new(1.0, 0.1, pitch, velocity).unwrap(),
    ];
    let stream = EventStream::from_events(events, -3.0);
    assert!(stream.is_sorted());
    assert_eq!(stream.get(0).map(|e| e.time()), Some(1.0));
    assert_eq!(stream.total_duration(), 0.0);
}
