use crate::model::{MidiDocument, NoteEvent};
use keyline_ports::types::Seconds;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// All notes of one loaded source, ordered by onset time.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventStream {
    events: Vec<NoteEvent>,
    total_duration: Seconds,
}

impl EventStream {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Flatten every track of `document` into one stream. Notes that cannot
    /// be represented (zero length, out-of-range key) are dropped.
    pub fn build(document: &MidiDocument) -> Self {
        let mut skipped = 0usize;
        let events = document
            .tracks
            .iter()
            .flat_map(|track| track.notes.iter())
            .filter_map(|raw| match NoteEvent::from_raw(raw) {
                Ok(event) => Some(event),
                Err(err) => {
                    skipped += 1;
                    debug!(tick = raw.tick, key = raw.key, "skipping note: {err}");
                    None
                }
            })
            .collect::<Vec<_>>();

        if skipped > 0 {
            debug!(skipped, "notes dropped while building event stream");
        }

        Self::from_events(events, document.duration)
    }

    /// Order `events` by time; equal times keep their relative order.
    pub fn from_events(mut events: Vec<NoteEvent>, total_duration: Seconds) -> Self {
        events.sort_by(|a, b| a.time().total_cmp(&b.time()));
        let total_duration = if total_duration.is_finite() {
            total_duration.max(0.0)
        } else {
            0.0
        };
        Self {
            events,
            total_duration,
        }
    }

    pub fn events(&self) -> &[NoteEvent] {
        &self.events
    }

    pub fn get(&self, index: usize) -> Option<&NoteEvent> {
        self.events.get(index)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn total_duration(&self) -> Seconds {
        self.total_duration
    }

    pub fn is_sorted(&self) -> bool {
        self.events.windows(2).all(|pair| pair[0].time() <= pair[1].time())
    }
}
