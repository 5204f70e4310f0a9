use crate::transport::TransportPhase;
use keyline_ports::source::SourceRef;
use keyline_ports::types::{Pitch, Seconds, Volume01};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Command {
    Load { source: SourceRef },
    Play,
    Pause,
    /// Play when stopped, pause when playing.
    TogglePlay,
    Reset,
    SetVolume { volume: Volume01 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    PhaseChanged { phase: TransportPhase },
    DurationChanged { duration: Seconds },
    Progress { current_time: Seconds, progress_percent: f64 },
    InstrumentLoading { loading: bool },
    Error { message: String },
    NoteTriggered { pitch: Pitch, time: Seconds },
}

/// Everything a presentation layer needs to draw the player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub phase: TransportPhase,
    pub source: Option<SourceRef>,
    pub title: Option<String>,
    pub current_time: Seconds,
    pub duration: Seconds,
    pub progress_percent: f64,
    pub error_message: Option<String>,
    pub instrument_loading: bool,
    pub controls_enabled: bool,
    pub note_count: usize,
    pub next_index: usize,
}

impl PlaybackSnapshot {
    pub fn is_playing(&self) -> bool {
        self.phase == TransportPhase::Playing
    }
}

/// `m:ss`, seconds truncated.
pub fn format_time(seconds: Seconds) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_time_pads_seconds() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(5.9), "0:05");
        assert_eq!(format_time(65.0), "1:05");
        assert_eq!(format_time(600.4), "10:00");
        assert_eq!(format_time(-3.0), "0:00");
        assert_eq!(format_time(f64::NAN), "0:00");
    }

    #[test]
    fn commands_use_tagged_json() {
        let json = serde_json::to_string(&Command::Load {
            source: SourceRef::new("song.mid"),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"Load","payload":{"source":"song.mid"}}"#);
        let back: Command = serde_json::from_str(r#"{"type":"Pause"}"#).unwrap();
        assert_eq!(back, Command::Pause);
    }
}
