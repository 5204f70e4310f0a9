use keyline_core::{format_time, Command, Event, TransportPhase};
use keyline_ports::source::SourceRef;
use keyline_ports::types::{Seconds, Volume01};

const BAR_WIDTH: usize = 30;

/// A line typed while the player runs.
#[derive(Clone, Debug, PartialEq)]
pub enum Input {
    Command(Command),
    Quit,
    Help,
    Unknown(String),
}

pub const HELP: &str = "p: play/pause  r: rewind  l <file>: load  v <0-100>: volume  q: quit";

/// Blank lines are ignored.
pub fn parse_line(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let input = match word {
        "p" | "play" | "pause" => Input::Command(Command::TogglePlay),
        "r" | "reset" => Input::Command(Command::Reset),
        "l" | "load" if !rest.is_empty() => Input::Command(Command::Load {
            source: SourceRef::new(rest),
        }),
        "v" | "volume" => match rest.parse::<f32>() {
            Ok(percent) if percent.is_finite() => Input::Command(Command::SetVolume {
                volume: Volume01::new(percent / 100.0),
            }),
            _ => Input::Unknown(line.to_string()),
        },
        "q" | "quit" | "exit" => Input::Quit,
        "h" | "help" | "?" => Input::Help,
        _ => Input::Unknown(line.to_string()),
    };
    Some(input)
}

/// Folds session events into the status line printed under the prompt.
#[derive(Debug)]
pub struct StatusLine {
    phase: TransportPhase,
    current_time: Seconds,
    duration: Seconds,
    progress_percent: f64,
    instrument_loading: bool,
}

impl Default for StatusLine {
    fn default() -> Self {
        Self {
            phase: TransportPhase::Idle,
            current_time: 0.0,
            duration: 0.0,
            progress_percent: 0.0,
            instrument_loading: false,
        }
    }
}

impl StatusLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> TransportPhase {
        self.phase
    }

    /// Returns whether the line changed.
    pub fn apply(&mut self, event: &Event) -> bool {
        match event {
            Event::PhaseChanged { phase } => self.phase = *phase,
            Event::DurationChanged { duration } => self.duration = *duration,
            Event::Progress {
                current_time,
                progress_percent,
            } => {
                self.current_time = *current_time;
                self.progress_percent = *progress_percent;
            }
            Event::InstrumentLoading { loading } => self.instrument_loading = *loading,
            Event::Error { .. } | Event::NoteTriggered { .. } => return false,
        }
        true
    }

    pub fn render(&self) -> String {
        let filled = ((self.progress_percent / 100.0) * BAR_WIDTH as f64).round() as usize;
        let filled = filled.min(BAR_WIDTH);
        let state = if self.instrument_loading {
            "loading instrument"
        } else {
            phase_label(self.phase)
        };
        format!(
            "{} / {} [{}{}] {}",
            format_time(self.current_time),
            format_time(self.duration),
            "#".repeat(filled),
            ".".repeat(BAR_WIDTH - filled),
            state
        )
    }
}

fn phase_label(phase: TransportPhase) -> &'static str {
    match phase {
        TransportPhase::Idle => "idle",
        TransportPhase::Loading => "loading",
        TransportPhase::Ready => "ready",
        TransportPhase::Playing => "playing",
        TransportPhase::Paused => "paused",
        TransportPhase::Finished => "finished",
        TransportPhase::Error => "error",
    }
}
