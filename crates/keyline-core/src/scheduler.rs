use crate::error::PlaybackError;
use crate::transport::{Transport, TransportPhase};
use keyline_domain_score::EventStream;
use keyline_ports::instrument::Instrument;
use keyline_ports::playback::GapPolicy;
use keyline_ports::types::Seconds;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, Default)]
pub struct SchedulerConfig {
    pub gap_policy: GapPolicy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub current_time: Seconds,
    pub progress_percent: f64,
}

impl Progress {
    pub fn at(position: Seconds, total_duration: Seconds) -> Self {
        if total_duration <= 0.0 {
            return Self::complete(total_duration);
        }
        Self {
            current_time: position.min(total_duration).max(0.0),
            progress_percent: (100.0 * position / total_duration).clamp(0.0, 100.0),
        }
    }

    pub fn complete(total_duration: Seconds) -> Self {
        Self {
            current_time: total_duration.max(0.0),
            progress_percent: 100.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Request another frame.
    Continue,
    /// End of stream reached; the transport is now Finished.
    Finished,
    /// The transport was not playing; nothing happened.
    Inactive,
}

#[derive(Clone, Debug)]
pub struct StepReport {
    pub outcome: StepOutcome,
    pub progress: Progress,
    /// Stream indices attacked during this step, in order.
    pub triggered: Vec<usize>,
    /// Events consumed without being attacked.
    pub skipped: usize,
    pub faults: Vec<PlaybackError>,
}

impl StepReport {
    fn inactive(transport: &Transport) -> Self {
        Self {
            outcome: StepOutcome::Inactive,
            progress: Progress::at(transport.position(), transport.total_duration()),
            triggered: Vec::new(),
            skipped: 0,
            faults: Vec::new(),
        }
    }
}

/// Frame-driven note dispatch.
///
/// Each step advances the transport by the wall-clock time since the previous
/// step and attacks every event whose onset falls in `(previous, position]`.
/// Events are consumed exactly once: `next_index` moves past every event with
/// `time <= position` whether or not it was attacked.
#[derive(Clone, Debug, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn step(
        &self,
        transport: &mut Transport,
        stream: &EventStream,
        timestamp_ms: f64,
        instrument: &mut dyn Instrument,
    ) -> StepReport {
        if transport.phase() != TransportPhase::Playing {
            return StepReport::inactive(transport);
        }

        let delta_ms = transport.mark_frame(timestamp_ms);
        let (previous, position) = transport.advance(delta_ms / 1000.0);
        let total_duration = transport.total_duration();
        let floor = self.trigger_floor(previous, position, delta_ms);

        let mut report = StepReport {
            outcome: StepOutcome::Continue,
            progress: Progress::at(position, total_duration),
            triggered: Vec::new(),
            skipped: 0,
            faults: Vec::new(),
        };

        let mut index = transport.next_index();
        while let Some(event) = stream.get(index) {
            if event.time() > position {
                break;
            }

            // At the very start the window is closed so onsets at 0 play.
            let due = if floor <= 0.0 {
                event.time() >= 0.0
            } else {
                event.time() > floor
            };

            if due {
                match instrument.attack(event.pitch(), event.duration(), event.velocity()) {
                    Ok(()) => report.triggered.push(index),
                    Err(err) => {
                        let fault = PlaybackError::PlaybackFault(format!(
                            "{} at {:.3}s: {err}",
                            event.pitch(),
                            event.time()
                        ));
                        warn!(index, "{fault}");
                        report.faults.push(fault);
                    }
                }
            } else {
                report.skipped += 1;
            }
            index += 1;
        }
        transport.advance_index_to(index);

        if report.skipped > 0 {
            debug!(skipped = report.skipped, position, "skipped events behind the cursor");
        }

        if position >= total_duration || index >= stream.len() {
            if let Err(err) = transport.finish() {
                warn!("finish failed: {err}");
            }
            instrument.release_all();
            report.progress = Progress::complete(total_duration);
            report.outcome = StepOutcome::Finished;
            debug!(position, total_duration, "playback finished");
        }

        report
    }

    fn trigger_floor(&self, previous: Seconds, position: Seconds, delta_ms: f64) -> Seconds {
        match self.config.gap_policy {
            GapPolicy::CatchUp => previous,
            GapPolicy::FastForward { max_gap_ms } if delta_ms > max_gap_ms.max(0.0) => {
                (position - max_gap_ms.max(0.0) / 1000.0).max(previous)
            }
            GapPolicy::FastForward { .. } => previous,
        }
    }
}
