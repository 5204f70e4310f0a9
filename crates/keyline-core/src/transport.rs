use keyline_ports::types::Seconds;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportPhase {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Finished,
    Error,
}

impl TransportPhase {
    /// Whether play/pause/reset make sense to offer.
    pub fn controls_enabled(self) -> bool {
        !matches!(
            self,
            TransportPhase::Idle | TransportPhase::Loading | TransportPhase::Error
        )
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid transport transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: TransportPhase,
        to: TransportPhase,
    },
}

/// Phase plus playback cursor for one loaded source.
#[derive(Clone, Debug)]
pub struct Transport {
    phase: TransportPhase,
    position: Seconds,
    next_index: usize,
    last_frame_timestamp: Option<f64>,
    total_duration: Seconds,
    error_message: Option<String>,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            phase: TransportPhase::Idle,
            position: 0.0,
            next_index: 0,
            last_frame_timestamp: None,
            total_duration: 0.0,
            error_message: None,
        }
    }

    pub fn phase(&self) -> TransportPhase {
        self.phase
    }

    /// Playback position, always within `0..=total_duration`.
    pub fn position(&self) -> Seconds {
        self.position.clamp(0.0, self.total_duration)
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn last_frame_timestamp(&self) -> Option<f64> {
        self.last_frame_timestamp
    }

    pub fn total_duration(&self) -> Seconds {
        self.total_duration
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Any phase -> Loading. Drops the cursor and duration of the previous
    /// source.
    pub fn begin_load(&mut self) {
        self.rewind();
        self.total_duration = 0.0;
        self.error_message = None;
        self.phase = TransportPhase::Loading;
    }

    pub fn finish_load(&mut self, total_duration: Seconds) -> Result<(), TransportError> {
        self.expect(&[TransportPhase::Loading], TransportPhase::Ready)?;
        self.rewind();
        self.total_duration = if total_duration.is_finite() {
            total_duration.max(0.0)
        } else {
            0.0
        };
        self.phase = TransportPhase::Ready;
        Ok(())
    }

    /// Any phase -> Error. Only a new load leaves this phase.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.rewind();
        self.total_duration = 0.0;
        self.error_message = Some(message.into());
        self.phase = TransportPhase::Error;
    }

    pub fn start(&mut self) -> Result<(), TransportError> {
        self.expect(
            &[TransportPhase::Ready, TransportPhase::Paused],
            TransportPhase::Playing,
        )?;
        self.last_frame_timestamp = None;
        self.phase = TransportPhase::Playing;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), TransportError> {
        self.expect(&[TransportPhase::Playing], TransportPhase::Paused)?;
        self.last_frame_timestamp = None;
        self.phase = TransportPhase::Paused;
        Ok(())
    }

    pub fn finish(&mut self) -> Result<(), TransportError> {
        self.expect(&[TransportPhase::Playing], TransportPhase::Finished)?;
        self.position = self.total_duration;
        self.last_frame_timestamp = None;
        self.phase = TransportPhase::Finished;
        Ok(())
    }

    /// Back to the start of the current source.
    pub fn reset(&mut self) -> Result<(), TransportError> {
        self.expect(
            &[
                TransportPhase::Ready,
                TransportPhase::Playing,
                TransportPhase::Paused,
                TransportPhase::Finished,
            ],
            TransportPhase::Ready,
        )?;
        self.rewind();
        self.phase = TransportPhase::Ready;
        Ok(())
    }

    /// Record a frame timestamp and return the milliseconds elapsed since the
    /// previous one. The first frame after start/resume yields 0, as does a
    /// timestamp that goes backwards.
    pub(crate) fn mark_frame(&mut self, timestamp_ms: f64) -> f64 {
        // A broken clock reading must not poison later deltas.
        if !timestamp_ms.is_finite() {
            return 0.0;
        }
        let previous = self.last_frame_timestamp.unwrap_or(timestamp_ms);
        self.last_frame_timestamp = Some(timestamp_ms);
        let delta = timestamp_ms - previous;
        if delta.is_finite() && delta > 0.0 {
            delta
        } else {
            0.0
        }
    }

    /// Move the position forward; returns `(previous, current)` unclamped.
    pub(crate) fn advance(&mut self, delta: Seconds) -> (Seconds, Seconds) {
        let previous = self.position;
        if self.phase == TransportPhase::Playing && delta > 0.0 {
            self.position += delta;
        }
        (previous, self.position)
    }

    pub(crate) fn advance_index_to(&mut self, index: usize) {
        if self.phase == TransportPhase::Playing {
            self.next_index = self.next_index.max(index);
        }
    }

    fn rewind(&mut self) {
        self.position = 0.0;
        self.next_index = 0;
        self.last_frame_timestamp = None;
    }

    fn expect(
        &self,
        allowed: &[TransportPhase],
        to: TransportPhase,
    ) -> Result<(), TransportError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(TransportError::InvalidTransition {
                from: self.phase,
                to,
            })
        }
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(total: Seconds) -> Transport {
        let mut transport = Transport::new();
        transport.begin_load();
        transport.finish_load(total).unwrap();
        transport
    }

    #[test]
    fn load_moves_idle_to_ready() {
        let transport = ready(4.0);
        assert_eq!(transport.phase(), TransportPhase::Ready);
        assert_eq!(transport.total_duration(), 4.0);
        assert_eq!(transport.position(), 0.0);
        assert_eq!(transport.next_index(), 0);
    }

    #[test]
    fn finish_load_outside_loading_is_rejected() {
        let mut transport = Transport::new();
        assert_eq!(
            transport.finish_load(1.0),
            Err(TransportError::InvalidTransition {
                from: TransportPhase::Idle,
                to: TransportPhase::Ready,
            })
        );
        assert_eq!(transport.phase(), TransportPhase::Idle);
    }

    #[test]
    fn start_clears_last_frame_timestamp() {
        let mut transport = ready(4.0);
        transport.start().unwrap();
        assert_eq!(transport.mark_frame(100.0), 0.0);
        assert_eq!(transport.mark_frame(116.0), 16.0);
        transport.pause().unwrap();
        transport.start().unwrap();
        assert_eq!(transport.last_frame_timestamp(), None);
        assert_eq!(transport.mark_frame(5_000.0), 0.0);
    }

    #[test]
    fn backwards_timestamp_is_zero_delta() {
        let mut transport = ready(4.0);
        transport.start().unwrap();
        transport.mark_frame(100.0);
        assert_eq!(transport.mark_frame(90.0), 0.0);
        assert_eq!(transport.mark_frame(95.0), 5.0);
    }

    #[test]
    fn non_finite_timestamps_are_ignored() {
        let mut transport = ready(10.0);
        transport.start().unwrap();
        assert_eq!(transport.mark_frame(100.0), 0.0);
        assert_eq!(transport.mark_frame(f64::NAN), 0.0);
        assert_eq!(transport.mark_frame(f64::INFINITY), 0.0);
        assert_eq!(transport.last_frame_timestamp(), Some(100.0));
        assert_eq!(transport.mark_frame(150.0), 50.0);
    }

    #[test]
    fn position_is_clamped_on_observation() {
        let mut transport = ready(1.0);
        transport.start().unwrap();
        transport.advance(1.5);
        assert_eq!(transport.position(), 1.0);
        transport.finish().unwrap();
        assert_eq!(transport.phase(), TransportPhase::Finished);
        assert_eq!(transport.position(), 1.0);
    }

    #[test]
    fn cursor_only_moves_while_playing() {
        let mut transport = ready(2.0);
        transport.advance(1.0);
        transport.advance_index_to(3);
        assert_eq!(transport.position(), 0.0);
        assert_eq!(transport.next_index(), 0);

        transport.start().unwrap();
        transport.advance_index_to(3);
        transport.advance_index_to(1);
        assert_eq!(transport.next_index(), 3);
    }

    #[test]
    fn reset_rewinds_from_paused_and_finished() {
        let mut transport = ready(2.0);
        transport.start().unwrap();
        transport.advance(1.0);
        transport.advance_index_to(2);
        transport.pause().unwrap();
        transport.reset().unwrap();
        assert_eq!(transport.phase(), TransportPhase::Ready);
        assert_eq!(transport.position(), 0.0);
        assert_eq!(transport.next_index(), 0);

        transport.start().unwrap();
        transport.finish().unwrap();
        transport.reset().unwrap();
        assert_eq!(transport.position(), 0.0);
    }

    #[test]
    fn error_is_left_only_by_loading() {
        let mut transport = ready(2.0);
        transport.fail("bad file");
        assert_eq!(transport.phase(), TransportPhase::Error);
        assert_eq!(transport.error_message(), Some("bad file"));
        assert!(transport.start().is_err());
        assert!(transport.reset().is_err());

        transport.begin_load();
        assert_eq!(transport.phase(), TransportPhase::Loading);
        assert_eq!(transport.error_message(), None);
    }

    #[test]
    fn controls_are_disabled_while_loading_or_failed() {
        assert!(!TransportPhase::Loading.controls_enabled());
        assert!(!TransportPhase::Error.controls_enabled());
        assert!(!TransportPhase::Idle.controls_enabled());
        assert!(TransportPhase::Paused.controls_enabled());
    }
}
