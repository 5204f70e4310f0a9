use crate::types::*;
use std::future::Future;

#[derive(thiserror::Error, Debug)]
pub enum InstrumentError {
    #[error("instrument not ready")]
    NotReady,
    #[error("note rejected: {0}")]
    Rejected(String),
    #[error("sample load failed: {0}")]
    SampleLoad(String),
    #[error("audio output failed: {0}")]
    Output(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// A constructed sound source. Calls come from the playback session only,
/// never from the audio thread.
pub trait Instrument: Send {
    /// Start `pitch` now and release it after `duration` seconds.
    fn attack(
        &mut self,
        pitch: Pitch,
        duration: Seconds,
        velocity: Velocity01,
    ) -> Result<(), InstrumentError>;

    /// Release every sounding or pending note.
    fn release_all(&mut self);

    /// Output level. Instruments without a level control ignore it.
    fn set_volume(&mut self, _volume: Volume01) {}

    fn dispose(&mut self);
}

/// Deferred, asynchronous instrument construction (sample loading, opening
/// the output device). Called on the first play request.
pub trait InstrumentFactory: Send + Sync {
    type Instrument: Instrument;

    fn construct(&self) -> impl Future<Output = Result<Self::Instrument, InstrumentError>> + Send;
}

impl<T: Instrument + ?Sized> Instrument for Box<T> {
    fn attack(
        &mut self,
        pitch: Pitch,
        duration: Seconds,
        velocity: Velocity01,
    ) -> Result<(), InstrumentError> {
        (**self).attack(pitch, duration, velocity)
    }

    fn release_all(&mut self) {
        (**self).release_all()
    }

    fn set_volume(&mut self, volume: Volume01) {
        (**self).set_volume(volume)
    }

    fn dispose(&mut self) {
        (**self).dispose()
    }
}
