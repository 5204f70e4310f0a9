use crate::transport::{TransportError, TransportPhase};
use keyline_ports::instrument::InstrumentError;
use keyline_ports::source::SourceError;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("failed to fetch MIDI source: {0}")]
    SourceFetch(String),
    #[error("failed to parse MIDI file: {0}")]
    Parse(String),
    #[error("failed to initialize instrument: {0}")]
    InstrumentInit(String),
    #[error("note trigger failed: {0}")]
    PlaybackFault(String),
    #[error("{command} is not allowed while {phase:?}")]
    Rejected {
        command: &'static str,
        phase: TransportPhase,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<SourceError> for PlaybackError {
    fn from(err: SourceError) -> Self {
        PlaybackError::SourceFetch(err.to_string())
    }
}

impl From<InstrumentError> for PlaybackError {
    fn from(err: InstrumentError) -> Self {
        PlaybackError::InstrumentInit(err.to_string())
    }
}
