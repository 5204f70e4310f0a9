pub mod audio;
pub mod instrument;
pub mod playback;
pub mod source;
pub mod storage;
pub mod synth;
pub mod types;

pub use audio::*;
pub use instrument::*;
pub use playback::*;
pub use source::*;
pub use storage::*;
pub use synth::*;
pub use types::*;
