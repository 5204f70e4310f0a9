pub mod midi_import;
pub mod model;
pub mod stream;
pub mod tempo;

pub use midi_import::*;
pub use model::*;
pub use stream::*;
pub use tempo::*;
