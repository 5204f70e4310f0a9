pub mod audio_graph;
pub mod audio_params;
pub mod driver;
pub mod error;
pub mod frame;
pub mod instrument;
pub mod ipc;
pub mod scheduler;
pub mod session;
pub mod transport;

pub use audio_graph::*;
pub use audio_params::*;
pub use driver::*;
pub use error::*;
pub use frame::*;
pub use instrument::*;
pub use ipc::*;
pub use scheduler::*;
pub use session::*;
pub use transport::*;
