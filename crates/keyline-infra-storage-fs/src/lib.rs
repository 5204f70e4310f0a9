mod settings;
mod source;

pub use settings::FsStorage;
pub use source::FsSource;
