use keyline_ports::source::{SourceError, SourcePort, SourceRef};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads MIDI sources from the local filesystem. Accepts plain paths and
/// `file://` URLs; relative paths resolve against `base_dir` when set.
#[derive(Clone, Debug, Default)]
pub struct FsSource {
    base_dir: Option<PathBuf>,
}

impl FsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    pub fn resolve(&self, source: &SourceRef) -> Result<PathBuf, SourceError> {
        let location = source.as_str().trim();
        if location.is_empty() {
            return Err(SourceError::NotFound("empty source".into()));
        }

        let path = if let Some(rest) = location.strip_prefix("file://") {
            // `file://localhost/x` and `file:///x` both name `/x`.
            let rest = rest.strip_prefix("localhost").unwrap_or(rest);
            PathBuf::from(percent_decode(rest))
        } else if let Some((scheme, _)) = location.split_once("://") {
            return Err(SourceError::Unsupported(format!("{scheme}:// sources")));
        } else {
            PathBuf::from(location)
        };

        Ok(match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        })
    }
}

impl SourcePort for FsSource {
    async fn fetch(&self, source: &SourceRef) -> Result<Vec<u8>, SourceError> {
        let path = self.resolve(source)?;
        debug!(path = %path.display(), "reading MIDI file");
        read(&path).await
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, SourceError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            Err(SourceError::NotFound(path.display().to_string()))
        }
        Err(err) => Err(SourceError::Io(format!("{}: {err}", path.display()))),
    }
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
