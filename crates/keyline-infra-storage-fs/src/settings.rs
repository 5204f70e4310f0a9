use keyline_ports::storage::{PlayerSettings, StorageError, StoragePort};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Player settings as pretty JSON under the user's config directory.
pub struct FsStorage {
    base_dir: PathBuf,
}

impl FsStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_base_dir() -> Result<PathBuf, StorageError> {
        let base = dirs_next::config_dir()
            .ok_or_else(|| StorageError::Io("config dir not found".to_string()))?;
        Ok(base.join("Keyline"))
    }

    pub fn settings_path(&self) -> PathBuf {
        self.base_dir.join("settings.json")
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
        let data = fs::read(path).map_err(|e| StorageError::Io(e.to_string()))?;
        serde_json::from_slice(&data).map_err(|e| StorageError::Serde(e.to_string()))
    }

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        let data =
            serde_json::to_vec_pretty(value).map_err(|e| StorageError::Serde(e.to_string()))?;
        fs::write(path, data).map_err(|e| StorageError::Io(e.to_string()))
    }
}

impl Default for FsStorage {
    fn default() -> Self {
        let base_dir = Self::default_base_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { base_dir }
    }
}

impl StoragePort for FsStorage {
    fn load_settings(&self) -> Result<PlayerSettings, StorageError> {
        let path = self.settings_path();
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(PlayerSettings::default());
        }
        Self::read_json(&path)
    }

    fn save_settings(&self, s: &PlayerSettings) -> Result<(), StorageError> {
        let path = self.settings_path();
        Self::write_json(&path, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyline_ports::playback::GapPolicy;
    use keyline_ports::types::DeviceId;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path().to_path_buf());
        let settings = storage.load_settings().unwrap();
        assert_eq!(settings.sample_rate_hz, 48_000);
        assert_eq!(settings.frame_interval_ms, 16);
    }

    #[test]
    fn saved_settings_are_loaded_back() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path().join("nested"));
        let settings = PlayerSettings {
            selected_audio_out: Some(DeviceId("cpal:Alsa:0:default".into())),
            soundfont_path: Some("/usr/share/sounds/sf2/piano.sf2".into()),
            gap_policy: GapPolicy::FastForward { max_gap_ms: 250.0 },
            ..PlayerSettings::default()
        };
        storage.save_settings(&settings).unwrap();

        let loaded = storage.load_settings().unwrap();
        assert_eq!(loaded.selected_audio_out, settings.selected_audio_out);
        assert_eq!(loaded.soundfont_path, settings.soundfont_path);
        assert_eq!(loaded.gap_policy, settings.gap_policy);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path().to_path_buf());
        fs::write(storage.settings_path(), br#"{ "release_seconds": 0.5 }"#).unwrap();

        let loaded = storage.load_settings().unwrap();
        assert_eq!(loaded.release_seconds, 0.5);
        assert_eq!(loaded.sample_rate_hz, 48_000);
        assert_eq!(loaded.gap_policy, GapPolicy::CatchUp);
    }

    #[test]
    fn corrupt_file_is_a_serde_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path().to_path_buf());
        fs::write(storage.settings_path(), b"{ not json").unwrap();
        assert!(matches!(
            storage.load_settings(),
            Err(StorageError::Serde(_))
        ));
    }
}
