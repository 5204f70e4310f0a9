use clap::{crate_version, Args, Parser, Subcommand, ValueEnum};
use keyline_ports::playback::GapPolicy;
use keyline_ports::storage::PlayerSettings;
use keyline_ports::types::{DeviceId, Volume01};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(version = crate_version!(), about = "A MIDI file player.")]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub overrides: SettingsOverrides,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plays a MIDI file. While playing, type `p` to pause or resume, `r` to
    /// rewind, `l <file>` to load another file and `q` to quit.
    Play {
        /// Path or file:// URL of the MIDI file.
        file: String,
        /// Stay open after the end of the file instead of exiting.
        #[arg(short, long)]
        keep_open: bool,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Prints the tracks, note counts and duration of a MIDI file.
    Inspect {
        /// Path of the MIDI file.
        file: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum GapPolicyArg {
    CatchUp,
    FastForward,
}

/// One-run overrides of the stored player settings.
#[derive(Args, Debug)]
pub struct SettingsOverrides {
    /// SoundFont (.sf2) used for playback.
    #[arg(long, global = true)]
    pub soundfont: Option<String>,
    /// Output device id or name.
    #[arg(long, global = true)]
    pub device: Option<String>,
    /// Milliseconds between scheduler frames.
    #[arg(long, global = true)]
    pub frame_ms: Option<u64>,
    /// How to treat long stalls between frames.
    #[arg(long, value_enum, global = true)]
    pub gap_policy: Option<GapPolicyArg>,
    /// Longest stall that still catches up, for `--gap-policy fast-forward`.
    #[arg(long, default_value_t = 250.0, global = true)]
    pub max_gap_ms: f64,
    /// Master volume between 0 and 1.
    #[arg(long, global = true)]
    pub volume: Option<f32>,
    /// Store the resulting settings as the new defaults.
    #[arg(long, global = true)]
    pub save_settings: bool,
}

impl SettingsOverrides {
    pub fn apply(&self, settings: &mut PlayerSettings) {
        if let Some(path) = &self.soundfont {
            settings.soundfont_path = Some(path.clone());
        }
        if let Some(device) = &self.device {
            settings.selected_audio_out = Some(DeviceId(device.clone()));
        }
        if let Some(frame_ms) = self.frame_ms {
            settings.frame_interval_ms = frame_ms.max(1);
        }
        match self.gap_policy {
            Some(GapPolicyArg::CatchUp) => settings.gap_policy = GapPolicy::CatchUp,
            Some(GapPolicyArg::FastForward) => {
                settings.gap_policy = GapPolicy::FastForward {
                    max_gap_ms: self.max_gap_ms.max(0.0),
                }
            }
            None => {}
        }
        if let Some(volume) = self.volume {
            settings.master_volume = Volume01::new(volume);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_only_given_fields() {
        let cli = Cli::parse_from([
            "keyline",
            "play",
            "song.mid",
            "--gap-policy",
            "fast-forward",
            "--max-gap-ms",
            "100",
            "--volume",
            "2.0",
        ]);
        let mut settings = PlayerSettings::default();
        cli.overrides.apply(&mut settings);

        assert_eq!(
            settings.gap_policy,
            GapPolicy::FastForward { max_gap_ms: 100.0 }
        );
        assert_eq!(settings.master_volume.get(), 1.0);
        assert_eq!(settings.frame_interval_ms, 16);
        assert_eq!(settings.soundfont_path, None);
        assert!(matches!(
            cli.command,
            Commands::Play { ref file, keep_open: false } if file == "song.mid"
        ));
    }

    #[test]
    fn no_flags_keep_settings() {
        let cli = Cli::parse_from(["keyline", "devices"]);
        let mut settings = PlayerSettings::default();
        cli.overrides.apply(&mut settings);
        assert_eq!(settings.gap_policy, GapPolicy::CatchUp);
        assert_eq!(settings.selected_audio_out, None);
    }
}
