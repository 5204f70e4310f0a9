use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, FromSample, Sample, SampleFormat, SampleRate, SizedSample, StreamConfig,
    SupportedStreamConfigRange,
};
use keyline_ports::audio::{AudioError, AudioOutputPort, AudioRenderCallback, AudioStreamHandle};
use keyline_ports::types::{AudioConfig, AudioOutputDevice, DeviceId, SampleTime};
use std::sync::mpsc;
use std::thread;
use tracing::{debug, error};

const DEFAULT_RENDER_FRAMES: usize = 8192;

/// Output devices of the default cpal host. Streams live on a dedicated
/// thread because `cpal::Stream` is not `Send` on every platform.
pub struct CpalAudioOutputPort {
    host: cpal::Host,
}

struct SelectedStreamConfig {
    config: StreamConfig,
    sample_format: SampleFormat,
}

impl CpalAudioOutputPort {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    pub fn with_host(host: cpal::Host) -> Self {
        Self { host }
    }

    fn list_devices_from_host(
        host: &cpal::Host,
    ) -> Result<Vec<(DeviceId, cpal::Device)>, AudioError> {
        let host_id = format!("{:?}", host.id());
        let devices = host
            .output_devices()
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        Ok(devices
            .enumerate()
            .map(|(index, device)| {
                let name = device_name(&device);
                (device_id(&host_id, index, &name), device)
            })
            .collect())
    }

    fn describe(id: DeviceId, device: &cpal::Device) -> Option<AudioOutputDevice> {
        let default_config = device.default_output_config().ok()?;
        Some(AudioOutputDevice {
            id,
            name: device_name(device),
            default_config: AudioConfig {
                sample_rate_hz: default_config.sample_rate().0,
                channels: default_config.channels(),
                buffer_size_frames: None,
            },
        })
    }

    fn select_stream_config(
        device: &cpal::Device,
        desired: AudioConfig,
    ) -> Result<SelectedStreamConfig, AudioError> {
        let supported = device
            .supported_output_configs()
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        let chosen = select_supported_config(supported, desired)?;
        let sample_format = chosen.sample_format();
        let mut config = chosen.config();
        config.buffer_size = match desired.buffer_size_frames {
            Some(frames) => BufferSize::Fixed(frames),
            None => BufferSize::Default,
        };

        Ok(SelectedStreamConfig {
            config,
            sample_format,
        })
    }
}

impl Default for CpalAudioOutputPort {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CpalAudioStreamHandle {
    stop_tx: mpsc::Sender<()>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl AudioStreamHandle for CpalAudioStreamHandle {
    fn close(mut self: Box<Self>) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                error!("audio output thread panicked");
            }
        }
    }
}

impl AudioOutputPort for CpalAudioOutputPort {
    fn list_outputs(&self) -> Result<Vec<AudioOutputDevice>, AudioError> {
        let devices = Self::list_devices_from_host(&self.host)?;
        Ok(devices
            .into_iter()
            .filter_map(|(id, device)| Self::describe(id, &device))
            .collect())
    }

    fn default_output(&self) -> Result<AudioOutputDevice, AudioError> {
        let default = self
            .host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("no default output device".into()))?;
        let default_name = device_name(&default);

        let devices = Self::list_devices_from_host(&self.host)?;
        let (id, device) = devices
            .into_iter()
            .find(|(_, device)| device_name(device) == default_name)
            .ok_or_else(|| AudioError::DeviceNotFound(default_name.clone()))?;
        Self::describe(id, &device).ok_or(AudioError::DeviceUnavailable(default_name))
    }

    fn open_output(
        &self,
        device_id: &DeviceId,
        config: AudioConfig,
        cb: Box<dyn AudioRenderCallback>,
    ) -> Result<Box<dyn AudioStreamHandle>, AudioError> {
        let device_id = device_id.clone();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let join_handle = thread::Builder::new()
            .name("keyline-audio".into())
            .spawn(move || {
                let stream = match start_stream(&device_id, config, cb) {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                let _ = stop_rx.recv();
                debug!(device = %device_id, "stopping audio stream");
                drop(stream);
            })
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|e| AudioError::Backend(e.to_string()))??;

        Ok(Box::new(CpalAudioStreamHandle {
            stop_tx,
            join_handle: Some(join_handle),
        }))
    }
}

fn start_stream(
    device_id: &DeviceId,
    desired: AudioConfig,
    cb: Box<dyn AudioRenderCallback>,
) -> Result<cpal::Stream, AudioError> {
    let host = cpal::default_host();
    let device = CpalAudioOutputPort::list_devices_from_host(&host)?
        .into_iter()
        .find(|(id, _)| id == device_id)
        .map(|(_, device)| device)
        .ok_or_else(|| AudioError::DeviceNotFound(device_id.to_string()))?;

    let selected = CpalAudioOutputPort::select_stream_config(&device, desired)?;
    debug!(
        device = %device_id,
        format = ?selected.sample_format,
        channels = selected.config.channels,
        "opening audio stream"
    );

    let stream = match selected.sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &selected.config, cb),
        SampleFormat::I16 => build_stream::<i16>(&device, &selected.config, cb),
        SampleFormat::U16 => build_stream::<u16>(&device, &selected.config, cb),
        other => {
            return Err(AudioError::UnsupportedConfig(format!(
                "sample format {other:?}"
            )))
        }
    }
    .map_err(|e| AudioError::Backend(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::Backend(e.to_string()))?;
    Ok(stream)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut cb: Box<dyn AudioRenderCallback>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let initial_frames = match config.buffer_size {
        BufferSize::Fixed(frames) => frames as usize,
        BufferSize::Default => DEFAULT_RENDER_FRAMES,
    };
    let mut left = vec![0.0_f32; initial_frames];
    let mut right = vec![0.0_f32; initial_frames];
    let mut sample_time: SampleTime = 0;

    device.build_output_stream(
        config,
        move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
            let frames = if channels == 0 { 0 } else { data.len() / channels };
            if frames > left.len() {
                left.resize(frames, 0.0);
                right.resize(frames, 0.0);
            }
            cb.render(sample_time, &mut left[..frames], &mut right[..frames]);
            write_interleaved(data, channels, &left[..frames], &right[..frames]);
            sample_time = sample_time.saturating_add(frames as u64);
        },
        |err| error!("cpal stream error: {err}"),
        None,
    )
}

fn device_name(device: &cpal::Device) -> String {
    device
        .name()
        .unwrap_or_else(|_| "Unknown Output".to_string())
}

fn device_id(host_id: &str, index: usize, name: &str) -> DeviceId {
    DeviceId(format!("cpal:{host_id}:{index}:{name}"))
}

/// Prefer the requested channel count, then the richest sample format.
fn select_supported_config(
    supported: impl Iterator<Item = SupportedStreamConfigRange>,
    desired: AudioConfig,
) -> Result<cpal::SupportedStreamConfig, AudioError> {
    let mut best: Option<(i32, SupportedStreamConfigRange)> = None;

    for config_range in supported {
        let min = config_range.min_sample_rate().0;
        let max = config_range.max_sample_rate().0;
        if desired.sample_rate_hz < min || desired.sample_rate_hz > max {
            continue;
        }

        let format_score = match config_range.sample_format() {
            SampleFormat::F32 => 3,
            SampleFormat::I16 => 2,
            SampleFormat::U16 => 1,
            _ => continue,
        };
        let channel_score = if config_range.channels() == desired.channels {
            10
        } else if config_range.channels() >= 2 {
            5
        } else {
            0
        };
        let score = channel_score + format_score;

        if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
            best = Some((score, config_range));
        }
    }

    best.map(|(_, range)| range.with_sample_rate(SampleRate(desired.sample_rate_hz)))
        .ok_or_else(|| {
            AudioError::UnsupportedConfig(format!(
                "no output config at {} Hz",
                desired.sample_rate_hz
            ))
        })
}

/// Stereo into `channels`; mono devices get the average, extra channels
/// are silent.
fn write_interleaved<T>(data: &mut [T], channels: usize, left: &[f32], right: &[f32])
where
    T: Sample + FromSample<f32>,
{
    if channels == 0 {
        return;
    }
    for (frame, out) in data.chunks_mut(channels).enumerate() {
        let l = left.get(frame).copied().unwrap_or(0.0).clamp(-1.0, 1.0);
        let r = right.get(frame).copied().unwrap_or(0.0).clamp(-1.0, 1.0);
        match out {
            [mono] => *mono = T::from_sample((l + r) * 0.5),
            [out_l, out_r, rest @ ..] => {
                *out_l = T::from_sample(l);
                *out_r = T::from_sample(r);
                for sample in rest {
                    *sample = T::EQUILIBRIUM;
                }
            }
            [] => {}
        }
    }
}
