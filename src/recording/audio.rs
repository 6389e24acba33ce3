//! Host audio service built on cpal, hound and rodio.
//!
//! Capture runs on a cpal input stream whose callback appends PCM samples to a
//! shared buffer. Finalizing writes that buffer as a WAV file in the OS temp
//! directory; loading decodes the WAV back into memory, and playback feeds it
//! to a rodio sink from the first sample.

use anyhow::anyhow;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use hound::{WavReader, WavWriter};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::RecorderError;
use super::service::{AudioService, Permission, QualityPreset, SessionOptions};
use crate::config::AudioConfig;

#[cfg(target_os = "linux")]
use std::fs::OpenOptions;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

/// File name of the recording inside the OS temp directory.
pub const RECORDING_FILE_NAME: &str = "yarec-recording.wav";

/// Where finished recordings are written.
pub fn recording_path() -> PathBuf {
    std::env::temp_dir().join(RECORDING_FILE_NAME)
}

/// A live cpal capture stream.
pub struct CpalSession {
    /// Active input stream, capture stops when dropped
    stream: cpal::Stream,
    /// Captured PCM, already downmixed and decimated
    samples: Arc<Mutex<Vec<i16>>>,
    paused: Arc<AtomicBool>,
    sample_rate: u32,
    channels: u16,
    /// Target output location, fixed when the session is created
    target: PathBuf,
}

/// A recording decoded into memory.
pub struct CpalBuffer {
    id: u64,
    samples: Arc<[i16]>,
    sample_rate: u32,
    channels: u16,
}

impl CpalBuffer {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.channels as f32 / self.sample_rate as f32
    }
}

/// Opened lazily on the first play and kept for the lifetime of the service.
struct Output {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

/// [`AudioService`] backed by the system's default audio host.
pub struct CpalAudioService {
    /// Requested sample rate in Hz (the device rate wins)
    requested_sample_rate: u32,
    /// Device name, index or "default"
    device_name: String,
    options: SessionOptions,
    output: Option<Output>,
    sink: Option<Sink>,
    /// Buffer currently feeding the sink
    playing: Option<u64>,
    next_buffer_id: u64,
}

impl CpalAudioService {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            requested_sample_rate: config.sample_rate,
            device_name: config.device.clone(),
            options: SessionOptions::default(),
            output: None,
            sink: None,
            playing: None,
            next_buffer_id: 0,
        }
    }

    /// Blocks until the current playback finishes.
    pub fn wait_for_playback(&self) {
        if let Some(sink) = &self.sink {
            sink.sleep_until_end();
        }
    }

    fn resolve_device(&self) -> Result<cpal::Device, RecorderError> {
        suppress_alsa_warnings(|| {
            let host = cpal::default_host();
            if self.device_name == "default" {
                host.default_input_device()
                    .ok_or_else(|| anyhow!("No audio input device available"))
            } else {
                find_device_by_name(&host, &self.device_name)
            }
        })
        .map_err(|e| RecorderError::DeviceUnavailable(e.to_string()))
    }

    fn output_handle(&mut self) -> Result<OutputStreamHandle, RecorderError> {
        if let Some(output) = &self.output {
            return Ok(output.handle.clone());
        }
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| RecorderError::DeviceUnavailable(format!("no output device: {e}")))?;
        self.output = Some(Output {
            _stream: stream,
            handle: handle.clone(),
        });
        Ok(handle)
    }

    fn stop_playback(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.playing = None;
    }
}

impl AudioService for CpalAudioService {
    type Session = CpalSession;
    type Buffer = CpalBuffer;

    async fn request_microphone_permission(&mut self) -> Result<Permission, RecorderError> {
        let device = self.resolve_device()?;
        match device.default_input_config() {
            Ok(_) => Ok(Permission::Granted),
            Err(cpal::DefaultStreamConfigError::BackendSpecific { err })
                if is_permission_message(&err.description) =>
            {
                tracing::warn!("Input device refused access: {}", err.description);
                Ok(Permission::Denied)
            }
            Err(e) => Err(RecorderError::DeviceUnavailable(e.to_string())),
        }
    }

    async fn configure_session(&mut self, options: &SessionOptions) -> Result<(), RecorderError> {
        // Desktop hosts expose no session categories; the options are kept for
        // the controller and the log.
        tracing::debug!(
            "Audio session: background={}, duck_others={}, earpiece={}, exclusive={}",
            options.allow_background_capture,
            options.duck_other_audio,
            options.route_to_earpiece,
            options.exclusive_capture_during_recording
        );
        self.options = *options;
        Ok(())
    }

    async fn begin_capture(&mut self, preset: QualityPreset) -> Result<CpalSession, RecorderError> {
        let device = self.resolve_device()?;
        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown device".to_string());
        tracing::info!("Recording device: {}", device_name);

        let device_config = device
            .default_input_config()
            .map_err(|e| RecorderError::DeviceUnavailable(e.to_string()))?;
        let device_rate = device_config.sample_rate().0;
        let device_channels = device_config.channels();

        if device_rate != self.requested_sample_rate {
            tracing::warn!(
                "Requested sample rate {}Hz but device uses {}Hz. Recording at device rate.",
                self.requested_sample_rate,
                device_rate
            );
        }

        let layout = FrameLayout {
            device_channels: device_channels as usize,
            output_channels: preset.output_channels(device_channels) as usize,
            decimation: preset.decimation(device_rate) as usize,
        };
        tracing::debug!(
            "Device configuration: {}Hz, {} channels, format {:?}; writing {} channel(s) at {}Hz",
            device_rate,
            device_channels,
            device_config.sample_format(),
            layout.output_channels,
            device_rate / layout.decimation as u32
        );

        let samples = Arc::new(Mutex::new(Vec::new()));
        let paused = Arc::new(AtomicBool::new(false));
        let stream_config: cpal::StreamConfig = device_config.config();

        let stream = match device_config.sample_format() {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &stream_config, &samples, &paused, layout)
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &stream_config, &samples, &paused, layout)
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &stream_config, &samples, &paused, layout)
            }
            cpal::SampleFormat::I32 => {
                build_stream::<i32>(&device, &stream_config, &samples, &paused, layout)
            }
            other => {
                return Err(RecorderError::DeviceUnavailable(format!(
                    "unsupported sample format {other:?}"
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| RecorderError::DeviceUnavailable(e.to_string()))?;
        tracing::debug!("Audio stream started");

        Ok(CpalSession {
            stream,
            samples,
            paused,
            sample_rate: device_rate / layout.decimation as u32,
            channels: layout.output_channels as u16,
            target: recording_path(),
        })
    }

    fn pause(&mut self, session: &mut CpalSession) -> Result<(), RecorderError> {
        // Some backends cannot pause a stream; the flag alone drops incoming data.
        session.paused.store(true, Ordering::Release);
        if let Err(e) = session.stream.pause() {
            tracing::debug!("Stream pause not supported, dropping samples instead: {}", e);
        }
        Ok(())
    }

    fn resume(&mut self, session: &mut CpalSession) -> Result<(), RecorderError> {
        session
            .stream
            .play()
            .map_err(|e| RecorderError::DeviceUnavailable(e.to_string()))?;
        session.paused.store(false, Ordering::Release);
        Ok(())
    }

    async fn finalize(&mut self, session: CpalSession) -> Result<PathBuf, RecorderError> {
        let CpalSession {
            stream,
            samples,
            sample_rate,
            channels,
            target,
            ..
        } = session;
        drop(stream);

        let samples = samples
            .lock()
            .map(|mut samples| std::mem::take(&mut *samples))
            .map_err(|_| RecorderError::Storage("sample buffer poisoned".into()))?;

        if samples.is_empty() {
            tracing::warn!("Recording stopped with no samples captured");
        } else {
            tracing::info!(
                "Recording stopped: {:.2}s ({} samples at {}Hz, {} channel(s))",
                samples.len() as f32 / channels as f32 / sample_rate as f32,
                samples.len(),
                sample_rate,
                channels
            );
        }

        let path = target.clone();
        tokio::task::spawn_blocking(move || save_wav(&samples, sample_rate, channels, &path))
            .await
            .map_err(|e| RecorderError::Storage(format!("writer task failed: {e}")))??;

        if let Ok(metadata) = std::fs::metadata(&target) {
            tracing::debug!("WAV written: {} ({} bytes)", target.display(), metadata.len());
        }
        Ok(target)
    }

    async fn load_buffer(&mut self, location: &Path) -> Result<CpalBuffer, RecorderError> {
        let path = location.to_path_buf();
        let (samples, sample_rate, channels) =
            tokio::task::spawn_blocking(move || read_wav(&path))
                .await
                .map_err(|e| RecorderError::Storage(format!("reader task failed: {e}")))??;

        self.next_buffer_id += 1;
        let buffer = CpalBuffer {
            id: self.next_buffer_id,
            samples: samples.into(),
            sample_rate,
            channels,
        };
        tracing::debug!(
            "Loaded {} for playback ({:.2}s)",
            location.display(),
            buffer.duration_secs()
        );
        Ok(buffer)
    }

    fn play(&mut self, buffer: &CpalBuffer) -> Result<(), RecorderError> {
        self.stop_playback();
        let handle = self.output_handle()?;
        let sink = Sink::try_new(&handle)
            .map_err(|e| RecorderError::DeviceUnavailable(format!("playback failed: {e}")))?;
        sink.append(SamplesBuffer::new(
            buffer.channels,
            buffer.sample_rate,
            buffer.samples.to_vec(),
        ));
        sink.play();
        if self.options.route_to_earpiece {
            tracing::debug!("Earpiece routing requested; playing through the default output");
        }
        self.sink = Some(sink);
        self.playing = Some(buffer.id);
        Ok(())
    }

    fn release_session(&mut self, session: CpalSession) {
        tracing::debug!("Releasing capture session for {}", session.target.display());
        drop(session);
    }

    fn release_buffer(&mut self, buffer: CpalBuffer) {
        if self.playing == Some(buffer.id) {
            self.stop_playback();
        }
    }

    fn recent_samples(&self, session: &CpalSession, window: Duration) -> Vec<i16> {
        let Ok(samples) = session.samples.lock() else {
            return Vec::new();
        };
        let count = frames_in(window, session.sample_rate);
        // Meter on the first channel only.
        let channels = session.channels.max(1) as usize;
        let wanted = count.saturating_mul(channels);
        let start = samples.len().saturating_sub(wanted);
        samples[start..].iter().step_by(channels).copied().collect()
    }
}

/// Number of frames covering `window` at the stored sample rate.
fn frames_in(window: Duration, sample_rate: u32) -> usize {
    (sample_rate as u128 * window.as_millis() / 1000) as usize
}

/// How device frames are reduced before they are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameLayout {
    device_channels: usize,
    output_channels: usize,
    decimation: usize,
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    samples: &Arc<Mutex<Vec<i16>>>,
    paused: &Arc<AtomicBool>,
    layout: FrameLayout,
) -> Result<cpal::Stream, RecorderError>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let samples_arc = Arc::clone(samples);
    let pause_arc = Arc::clone(paused);
    let mut reducer = FrameReducer::new(layout);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if pause_arc.load(Ordering::Acquire) {
                    return;
                }
                let converted: Vec<i16> = data.iter().map(|&s| i16::from_sample(s)).collect();
                let frames = reducer.push(&converted);
                if let Ok(mut samples) = samples_arc.lock() {
                    samples.extend_from_slice(&frames);
                }
            },
            |err| {
                tracing::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| RecorderError::DeviceUnavailable(e.to_string()))
}

/// Reduces interleaved device frames to the stored layout.
///
/// Decimation groups can straddle two callback buffers, so frames that do not
/// fill a whole group are kept and prepended to the next buffer.
struct FrameReducer {
    layout: FrameLayout,
    pending: Vec<i16>,
}

impl FrameReducer {
    fn new(layout: FrameLayout) -> Self {
        Self {
            layout,
            pending: Vec::new(),
        }
    }

    fn push(&mut self, data: &[i16]) -> Vec<i16> {
        let output_channels = self.layout.output_channels.max(1);
        let decimation = self.layout.decimation.max(1);
        let mixed = downmix(data, self.layout.device_channels.max(1), output_channels);
        if decimation == 1 {
            return mixed;
        }

        self.pending.extend_from_slice(&mixed);
        let group_len = decimation * output_channels;
        let complete = self.pending.len() / group_len * group_len;
        let reduced = self.pending[..complete]
            .chunks_exact(group_len)
            .flat_map(|group| {
                (0..output_channels).map(move |channel| {
                    let sum: i32 = group
                        .iter()
                        .skip(channel)
                        .step_by(output_channels)
                        .map(|&s| s as i32)
                        .sum();
                    (sum / decimation as i32) as i16
                })
            })
            .collect();
        self.pending.drain(..complete);
        reduced
    }
}

/// Averages each device frame down to mono when the layouts differ.
fn downmix(data: &[i16], device_channels: usize, output_channels: usize) -> Vec<i16> {
    if device_channels == output_channels {
        return data.to_vec();
    }
    // Only mono output differs from the device layout.
    data.chunks_exact(device_channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / device_channels as i32) as i16
        })
        .collect()
}

fn save_wav(samples: &[i16], sample_rate: u32, channels: u16, path: &Path) -> Result<(), RecorderError> {
    let wav_spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let storage = |e: hound::Error| RecorderError::Storage(format!("{}: {e}", path.display()));
    let mut writer = WavWriter::create(path, wav_spec).map_err(storage)?;
    for &sample in samples {
        writer.write_sample(sample).map_err(storage)?;
    }
    writer.finalize().map_err(storage)?;
    Ok(())
}

fn read_wav(path: &Path) -> Result<(Vec<i16>, u32, u16), RecorderError> {
    let storage = |e: hound::Error| RecorderError::Storage(format!("{}: {e}", path.display()));
    let mut reader = WavReader::open(path).map_err(storage)?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(RecorderError::Storage(format!(
            "{}: expected 16-bit PCM, found {}-bit {:?}",
            path.display(),
            spec.bits_per_sample,
            spec.sample_format
        )));
    }
    let samples = reader
        .samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(storage)?;
    Ok((samples, spec.sample_rate, spec.channels))
}

/// Whether a backend error message describes an authorization refusal.
fn is_permission_message(message: &str) -> bool {
    let message = message.to_lowercase();
    ["permission", "denied", "not authorized", "not permitted"]
        .iter()
        .any(|needle| message.contains(needle))
}

/// Input devices that can report a name, paired with that name, in host order.
///
/// `yarec list-devices` numbers this same list, so its IDs select the device
/// it printed.
pub(crate) fn named_input_devices(
    host: &cpal::Host,
) -> anyhow::Result<Vec<(cpal::Device, String)>> {
    let devices = host
        .input_devices()
        .map_err(|e| anyhow!("Failed to enumerate audio devices: {e}"))?;
    Ok(with_names(devices, |device| device.name().ok()))
}

fn with_names<D>(
    devices: impl Iterator<Item = D>,
    name_of: impl Fn(&D) -> Option<String>,
) -> Vec<(D, String)> {
    devices
        .filter_map(|device| name_of(&device).map(|name| (device, name)))
        .collect()
}

/// Finds an audio input device by name or numeric index.
///
/// # Errors
/// - If no device with the specified name/index is found
fn find_device_by_name(host: &cpal::Host, device_spec: &str) -> anyhow::Result<cpal::Device> {
    select_device(named_input_devices(host)?, device_spec)
}

fn select_device<D>(devices: Vec<(D, String)>, device_spec: &str) -> anyhow::Result<D> {
    if let Ok(index) = device_spec.parse::<usize>() {
        let count = devices.len();
        return devices
            .into_iter()
            .nth(index)
            .map(|(device, _)| device)
            .ok_or_else(|| {
                anyhow!(
                    "Device index {} is out of range (0-{})",
                    index,
                    count.saturating_sub(1)
                )
            });
    }

    devices
        .into_iter()
        .find(|(_, name)| name == device_spec)
        .map(|(device, _)| device)
        .ok_or_else(|| {
            anyhow!(
                "Audio input device '{device_spec}' not found. Use 'yarec list-devices' to see available devices."
            )
        })
}

/// Temporarily redirects stderr to /dev/null to suppress ALSA library warnings on Linux.
#[cfg(target_os = "linux")]
pub(crate) fn suppress_alsa_warnings<F, T>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    let dev_null = OpenOptions::new()
        .write(true)
        .open("/dev/null")
        .map_err(|e| anyhow!("Failed to open /dev/null: {e}"))?;

    let dev_null_fd = dev_null.as_raw_fd();

    let old_stderr = unsafe { libc::dup(libc::STDERR_FILENO) };
    if old_stderr == -1 {
        return Err(anyhow!("Failed to duplicate stderr"));
    }

    let redirect_result = unsafe { libc::dup2(dev_null_fd, libc::STDERR_FILENO) };
    if redirect_result == -1 {
        unsafe { libc::close(old_stderr) };
        return Err(anyhow!("Failed to redirect stderr"));
    }

    let result = f();

    unsafe {
        libc::dup2(old_stderr, libc::STDERR_FILENO);
        libc::close(old_stderr);
    }

    result
}

/// On non-Linux platforms, no stderr suppression is needed since ALSA doesn't exist.
#[cfg(not(target_os = "linux"))]
pub(crate) fn suppress_alsa_warnings<F, T>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    f()
}
