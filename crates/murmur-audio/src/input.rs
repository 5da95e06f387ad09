use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use murmur_core::error::{MurmurError, Result};

/// Callback receiving mono f32 sample chunks from the input device.
/// Runs on the audio hardware's callback thread.
pub type ChunkFn = Box<dyn Fn(&[f32]) + Send + 'static>;

/// Microphone capability: open a device delivering sample chunks via
/// callback, close it again. Implementations own device selection and any
/// format conversion; callers always receive mono samples at the rate they
/// asked for.
pub trait AudioInput: Send + Sync {
    fn open(&self, sample_rate: u32, on_chunk: ChunkFn) -> Result<()>;
    fn close(&self) -> Result<()>;
}

/// Wrapper to make `cpal::Stream` storable inside a `Mutex`.
///
/// `cpal::Stream` carries a `*mut ()` marker that prevents auto `Send`/`Sync`
/// on some backends. The handle is only ever stored (to keep capture alive)
/// or dropped (to stop it).
struct SendStream(#[allow(dead_code)] cpal::Stream);

// SAFETY: SendStream wraps a cpal::Stream which manages its own audio thread.
// 1. The Stream handle is only used to keep capture alive and to drop it
// 2. Audio callbacks run on a separate OS thread managed by cpal
// 3. No mutable shared state between the Stream handle and callbacks
unsafe impl Send for SendStream {}
unsafe impl Sync for SendStream {}

/// Default-input-device microphone backed by cpal.
///
/// Opens the OS default input device with its preferred configuration and
/// converts in the callback: multi-channel frames are downmixed to mono and
/// linearly resampled to the requested rate, since many devices refuse
/// arbitrary formats.
pub struct CpalInput {
    active: AtomicBool,
    stream: Mutex<Option<SendStream>>,
}

impl CpalInput {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            stream: Mutex::new(None),
        }
    }
}

impl Default for CpalInput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioInput for CpalInput {
    fn open(&self, sample_rate: u32, on_chunk: ChunkFn) -> Result<()> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        if self.active.load(Ordering::Relaxed) {
            return Err(MurmurError::Capture("Audio input already open".into()));
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| MurmurError::Capture("No default input device found".into()))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        // Use the device's preferred config; arbitrary rates are often
        // rejected outright.
        let stream_config = match device.default_input_config() {
            Ok(supported) => {
                debug!(
                    device = %device_name,
                    sample_rate = supported.sample_rate().0,
                    channels = supported.channels(),
                    "Using device's default config"
                );
                cpal::StreamConfig {
                    channels: supported.channels(),
                    sample_rate: supported.sample_rate(),
                    buffer_size: cpal::BufferSize::Default,
                }
            }
            Err(e) => {
                debug!(error = %e, "Could not query default config, requesting target format");
                cpal::StreamConfig {
                    channels: 1,
                    sample_rate: cpal::SampleRate(sample_rate),
                    buffer_size: cpal::BufferSize::Default,
                }
            }
        };

        let device_rate = stream_config.sample_rate.0;
        let device_channels = stream_config.channels;
        let needs_conversion = device_rate != sample_rate || device_channels != 1;

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !needs_conversion {
                        on_chunk(data);
                        return;
                    }

                    let mono: Vec<f32> = if device_channels > 1 {
                        let ch = device_channels as usize;
                        data.chunks_exact(ch)
                            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
                            .collect()
                    } else {
                        data.to_vec()
                    };

                    let resampled = if device_rate != sample_rate {
                        let ratio = device_rate as f64 / sample_rate as f64;
                        let out_len = (mono.len() as f64 / ratio).ceil() as usize;
                        let mut out = Vec::with_capacity(out_len);
                        for i in 0..out_len {
                            let src = i as f64 * ratio;
                            let idx0 = src.floor() as usize;
                            let idx1 = (idx0 + 1).min(mono.len().saturating_sub(1));
                            let frac = (src - idx0 as f64) as f32;
                            out.push(mono[idx0] * (1.0 - frac) + mono[idx1] * frac);
                        }
                        out
                    } else {
                        mono
                    };

                    on_chunk(&resampled);
                },
                move |err| {
                    tracing::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| MurmurError::Capture(format!("Failed to build audio stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| MurmurError::Capture(format!("Failed to start audio stream: {}", e)))?;

        if let Ok(mut guard) = self.stream.lock() {
            *guard = Some(SendStream(stream));
        }
        self.active.store(true, Ordering::Relaxed);

        info!(
            device = %device_name,
            device_rate,
            device_channels,
            target_rate = sample_rate,
            "Audio input opened"
        );
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if !self.active.load(Ordering::Relaxed) {
            return Err(MurmurError::Capture("Audio input is not open".into()));
        }

        // Dropping the stream stops capture.
        if let Ok(mut guard) = self.stream.lock() {
            *guard = None;
        }
        self.active.store(false, Ordering::Relaxed);
        info!("Audio input closed");
        Ok(())
    }
}

/// In-memory input for tests: holds the chunk callback so tests can feed
/// samples as if the hardware produced them.
#[derive(Default)]
pub struct MockInput {
    callback: Mutex<Option<ChunkFn>>,
    open: Arc<AtomicBool>,
    fail_open: bool,
}

impl MockInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `open` fail, simulating a missing device.
    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    /// Deliver a chunk to the registered callback, as the device would.
    /// Chunks emitted after `close` go nowhere.
    pub fn emit(&self, chunk: &[f32]) {
        if let Some(cb) = self
            .callback
            .lock()
            .expect("mock mutex poisoned")
            .as_ref()
        {
            cb(chunk);
        }
    }
}

impl AudioInput for MockInput {
    fn open(&self, _sample_rate: u32, on_chunk: ChunkFn) -> Result<()> {
        if self.fail_open {
            return Err(MurmurError::Capture("No default input device found".into()));
        }
        *self.callback.lock().expect("mock mutex poisoned") = Some(on_chunk);
        self.open.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        *self.callback.lock().expect("mock mutex poisoned") = None;
        self.open.store(false, Ordering::Relaxed);
        Ok(())
    }
}
