use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use murmur_core::error::{MurmurError, Result};

use crate::input::AudioInput;
use crate::level::meter_level;

/// Callback receiving a normalized input level in `[0.0, 1.0]` per chunk.
pub type LevelFn = Arc<dyn Fn(f32) + Send + Sync + 'static>;

struct CaptureBuffer {
    capturing: bool,
    chunks: Vec<Vec<f32>>,
}

/// Accumulates microphone samples between a start and a stop call.
///
/// The chunk callback runs on the audio thread; it appends to a shared
/// buffer while capture is active and drops anything that arrives after
/// `stop` flipped the flag. `stop` is idempotent: a second call returns an
/// empty buffer without touching the device.
pub struct CaptureSession {
    input: Arc<dyn AudioInput>,
    sample_rate: u32,
    buffer: Arc<Mutex<CaptureBuffer>>,
    on_level: Option<LevelFn>,
}

impl CaptureSession {
    pub fn new(input: Arc<dyn AudioInput>, sample_rate: u32) -> Self {
        Self {
            input,
            sample_rate,
            buffer: Arc::new(Mutex::new(CaptureBuffer {
                capturing: false,
                chunks: Vec::new(),
            })),
            on_level: None,
        }
    }

    /// Register a callback fired with the meter level of every chunk.
    pub fn with_level_fn(mut self, f: impl Fn(f32) + Send + Sync + 'static) -> Self {
        self.on_level = Some(Arc::new(f));
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_capturing(&self) -> bool {
        self.buffer.lock().map(|b| b.capturing).unwrap_or(false)
    }

    /// Seconds of audio represented by `samples` at this session's rate.
    pub fn duration_secs(&self, samples: &[f32]) -> f64 {
        samples.len() as f64 / self.sample_rate as f64
    }

    /// Begin capturing. Clears any leftover samples from a previous run
    /// before opening the device.
    pub fn start(&self) -> Result<()> {
        {
            let mut buf = self
                .buffer
                .lock()
                .map_err(|e| MurmurError::Capture(format!("Capture mutex poisoned: {}", e)))?;
            if buf.capturing {
                return Err(MurmurError::Capture("Capture already in progress".into()));
            }
            buf.capturing = true;
            buf.chunks.clear();
        }

        let buffer = Arc::clone(&self.buffer);
        let on_level = self.on_level.clone();
        let opened = self.input.open(
            self.sample_rate,
            Box::new(move |chunk| {
                let mut buf = match buffer.lock() {
                    Ok(b) => b,
                    Err(_) => return,
                };
                if !buf.capturing {
                    debug!("Dropping chunk received after capture stopped");
                    return;
                }
                buf.chunks.push(chunk.to_vec());
                if let Some(level_fn) = &on_level {
                    level_fn(meter_level(chunk));
                }
            }),
        );

        if let Err(e) = opened {
            if let Ok(mut buf) = self.buffer.lock() {
                buf.capturing = false;
            }
            return Err(e);
        }

        info!(sample_rate = self.sample_rate, "Capture started");
        Ok(())
    }

    /// Stop capturing and return everything recorded since `start`, in
    /// arrival order. Returns an empty buffer when capture was not active.
    pub fn stop(&self) -> Result<Vec<f32>> {
        let (was_capturing, chunks) = {
            let mut buf = self
                .buffer
                .lock()
                .map_err(|e| MurmurError::Capture(format!("Capture mutex poisoned: {}", e)))?;
            let was = buf.capturing;
            buf.capturing = false;
            (was, std::mem::take(&mut buf.chunks))
        };

        if !was_capturing {
            return Ok(Vec::new());
        }

        self.input.close()?;

        let samples = chunks.concat();
        info!(
            samples = samples.len(),
            duration_secs = self.duration_secs(&samples),
            "Capture stopped"
        );
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::MockInput;

    fn session_with_mock() -> (CaptureSession, Arc<MockInput>) {
        let input = Arc::new(MockInput::new());
        let session = CaptureSession::new(Arc::clone(&input) as Arc<dyn AudioInput>, 16000);
        (session, input)
    }

    #[test]
    fn test_start_capture_stop_returns_samples_in_order() {
        let (session, input) = session_with_mock();

        session.start().unwrap();
        assert!(session.is_capturing());
        assert!(input.is_open());

        input.emit(&[0.1, 0.2]);
        input.emit(&[0.3, 0.4]);
        input.emit(&[0.5, 0.6]);

        let samples = session.stop().unwrap();
        assert_eq!(samples, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        assert!(!session.is_capturing());
        assert!(!input.is_open());
    }

    #[test]
    fn test_second_stop_returns_empty() {
        let (session, input) = session_with_mock();

        session.start().unwrap();
        input.emit(&[0.1]);
        let first = session.stop().unwrap();
        assert_eq!(first.len(), 1);

        let second = session.stop().unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_double_start_is_rejected() {
        let (session, input) = session_with_mock();

        session.start().unwrap();
        let result = session.start();
        assert!(matches!(result, Err(MurmurError::Capture(_))));

        // The first capture is still running.
        assert!(session.is_capturing());
        input.emit(&[0.7]);
        assert_eq!(session.stop().unwrap(), vec![0.7]);
    }

    #[test]
    fn test_failed_open_resets_capture_flag() {
        let input = Arc::new(MockInput::failing());
        let session = CaptureSession::new(Arc::clone(&input) as Arc<dyn AudioInput>, 16000);

        assert!(session.start().is_err());
        assert!(!session.is_capturing());

        // Nothing was captured, and stop does not try to close the device.
        assert!(session.stop().unwrap().is_empty());
    }

    #[test]
    fn test_restart_discards_previous_samples() {
        let (session, input) = session_with_mock();

        session.start().unwrap();
        input.emit(&[0.1, 0.2]);
        session.stop().unwrap();

        session.start().unwrap();
        input.emit(&[0.9]);
        let samples = session.stop().unwrap();
        assert_eq!(samples, vec![0.9]);
    }

    #[test]
    fn test_level_callback_fires_per_chunk() {
        let input = Arc::new(MockInput::new());
        let levels: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&levels);
        let session = CaptureSession::new(Arc::clone(&input) as Arc<dyn AudioInput>, 16000)
            .with_level_fn(move |level| sink.lock().unwrap().push(level));

        session.start().unwrap();
        input.emit(&[0.0, 0.0]);
        input.emit(&[0.5, -0.5]);
        session.stop().unwrap();

        let recorded = levels.lock().unwrap();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0], 0.0);
        assert!(recorded[1] > 0.0);
    }

    #[test]
    fn test_duration_secs() {
        let (session, _input) = session_with_mock();
        let one_second = vec![0.0f32; 16000];
        assert!((session.duration_secs(&one_second) - 1.0).abs() < 1e-9);
        assert_eq!(session.duration_secs(&[]), 0.0);
    }
}
