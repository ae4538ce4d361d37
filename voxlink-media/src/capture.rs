//! Microphone capture pipeline
//!
//! Acquires the microphone through cpal, chunks the callback data into
//! fixed-size frames and forwards them over a bounded channel. The
//! hardware callback never blocks: when the consumer falls behind,
//! frames are dropped. Pausing gates forwarding only; the hardware
//! stream keeps running so resuming never re-requests device access.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::error::MediaError;

/// Capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,
    /// Number of capture channels
    pub channels: u16,
    /// Samples per forwarded frame (per channel)
    pub frame_samples: usize,
    /// Device name (None for default input device)
    pub device_name: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            frame_samples: 320, // 20 ms at 16 kHz
            device_name: None,
        }
    }
}

/// One fixed-size frame of captured audio
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Interleaved f32 samples, exactly `frame_samples * channels` long
    pub samples: Vec<f32>,
}

/// Accumulates arbitrary-size callback buffers into fixed-size frames
#[derive(Debug)]
pub struct FrameChunker {
    frame_len: usize,
    pending: Vec<f32>,
}

impl FrameChunker {
    /// Create a chunker emitting frames of `frame_len` samples
    pub fn new(frame_len: usize) -> Self {
        Self {
            frame_len,
            pending: Vec::with_capacity(frame_len * 2),
        }
    }

    /// Feed input samples, invoking `emit` for every completed frame
    pub fn push(&mut self, input: &[f32], mut emit: impl FnMut(Vec<f32>)) {
        self.pending.extend_from_slice(input);
        while self.pending.len() >= self.frame_len {
            let frame: Vec<f32> = self.pending.drain(..self.frame_len).collect();
            emit(frame);
        }
    }

    /// Samples buffered but not yet emitted
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

enum CaptureControl {
    Stop,
}

/// Microphone capture pipeline
pub struct CapturePipeline {
    paused: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    level_tx: watch::Sender<f32>,
    control: Option<std::sync::mpsc::Sender<CaptureControl>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl CapturePipeline {
    /// Create an idle pipeline
    pub fn new() -> Self {
        let (level_tx, _) = watch::channel(0.0);
        Self {
            paused: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            level_tx,
            control: None,
            thread: None,
        }
    }

    /// Acquire the microphone and start forwarding frames
    ///
    /// The cpal stream is owned by a dedicated thread (cpal streams are
    /// not `Send`); the returned receiver yields frames while capture is
    /// not paused. Acquisition failures are classified per
    /// [`MediaError`] kind.
    pub fn start(
        &mut self,
        config: CaptureConfig,
    ) -> Result<mpsc::Receiver<CapturedFrame>, MediaError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(MediaError::StreamError {
                reason: "already capturing".to_string(),
            });
        }

        let (frames_tx, frames_rx) = mpsc::channel::<CapturedFrame>(32);
        let (control_tx, control_rx) = std::sync::mpsc::channel::<CaptureControl>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), MediaError>>();

        let paused = self.paused.clone();
        let running = self.running.clone();
        let level_tx = self.level_tx.clone();

        let handle = thread::spawn(move || {
            let stream = match build_input_stream(&config, paused, level_tx, frames_tx) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                warn!("capture stream failed to start: {e}");
                return;
            }
            // Block until stop; dropping the stream releases the device.
            let _ = control_rx.recv();
            drop(stream);
            debug!("capture stream released");
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.running.store(true, Ordering::SeqCst);
                self.control = Some(control_tx);
                self.thread = Some(handle);
                Ok(frames_rx)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(MediaError::Aborted),
        }
    }

    /// Gate frame forwarding without stopping the hardware stream
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Resume frame forwarding
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Whether forwarding is currently gated
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Whether the hardware stream is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Live input level (0.0 to 1.0), updated regardless of pause
    ///
    /// Intended for local visualization and voice-activity analysis;
    /// pausing forwarding does not silence this signal.
    pub fn level_receiver(&self) -> watch::Receiver<f32> {
        self.level_tx.subscribe()
    }

    /// Release all hardware resources
    ///
    /// Idempotent: safe when never started or already stopped.
    pub fn stop(&mut self) {
        if let Some(control) = self.control.take() {
            let _ = control.send(CaptureControl::Stop);
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        self.running.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
    }
}

impl Default for CapturePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_input_stream(
    config: &CaptureConfig,
    paused: Arc<AtomicBool>,
    level_tx: watch::Sender<f32>,
    frames_tx: mpsc::Sender<CapturedFrame>,
) -> Result<cpal::Stream, MediaError> {
    let host = cpal::default_host();
    let device = match &config.device_name {
        Some(name) => host
            .input_devices()
            .map_err(|e| MediaError::Unknown {
                reason: format!("failed to enumerate input devices: {e}"),
            })?
            .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
            .ok_or_else(|| MediaError::DeviceNotFound {
                device: name.clone(),
            })?,
        None => host
            .default_input_device()
            .ok_or_else(|| MediaError::DeviceNotFound {
                device: "default input device".to_string(),
            })?,
    };
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let stream_config = cpal::StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let supported = device
        .default_input_config()
        .map_err(|e| match e {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => MediaError::DeviceBusy {
                device: device_name.clone(),
            },
            other => MediaError::Unknown {
                reason: other.to_string(),
            },
        })?
        .sample_format();

    let frame_len = config.frame_samples * config.channels as usize;
    let mut chunker = FrameChunker::new(frame_len);
    let err_fn = |err| warn!("capture stream error: {err}");

    let mut forward = move |data: &[f32]| {
        // Level is published even while paused so local visualization
        // keeps working.
        let rms = (data.iter().map(|s| s * s).sum::<f32>() / data.len().max(1) as f32).sqrt();
        let _ = level_tx.send(rms);

        if paused.load(Ordering::Relaxed) {
            return;
        }
        chunker.push(data, |samples| {
            // Never block the hardware callback; drop on backpressure.
            let _ = frames_tx.try_send(CapturedFrame { samples });
        });
    };

    let stream = match supported {
        cpal::SampleFormat::F32 => device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| forward(data),
                err_fn,
                None,
            )
            .map_err(|e| MediaError::from_build_stream(e, &device_name))?,
        cpal::SampleFormat::I16 => {
            device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let converted: Vec<f32> =
                            data.iter().map(|&s| crate::pcm::i16_to_f32(s)).collect();
                        forward(&converted);
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| MediaError::from_build_stream(e, &device_name))?
        }
        other => {
            return Err(MediaError::ConfigurationNotSupported {
                reason: format!("unsupported input sample format: {other:?}"),
            })
        }
    };

    Ok(stream)
}
