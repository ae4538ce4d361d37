//! Speaker output sink
//!
//! Owns a cpal output stream whose real-time callback drains a shared
//! [`PlaybackEngine`] via [`PlaybackEngine::render`]. The stream lives
//! on a dedicated thread (cpal streams are not `Send`); stopping the
//! sink releases the device without touching the engine, so playback
//! can be rewired to another device mid-session.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

use crate::error::MediaError;
use crate::playback::PlaybackEngine;

/// Output device configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Number of output channels
    pub channels: u16,
    /// Device name (None for default output device)
    pub device_name: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            device_name: None,
        }
    }
}

enum SinkControl {
    Stop,
}

/// Speaker sink draining a [`PlaybackEngine`] at the hardware rate
pub struct PlaybackSink {
    control: Option<std::sync::mpsc::Sender<SinkControl>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl PlaybackSink {
    /// Acquire the output device and start draining the engine
    ///
    /// Acquisition failures are classified per [`MediaError`] kind, the
    /// same way capture acquisition is.
    pub fn start(engine: Arc<PlaybackEngine>, config: OutputConfig) -> Result<Self, MediaError> {
        let (control_tx, control_rx) = std::sync::mpsc::channel::<SinkControl>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), MediaError>>();

        let handle = thread::spawn(move || {
            let stream = match build_output_stream(&config, engine) {
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
                warn!("output stream failed to start: {e}");
                return;
            }
            // Block until stop; dropping the stream releases the device.
            let _ = control_rx.recv();
            drop(stream);
            debug!("output stream released");
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                control: Some(control_tx),
                thread: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(MediaError::Aborted),
        }
    }

    /// Release the output device
    ///
    /// Idempotent: safe when already stopped.
    pub fn stop(&mut self) {
        if let Some(control) = self.control.take() {
            let _ = control.send(SinkControl::Stop);
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PlaybackSink {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_output_stream(
    config: &OutputConfig,
    engine: Arc<PlaybackEngine>,
) -> Result<cpal::Stream, MediaError> {
    let host = cpal::default_host();
    let device = match &config.device_name {
        Some(name) => host
            .output_devices()
            .map_err(|e| MediaError::Unknown {
                reason: format!("failed to enumerate output devices: {e}"),
            })?
            .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
            .ok_or_else(|| MediaError::DeviceNotFound {
                device: name.clone(),
            })?,
        None => host
            .default_output_device()
            .ok_or_else(|| MediaError::DeviceNotFound {
                device: "default output device".to_string(),
            })?,
    };
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let stream_config = cpal::StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let supported = device
        .default_output_config()
        .map_err(|e| match e {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => MediaError::DeviceBusy {
                device: device_name.clone(),
            },
            other => MediaError::Unknown {
                reason: other.to_string(),
            },
        })?
        .sample_format();

    let err_fn = |err| warn!("output stream error: {err}");

    let stream = match supported {
        cpal::SampleFormat::F32 => device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| engine.render(data),
                err_fn,
                None,
            )
            .map_err(|e| MediaError::from_build_stream(e, &device_name))?,
        cpal::SampleFormat::I16 => {
            let mut scratch: Vec<f32> = Vec::new();
            device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        scratch.resize(data.len(), 0.0);
                        engine.render(&mut scratch);
                        for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                            *out = crate::pcm::f32_to_i16(*sample);
                        }
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| MediaError::from_build_stream(e, &device_name))?
        }
        other => {
            return Err(MediaError::ConfigurationNotSupported {
                reason: format!("unsupported output sample format: {other:?}"),
            })
        }
    };

    Ok(stream)
}
