//! CPAL output device that plays a transport.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig as CpalStreamConfig};

use crate::{TransportCoordinator, TransportError, TransportPlayer};

/// Block size the transport is prepared with.
///
/// CPAL does not report the period ahead of time; larger periods are
/// rendered in slices of this size.
const DEFAULT_BLOCK_SIZE: usize = 512;

/// Lists the names of the available output devices.
///
/// # Errors
///
/// Returns `BackendError` if the host cannot enumerate devices.
pub fn list_output_devices() -> Result<Vec<String>, TransportError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| TransportError::BackendError(e.to_string()))?;

    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Gets the name of the default output device, if any.
pub fn default_output_device_name() -> Option<String> {
    cpal::default_host()
        .default_output_device()
        .and_then(|d| d.name().ok())
}

/// Wrapper around a CPAL audio output device.
#[must_use]
pub struct OutputDevice {
    device: Device,
    block_size: usize,
}

impl OutputDevice {
    /// Opens the default output device.
    ///
    /// # Errors
    ///
    /// Returns `NoDefaultDevice` if no default output device is configured.
    pub fn open_default() -> Result<Self, TransportError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or(TransportError::NoDefaultDevice)?;

        Ok(Self {
            device,
            block_size: DEFAULT_BLOCK_SIZE,
        })
    }

    /// Opens a specific output device by name.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no device with the given name exists.
    pub fn open_by_name(name: &str) -> Result<Self, TransportError> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| TransportError::BackendError(e.to_string()))?;

        for device in devices {
            if device.name().is_ok_and(|device_name| device_name == name) {
                return Ok(Self {
                    device,
                    block_size: DEFAULT_BLOCK_SIZE,
                });
            }
        }

        Err(TransportError::DeviceNotFound {
            name: name.to_string(),
        })
    }

    /// Sets the block size the transport is prepared with.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// Returns the device name.
    pub fn name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "unknown".to_string())
    }

    /// Returns the device's native output format (sample rate, channels).
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the device cannot report a configuration.
    pub fn native_config(&self) -> Result<(u32, u16), TransportError> {
        let config = self
            .device
            .default_output_config()
            .map_err(|e| TransportError::BackendError(e.to_string()))?;
        Ok((config.sample_rate().0, config.channels()))
    }

    /// Prepares `transport` for this device and starts pulling from it.
    ///
    /// The returned [`PlaybackStream`] must be kept alive for playback to
    /// continue.
    ///
    /// # Errors
    ///
    /// Returns an error if the device format is unsupported or the stream
    /// cannot be built or started.
    pub fn start_playback(
        &self,
        transport: Arc<TransportCoordinator>,
    ) -> Result<PlaybackStream, TransportError> {
        let supported_config = self
            .device
            .default_output_config()
            .map_err(|e| TransportError::BackendError(e.to_string()))?;

        let sample_format = supported_config.sample_format();
        let cpal_config: CpalStreamConfig = supported_config.into();
        let channels = usize::from(cpal_config.channels);
        let sample_rate = f64::from(cpal_config.sample_rate.0);

        let mut player = TransportPlayer::new(Arc::clone(&transport));
        player.prepare(self.block_size, sample_rate, channels);

        let stream = release_on_error(
            &transport,
            self.build_stream(sample_format, &cpal_config, player),
        )?;

        tracing::info!(
            device = %self.name(),
            sample_rate,
            channels,
            block_size = self.block_size,
            "Playback started"
        );

        Ok(PlaybackStream {
            stream: Some(stream),
            transport,
        })
    }

    fn build_stream(
        &self,
        sample_format: SampleFormat,
        config: &CpalStreamConfig,
        player: TransportPlayer,
    ) -> Result<Stream, TransportError> {
        let stream = match sample_format {
            SampleFormat::F32 => self.build_f32_stream(config, player)?,
            SampleFormat::I16 => self.build_i16_stream(config, player)?,
            format => {
                return Err(TransportError::UnsupportedFormat {
                    format: format!("{format:?}"),
                });
            }
        };

        stream
            .play()
            .map_err(|e| TransportError::BackendError(e.to_string()))?;
        Ok(stream)
    }

    fn build_f32_stream(
        &self,
        config: &CpalStreamConfig,
        mut player: TransportPlayer,
    ) -> Result<Stream, TransportError> {
        self.device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    player.render_interleaved(data);
                },
                |err| {
                    tracing::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| TransportError::BackendError(e.to_string()))
    }

    fn build_i16_stream(
        &self,
        config: &CpalStreamConfig,
        mut player: TransportPlayer,
    ) -> Result<Stream, TransportError> {
        self.device
            .build_output_stream(
                config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    player.render_interleaved_i16(data);
                },
                |err| {
                    tracing::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| TransportError::BackendError(e.to_string()))
    }
}

/// Undoes `prepare_to_play` when the stream could not be started.
fn release_on_error<T>(
    transport: &TransportCoordinator,
    result: Result<T, TransportError>,
) -> Result<T, TransportError> {
    if let Err(e) = &result {
        tracing::warn!(error = %e, "Failed to start playback, releasing transport");
        transport.release_resources();
    }
    result
}

/// A running output stream pulling from a transport.
///
/// Playback continues while this struct is held. Dropping it stops the
/// CPAL stream first and then releases the transport's resources.
pub struct PlaybackStream {
    stream: Option<Stream>,
    transport: Arc<TransportCoordinator>,
}

impl PlaybackStream {
    /// Returns the transport being played.
    pub fn transport(&self) -> &Arc<TransportCoordinator> {
        &self.transport
    }
}

impl Drop for PlaybackStream {
    fn drop(&mut self) {
        drop(self.stream.take());
        self.transport.release_resources();
        tracing::debug!("Playback stream closed");
    }
}
