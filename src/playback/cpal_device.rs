//! Hardware output through cpal.
//!
//! Each voice runs one cpal output stream for its whole life. The stream is
//! built and owned by a small thread so the voice itself stays `Send + Sync`
//! on every platform; transport calls only flip the state of the shared
//! [`VoiceQueue`] that the stream callback renders from.
//!
//! The stream uses the device's default sample format. The queue always
//! renders f32, which the callback converts on the way out.

use super::{
    devices::{DeviceEventKind, EventSink},
    error::{PlaybackError, PlaybackResult},
    traits::{
        AudioBackend, BufferHandle, DeviceInfo, HardwareFormat, PlaybackDevice, PlaybackState,
        VoiceControls,
    },
    voice_queue::VoiceQueue,
};
use cpal::Sample;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Backend over the host's default cpal audio API.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub const fn new() -> Self {
        Self
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn devices(&self) -> PlaybackResult<Vec<DeviceInfo>> {
        let host = cpal::default_host();
        let default_name = host
            .default_output_device()
            .and_then(|device| device.name().ok());

        let mut devices = Vec::new();
        for device in host.output_devices()? {
            let name = device.name()?;
            let is_default = default_name.as_deref() == Some(name.as_str());
            devices.push(DeviceInfo { name, is_default });
        }
        Ok(devices)
    }

    fn open_voice(
        &self,
        device: Option<&str>,
        events: EventSink,
    ) -> PlaybackResult<Arc<dyn PlaybackDevice>> {
        Ok(Arc::new(CpalDevice::open(device, events)?))
    }
}

fn find_device(name: Option<&str>) -> PlaybackResult<cpal::Device> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_output_device()
            .ok_or_else(|| PlaybackError::device_not_found("default output device")),
        Some(wanted) => {
            for device in host.output_devices()? {
                if device.name()? == wanted {
                    return Ok(device);
                }
            }
            Err(PlaybackError::device_not_found(wanted))
        }
    }
}

/// A voice playing through a cpal output stream.
pub struct CpalDevice {
    queue: Arc<Mutex<VoiceQueue>>,
    shutdown: Sender<()>,
    output_thread: Option<JoinHandle<()>>,
}

impl CpalDevice {
    /// Open an output stream on `device` (`None` for the host default).
    pub fn open(device: Option<&str>, events: EventSink) -> PlaybackResult<Self> {
        let queue = Arc::new(Mutex::new(VoiceQueue::new(events.clone())));
        let (shutdown, shutdown_rx) = channel::bounded::<()>(1);
        let (ready_tx, ready_rx) = channel::bounded::<PlaybackResult<String>>(1);

        let device_name = device.map(str::to_string);
        let callback_queue = Arc::clone(&queue);
        let output_thread = std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let stream = match build_stream(device_name.as_deref(), callback_queue, events) {
                    Ok((stream, name)) => {
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                // Blocks until the voice is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
            })
            .map_err(|e| PlaybackError::resource("output thread", e.to_string()))?;

        let name = ready_rx
            .recv()
            .map_err(|_| PlaybackError::backend("cpal", "output thread exited during setup"))??;
        tracing::debug!("cpal output stream running on '{}'", name);

        Ok(Self {
            queue,
            shutdown,
            output_thread: Some(output_thread),
        })
    }
}

fn build_stream(
    device_name: Option<&str>,
    queue: Arc<Mutex<VoiceQueue>>,
    events: EventSink,
) -> PlaybackResult<(cpal::Stream, String)> {
    let device = find_device(device_name)?;
    let name = device.name()?;
    let supported = device.default_output_config()?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.config();

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_typed::<f32>(&device, &config, queue, events)?,
        cpal::SampleFormat::F64 => build_typed::<f64>(&device, &config, queue, events)?,
        cpal::SampleFormat::I16 => build_typed::<i16>(&device, &config, queue, events)?,
        cpal::SampleFormat::I32 => build_typed::<i32>(&device, &config, queue, events)?,
        cpal::SampleFormat::U16 => build_typed::<u16>(&device, &config, queue, events)?,
        other => {
            return Err(PlaybackError::backend(
                "cpal",
                format!("unsupported output sample format {other:?} on '{name}'"),
            ));
        }
    };
    tracing::debug!("cpal output format: {:?}, {:?}", sample_format, config);
    stream.play()?;
    Ok((stream, name))
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: Arc<Mutex<VoiceQueue>>,
    events: EventSink,
) -> PlaybackResult<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let out_channels = config.channels as usize;
    let out_rate = config.sample_rate.0;
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            // Grows to the largest callback size once
            scratch.resize(data.len(), 0.0);
            queue.lock().render(&mut scratch, out_channels, out_rate);
            convert_samples(&scratch, data);
        },
        move |err| {
            tracing::warn!("cpal stream error: {}", err);
            events.emit(DeviceEventKind::Error {
                details: err.to_string(),
            });
        },
        None,
    )?;
    Ok(stream)
}

/// Convert rendered f32 output to the device's sample type.
fn convert_samples<T>(rendered: &[f32], out: &mut [T])
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    for (out, &sample) in out.iter_mut().zip(rendered) {
        *out = T::from_sample(sample);
    }
}

impl PlaybackDevice for CpalDevice {
    fn create_buffers(&self, count: usize) -> PlaybackResult<Vec<BufferHandle>> {
        Ok(self.queue.lock().create_buffers(count))
    }

    fn queue(
        &self,
        buffer: BufferHandle,
        samples: &[i16],
        format: HardwareFormat,
        sample_rate: u32,
    ) -> PlaybackResult<()> {
        self.queue
            .lock()
            .queue(buffer, samples, format, sample_rate)
    }

    fn unqueue_finished(&self) -> PlaybackResult<Vec<BufferHandle>> {
        Ok(self.queue.lock().unqueue_finished())
    }

    fn unqueue_all(&self) -> PlaybackResult<Vec<BufferHandle>> {
        Ok(self.queue.lock().unqueue_all())
    }

    fn release_buffers(&self, buffers: &[BufferHandle]) -> PlaybackResult<()> {
        self.queue.lock().release(buffers)
    }

    fn play(&self) -> PlaybackResult<()> {
        self.queue.lock().play();
        Ok(())
    }

    fn pause(&self) -> PlaybackResult<()> {
        self.queue.lock().pause();
        Ok(())
    }

    fn stop(&self) -> PlaybackResult<()> {
        self.queue.lock().stop();
        Ok(())
    }

    fn status(&self) -> PlaybackState {
        self.queue.lock().status()
    }

    fn elapsed_in_current_buffer(&self) -> Duration {
        self.queue.lock().elapsed_in_current_buffer()
    }

    fn set_controls(&self, controls: VoiceControls) -> PlaybackResult<()> {
        self.queue.lock().set_controls(controls);
        Ok(())
    }

    fn controls(&self) -> VoiceControls {
        self.queue.lock().controls()
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.output_thread.take() {
            if handle.join().is_err() {
                tracing::warn!("cpal output thread panicked");
            }
        }
    }
}
