//! Microphone capture through cpal
//!
//! The device is opened with its default input config. Samples are converted
//! to f32, downmixed to mono, resampled to the requested rate and handed out
//! as 16-bit little-endian frames.
//!
//! cpal streams are not `Send` on every platform, so each stream lives on a
//! dedicated capture thread that forwards sample chunks over a bounded
//! channel. A full channel means the reader fell behind; those chunks are
//! dropped rather than treated as an error.

use super::{AudioFormat, AudioSource, AudioStream};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Chunks buffered between the capture callback and the reader
const CHUNK_QUEUE: usize = 32;

type StopSignal = Arc<Mutex<Option<oneshot::Sender<()>>>>;

fn signal_stop(stop: &StopSignal) {
    if let Ok(mut guard) = stop.lock() {
        if let Some(tx) = guard.take() {
            let _ = tx.send(());
        }
    }
}

pub struct MicrophoneSource {
    read_timeout: Duration,
    /// Stop signals of streams opened from this source
    streams: Vec<StopSignal>,
}

impl MicrophoneSource {
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            read_timeout,
            streams: Vec::new(),
        }
    }
}

fn build_stream(format: &AudioFormat, chunk_tx: mpsc::Sender<Vec<i16>>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("no input device available"))?;

    info!(
        "[AUDIO] Using input device: {}",
        device.name().unwrap_or_else(|_| "unknown".to_string())
    );

    // the device's own config: cpal neither converts formats nor resamples
    let native = device
        .default_input_config()
        .map_err(|e| anyhow!("no default input config: {}", e))?;
    let conversion = Conversion {
        channels: native.channels(),
        native_rate: native.sample_rate().0,
        target_rate: format.sample_rate,
    };
    let config = cpal::StreamConfig {
        channels: native.channels(),
        sample_rate: native.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        "[AUDIO] Native input {:?} {}Hz x{}, delivering {}Hz mono",
        native.sample_format(),
        conversion.native_rate,
        conversion.channels,
        conversion.target_rate
    );
    if format.channels != 1 {
        warn!("[AUDIO] {} channels requested, capture is downmixed to mono", format.channels);
    }

    match native.sample_format() {
        SampleFormat::F32 => build_typed::<f32>(&device, &config, conversion, chunk_tx),
        SampleFormat::F64 => build_typed::<f64>(&device, &config, conversion, chunk_tx),
        SampleFormat::I16 => build_typed::<i16>(&device, &config, conversion, chunk_tx),
        SampleFormat::I32 => build_typed::<i32>(&device, &config, conversion, chunk_tx),
        SampleFormat::U8 => build_typed::<u8>(&device, &config, conversion, chunk_tx),
        SampleFormat::U16 => build_typed::<u16>(&device, &config, conversion, chunk_tx),
        other => bail!("unsupported input sample format {:?}", other),
    }
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    conversion: Conversion,
    chunk_tx: mpsc::Sender<Vec<i16>>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let samples: Vec<f32> = data.iter().map(|s| f32::from_sample(*s)).collect();
            // overflow: drop the chunk, the reader sees a gap
            if chunk_tx.try_send(conversion.apply(&samples)).is_err() {
                debug!("[AUDIO] Chunk queue full, dropping chunk");
            }
        },
        |err| error!("[AUDIO] Input stream error: {}", err),
        None,
    )?;

    Ok(stream)
}

/// Native interleaved capture to mono 16-bit at the target rate
#[derive(Debug, Clone, Copy)]
struct Conversion {
    channels: u16,
    native_rate: u32,
    target_rate: u32,
}

impl Conversion {
    fn apply(&self, interleaved: &[f32]) -> Vec<i16> {
        let mono = to_mono(interleaved, self.channels);
        resample(&mono, self.native_rate, self.target_rate)
            .into_iter()
            .map(to_i16)
            .collect()
    }
}

/// Average interleaved channels into one
fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = usize::from(channels.max(1));
    if ch == 1 {
        return data.to_vec();
    }
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear interpolation resampler, adequate for speech bandwidth
fn resample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() || dst_rate == 0 {
        return samples.to_vec();
    }

    let ratio = f64::from(src_rate) / f64::from(dst_rate);
    let out_len = (samples.len() as f64 / ratio) as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = (pos as usize).min(last);
            let frac = pos - idx as f64;
            if idx < last {
                (f64::from(samples[idx]) * (1.0 - frac) + f64::from(samples[idx + 1]) * frac) as f32
            } else {
                samples[idx]
            }
        })
        .collect()
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

#[async_trait]
impl AudioSource for MicrophoneSource {
    async fn open(&mut self, format: &AudioFormat) -> Result<Box<dyn AudioStream>> {
        let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<i16>>(CHUNK_QUEUE);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let format = *format;

        std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let stream = match build_stream(&format, chunk_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("{:#}", e)));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // park until the stream is closed or the source terminated
                let _ = stop_rx.blocking_recv();
                drop(stream);
                info!("[AUDIO] Capture stopped");
            })?;

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => bail!("failed to start capture: {}", reason),
            Err(_) => bail!("capture thread exited during startup"),
        }

        let stop: StopSignal = Arc::new(Mutex::new(Some(stop_tx)));
        self.streams.push(stop.clone());

        Ok(Box::new(MicrophoneStream {
            chunks: chunk_rx,
            pending: BytesMut::new(),
            read_timeout: self.read_timeout,
            stop,
        }))
    }

    fn terminate(&mut self) {
        for stop in self.streams.drain(..) {
            signal_stop(&stop);
        }
    }

    fn name(&self) -> &'static str {
        "microphone"
    }
}

struct MicrophoneStream {
    chunks: mpsc::Receiver<Vec<i16>>,
    /// Little-endian samples not yet handed out
    pending: BytesMut,
    read_timeout: Duration,
    stop: StopSignal,
}

#[async_trait]
impl AudioStream for MicrophoneStream {
    async fn read(&mut self, frame_size: usize) -> Result<Bytes> {
        let wanted = frame_size * 2;

        if self.pending.len() < wanted {
            match timeout(self.read_timeout, self.chunks.recv()).await {
                Ok(Some(chunk)) => {
                    self.pending.reserve(chunk.len() * 2);
                    for sample in chunk {
                        self.pending.put_i16_le(sample);
                    }
                }
                Ok(None) => bail!("capture stream ended"),
                Err(_) => {}
            }
        }

        if self.pending.len() >= wanted {
            Ok(self.pending.split_to(wanted).freeze())
        } else {
            Ok(Bytes::new())
        }
    }

    async fn close(&mut self) {
        signal_stop(&self.stop);
        self.chunks.close();
        if !self.pending.is_empty() {
            warn!("[AUDIO] Discarding {} buffered bytes", self.pending.len());
            self.pending.clear();
        }
    }
}
