//! Scripted capture source for recognition loop tests

use super::{AudioFormat, AudioSource, AudioStream};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted read
#[derive(Debug, Clone)]
pub enum Frame {
    /// Deliver these bytes
    Data(Bytes),
    /// Empty frame, as after an overflow
    Overflow,
    /// Block for this long, then deliver an empty frame
    Stall(Duration),
    /// Fail the read
    Broken,
}

impl Frame {
    pub fn text(text: &str) -> Self {
        Frame::Data(Bytes::copy_from_slice(text.as_bytes()))
    }
}

#[derive(Debug, Default)]
pub struct Counters {
    pub opened: usize,
    pub reads: usize,
    pub closed: usize,
    pub terminated: usize,
}

/// Source whose single stream replays a frame script. Once the script runs
/// out every read idles for `idle` and returns an empty frame.
#[derive(Debug, Clone)]
pub struct ScriptedAudio {
    frames: Arc<Mutex<VecDeque<Frame>>>,
    counters: Arc<Mutex<Counters>>,
    idle: Duration,
    fail_open: bool,
}

impl ScriptedAudio {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: Arc::new(Mutex::new(frames.into_iter().collect())),
            counters: Arc::new(Mutex::new(Counters::default())),
            idle: Duration::from_millis(10),
            fail_open: false,
        }
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::new([])
        }
    }

    pub fn opened(&self) -> usize {
        self.counters.lock().unwrap().opened
    }

    pub fn reads(&self) -> usize {
        self.counters.lock().unwrap().reads
    }

    pub fn closed(&self) -> usize {
        self.counters.lock().unwrap().closed
    }

    pub fn terminated(&self) -> usize {
        self.counters.lock().unwrap().terminated
    }

    pub fn stream(&self) -> Box<dyn AudioStream> {
        Box::new(ScriptedStream {
            frames: self.frames.clone(),
            counters: self.counters.clone(),
            idle: self.idle,
        })
    }
}

#[async_trait]
impl AudioSource for ScriptedAudio {
    async fn open(&mut self, _format: &AudioFormat) -> Result<Box<dyn AudioStream>> {
        if self.fail_open {
            return Err(anyhow!("no input device available"));
        }
        self.counters.lock().unwrap().opened += 1;
        Ok(self.stream())
    }

    fn terminate(&mut self) {
        self.counters.lock().unwrap().terminated += 1;
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

struct ScriptedStream {
    frames: Arc<Mutex<VecDeque<Frame>>>,
    counters: Arc<Mutex<Counters>>,
    idle: Duration,
}

#[async_trait]
impl AudioStream for ScriptedStream {
    async fn read(&mut self, _frame_size: usize) -> Result<Bytes> {
        self.counters.lock().unwrap().reads += 1;
        let next = self.frames.lock().unwrap().pop_front();
        match next {
            Some(Frame::Data(bytes)) => Ok(bytes),
            Some(Frame::Overflow) => Ok(Bytes::new()),
            Some(Frame::Stall(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(Bytes::new())
            }
            Some(Frame::Broken) => Err(anyhow!("device unplugged")),
            None => {
                tokio::time::sleep(self.idle).await;
                Ok(Bytes::new())
            }
        }
    }

    async fn close(&mut self) {
        self.counters.lock().unwrap().closed += 1;
    }
}
