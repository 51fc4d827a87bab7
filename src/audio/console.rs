//! Console capture simulation
//!
//! Each line typed on stdin is delivered as one frame of UTF-8 text. Pairs
//! with the transcript speech engine for running without a microphone.

use super::{AudioFormat, AudioSource, AudioStream};
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::time::timeout;
use tracing::info;

pub struct ConsoleSource {
    read_timeout: Duration,
}

impl ConsoleSource {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

#[async_trait]
impl AudioSource for ConsoleSource {
    async fn open(&mut self, _format: &AudioFormat) -> Result<Box<dyn AudioStream>> {
        info!("[AUDIO] Reading commands from stdin, one per line");
        Ok(Box::new(ConsoleStream {
            lines: Some(BufReader::new(tokio::io::stdin()).lines()),
            read_timeout: self.read_timeout,
        }))
    }

    fn terminate(&mut self) {}

    fn name(&self) -> &'static str {
        "console"
    }
}

struct ConsoleStream {
    /// None once stdin hit EOF or the stream was closed
    lines: Option<Lines<BufReader<Stdin>>>,
    read_timeout: Duration,
}

#[async_trait]
impl AudioStream for ConsoleStream {
    async fn read(&mut self, _frame_size: usize) -> Result<Bytes> {
        let Some(lines) = self.lines.as_mut() else {
            tokio::time::sleep(self.read_timeout).await;
            return Ok(Bytes::new());
        };

        match timeout(self.read_timeout, lines.next_line()).await {
            Ok(Ok(Some(line))) => Ok(Bytes::from(line)),
            Ok(Ok(None)) => {
                info!("[AUDIO] stdin closed");
                self.lines = None;
                Ok(Bytes::new())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(Bytes::new()),
        }
    }

    async fn close(&mut self) {
        self.lines = None;
    }
}
