//! Sinks for streamed frames.

use std::io::Write;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::datasource::DatasourceError;
use crate::frame::Frame;

/// Where [`Datasource::run_stream`](crate::Datasource::run_stream) pushes
/// rendered frames.
#[async_trait]
pub trait StreamSender: Send + Sync {
    async fn send_frame(&self, frame: &Frame) -> Result<(), DatasourceError>;
}

/// Writes each frame as one JSON line.
pub struct JsonLinesSender<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSender<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: Write + Send> StreamSender for JsonLinesSender<W> {
    async fn send_frame(&self, frame: &Frame) -> Result<(), DatasourceError> {
        let line = frame.to_json()?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Keeps frames in memory for inspection.
pub struct InMemorySender {
    frames: Mutex<Vec<Frame>>,
}

impl InMemorySender {
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
        }
    }

    /// Take all stored frames, leaving the buffer empty.
    pub fn take_frames(&self) -> Vec<Frame> {
        std::mem::take(&mut *self.frames.lock())
    }

    pub fn count(&self) -> usize {
        self.frames.lock().len()
    }
}

impl Default for InMemorySender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamSender for InMemorySender {
    async fn send_frame(&self, frame: &Frame) -> Result<(), DatasourceError> {
        self.frames.lock().push(frame.clone());
        Ok(())
    }
}
