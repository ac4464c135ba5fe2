//! Dedicated writer task for outbound frames.
//!
//! The transport write half is not designed for multiple concurrent writers,
//! so all sends funnel through one task that owns it:
//!
//! ```text
//! request()  ─┐
//! dispatch   ─┼─► mpsc::Sender<Bytes> ─► Writer Task ─► Transport
//! send()     ─┘
//! ```
//!
//! The bounded channel doubles as backpressure: senders wait once the queue
//! fills. The task exits when every handle is dropped or a write fails, and
//! closes the transport on the way out.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ClientError, Result};
use crate::transport::TransportWriter;

/// Default outbound queue capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Handle for queueing frames onto the writer task.
///
/// Cheaply cloneable; every clone feeds the same queue.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
}

impl WriterHandle {
    /// Queue one frame for sending.
    ///
    /// Waits while the queue is full. Fails with
    /// [`ClientError::ConnectionClosed`] once the writer task has stopped.
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| ClientError::ConnectionClosed)
    }
}

/// Spawn the writer task owning the transport write half.
pub fn spawn_writer_task(
    writer: Box<dyn TransportWriter>,
    capacity: usize,
) -> (WriterHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

async fn writer_loop(mut rx: mpsc::Receiver<Bytes>, mut writer: Box<dyn TransportWriter>) {
    while let Some(frame) = rx.recv().await {
        if let Err(err) = writer.send(frame).await {
            tracing::error!("Write failed, stopping writer: {}", err);
            rx.close();
            break;
        }
    }
    if let Err(err) = writer.close().await {
        tracing::debug!("Transport close failed: {}", err);
    }
}
