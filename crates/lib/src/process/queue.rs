//! Per-stream output queues fed by background reader tasks.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::consts::CHUNK_SIZE;
use crate::sink::OutputKind;

/// Chunks read from one output stream of a child process.
///
/// The queue is filled by a reader task that runs independently of the
/// consumer. Consumers either await chunks one at a time with
/// [`recv`](Self::recv) or take everything buffered so far with
/// [`drain`](Self::drain).
#[derive(Debug)]
pub struct OutputQueue {
  kind: OutputKind,
  rx: UnboundedReceiver<Vec<u8>>,
  closed: bool,
}

impl OutputQueue {
  /// Start a reader task for `stream` and return the queue it feeds.
  pub(crate) fn spawn<S>(kind: OutputKind, stream: S) -> (Self, JoinHandle<()>)
  where
    S: AsyncRead + Unpin + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(read_chunks(kind, stream, tx));
    (Self { kind, rx, closed: false }, handle)
  }

  /// The stream this queue carries.
  pub fn kind(&self) -> OutputKind {
    self.kind
  }

  /// Wait for the next chunk. Returns `None` once the stream has ended and
  /// every chunk has been consumed.
  pub async fn recv(&mut self) -> Option<Vec<u8>> {
    if self.closed {
      return None;
    }
    let chunk = self.rx.recv().await;
    if chunk.is_none() {
      self.closed = true;
    }
    chunk
  }

  /// Take everything currently queued without waiting for more data.
  pub fn drain(&mut self) -> Vec<u8> {
    let mut out = Vec::new();
    if self.closed {
      return out;
    }
    loop {
      match self.rx.try_recv() {
        Ok(chunk) => out.extend_from_slice(&chunk),
        Err(TryRecvError::Empty) => break,
        Err(TryRecvError::Disconnected) => {
          self.closed = true;
          break;
        }
      }
    }
    out
  }

  /// True once the reader has finished and the queue has been emptied.
  pub fn is_closed(&self) -> bool {
    self.closed
  }
}

async fn read_chunks<S>(kind: OutputKind, mut stream: S, tx: UnboundedSender<Vec<u8>>)
where
  S: AsyncRead + Unpin,
{
  let mut buf = vec![0u8; CHUNK_SIZE];
  loop {
    match stream.read(&mut buf).await {
      Ok(0) => break,
      Ok(n) => {
        trace!(stream = %kind, bytes = n, "chunk read");
        if tx.send(buf[..n].to_vec()).is_err() {
          // Consumer is gone; nobody will read the rest.
          break;
        }
      }
      Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
      Err(e) => {
        warn!(stream = %kind, error = %e, "failed to read child output");
        break;
      }
    }
  }
  trace!(stream = %kind, "stream closed");
}
