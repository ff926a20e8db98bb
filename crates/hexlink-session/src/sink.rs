//! Raw-byte sink: every byte read from the link, in order, handed to a
//! consumer through a bounded queue.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::error::{Result, SessionError};

/// Producer half of the raw-byte queue.
///
/// Pushes block while the queue is full. Once the consumer hangs up the sink
/// detaches itself and further pushes are dropped.
#[derive(Debug, Clone)]
pub struct RawSink {
    tx: Option<SyncSender<Vec<u8>>>,
}

impl RawSink {
    /// Queue a chunk. Returns `false` once the consumer is gone.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        if tx.send(chunk.to_vec()).is_err() {
            warn!("raw byte consumer went away; detaching sink");
            self.tx = None;
            return false;
        }
        true
    }

    pub fn is_attached(&self) -> bool {
        self.tx.is_some()
    }
}

/// A bounded raw-byte queue.
pub fn raw_channel(capacity: usize) -> (RawSink, Receiver<Vec<u8>>) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (RawSink { tx: Some(tx) }, rx)
}

/// Appends raw link bytes to a file on a background thread.
///
/// The thread exits when every [`RawSink`] feeding it has been dropped.
pub struct RawLogWriter {
    handle: Option<JoinHandle<std::io::Result<u64>>>,
}

impl RawLogWriter {
    /// Open `path` for appending and start the writer thread.
    pub fn create(path: impl AsRef<Path>, capacity: usize) -> Result<(RawSink, RawLogWriter)> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(SessionError::RawLog)?;
        debug!(?path, "raw log opened");

        let (sink, rx) = raw_channel(capacity);
        let handle = std::thread::Builder::new()
            .name("hexlink-raw-log".into())
            .spawn(move || write_all_chunks(file, rx))
            .map_err(SessionError::Spawn)?;

        Ok((
            sink,
            RawLogWriter {
                handle: Some(handle),
            },
        ))
    }

    /// Wait for the writer to drain and return the number of bytes written.
    pub fn finish(mut self) -> std::io::Result<u64> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("raw log writer panicked"))),
            None => Ok(0),
        }
    }
}

fn write_all_chunks(file: File, rx: Receiver<Vec<u8>>) -> std::io::Result<u64> {
    let mut out = BufWriter::new(file);
    let mut total = 0u64;
    while let Ok(chunk) = rx.recv() {
        out.write_all(&chunk)?;
        total += chunk.len() as u64;
        // Drain what is already queued before paying for a flush.
        while let Ok(chunk) = rx.try_recv() {
            out.write_all(&chunk)?;
            total += chunk.len() as u64;
        }
        out.flush()?;
    }
    out.flush()?;
    Ok(total)
}
