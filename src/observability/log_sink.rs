//! Buffered, non-blocking log file writer with time-based rolling.
//!
//! # Responsibilities
//! - Accept log lines from any task without blocking on disk I/O
//! - Drop lines instead of applying backpressure when asked to
//! - Roll the live file to `<path>.<YYYY-MM-DD>` on a fixed interval
//!
//! # Design Decisions
//! - A bounded mpsc channel decouples callers from the single writer task
//! - Roll requests travel through the same channel, so they are ordered
//!   with respect to the lines printed before them
//! - Closing drops the only sender; the writer drains what is queued, flushes
//!   and exits

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::LogSinkConfig;
use crate::observability::metrics;

enum Entry {
    Line(Bytes),
    Roll,
}

pub struct LogSink {
    path: PathBuf,
    sender: RwLock<Option<mpsc::Sender<Entry>>>,
    writer: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    dropped: AtomicU64,
}

impl LogSink {
    /// Open the sink described by `config`.
    pub async fn from_config(config: &LogSinkConfig) -> io::Result<Self> {
        Self::open(&config.path, config.buffer_size, config.roll_interval()).await
    }

    /// Open (or create) `path` and start the writer task.
    ///
    /// Must be called from inside a Tokio runtime.
    pub async fn open(
        path: impl AsRef<Path>,
        buffer_size: usize,
        roll_interval: Duration,
    ) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_live(&path).await?;
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        let writer = tokio::spawn(write_loop(path.clone(), file, rx, roll_interval));

        tracing::debug!(path = %path.display(), buffer_size, "Log sink opened");
        Ok(Self {
            path,
            sender: RwLock::new(Some(tx)),
            writer: tokio::sync::Mutex::new(Some(writer)),
            dropped: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines dropped because the buffer was full or the sink closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn sender(&self) -> Option<mpsc::Sender<Entry>> {
        self.sender.read().clone()
    }

    fn drop_line(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::record_log_dropped();
    }

    /// Queue one line. Returns `true` if it was accepted.
    ///
    /// With `discard` set this never waits: a full buffer drops the line.
    /// Otherwise the call waits for buffer space. Empty lines are ignored.
    pub async fn print(&self, buf: impl Into<Bytes>, discard: bool) -> bool {
        let buf = buf.into();
        if buf.is_empty() {
            return true;
        }

        let Some(sender) = self.sender() else {
            if discard {
                self.drop_line();
            }
            return false;
        };

        if discard {
            match sender.try_send(Entry::Line(buf)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                    self.drop_line();
                    false
                }
            }
        } else {
            sender.send(Entry::Line(buf)).await.is_ok()
        }
    }

    /// Roll the live file now, after every line queued so far.
    pub async fn roll(&self) -> bool {
        match self.sender() {
            Some(sender) => sender.send(Entry::Roll).await.is_ok(),
            None => false,
        }
    }

    /// Flush queued lines and stop the writer. Idempotent.
    pub async fn close(&self) {
        self.sender.write().take();
        if let Some(writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.await {
                tracing::error!(path = %self.path.display(), error = %e, "Log writer task failed");
            }
        }
    }
}

async fn open_live(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && fs::metadata(parent).await.is_err() {
            fs::create_dir_all(parent).await?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path).await
}

fn rolled_path(path: &Path) -> PathBuf {
    let date = chrono::Local::now().format("%Y-%m-%d");
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{date}"));
    PathBuf::from(name)
}

/// Move the live file's contents to today's rolled file and reopen it empty.
async fn roll_file(path: &Path, mut file: BufWriter<File>) -> io::Result<BufWriter<File>> {
    file.flush().await?;
    drop(file);

    let target = rolled_path(path);
    if fs::metadata(&target).await.is_ok() {
        let mut contents = Vec::new();
        File::open(path).await?.read_to_end(&mut contents).await?;
        let mut rolled = OpenOptions::new().append(true).open(&target).await?;
        rolled.write_all(&contents).await?;
        rolled.flush().await?;
        fs::remove_file(path).await?;
    } else {
        fs::rename(path, &target).await?;
    }

    tracing::debug!(path = %path.display(), rolled = %target.display(), "Log file rolled");
    Ok(BufWriter::new(open_live(path).await?))
}

async fn write_loop(
    path: PathBuf,
    file: File,
    mut rx: mpsc::Receiver<Entry>,
    roll_interval: Duration,
) {
    let mut file = BufWriter::new(file);
    let mut ticker = time::interval_at(Instant::now() + roll_interval, roll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let roll = tokio::select! {
            biased;
            entry = rx.recv() => match entry {
                Some(Entry::Line(line)) => {
                    if let Err(e) = file.write_all(&line).await {
                        tracing::error!(path = %path.display(), error = %e, "Failed to write log line");
                    }
                    // Flush once the queue is momentarily empty.
                    if rx.is_empty() {
                        if let Err(e) = file.flush().await {
                            tracing::error!(path = %path.display(), error = %e, "Failed to flush log file");
                        }
                    }
                    false
                }
                Some(Entry::Roll) => true,
                None => break,
            },
            _ = ticker.tick() => true,
        };

        if roll {
            file = match roll_file(&path, file).await {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Failed to roll log file");
                    match open_live(&path).await {
                        Ok(f) => BufWriter::new(f),
                        Err(e) => {
                            tracing::error!(path = %path.display(), error = %e, "Cannot reopen log file, writer stopping");
                            return;
                        }
                    }
                }
            };
        }
    }

    if let Err(e) = file.flush().await {
        tracing::error!(path = %path.display(), error = %e, "Failed to flush log file");
    }
}
