//! Inbound spool: temp-file accumulation and atomic publication.
//!
//! Each incoming file announced by `M_FILE` gets a temp sink in the temp
//! directory. Data frames append to it; when the received byte count reaches
//! the declared size the sink is fsynced and atomically renamed into the
//! inbound directory. Name collisions get a numeric suffix before the
//! extension. A session abort discards the temp sink without publishing.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::command::FileInfo;

/// Decision hook consulted when the peer announces an incoming file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Receive the file.
    Accept,
    /// Refuse it with `M_SKIP`; the peer keeps it queued.
    Skip,
}

type DispositionFn = dyn Fn(&FileInfo) -> Disposition + Send + Sync;

/// Serial for unique temp names; spools may share a temp directory.
static TEMP_SERIAL: AtomicU64 = AtomicU64::new(0);

/// Sink for files received from peers.
#[derive(Clone)]
pub struct InboundSpool {
    inbound_dir: PathBuf,
    temp_dir: PathBuf,
    disposition: Arc<DispositionFn>,
}

/// One active incoming file, alive between `M_FILE` and its retirement.
pub struct Receiving {
    info: FileInfo,
    temp_path: PathBuf,
    sink: File,
    received: u64,
}

impl Receiving {
    /// The announcement this receive belongs to.
    #[must_use]
    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    /// Bytes accumulated so far.
    #[must_use]
    pub fn received(&self) -> u64 {
        self.received
    }

    /// True once the declared size has been fully received.
    #[must_use]
    pub fn complete(&self) -> bool {
        self.received == self.info.size
    }

    /// Room left before the declared size is exceeded.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.info.size.saturating_sub(self.received)
    }
}

impl InboundSpool {
    /// Spool publishing into `inbound_dir`, staging under `temp_dir`.
    #[must_use]
    pub fn new(inbound_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            inbound_dir: inbound_dir.into(),
            temp_dir: temp_dir.into(),
            disposition: Arc::new(|_| Disposition::Accept),
        }
    }

    /// Install a disposition hook; the default accepts everything.
    #[must_use]
    pub fn with_disposition<F>(mut self, hook: F) -> Self
    where
        F: Fn(&FileInfo) -> Disposition + Send + Sync + 'static,
    {
        self.disposition = Arc::new(hook);
        self
    }

    /// Ask the embedder whether to receive an announced file.
    #[must_use]
    pub fn disposition(&self, info: &FileInfo) -> Disposition {
        (self.disposition)(info)
    }

    /// Open a temp sink for an announced file.
    pub async fn begin(&self, info: &FileInfo) -> io::Result<Receiving> {
        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let serial = TEMP_SERIAL.fetch_add(1, Ordering::Relaxed);
        let temp_path = self
            .temp_dir
            .join(format!("{}.{serial}.bpt", sanitize_name(&info.name)));
        let sink = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await?;
        Ok(Receiving {
            info: info.clone(),
            temp_path,
            sink,
            received: 0,
        })
    }

    /// Append one data frame's payload. The session checks the declared-size
    /// bound before calling.
    pub async fn append(&self, rx: &mut Receiving, bytes: &[u8]) -> io::Result<()> {
        rx.sink.write_all(bytes).await?;
        rx.received += bytes.len() as u64;
        Ok(())
    }

    /// Fsync and atomically publish a complete receive into the inbound
    /// directory. Returns the published path.
    pub async fn commit(&self, mut rx: Receiving) -> io::Result<PathBuf> {
        rx.sink.flush().await?;
        rx.sink.sync_all().await?;
        drop(rx.sink);

        tokio::fs::create_dir_all(&self.inbound_dir).await?;
        let target = self.claim_name(&sanitize_name(&rx.info.name)).await?;
        tokio::fs::rename(&rx.temp_path, &target).await?;
        Ok(target)
    }

    /// Discard an incomplete receive.
    pub async fn abort(&self, rx: Receiving) {
        drop(rx.sink);
        let _ = tokio::fs::remove_file(&rx.temp_path).await;
    }

    /// Reserve a collision-free name in the inbound directory. The reserved
    /// placeholder is atomically replaced by the rename in `commit`.
    async fn claim_name(&self, name: &str) -> io::Result<PathBuf> {
        let (stem, ext) = split_name(name);
        for attempt in 0..u32::MAX {
            let candidate = if attempt == 0 {
                name.to_owned()
            } else {
                match ext {
                    Some(ext) => format!("{stem}-{attempt}.{ext}"),
                    None => format!("{stem}-{attempt}"),
                }
            };
            let path = self.inbound_dir.join(candidate);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => return Ok(path),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::other("inbound name space exhausted"))
    }
}

/// Reduce a peer-supplied name to a bare file name; peers do not get to pick
/// directories.
fn sanitize_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| n != "." && n != "..")
        .unwrap_or_else(|| "unnamed".to_owned())
}

fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}
