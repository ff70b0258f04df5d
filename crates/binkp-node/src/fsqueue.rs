//! Filesystem outbound queue.
//!
//! One directory per link under the outbound root, named
//! `<zone>.<net>.<node>.<point>`. Whatever lands in a link's directory is
//! shipped date-ascending (file mtime, then name for stability); a
//! committed item is unlinked. Enumeration is restartable by construction:
//! uncommitted files are simply still there next time.
//!
//! What the files contain is not this crate's business; the tosser puts
//! packed `.pkt` bundles there, tests put whatever they like.

use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use tracing::warn;

use binkp_core::{FtnAddress, OutboundItem, OutboundQueue, QueueError};

/// Directory-backed [`OutboundQueue`].
#[derive(Debug, Clone)]
pub struct FsQueue {
    root: PathBuf,
}

impl FsQueue {
    /// Queue rooted at the configured outbound directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory items for `link` live in.
    #[must_use]
    pub fn link_dir(&self, link: &FtnAddress) -> PathBuf {
        self.root.join(format!(
            "{}.{}.{}.{}",
            link.zone, link.net, link.node, link.point
        ))
    }
}

impl OutboundQueue for FsQueue {
    fn outbound_for(&self, link: &FtnAddress) -> Result<Vec<OutboundItem>, QueueError> {
        let dir = self.link_dir(link);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let mtime = meta
                .modified()?
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            files.push((mtime, name, entry.path(), meta.len()));
        }
        files.sort();

        let mut items = Vec::with_capacity(files.len());
        for (mtime, name, path, size) in files {
            let file = match std::fs::File::open(&path) {
                Ok(file) => file,
                Err(e) => {
                    // Raced with another session or an operator; skip it.
                    warn!(path = %path.display(), error = %e, "outbound file vanished");
                    continue;
                }
            };
            let commit_path = path.clone();
            items.push(OutboundItem {
                name,
                size,
                mtime,
                source: Box::new(tokio::fs::File::from_std(file)),
                commit: Box::new(move || {
                    std::fs::remove_file(&commit_path).map_err(QueueError::from)
                }),
            });
        }
        Ok(items)
    }
}
