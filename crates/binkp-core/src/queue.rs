//! Capability interfaces the session consumes from the surrounding system.
//!
//! The engine never decides *what* to send: an [`OutboundQueue`] hands it
//! work items addressed to a peer, each an opaque named byte stream with a
//! one-shot commit handle that retires the item once the peer acknowledges
//! it with `M_GOT`.

use tokio::io::{AsyncRead, AsyncSeek};

use crate::address::FtnAddress;
use crate::error::QueueError;

/// A seekable byte stream backing an outbound item. Seekable because the
/// peer may request a resume from an arbitrary offset via `M_GET`.
pub trait ByteSource: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> ByteSource for T {}

/// One-shot acknowledgement handle. Invoked exactly once, and only after a
/// matching `M_GOT` arrived; a skipped or unacknowledged item is dropped
/// uncommitted and stays in the queue for a later session.
pub type CommitHandle = Box<dyn FnOnce() -> Result<(), QueueError> + Send>;

/// A pending outbound transfer produced by the queue.
pub struct OutboundItem {
    /// Name announced to the peer.
    pub name: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Unix modification time announced to the peer.
    pub mtime: i64,
    /// The bytes to ship.
    pub source: Box<dyn ByteSource>,
    /// Retires the item in the queue once acknowledged.
    pub commit: CommitHandle,
}

impl std::fmt::Debug for OutboundItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundItem")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("mtime", &self.mtime)
            .finish_non_exhaustive()
    }
}

/// Source of outbound work, safe for concurrent use across sessions.
///
/// Enumeration must be restartable: items not committed in one session are
/// expected to reappear in the next.
pub trait OutboundQueue: Send + Sync {
    /// Work items addressed to `link`, date ascending. An empty list means
    /// the session goes straight to `M_EOB`.
    fn outbound_for(&self, link: &FtnAddress) -> Result<Vec<OutboundItem>, QueueError>;
}

/// A queue with nothing to send; useful for receive-only sessions and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyQueue;

impl OutboundQueue for EmptyQueue {
    fn outbound_for(&self, _link: &FtnAddress) -> Result<Vec<OutboundItem>, QueueError> {
        Ok(Vec::new())
    }
}
