//! Outbound batch driver.
//!
//! Walks the queue's work items in order, announcing each with `M_FILE`
//! and chunking its bytes into data frames. Files are announced, bodied
//! and acknowledged strictly FIFO: a new announcement never starts before
//! the previous body is fully emitted. Fully-sent items wait in a pending
//! list until the peer retires them with `M_GOT` (commit) or `M_SKIP`
//! (defer); `M_GET` rewinds the byte source and resumes from the requested
//! offset.

use std::collections::VecDeque;
use std::io::SeekFrom;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::command::{FileInfo, FileRef};
use crate::error::{QueueError, SessionError};
use crate::queue::{ByteSource, CommitHandle, OutboundItem};

/// What the session should put on the wire next.
#[derive(Debug)]
pub enum BatchFrame {
    /// Announce a file: emit `M_FILE`.
    Announce(FileInfo),
    /// Emit one data frame.
    Data(Vec<u8>),
    /// A file's body is fully emitted; nothing goes on the wire.
    FileDone {
        /// Name of the completed file.
        name: String,
        /// Bytes emitted for it in this session.
        sent: u64,
    },
    /// The batch is exhausted: emit `M_EOB` (returned exactly once).
    Eob,
}

struct InFlight {
    name: String,
    size: u64,
    mtime: i64,
    offset: u64,
    announced: bool,
    source: Box<dyn ByteSource>,
    commit: Option<CommitHandle>,
}

impl InFlight {
    fn info(&self) -> FileInfo {
        FileInfo {
            name: self.name.clone(),
            size: self.size,
            mtime: self.mtime,
            offset: self.offset,
        }
    }
}

/// Drives one session's outbound batch.
pub struct OutboundDriver {
    items: VecDeque<OutboundItem>,
    current: Option<InFlight>,
    /// Fully-sent files awaiting `M_GOT`/`M_SKIP`, FIFO.
    pending: VecDeque<InFlight>,
    /// Files the peer asked to resume via `M_GET`, served before new items.
    resumed: VecDeque<InFlight>,
    frame_size: usize,
    eob_emitted: bool,
    files_sent: u64,
}

impl OutboundDriver {
    /// Build a driver over the queue's items. `frame_size` is clamped to
    /// the protocol's `1..=32767` payload range.
    #[must_use]
    pub fn new(items: Vec<OutboundItem>, frame_size: usize) -> Self {
        Self {
            items: items.into(),
            current: None,
            pending: VecDeque::new(),
            resumed: VecDeque::new(),
            frame_size: frame_size.clamp(1, crate::MAX_FRAME_PAYLOAD),
            eob_emitted: false,
            files_sent: 0,
        }
    }

    /// Files whose bodies were fully emitted this session.
    #[must_use]
    pub fn files_sent(&self) -> u64 {
        self.files_sent
    }

    /// In-flight files not yet retired by a `M_GOT` or `M_SKIP`.
    #[must_use]
    pub fn unacknowledged(&self) -> usize {
        self.pending.len() + self.resumed.len() + usize::from(self.current.is_some())
    }

    /// True once `M_EOB` has been handed out and no resumed file is active.
    #[must_use]
    pub fn drained(&self) -> bool {
        self.eob_emitted && self.current.is_none() && self.resumed.is_empty()
    }

    /// Produce the next outbound step, or `None` when there is nothing left
    /// to put on the wire (EOB emitted, everything else is ack bookkeeping).
    pub async fn next_frame(&mut self) -> Result<Option<BatchFrame>, SessionError> {
        loop {
            let Some(file) = self.current.as_mut() else {
                if let Some(resumed) = self.resumed.pop_front() {
                    self.current = Some(resumed);
                    continue;
                }
                match self.items.pop_front() {
                    Some(item) => {
                        self.current = Some(InFlight {
                            name: item.name,
                            size: item.size,
                            mtime: item.mtime,
                            offset: 0,
                            announced: false,
                            source: item.source,
                            commit: Some(item.commit),
                        });
                        continue;
                    }
                    None if !self.eob_emitted => {
                        self.eob_emitted = true;
                        return Ok(Some(BatchFrame::Eob));
                    }
                    None => return Ok(None),
                }
            };

            if !file.announced {
                file.announced = true;
                return Ok(Some(BatchFrame::Announce(file.info())));
            }

            let remaining = file.size.saturating_sub(file.offset);
            if remaining == 0 {
                let file = self.current.take().expect("current file present");
                let done = BatchFrame::FileDone {
                    name: file.name.clone(),
                    sent: file.size,
                };
                self.files_sent += 1;
                self.pending.push_back(file);
                return Ok(Some(done));
            }

            let want = remaining.min(self.frame_size as u64) as usize;
            let mut chunk = vec![0u8; want];
            let n = file
                .source
                .read(&mut chunk)
                .await
                .map_err(QueueError::Io)?;
            if n == 0 {
                return Err(QueueError::Item(format!(
                    "{}: source ended {} bytes short of declared size",
                    file.name, remaining
                ))
                .into());
            }
            chunk.truncate(n);
            file.offset += n as u64;
            return Ok(Some(BatchFrame::Data(chunk)));
        }
    }

    /// Peer acknowledged `name`: invoke its commit handle and drop it. A
    /// `M_GOT` for the file currently being sent aborts the rest of its
    /// body (the peer already has it) and still commits.
    ///
    /// Returns false when no in-flight file matches, which is logged and
    /// ignored by the session.
    pub fn handle_got(&mut self, ack: &FileRef) -> Result<bool, SessionError> {
        if let Some(file) = self.take_in_flight(&ack.name) {
            if let Some(commit) = file.commit {
                commit()?;
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Peer skipped `name`: drop it without committing so a later session
    /// retries it.
    pub fn handle_skip(&mut self, skip: &FileRef) -> bool {
        self.take_in_flight(&skip.name).is_some()
    }

    /// Peer requested a resume of `name` from `offset`. Rewinds the byte
    /// source; a fully-sent file is re-announced from the new offset.
    ///
    /// # Errors
    ///
    /// `offset > size` is a protocol violation.
    pub async fn handle_get(&mut self, request: &FileInfo) -> Result<bool, SessionError> {
        let from_current = self
            .current
            .as_ref()
            .is_some_and(|file| file.name == request.name);
        let mut file = if from_current {
            self.current.take().expect("matched current file")
        } else if let Some(file) = remove_named(&mut self.pending, &request.name) {
            file
        } else if let Some(file) = remove_named(&mut self.resumed, &request.name) {
            file
        } else {
            return Ok(false);
        };

        if request.offset > file.size {
            return Err(SessionError::Protocol(format!(
                "M_GET offset {} beyond size {} of {}",
                request.offset, file.size, request.name
            )));
        }

        file.source
            .seek(SeekFrom::Start(request.offset))
            .await
            .map_err(QueueError::Io)?;
        // A file still mid-body continues silently from the new offset; one
        // that already finished must be re-announced before more data.
        if file.offset >= file.size {
            file.announced = false;
            self.files_sent = self.files_sent.saturating_sub(1);
        }
        file.offset = request.offset;
        if from_current {
            self.current = Some(file);
        } else {
            file.announced = false;
            self.resumed.push_back(file);
        }
        // A resume after our EOB re-opens the batch; EOB is emitted again
        // once the resumed body is done.
        self.eob_emitted = false;
        Ok(true)
    }

    fn take_in_flight(&mut self, name: &str) -> Option<InFlight> {
        if self
            .current
            .as_ref()
            .is_some_and(|file| file.name == name)
        {
            return self.current.take();
        }
        remove_named(&mut self.pending, name).or_else(|| remove_named(&mut self.resumed, name))
    }
}

fn remove_named(files: &mut VecDeque<InFlight>, name: &str) -> Option<InFlight> {
    let idx = files.iter().position(|file| file.name == name)?;
    files.remove(idx)
}
