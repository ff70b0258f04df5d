//! Frame encoding and decoding for the BinkP wire protocol.
//!
//! Each frame is a 16-bit little-endian header followed by the payload.
//! Bit 15 of the header is the command/data discriminator (1 = command),
//! the low 15 bits are the payload length. Command frames carry the command
//! id as the first payload byte; data frames carry raw file bytes.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::MAX_FRAME_PAYLOAD;
use crate::error::FrameError;

/// Header bit marking a command frame.
pub const COMMAND_BIT: u16 = 0x8000;

/// Command/data discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Protocol command (`M_NUL` .. `M_SKIP`).
    Command,
    /// Raw file bytes belonging to the current receive file.
    Data,
}

/// One length-prefixed unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command or data.
    pub kind: FrameKind,
    /// 0..=32767 payload bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a data frame.
    #[must_use]
    pub fn data(payload: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Data,
            payload,
        }
    }

    /// Build a command frame from a raw payload (`id` byte plus arguments).
    #[must_use]
    pub fn command(payload: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Command,
            payload,
        }
    }

    /// Encode header plus payload into a single buffer.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Oversize`] when the payload exceeds 32767 bytes.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        if self.payload.len() > MAX_FRAME_PAYLOAD {
            return Err(FrameError::Oversize(self.payload.len()));
        }
        let mut header = self.payload.len() as u16;
        if self.kind == FrameKind::Command {
            header |= COMMAND_BIT;
        }
        let mut buf = Vec::with_capacity(2 + self.payload.len());
        buf.extend_from_slice(&header.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }
}

/// Read one frame, or `None` on a clean end-of-stream at a frame boundary.
///
/// Reads exactly `2 + N` bytes. EOF inside a frame is [`FrameError::Truncated`].
/// No timeout is applied here; the session bounds every read.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 2];
    let mut got = 0;
    while got < header.len() {
        let n = reader.read(&mut header[got..]).await?;
        if n == 0 {
            if got == 0 {
                return Ok(None);
            }
            return Err(FrameError::Truncated);
        }
        got += n;
    }

    let raw = u16::from_le_bytes(header);
    let kind = if raw & COMMAND_BIT != 0 {
        FrameKind::Command
    } else {
        FrameKind::Data
    };
    let len = (raw & 0x7FFF) as usize;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FrameError::Truncated
        } else {
            FrameError::Io(e)
        }
    })?;

    Ok(Some(Frame { kind, payload }))
}

/// Write one frame and flush, so command frames interleave with data frames
/// at frame boundaries. The whole header+payload is buffered before any byte
/// hits the writer.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = frame.encode()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
