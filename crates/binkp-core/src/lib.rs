//! # BinkP core
//!
//! Protocol engine for BinkP, the binary Fidonet mail transfer protocol
//! over TCP. This crate provides:
//!
//! - FTN address parsing and rendering
//! - Frame encoding and decoding (length-prefixed, command/data multiplex)
//! - The BinkP command vocabulary
//! - CRAM-MD5 and plain-password authentication
//! - The session state machine driving handshake, auth and file exchange
//! - The outbound batch driver and the inbound spool
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Session                              │
//! │  (greet → auth → batch → EOB, one per TCP connection)       │
//! ├──────────────────────────┬──────────────────────────────────┤
//! │     OutboundDriver       │          InboundSpool            │
//! │  (queue items → frames)  │  (data frames → inbound dir)     │
//! ├──────────────────────────┴──────────────────────────────────┤
//! │                        Frames                               │
//! │  (16-bit little-endian header, bit 15 = command)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The crate is transport-agnostic above the socket: a [`Session`] runs over
//! anything that is `AsyncRead + AsyncWrite`. Listening and dialing live in
//! `binkp-node`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod auth;
pub mod command;
pub mod driver;
pub mod error;
pub mod frame;
pub mod queue;
pub mod session;
pub mod spool;

pub use address::{FtnAddress, HostPort};
pub use command::{Command, CommandId, FileInfo, FileRef};
pub use error::{AddressError, FrameError, QueueError, SessionError};
pub use frame::{Frame, FrameKind};
pub use queue::{OutboundItem, OutboundQueue};
pub use session::{
    CloseReason, Counters, Role, Session, SessionConfig, SessionOutcome, SessionState,
};
pub use spool::{Disposition, InboundSpool};

/// Default BinkP TCP port.
pub const DEFAULT_PORT: u16 = 24554;

/// Largest payload one frame can carry (15-bit length field).
pub const MAX_FRAME_PAYLOAD: usize = 0x7FFF;

/// Protocol version advertised in the `VER` greeting record.
pub const PROTOCOL_VERSION: &str = "binkp/1.0";
