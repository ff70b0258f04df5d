//! # BinkP node
//!
//! Everything around the protocol core that turns it into a running mailer
//! node: the jNode-compatible configuration loader, the TCP listener and
//! dialer, the filesystem outbound queue, and aggregate server statistics.
//!
//! The [`Node`] ties these together and exposes the two library entry
//! points: [`Node::listen_and_serve`] for the answering side and
//! [`Node::poll`] for dialing a configured link.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod dialer;
pub mod fsqueue;
pub mod listener;
pub mod node;
pub mod stats;

pub use config::{Config, ConfigError, LinkConfig};
pub use dialer::DialError;
pub use fsqueue::FsQueue;
pub use node::{Node, NodeError};
pub use stats::{ServerStats, StatsSnapshot};
