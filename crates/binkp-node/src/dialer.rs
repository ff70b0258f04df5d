//! Outbound connection establishment.
//!
//! Resolves a [`HostPort`] (bracketed IPv6, `ftn@host`, or bare
//! `host[:port]`; the parsing lives in `binkp-core`), then tries each
//! resolved address with the configured connect timeout. Cancellation is
//! honoured during both resolution and connect.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpStream, lookup_host};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use binkp_core::HostPort;

/// Why a dial attempt failed.
#[derive(Debug, Error)]
pub enum DialError {
    /// DNS resolution failed or returned nothing.
    #[error("cannot resolve {0}")]
    Resolve(String),

    /// Every resolved address refused or errored.
    #[error("cannot connect to {target}: {source}")]
    Connect {
        /// The dialed target.
        target: String,
        /// Last connection error seen.
        #[source]
        source: io::Error,
    },

    /// The connect deadline passed.
    #[error("connect to {0} timed out")]
    Timeout(String),

    /// Shutdown arrived mid-dial.
    #[error("dial cancelled")]
    Cancelled,
}

/// Open a TCP connection to `target` within `timeout`.
pub async fn connect(
    target: &HostPort,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<TcpStream, DialError> {
    let attempt = async {
        let addrs: Vec<_> = lookup_host((target.host.as_str(), target.port))
            .await
            .map_err(|_| DialError::Resolve(target.to_string()))?
            .collect();
        if addrs.is_empty() {
            return Err(DialError::Resolve(target.to_string()));
        }

        let mut last_error = io::Error::other("no addresses tried");
        for addr in addrs {
            debug!(%addr, "dialing");
            match TcpStream::connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = e,
            }
        }
        Err(DialError::Connect {
            target: target.to_string(),
            source: last_error,
        })
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(DialError::Cancelled),
        result = tokio::time::timeout(timeout, attempt) => match result {
            Ok(result) => result,
            Err(_) => Err(DialError::Timeout(target.to_string())),
        },
    }
}
