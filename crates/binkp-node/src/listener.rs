//! TCP listener and accept loops.
//!
//! Binds the v4 address, and the v6 address too when enabled, then runs one
//! accept loop per socket. Every accepted connection becomes a session task
//! on a shared [`TaskTracker`]; shutdown cancels the accept loops first and
//! then waits for every active session to reach its close.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use binkp_core::{InboundSpool, OutboundQueue, Role, Session};

use crate::config::Config;
use crate::stats::ServerStats;

/// The answering side of a node: bound sockets plus the session nursery.
pub struct Listener {
    config: Arc<Config>,
    queue: Arc<dyn OutboundQueue>,
    stats: Arc<ServerStats>,
    sockets: Vec<TcpListener>,
}

impl Listener {
    /// Bind all configured addresses. Fails if any bind fails.
    pub async fn bind(
        config: Arc<Config>,
        queue: Arc<dyn OutboundQueue>,
        stats: Arc<ServerStats>,
    ) -> io::Result<Self> {
        let mut sockets = Vec::new();

        let v4: SocketAddr = format!("{}:{}", config.bind_addr, config.port)
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("binkp.bind: {e}")))?;
        sockets.push(TcpListener::bind(v4).await?);
        info!(addr = %v4, "listening");

        if config.ipv6_enabled {
            let v6: SocketAddr = format!("[{}]:{}", config.bind6_addr, config.port)
                .parse()
                .map_err(|e| {
                    io::Error::new(io::ErrorKind::InvalidInput, format!("binkp.bind6: {e}"))
                })?;
            sockets.push(TcpListener::bind(v6).await?);
            info!(addr = %v6, "listening");
        }

        Ok(Self {
            config,
            queue,
            stats,
            sockets,
        })
    }

    /// The locally bound addresses, useful when the port was 0.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.sockets
            .iter()
            .filter_map(|socket| socket.local_addr().ok())
            .collect()
    }

    /// Accept until cancelled, then wait for all sessions to close.
    pub async fn serve(self, cancel: CancellationToken) {
        let sessions = TaskTracker::new();
        let accepts = TaskTracker::new();

        for socket in self.sockets {
            let config = Arc::clone(&self.config);
            let queue = Arc::clone(&self.queue);
            let stats = Arc::clone(&self.stats);
            let sessions = sessions.clone();
            let cancel = cancel.clone();
            accepts.spawn(accept_loop(socket, config, queue, stats, sessions, cancel));
        }
        accepts.close();
        accepts.wait().await;

        sessions.close();
        sessions.wait().await;
        info!("all sessions closed");
    }
}

async fn accept_loop(
    socket: TcpListener,
    config: Arc<Config>,
    queue: Arc<dyn OutboundQueue>,
    stats: Arc<ServerStats>,
    sessions: TaskTracker,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            () = cancel.cancelled() => break,
            accepted = socket.accept() => accepted,
        };
        match accepted {
            Ok((stream, remote)) => {
                info!(%remote, "incoming connection");
                let config = Arc::clone(&config);
                let queue = Arc::clone(&queue);
                let stats = Arc::clone(&stats);
                let cancel = cancel.clone();
                sessions.spawn(async move {
                    run_answering(stream, &config, queue, &stats, cancel).await;
                });
            }
            Err(e) => {
                // Transient accept failures (EMFILE and friends) must not
                // kill the loop.
                warn!(error = %e, "accept failed");
            }
        }
    }
}

async fn run_answering(
    stream: TcpStream,
    config: &Config,
    queue: Arc<dyn OutboundQueue>,
    stats: &ServerStats,
    cancel: CancellationToken,
) {
    stats.session_opened();
    let spool = InboundSpool::new(&config.inbound_dir, &config.temp_dir);
    let session = Session::new(stream, Role::Answering, config.session_config(), queue, spool)
        .with_cancel(cancel);
    let outcome = session.run().await;
    if let Some(error) = &outcome.error {
        error!(reason = ?outcome.reason, %error, "session failed");
    }
    stats.session_closed(outcome.counters);
}
