//! The node facade: one configured mailer, serving and polling.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use binkp_core::{
    FtnAddress, InboundSpool, OutboundQueue, Role, Session, SessionError, SessionOutcome,
};

use crate::config::Config;
use crate::dialer::{self, DialError};
use crate::listener::Listener;
use crate::stats::{ServerStats, StatsSnapshot};

/// Node-level failures surfaced to the front end.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Binding the listen sockets failed.
    #[error("cannot bind: {0}")]
    Bind(#[from] std::io::Error),

    /// Polling a link that has no dialable host configured.
    #[error("link {0} has no host configured")]
    NoHost(FtnAddress),

    /// The dial itself failed.
    #[error(transparent)]
    Dial(#[from] DialError),

    /// The dialed session ended in an error.
    #[error("session with {link} failed: {source}")]
    Session {
        /// The polled link.
        link: FtnAddress,
        /// The session's fatal error.
        #[source]
        source: SessionError,
    },
}

/// A configured BinkP node.
pub struct Node {
    config: Arc<Config>,
    queue: Arc<dyn OutboundQueue>,
    stats: Arc<ServerStats>,
}

impl Node {
    /// Assemble a node from its configuration and an outbound queue.
    #[must_use]
    pub fn new(config: Config, queue: Arc<dyn OutboundQueue>) -> Self {
        Self {
            config: Arc::new(config),
            queue,
            stats: Arc::new(ServerStats::new()),
        }
    }

    /// The node's configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Aggregate statistics over all finished sessions.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Bind and serve until `cancel` fires, then wait for every active
    /// session to close.
    pub async fn listen_and_serve(&self, cancel: CancellationToken) -> Result<(), NodeError> {
        let listener = Listener::bind(
            Arc::clone(&self.config),
            Arc::clone(&self.queue),
            Arc::clone(&self.stats),
        )
        .await?;
        listener.serve(cancel).await;
        Ok(())
    }

    /// Bind the listen sockets without serving yet; lets callers learn the
    /// actual port before starting, which matters when the port is 0.
    pub async fn bind(&self) -> Result<Listener, NodeError> {
        Ok(Listener::bind(
            Arc::clone(&self.config),
            Arc::clone(&self.queue),
            Arc::clone(&self.stats),
        )
        .await?)
    }

    /// Dial one configured link and run a full session in the originating
    /// role. Returns the session outcome; protocol-fatal outcomes are
    /// errors, `Complete`/`Cancelled` are not.
    pub async fn poll(
        &self,
        link: &FtnAddress,
        cancel: CancellationToken,
    ) -> Result<SessionOutcome, NodeError> {
        let target = self
            .config
            .link_for(link)
            .and_then(|l| l.host.clone())
            .ok_or_else(|| NodeError::NoHost(link.clone()))?;

        info!(%link, %target, "polling");
        let stream = dialer::connect(&target, self.config.connect_timeout, &cancel).await?;

        self.stats.session_opened();
        let spool = InboundSpool::new(&self.config.inbound_dir, &self.config.temp_dir);
        let session = Session::new(
            stream,
            Role::Originating,
            self.config.session_config(),
            Arc::clone(&self.queue),
            spool,
        )
        .with_cancel(cancel);

        let mut outcome = session.run().await;
        self.stats.session_closed(outcome.counters);

        match outcome.error.take() {
            Some(source) => Err(NodeError::Session {
                link: link.clone(),
                source,
            }),
            None => Ok(outcome),
        }
    }
}
