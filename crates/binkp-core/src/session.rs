//! The BinkP session state machine.
//!
//! One session per TCP connection, in either role. The state set is shared
//! between roles; the role only decides who speaks first at each phase:
//!
//! ```text
//! Greeting ──► AwaitingAuth ──► Authenticated ──► SendingBatch
//!                   │                                  │
//!                   ▼                                  ▼
//!             Closed(AuthFailed)        DrainingBatch / AwaitingPeerEob
//!                                                      │
//!                                                      ▼
//!                                              Closed(Complete)
//! ```
//!
//! The socket is split: a reader task decodes frames into a channel so a
//! frame read is never cancelled halfway, and the session task drains ready
//! frames between outbound chunks. That keeps `M_GET`/`M_SKIP`/`M_GOT`
//! responsive while a file body is streaming, and it means cancellation is
//! only ever observed at a frame boundary.

use std::io;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::address::FtnAddress;
use crate::auth;
use crate::command::{Command, FileInfo, FileRef, Received, classify};
use crate::driver::{BatchFrame, OutboundDriver};
use crate::error::{FrameError, SessionError};
use crate::frame::{self, Frame};
use crate::queue::OutboundQueue;
use crate::spool::{Disposition, InboundSpool, Receiving};
use crate::{MAX_FRAME_PAYLOAD, PROTOCOL_VERSION};

/// Which side of the connection this session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Server side: accepted the connection, issues the challenge,
    /// verifies `M_PWD`.
    Answering,
    /// Client side: dialed out, answers the challenge.
    Originating,
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Greeting burst in flight, peer address not yet seen.
    Greeting,
    /// Addresses exchanged, password not yet verified.
    AwaitingAuth,
    /// Password accepted; batch not yet started.
    Authenticated,
    /// Sending our batch, peer still sending too.
    SendingBatch,
    /// Peer finished its batch, ours still going.
    DrainingBatch,
    /// Our batch done, waiting for the peer's `M_EOB`.
    AwaitingPeerEob,
    /// Terminal.
    Closed(CloseReason),
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Both batches exchanged and acknowledged.
    Complete,
    /// Shutdown signal; nothing in flight was committed.
    Cancelled,
    /// Password verification failed.
    AuthFailed,
    /// Peer sent `M_BSY`.
    PeerBusy,
    /// Peer sent `M_ERR`.
    PeerError,
    /// Inactivity deadline reached.
    Timeout,
    /// Well-formed frames in a forbidden order.
    ProtocolViolation,
    /// Malformed frame on the wire.
    FrameFormat,
    /// Socket read/write failure.
    TransportFailed,
    /// Queue or spool failure on our side.
    LocalError,
}

/// Per-session transfer counters. Data-frame payload bytes only; command
/// frames are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Data bytes received.
    pub bytes_rx: u64,
    /// Data bytes sent.
    pub bytes_tx: u64,
    /// Files fully received and published.
    pub files_rx: u64,
    /// Files fully sent (body emitted; commit still depends on `M_GOT`).
    pub files_tx: u64,
}

/// What a finished session reports back to the caller.
#[derive(Debug)]
pub struct SessionOutcome {
    /// Terminal close reason.
    pub reason: CloseReason,
    /// Peer address from its `M_ADR`, when the handshake got that far.
    pub peer: Option<FtnAddress>,
    /// Transfer counters, flushed on every exit path.
    pub counters: Counters,
    /// The fatal error, for reasons other than `Complete`/`Cancelled`.
    pub error: Option<SessionError>,
}

type PasswordFn = dyn Fn(&FtnAddress) -> Option<String> + Send + Sync;

/// Static session parameters: local identity plus protocol knobs.
#[derive(Clone)]
pub struct SessionConfig {
    /// Local primary FTN address, announced in `M_ADR`.
    pub address: FtnAddress,
    /// Station name (`SYS` record).
    pub system_name: String,
    /// Sysop name (`ZYZ` record).
    pub sysop_name: String,
    /// Station location (`LOC` record).
    pub location: String,
    /// Data frame payload size, clamped to `1..=32767`.
    pub frame_size: usize,
    /// Inactivity deadline for every blocking read and write.
    pub timeout: Duration,
    passwords: Arc<PasswordFn>,
}

impl SessionConfig {
    /// Parameters with jNode-compatible defaults and no passwords.
    #[must_use]
    pub fn new(address: FtnAddress) -> Self {
        Self {
            address,
            system_name: String::new(),
            sysop_name: String::new(),
            location: String::new(),
            frame_size: MAX_FRAME_PAYLOAD,
            timeout: Duration::from_secs(30),
            passwords: Arc::new(|_| None),
        }
    }

    /// Set the station identity trio.
    #[must_use]
    pub fn with_identity(
        mut self,
        system: impl Into<String>,
        sysop: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        self.system_name = system.into();
        self.sysop_name = sysop.into();
        self.location = location.into();
        self
    }

    /// Set the data frame size (clamped to the protocol range).
    #[must_use]
    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size.clamp(1, MAX_FRAME_PAYLOAD);
        self
    }

    /// Set the inactivity timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Install the per-link password lookup. `None` or an empty secret
    /// means no authentication required for that peer.
    #[must_use]
    pub fn with_passwords<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&FtnAddress) -> Option<String> + Send + Sync + 'static,
    {
        self.passwords = Arc::new(lookup);
        self
    }

    /// The configured secret for a peer, if any.
    #[must_use]
    pub fn password_for(&self, peer: &FtnAddress) -> Option<String> {
        (self.passwords)(peer)
    }
}

/// A single BinkP session over any async byte stream.
pub struct Session<S> {
    stream: S,
    role: Role,
    config: SessionConfig,
    queue: Arc<dyn OutboundQueue>,
    spool: InboundSpool,
    cancel: CancellationToken,
}

/// How long an outgoing `M_ERR` report may take before the socket is
/// dropped anyway.
const ERROR_REPORT_TIMEOUT: Duration = Duration::from_secs(5);

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Wrap a connected stream in a session.
    pub fn new(
        stream: S,
        role: Role,
        config: SessionConfig,
        queue: Arc<dyn OutboundQueue>,
        spool: InboundSpool,
    ) -> Self {
        Self {
            stream,
            role,
            config,
            queue,
            spool,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a shutdown token. A cancelled session finishes its current
    /// frame write, then closes without committing anything in flight.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Drive the session to completion. Never panics out and never leaves
    /// an unpublished temp file behind; counters are reported on every
    /// exit path.
    pub async fn run(self) -> SessionOutcome {
        let Session {
            stream,
            role,
            config,
            queue,
            spool,
            cancel,
        } = self;

        info!(role = ?role, local = %config.address, "session opened");

        let (read_half, write_half) = tokio::io::split(stream);
        // Generous buffering keeps the peer's data stream flowing while our
        // own writes momentarily block; bounded so a hostile peer cannot
        // balloon memory past the configured maxmem hint.
        let (frames_tx, mut frames_rx) = mpsc::channel(256);
        let reader = tokio::spawn(read_pump(BufReader::new(read_half), frames_tx));

        let mut machine = Machine {
            writer: BufWriter::new(write_half),
            role,
            config,
            queue,
            spool,
            state: SessionState::Greeting,
            peer: None,
            issued_challenge: match role {
                Role::Answering => Some(auth::generate_challenge()),
                Role::Originating => None,
            },
            peer_challenge: None,
            pwd_sent: false,
            sent_eob: false,
            got_eob: false,
            driver: None,
            receiving: None,
            skipping: None,
            counters: Counters::default(),
        };

        let result = machine.drive(&mut frames_rx, &cancel).await;
        reader.abort();

        if let Some(receiving) = machine.receiving.take() {
            debug!(name = %receiving.info().name, "discarding incomplete receive");
            machine.spool.abort(receiving).await;
        }
        if let Some(driver) = &machine.driver {
            if driver.unacknowledged() > 0 {
                debug!(
                    files = driver.unacknowledged(),
                    "sent files left unacknowledged; queue will retry"
                );
            }
        }

        let outcome = match result {
            Ok(reason) => SessionOutcome {
                reason,
                peer: machine.peer.clone(),
                counters: machine.counters,
                error: None,
            },
            Err(error) => {
                if let Some(text) = error.wire_text() {
                    let report = machine.send(Command::Err(text));
                    let _ = tokio::time::timeout(ERROR_REPORT_TIMEOUT, report).await;
                }
                SessionOutcome {
                    reason: close_reason(&error),
                    peer: machine.peer.clone(),
                    counters: machine.counters,
                    error: Some(error),
                }
            }
        };
        machine.state = SessionState::Closed(outcome.reason);

        let _ = tokio::time::timeout(ERROR_REPORT_TIMEOUT, machine.writer.shutdown()).await;

        info!(
            reason = ?outcome.reason,
            peer = outcome.peer.as_ref().map(tracing::field::display),
            bytes_rx = outcome.counters.bytes_rx,
            bytes_tx = outcome.counters.bytes_tx,
            files_rx = outcome.counters.files_rx,
            files_tx = outcome.counters.files_tx,
            "session closed"
        );
        outcome
    }
}

/// Decode loop feeding the session channel. Runs until EOF, a decode error,
/// or the session hanging up the receiver.
async fn read_pump<R>(mut reader: R, frames: mpsc::Sender<Result<Frame, FrameError>>)
where
    R: AsyncRead + Unpin,
{
    loop {
        match frame::read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                if frames.send(Ok(frame)).await.is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(error) => {
                let _ = frames.send(Err(error)).await;
                return;
            }
        }
    }
}

struct Machine<W> {
    writer: W,
    role: Role,
    config: SessionConfig,
    queue: Arc<dyn OutboundQueue>,
    spool: InboundSpool,
    state: SessionState,
    peer: Option<FtnAddress>,
    issued_challenge: Option<[u8; auth::CHALLENGE_LEN]>,
    peer_challenge: Option<Vec<u8>>,
    pwd_sent: bool,
    sent_eob: bool,
    got_eob: bool,
    driver: Option<OutboundDriver>,
    receiving: Option<Receiving>,
    /// File we answered with `M_SKIP`; its in-flight data frames are
    /// discarded until the next `M_FILE`.
    skipping: Option<String>,
    counters: Counters,
}

impl<W> Machine<W>
where
    W: AsyncWrite + Send + Unpin,
{
    async fn drive(
        &mut self,
        frames: &mut mpsc::Receiver<Result<Frame, FrameError>>,
        cancel: &CancellationToken,
    ) -> Result<CloseReason, SessionError> {
        self.send_greeting().await?;

        loop {
            // Handle everything already decoded before the next chunk goes
            // out, so peer commands interleave with our data stream.
            loop {
                match frames.try_recv() {
                    Ok(item) => self.on_frame(item?).await?,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return self.on_eof(),
                }
                if self.finished() {
                    return Ok(CloseReason::Complete);
                }
            }
            if self.finished() {
                return Ok(CloseReason::Complete);
            }
            if cancel.is_cancelled() {
                return Ok(CloseReason::Cancelled);
            }

            if self.want_send() {
                self.pump_outbound().await?;
                continue;
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(CloseReason::Cancelled),
                item = frames.recv() => match item {
                    Some(item) => self.on_frame(item?).await?,
                    None => return self.on_eof(),
                },
                () = tokio::time::sleep(self.config.timeout) => {
                    return Err(SessionError::Timeout);
                }
            }
            if self.finished() {
                return Ok(CloseReason::Complete);
            }
        }
    }

    fn finished(&self) -> bool {
        self.sent_eob
            && self.got_eob
            && self.receiving.is_none()
            && self.driver.as_ref().is_none_or(OutboundDriver::drained)
    }

    fn on_eof(&self) -> Result<CloseReason, SessionError> {
        Err(SessionError::Transport(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "peer closed the connection mid-session",
        )))
    }

    fn authenticated(&self) -> bool {
        matches!(
            self.state,
            SessionState::Authenticated
                | SessionState::SendingBatch
                | SessionState::DrainingBatch
                | SessionState::AwaitingPeerEob
        )
    }

    fn want_send(&self) -> bool {
        self.driver.as_ref().is_some_and(|d| !d.drained())
    }

    fn update_state(&mut self) {
        if !self.authenticated() {
            return;
        }
        self.state = match (self.sent_eob, self.got_eob) {
            (false, false) => SessionState::SendingBatch,
            (false, true) => SessionState::DrainingBatch,
            (true, false) => SessionState::AwaitingPeerEob,
            // Terminal; drive() returns Complete.
            (true, true) => return,
        };
    }

    async fn send_greeting(&mut self) -> Result<(), SessionError> {
        let identity = [
            ("SYS", self.config.system_name.clone()),
            ("ZYZ", self.config.sysop_name.clone()),
            ("LOC", self.config.location.clone()),
        ];
        for (tag, value) in identity {
            if !value.is_empty() {
                self.send(Command::Nul(format!("{tag} {value}"))).await?;
            }
        }
        self.send(Command::Nul(format!(
            "VER binkp-rs/{} {PROTOCOL_VERSION}",
            env!("CARGO_PKG_VERSION")
        )))
        .await?;
        self.send(Command::Nul(format!("TIME {}", unix_now())))
            .await?;

        if let Some(challenge) = self.issued_challenge {
            self.send(Command::Nul(format!(
                "OPT {}{}",
                auth::CRAM_PREFIX,
                hex::encode(challenge)
            )))
            .await?;
        }

        self.send(Command::Adr(self.config.address.to_string()))
            .await
    }

    async fn pump_outbound(&mut self) -> Result<(), SessionError> {
        let step = match self.driver.as_mut() {
            Some(driver) => driver.next_frame().await?,
            None => return Ok(()),
        };
        match step {
            Some(BatchFrame::Announce(info)) => {
                info!(
                    name = %info.name,
                    size = info.size,
                    offset = info.offset,
                    "file send start"
                );
                self.send(Command::File(info)).await
            }
            Some(BatchFrame::Data(chunk)) => {
                self.counters.bytes_tx += chunk.len() as u64;
                self.write_frame(Frame::data(chunk)).await
            }
            Some(BatchFrame::FileDone { name, sent }) => {
                // The driver deduplicates re-sent files, so its count is
                // authoritative.
                self.counters.files_tx =
                    self.driver.as_ref().map_or(0, OutboundDriver::files_sent);
                info!(name = %name, bytes = sent, "file send done");
                Ok(())
            }
            Some(BatchFrame::Eob) => {
                self.send(Command::Eob).await?;
                self.sent_eob = true;
                self.update_state();
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn on_frame(&mut self, frame: Frame) -> Result<(), SessionError> {
        trace!(kind = ?frame.kind, len = frame.payload.len(), "frame rx");
        match classify(frame)? {
            Received::Data(bytes) => self.on_data(&bytes).await,
            Received::Command(command) => self.on_command(command).await,
        }
    }

    async fn on_data(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        if !self.authenticated() {
            return Err(SessionError::Protocol(
                "data frame before authentication".to_owned(),
            ));
        }
        let Some(receiving) = self.receiving.as_mut() else {
            // Frames already in flight when our M_SKIP crossed them.
            if self.skipping.is_some() {
                self.counters.bytes_rx += bytes.len() as u64;
                return Ok(());
            }
            return Err(SessionError::Protocol(
                "data frame without a preceding M_FILE".to_owned(),
            ));
        };
        if bytes.len() as u64 > receiving.remaining() {
            return Err(SessionError::Protocol(format!(
                "{}: data exceeds declared size {}",
                receiving.info().name,
                receiving.info().size
            )));
        }
        self.spool
            .append(receiving, bytes)
            .await
            .map_err(SessionError::Spool)?;
        self.counters.bytes_rx += bytes.len() as u64;
        if receiving.complete() {
            self.finish_receive().await?;
        }
        Ok(())
    }

    async fn finish_receive(&mut self) -> Result<(), SessionError> {
        let receiving = self.receiving.take().expect("complete receive present");
        let info = receiving.info().clone();
        let published = self
            .spool
            .commit(receiving)
            .await
            .map_err(SessionError::Spool)?;
        self.counters.files_rx += 1;
        info!(
            name = %info.name,
            size = info.size,
            path = %published.display(),
            "file recv done"
        );
        self.send(Command::Got(info.to_ref())).await
    }

    async fn on_command(&mut self, command: Command) -> Result<(), SessionError> {
        match command {
            Command::Nul(text) => {
                self.on_nul(&text);
                Ok(())
            }
            Command::Adr(list) => self.on_adr(&list).await,
            Command::Pwd(password) => self.on_pwd(&password).await,
            Command::Ok(_) => self.on_ok().await,
            Command::Eob => self.on_eob(),
            Command::File(info) => self.on_file(info).await,
            Command::Got(ack) => self.on_got(&ack),
            Command::Skip(skip) => self.on_skip(&skip),
            Command::Get(request) => self.on_get(&request).await,
            Command::Err(text) => Err(SessionError::PeerError(text)),
            Command::Bsy(text) => Err(SessionError::PeerBusy(text)),
        }
    }

    fn on_nul(&mut self, text: &str) {
        if let Some(options) = text.strip_prefix("OPT") {
            for token in options.split_whitespace() {
                if let Some(challenge) = auth::parse_challenge(token) {
                    debug!("peer advertised CRAM-MD5");
                    self.peer_challenge = Some(challenge);
                }
            }
        } else {
            debug!(info = %text, "peer info");
        }
    }

    async fn on_adr(&mut self, list: &str) -> Result<(), SessionError> {
        if self.peer.is_some() {
            warn!("duplicate M_ADR ignored");
            return Ok(());
        }
        let Some(peer) = list
            .split_whitespace()
            .find_map(|token| token.parse::<FtnAddress>().ok())
        else {
            return Err(SessionError::Protocol(format!(
                "no parseable address in M_ADR {list:?}"
            )));
        };
        info!(peer = %peer, "peer address");
        self.peer = Some(peer);
        if self.state == SessionState::Greeting {
            self.state = SessionState::AwaitingAuth;
        }

        if self.role == Role::Originating && !self.pwd_sent {
            let peer = self.peer.clone().expect("peer address just stored");
            let secret = self.config.password_for(&peer).unwrap_or_default();
            let response = match (&self.peer_challenge, secret.is_empty()) {
                (Some(challenge), false) => auth::cram_response(secret.as_bytes(), challenge),
                (None, false) => secret,
                (_, true) => String::new(),
            };
            self.pwd_sent = true;
            self.send(Command::Pwd(response)).await?;
        }
        Ok(())
    }

    async fn on_pwd(&mut self, password: &str) -> Result<(), SessionError> {
        if self.role != Role::Answering {
            return Err(SessionError::Protocol(
                "M_PWD sent to the originating side".to_owned(),
            ));
        }
        if self.state != SessionState::AwaitingAuth {
            return Err(SessionError::Protocol("M_PWD out of order".to_owned()));
        }
        let peer = self.peer.clone().expect("AwaitingAuth implies peer address");
        let stored = self.config.password_for(&peer);
        let secure = stored.as_deref().is_some_and(|s| !s.is_empty());
        let challenge = self.issued_challenge.as_ref().map(|c| c.as_slice());

        if !auth::verify_password(stored.as_deref(), challenge, password) {
            warn!(peer = %peer, "auth failed");
            return Err(SessionError::AuthFailed);
        }
        info!(peer = %peer, secure, "auth ok");
        let mode = if secure { "secure" } else { "non-secure" };
        self.send(Command::Ok(mode.to_owned())).await?;
        self.begin_batch()
    }

    async fn on_ok(&mut self) -> Result<(), SessionError> {
        if self.role != Role::Originating || self.state != SessionState::AwaitingAuth {
            return Err(SessionError::Protocol("unexpected M_OK".to_owned()));
        }
        info!("auth ok");
        self.begin_batch()
    }

    fn begin_batch(&mut self) -> Result<(), SessionError> {
        self.state = SessionState::Authenticated;
        let peer = self.peer.clone().expect("authenticated implies peer");
        let items = self.queue.outbound_for(&peer)?;
        debug!(files = items.len(), "outbound batch loaded");
        self.driver = Some(OutboundDriver::new(items, self.config.frame_size));
        self.state = SessionState::SendingBatch;
        self.update_state();
        Ok(())
    }

    async fn on_file(&mut self, info: FileInfo) -> Result<(), SessionError> {
        if !self.authenticated() {
            return Err(SessionError::Protocol(
                "M_FILE before authentication".to_owned(),
            ));
        }
        if let Some(receiving) = &self.receiving {
            return Err(SessionError::Protocol(format!(
                "M_FILE {} while {} is incomplete",
                info.name,
                receiving.info().name
            )));
        }

        self.skipping = None;
        if self.spool.disposition(&info) == Disposition::Skip {
            info!(name = %info.name, "refusing file");
            self.skipping = Some(info.name.clone());
            return self.send(Command::Skip(info.to_ref())).await;
        }

        info!(
            name = %info.name,
            size = info.size,
            offset = info.offset,
            "file recv start"
        );
        if info.offset > 0 {
            // No partial on disk to resume into; ask for the whole file.
            let mut from_zero = info.clone();
            from_zero.offset = 0;
            self.send(Command::Get(from_zero)).await?;
        }
        let receiving = self.spool.begin(&info).await.map_err(SessionError::Spool)?;
        self.receiving = Some(receiving);
        if self.receiving.as_ref().is_some_and(Receiving::complete) {
            // Zero-length file: no data frames will follow.
            self.finish_receive().await?;
        }
        Ok(())
    }

    fn on_eob(&mut self) -> Result<(), SessionError> {
        if !self.authenticated() {
            return Err(SessionError::Protocol(
                "M_EOB before authentication".to_owned(),
            ));
        }
        if let Some(receiving) = &self.receiving {
            return Err(SessionError::Protocol(format!(
                "end of batch while {} is incomplete",
                receiving.info().name
            )));
        }
        self.got_eob = true;
        self.update_state();
        Ok(())
    }

    fn on_got(&mut self, ack: &FileRef) -> Result<(), SessionError> {
        let Some(driver) = self.driver.as_mut() else {
            return Err(SessionError::Protocol(
                "M_GOT before authentication".to_owned(),
            ));
        };
        if driver.handle_got(ack)? {
            debug!(name = %ack.name, "file acknowledged");
        } else {
            warn!(name = %ack.name, "M_GOT for unknown file ignored");
        }
        Ok(())
    }

    fn on_skip(&mut self, skip: &FileRef) -> Result<(), SessionError> {
        let Some(driver) = self.driver.as_mut() else {
            return Err(SessionError::Protocol(
                "M_SKIP before authentication".to_owned(),
            ));
        };
        if driver.handle_skip(skip) {
            info!(name = %skip.name, "file skipped by peer; deferred");
        } else {
            warn!(name = %skip.name, "M_SKIP for unknown file ignored");
        }
        Ok(())
    }

    async fn on_get(&mut self, request: &FileInfo) -> Result<(), SessionError> {
        let Some(driver) = self.driver.as_mut() else {
            return Err(SessionError::Protocol(
                "M_GET before authentication".to_owned(),
            ));
        };
        if driver.handle_get(request).await? {
            info!(name = %request.name, offset = request.offset, "resuming from offset");
        } else {
            warn!(name = %request.name, "M_GET for unknown file ignored");
        }
        Ok(())
    }

    async fn send(&mut self, command: Command) -> Result<(), SessionError> {
        trace!(cmd = %command.id(), "command tx");
        self.write_frame(command.into_frame()).await
    }

    async fn write_frame(&mut self, frame: Frame) -> Result<(), SessionError> {
        trace!(kind = ?frame.kind, len = frame.payload.len(), "frame tx");
        let write = frame::write_frame(&mut self.writer, &frame);
        match tokio::time::timeout(self.config.timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(FrameError::Io(error))) => Err(SessionError::Transport(error)),
            Ok(Err(error)) => Err(error.into()),
            Err(_) => Err(SessionError::Timeout),
        }
    }
}

fn close_reason(error: &SessionError) -> CloseReason {
    match error {
        SessionError::Transport(_) => CloseReason::TransportFailed,
        SessionError::Frame(_) => CloseReason::FrameFormat,
        SessionError::Protocol(_) => CloseReason::ProtocolViolation,
        SessionError::AuthFailed => CloseReason::AuthFailed,
        SessionError::PeerBusy(_) => CloseReason::PeerBusy,
        SessionError::PeerError(_) => CloseReason::PeerError,
        SessionError::Timeout => CloseReason::Timeout,
        SessionError::Queue(_) | SessionError::Spool(_) => CloseReason::LocalError,
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
