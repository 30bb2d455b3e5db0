//! Per-call connection engine

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, oneshot, watch, Mutex, Notify};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::{
    command::{to_wire_line, AgiResponse},
    constants::{
        DEFAULT_HANGUP_GRACE_MS, DEFAULT_INIT_TIMEOUT_MS, MAX_EVENT_QUEUE_SIZE, SOCKET_BUF_SIZE,
    },
    error::{AgiError, AgiResult},
    protocol::{AgiMessage, AgiParser},
    variables::ChannelVariables,
};

/// Connection status of a channel
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionStatus {
    /// Socket is open and commands may be sent.
    Connected,
    /// Socket is gone; no further events will follow.
    Disconnected(DisconnectReason),
}

/// Reason for disconnection
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Asterisk closed the socket (EOF)
    ConnectionClosed,
    /// TCP I/O or framing error (io::Error is not Clone, so we store the message)
    IoError(String),
    /// Closed after the hangup grace period
    HangupTeardown,
    /// Application called close()
    ClientRequested,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::ConnectionClosed => write!(f, "connection closed"),
            DisconnectReason::IoError(msg) => write!(f, "I/O error: {}", msg),
            DisconnectReason::HangupTeardown => write!(f, "closed after hangup"),
            DisconnectReason::ClientRequested => write!(f, "client requested close"),
        }
    }
}

/// Notifications published by a channel.
///
/// Every subscriber sees every event, in the order the channel produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AgiEvent {
    /// Raw line received from Asterisk (replies and hangup notices)
    Recv(String),
    /// Exact bytes written for a command
    Send(String),
    /// A reply line decoded into a response
    Response(AgiResponse),
    /// Asterisk reported the call as hung up
    Hangup,
    /// No inbound traffic for the configured idle timeout
    Timeout,
    /// Socket or framing error; a `Close` follows
    Error(String),
    /// The connection is finished; always the last event
    Close(DisconnectReason),
}

/// Options for a single channel.
#[derive(Debug, Clone)]
pub struct AgiChannelOptions {
    /// Tear down the socket after a hangup notice. Default: true.
    pub auto_close_on_hangup: bool,
    /// Delay between the hangup notice and teardown, so the reply to a
    /// command already in flight can still arrive. Default: 1s.
    pub hangup_grace: Duration,
    /// Limit for receiving the metadata block. Default: 5s.
    pub init_timeout: Duration,
    /// Emit [`AgiEvent::Timeout`] after this much inbound silence. Default: off.
    pub idle_timeout: Option<Duration>,
    /// Fail `send_command` if no reply arrives in time. Default: off.
    pub command_timeout: Option<Duration>,
    /// Per-subscriber event queue capacity. Default: 1000.
    pub event_queue_size: usize,
}

impl Default for AgiChannelOptions {
    fn default() -> Self {
        Self {
            auto_close_on_hangup: true,
            hangup_grace: Duration::from_millis(DEFAULT_HANGUP_GRACE_MS),
            init_timeout: Duration::from_millis(DEFAULT_INIT_TIMEOUT_MS),
            idle_timeout: None,
            command_timeout: None,
            event_queue_size: MAX_EVENT_QUEUE_SIZE,
        }
    }
}

/// Reply slot for the command in flight.
#[derive(Default)]
struct PendingReply {
    slot: Option<oneshot::Sender<AgiResponse>>,
    /// Replies still owed to commands that timed out; dropped on arrival.
    stale: u32,
}

impl PendingReply {
    /// Route one reply: to the waiting command, or discard it when it
    /// belongs to a command that already timed out.
    fn deliver(&mut self, response: AgiResponse) {
        if self.stale > 0 {
            self.stale -= 1;
            debug!("[RECV] Dropping late reply of a timed-out command");
        } else if let Some(tx) = self
            .slot
            .take()
        {
            let _ = tx.send(response);
        } else {
            warn!("Received reply but no command is pending");
        }
    }

    /// Give up on the armed command; its reply, if it ever comes, is stale.
    fn abandon(&mut self) {
        if self
            .slot
            .take()
            .is_some()
        {
            self.stale += 1;
        }
    }
}

/// Shared state between AgiChannel and the reader task
struct SharedState {
    pending_reply: Mutex<PendingReply>,
    /// Command reply timeout in milliseconds (0 = disabled)
    command_timeout_ms: AtomicU64,
    /// Wakes the reader for teardown
    shutdown: Notify,
    /// Set once a hangup teardown has been scheduled
    hangup_teardown: AtomicBool,
    /// Set by close(); takes precedence over a scheduled hangup teardown
    close_requested: AtomicBool,
}

/// Handle to one AGI call (Clone + Send)
///
/// Obtained once the metadata block has been received, so
/// [`variables`](Self::variables) is always populated. Commands are
/// serialized through the writer mutex; the reader task routes each reply
/// line to the command waiting for it.
#[derive(Clone)]
pub struct AgiChannel {
    variables: Arc<ChannelVariables>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    shared: Arc<SharedState>,
    status_rx: watch::Receiver<ConnectionStatus>,
    event_tx: broadcast::Sender<AgiEvent>,
    peer_addr: Option<SocketAddr>,
}

impl std::fmt::Debug for AgiChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgiChannel")
            .field("channel", &self.variables.channel())
            .field("unique_id", &self.variables.unique_id())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Event subscription for one channel (!Clone)
///
/// Yields `Err(AgiError::QueueFull)` once per overflow episode when the
/// subscriber fell behind, and `None` after the `Close` event.
pub struct AgiEventStream {
    rx: broadcast::Receiver<AgiEvent>,
    finished: bool,
}

impl std::fmt::Debug for AgiEventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgiEventStream")
            .field("finished", &self.finished)
            .finish()
    }
}

/// Read until the metadata block is complete.
async fn read_variables(
    stream: &mut TcpStream,
    parser: &mut AgiParser,
    read_buffer: &mut [u8],
) -> AgiResult<ChannelVariables> {
    loop {
        if let Some(message) = parser.parse_message()? {
            match message {
                AgiMessage::Variables(variables) => return Ok(variables),
                other => {
                    return Err(AgiError::protocol_error(format!(
                        "expected metadata block, got {:?}",
                        other
                    )))
                }
            }
        }

        let bytes_read = stream
            .read(read_buffer)
            .await?;
        trace!("[INIT] Read {} bytes from socket", bytes_read);
        if bytes_read == 0 {
            return Err(AgiError::ConnectionClosed);
        }
        parser.add_data(&read_buffer[..bytes_read])?;
    }
}

/// Read one chunk; `None` means the idle timeout elapsed first.
async fn read_chunk(
    reader: &mut OwnedReadHalf,
    read_buffer: &mut [u8],
    idle_timeout: Option<Duration>,
) -> Option<std::io::Result<usize>> {
    match idle_timeout {
        Some(limit) => timeout(limit, reader.read(read_buffer))
            .await
            .ok(),
        None => Some(
            reader
                .read(read_buffer)
                .await,
        ),
    }
}

fn schedule_hangup_teardown(shared: &Arc<SharedState>, grace: Duration) {
    if shared
        .hangup_teardown
        .swap(true, Ordering::SeqCst)
    {
        return;
    }
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        debug!("[HANGUP] Grace period over, closing channel");
        shared
            .shutdown
            .notify_one();
    });
}

/// Background reader loop
async fn reader_loop(
    reader: OwnedReadHalf,
    parser: AgiParser,
    shared: Arc<SharedState>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    status_tx: watch::Sender<ConnectionStatus>,
    event_tx: broadcast::Sender<AgiEvent>,
    options: AgiChannelOptions,
) {
    let result = std::panic::AssertUnwindSafe(reader_loop_inner(
        reader,
        parser,
        shared.clone(),
        event_tx.clone(),
        options,
    ));
    let reason = match futures_util::FutureExt::catch_unwind(result).await {
        Ok(reason) => reason,
        Err(_) => {
            tracing::error!("reader task panicked");
            DisconnectReason::IoError("reader task panicked".to_string())
        }
    };

    // Status first: a send_command that registers after the pending slot is
    // cleared below must observe the disconnect.
    let _ = status_tx.send(ConnectionStatus::Disconnected(reason.clone()));
    shared
        .pending_reply
        .lock()
        .await
        .slot
        .take();

    if matches!(
        reason,
        DisconnectReason::HangupTeardown | DisconnectReason::ClientRequested
    ) {
        let mut writer = writer
            .lock()
            .await;
        if let Err(e) = writer
            .shutdown()
            .await
        {
            debug!("Shutdown after {} failed: {}", reason, e);
        }
    }

    info!("Channel closed: {}", reason);
    let _ = event_tx.send(AgiEvent::Close(reason));
}

async fn reader_loop_inner(
    mut reader: OwnedReadHalf,
    mut parser: AgiParser,
    shared: Arc<SharedState>,
    event_tx: broadcast::Sender<AgiEvent>,
    options: AgiChannelOptions,
) -> DisconnectReason {
    let mut read_buffer = vec![0u8; SOCKET_BUF_SIZE];

    loop {
        // Drain every complete line already buffered
        match parser.parse_message() {
            Ok(Some(AgiMessage::Response { line, response })) => {
                debug!("[RECV] {}", line);
                let _ = event_tx.send(AgiEvent::Recv(line));
                let _ = event_tx.send(AgiEvent::Response(response.clone()));

                shared
                    .pending_reply
                    .lock()
                    .await
                    .deliver(response);
                continue;
            }
            Ok(Some(AgiMessage::Hangup { line })) => {
                info!("[RECV] {}", line);
                let _ = event_tx.send(AgiEvent::Recv(line));
                let _ = event_tx.send(AgiEvent::Hangup);
                if options.auto_close_on_hangup {
                    schedule_hangup_teardown(&shared, options.hangup_grace);
                }
                continue;
            }
            Ok(Some(AgiMessage::Variables(_))) => {
                debug!("Ignoring metadata block after initialisation");
                continue;
            }
            Ok(None) => {
                // Need more data from socket
            }
            Err(e) => {
                warn!("Parser error: {}", e);
                let _ = event_tx.send(AgiEvent::Error(e.to_string()));
                return DisconnectReason::IoError(e.to_string());
            }
        }

        let read_result = tokio::select! {
            _ = shared.shutdown.notified() => {
                return if !shared.close_requested.load(Ordering::SeqCst)
                    && shared.hangup_teardown.load(Ordering::SeqCst)
                {
                    DisconnectReason::HangupTeardown
                } else {
                    DisconnectReason::ClientRequested
                };
            }
            result = read_chunk(&mut reader, &mut read_buffer, options.idle_timeout) => result,
        };

        match read_result {
            Some(Ok(0)) => {
                debug!("Connection closed (EOF)");
                return DisconnectReason::ConnectionClosed;
            }
            Some(Ok(n)) => {
                trace!("[RECV] Read {} bytes from socket", n);
                if let Err(e) = parser.add_data(&read_buffer[..n]) {
                    warn!("Buffer error: {}", e);
                    let _ = event_tx.send(AgiEvent::Error(e.to_string()));
                    return DisconnectReason::IoError(e.to_string());
                }
            }
            Some(Err(e)) => {
                warn!("Read error: {}", e);
                let _ = event_tx.send(AgiEvent::Error(e.to_string()));
                return DisconnectReason::IoError(e.to_string());
            }
            None => {
                debug!("Idle timeout elapsed");
                let _ = event_tx.send(AgiEvent::Timeout);
            }
        }
    }
}

impl AgiChannel {
    /// Accept one call from a listener Asterisk connects to.
    pub async fn accept(listener: &TcpListener) -> AgiResult<Self> {
        Self::accept_with_options(listener, AgiChannelOptions::default()).await
    }

    /// Accept one call with custom options
    pub async fn accept_with_options(
        listener: &TcpListener,
        options: AgiChannelOptions,
    ) -> AgiResult<Self> {
        let (stream, addr) = listener
            .accept()
            .await?;
        info!("Accepted AGI connection from {}", addr);
        Self::from_stream(stream, options).await
    }

    /// Take over an accepted connection: read the metadata block, then hand
    /// the socket to a background reader.
    ///
    /// Returns once the channel is ready, i.e. its metadata is complete.
    pub async fn from_stream(mut stream: TcpStream, options: AgiChannelOptions) -> AgiResult<Self> {
        let peer_addr = stream
            .peer_addr()
            .ok();
        let _ = stream.set_nodelay(true);

        let mut parser = AgiParser::new();
        let mut read_buffer = vec![0u8; SOCKET_BUF_SIZE];

        let init_timeout_ms = options
            .init_timeout
            .as_millis() as u64;
        let variables = match timeout(
            options.init_timeout,
            read_variables(&mut stream, &mut parser, &mut read_buffer),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!("[INIT] No metadata block within {}ms", init_timeout_ms);
                return Err(AgiError::Timeout {
                    timeout_ms: init_timeout_ms,
                });
            }
        };

        debug!(
            "[INIT] Channel {} ready ({} variables)",
            variables.channel(),
            variables
                .iter()
                .count()
        );
        Ok(Self::split_and_spawn(stream, parser, variables, peer_addr, options))
    }

    fn split_and_spawn(
        stream: TcpStream,
        parser: AgiParser,
        variables: ChannelVariables,
        peer_addr: Option<SocketAddr>,
        options: AgiChannelOptions,
    ) -> Self {
        let queue_size = options
            .event_queue_size
            .max(1);
        let (read_half, write_half) = stream.into_split();

        let shared = Arc::new(SharedState {
            pending_reply: Mutex::new(PendingReply::default()),
            command_timeout_ms: AtomicU64::new(
                options
                    .command_timeout
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0),
            ),
            shutdown: Notify::new(),
            hangup_teardown: AtomicBool::new(false),
            close_requested: AtomicBool::new(false),
        });
        let writer = Arc::new(Mutex::new(write_half));

        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connected);
        let (event_tx, _) = broadcast::channel(queue_size);

        tokio::spawn(reader_loop(
            read_half,
            parser,
            shared.clone(),
            writer.clone(),
            status_tx,
            event_tx.clone(),
            options,
        ));

        AgiChannel {
            variables: Arc::new(variables),
            writer,
            shared,
            status_rx,
            event_tx,
            peer_addr,
        }
    }

    /// Metadata Asterisk sent for this call.
    pub fn variables(&self) -> &ChannelVariables {
        &self.variables
    }

    /// Remote address of the Asterisk side, if known.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Subscribe to channel events from this point on.
    pub fn subscribe(&self) -> AgiEventStream {
        AgiEventStream {
            rx: self
                .event_tx
                .subscribe(),
            finished: !self.is_connected(),
        }
    }

    /// Send one command line and wait for its reply.
    ///
    /// The reply slot is armed before the line is written, so a fast reply
    /// cannot be missed. The writer lock is held until the reply arrives:
    /// AGI allows one command in flight, and a concurrent caller waits its
    /// turn instead of receiving someone else's reply.
    ///
    /// ```rust,no_run
    /// # async fn example(channel: &asterisk_agi_tokio::AgiChannel) -> Result<(), asterisk_agi_tokio::AgiError> {
    /// let resp = channel.send_command("GET VARIABLE CALLERID(num)").await?;
    /// println!("{}", resp.arguments().nokey());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn send_command(&self, command: &str) -> AgiResult<AgiResponse> {
        if !self.is_connected() {
            return Err(AgiError::NotConnected);
        }

        let line = to_wire_line(command)?;

        // Lock writer — serializes concurrent commands and holds through reply.
        let mut writer = self
            .writer
            .lock()
            .await;

        // Set up reply channel
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self
                .shared
                .pending_reply
                .lock()
                .await;
            pending.slot = Some(tx);
        }
        if !self.is_connected() {
            self.clear_pending()
                .await;
            return Err(AgiError::ConnectionClosed);
        }

        debug!("[SEND] {}", line.trim_end());
        let _ = self
            .event_tx
            .send(AgiEvent::Send(line.clone()));

        if let Err(e) = writer
            .write_all(line.as_bytes())
            .await
        {
            warn!("[SEND] Write failed: {}", e);
            self.clear_pending()
                .await;
            return Err(AgiError::Io(e));
        }

        let timeout_ms = self
            .shared
            .command_timeout_ms
            .load(Ordering::Relaxed);
        let reply = if timeout_ms == 0 {
            rx.await
        } else {
            match timeout(Duration::from_millis(timeout_ms), rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    // Asterisk still owes this reply; the next command must
                    // not receive it.
                    self.shared
                        .pending_reply
                        .lock()
                        .await
                        .abandon();
                    warn!("[SEND] No reply within {}ms: {}", timeout_ms, line.trim_end());
                    drop(writer);
                    return Err(AgiError::Timeout { timeout_ms });
                }
            }
        };
        drop(writer);

        let response = reply.map_err(|_| AgiError::ConnectionClosed)?;
        trace!(
            "Received response: code={:?} result={}",
            response.code(),
            response.result()
        );
        Ok(response)
    }

    async fn clear_pending(&self) {
        self.shared
            .pending_reply
            .lock()
            .await
            .slot
            .take();
    }

    /// Set the command reply timeout; `None` waits indefinitely (default).
    pub fn set_command_timeout(&self, duration: Option<Duration>) {
        self.shared
            .command_timeout_ms
            .store(
                duration
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0),
                Ordering::Relaxed,
            );
    }

    /// Whether the connection is alive (not yet disconnected).
    pub fn is_connected(&self) -> bool {
        matches!(
            *self
                .status_rx
                .borrow(),
            ConnectionStatus::Connected
        )
    }

    /// Current connection status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.status_rx
            .borrow()
            .clone()
    }

    /// Wait until the connection is closed and return why.
    pub async fn closed(&self) -> DisconnectReason {
        let mut status_rx = self
            .status_rx
            .clone();
        loop {
            if let ConnectionStatus::Disconnected(reason) = &*status_rx.borrow_and_update() {
                return reason.clone();
            }
            if status_rx
                .changed()
                .await
                .is_err()
            {
                return DisconnectReason::ConnectionClosed;
            }
        }
    }

    /// Close the connection.
    ///
    /// A command still waiting for its reply fails with
    /// [`AgiError::ConnectionClosed`].
    pub async fn close(&self) {
        if !self.is_connected() {
            return;
        }
        info!("Client requested close");
        self.shared
            .close_requested
            .store(true, Ordering::SeqCst);
        self.shared
            .shutdown
            .notify_one();
        self.closed()
            .await;
    }
}

impl AgiEventStream {
    /// Receive the next event, or None once the channel has closed.
    pub async fn recv(&mut self) -> Option<AgiResult<AgiEvent>> {
        if self.finished {
            return None;
        }
        match self
            .rx
            .recv()
            .await
        {
            Ok(event) => {
                if matches!(event, AgiEvent::Close(_)) {
                    self.finished = true;
                }
                Some(Ok(event))
            }
            Err(broadcast::error::RecvError::Lagged(dropped)) => {
                warn!("Event subscriber lagged, {} events dropped", dropped);
                Some(Err(AgiError::QueueFull { dropped }))
            }
            Err(broadcast::error::RecvError::Closed) => {
                self.finished = true;
                None
            }
        }
    }
}
