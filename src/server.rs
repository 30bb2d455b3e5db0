//! FastAGI listener
//!
//! Accepts connections from Asterisk, runs the metadata handshake for each
//! one and hands ready [`AgiChannel`]s to the application.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    connection::{AgiChannel, AgiChannelOptions},
    constants::{DEFAULT_AGI_PORT, DEFAULT_BIND_ADDRESS, MAX_CHANNEL_QUEUE_SIZE},
    error::{AgiError, AgiResult},
};

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct AgiServerOptions {
    /// TCP port; 0 picks an ephemeral port. Default: 3000.
    pub port: u16,
    /// Default: `0.0.0.0`.
    pub bind_address: String,
    /// Applied to every accepted channel.
    pub channel: AgiChannelOptions,
    /// Ready channels queued for the application before accepting stalls.
    pub max_channels: usize,
}

impl Default for AgiServerOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_AGI_PORT,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            channel: AgiChannelOptions::default(),
            max_channels: MAX_CHANNEL_QUEUE_SIZE,
        }
    }
}

/// Notifications from a running server.
#[derive(Debug)]
#[non_exhaustive]
pub enum ServerEvent {
    /// A call connected and its metadata block is complete.
    Channel(AgiChannel),
    /// The listener failed to accept a connection.
    Error(String),
    /// The server stopped; always last, but skipped when the application
    /// left the event queue full.
    Close,
}

/// Receiver for [`ServerEvent`]s (!Clone).
///
/// Also usable as a [`Stream`].
#[derive(Debug)]
pub struct AgiServerEvents {
    rx: mpsc::Receiver<ServerEvent>,
}

impl AgiServerEvents {
    /// Next event, or None after `Close`.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.rx
            .recv()
            .await
    }
}

impl Stream for AgiServerEvents {
    type Item = ServerEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut()
            .rx
            .poll_recv(cx)
    }
}

struct ServerState {
    channels: Mutex<HashMap<u64, AgiChannel>>,
    next_id: AtomicU64,
    stopping: AtomicBool,
    shutdown: Notify,
}

impl ServerState {
    fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            stopping: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }
}

struct Running {
    state: Arc<ServerState>,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

/// FastAGI server.
///
/// ```rust,no_run
/// use asterisk_agi_tokio::{AgiServer, AgiServerOptions, ServerEvent};
///
/// # async fn example() -> Result<(), asterisk_agi_tokio::AgiError> {
/// let mut server = AgiServer::new(AgiServerOptions::default());
/// let mut events = server.start().await?;
///
/// while let Some(event) = events.recv().await {
///     if let ServerEvent::Channel(channel) = event {
///         tokio::spawn(async move {
///             channel.answer().await?;
///             channel.hangup(None).await
///         });
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct AgiServer {
    options: AgiServerOptions,
    running: Option<Running>,
}

impl std::fmt::Debug for AgiServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgiServer")
            .field("options", &self.options)
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

impl AgiServer {
    pub fn new(options: AgiServerOptions) -> Self {
        Self {
            options,
            running: None,
        }
    }

    pub fn options(&self) -> &AgiServerOptions {
        &self.options
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .as_ref()
            .map(|r| r.local_addr)
    }

    /// Bind and start accepting calls.
    pub async fn start(&mut self) -> AgiResult<AgiServerEvents> {
        if self
            .running
            .is_some()
        {
            return Err(AgiError::protocol_error("server already started"));
        }

        let listener = TcpListener::bind((self.options.bind_address.as_str(), self.options.port)).await?;
        let local_addr = listener.local_addr()?;
        info!("AGI server listening on {}", local_addr);

        let (tx, rx) = mpsc::channel(
            self.options
                .max_channels
                .max(1),
        );
        let state = Arc::new(ServerState::new());
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&state),
            tx,
            self.options
                .channel
                .clone(),
        ));

        self.running = Some(Running {
            state,
            local_addr,
            accept_task,
        });
        Ok(AgiServerEvents { rx })
    }

    /// Number of channels currently open.
    pub async fn active_channels(&self) -> usize {
        match &self.running {
            Some(running) => running
                .state
                .channels
                .lock()
                .await
                .len(),
            None => 0,
        }
    }

    /// Stop accepting, close every open channel and emit `Close`.
    pub async fn stop(&mut self) {
        let Some(running) = self
            .running
            .take()
        else {
            return;
        };
        running
            .state
            .stopping
            .store(true, Ordering::SeqCst);
        running
            .state
            .shutdown
            .notify_one();
        if let Err(e) = running
            .accept_task
            .await
        {
            warn!("Accept loop ended abnormally: {}", e);
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    tx: mpsc::Sender<ServerEvent>,
    options: AgiChannelOptions,
) {
    loop {
        tokio::select! {
            _ = state.shutdown.notified() => break,
            result = listener.accept() => match result {
                Ok((stream, peer)) => spawn_handshake(stream, peer, &state, &tx, &options),
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    publish(&tx, ServerEvent::Error(e.to_string()));
                }
            },
        }
    }
    drop(listener);

    let channels: Vec<AgiChannel> = state
        .channels
        .lock()
        .await
        .drain()
        .map(|(_, channel)| channel)
        .collect();
    info!("AGI server stopping, closing {} channels", channels.len());
    futures_util::future::join_all(
        channels
            .iter()
            .map(|channel| channel.close()),
    )
    .await;

    publish(&tx, ServerEvent::Close);
}

/// Queue a listener-level event without waiting on a receiver that stopped
/// draining.
fn publish(tx: &mpsc::Sender<ServerEvent>, event: ServerEvent) {
    match tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(event)) => {
            warn!("Server event queue full, dropping {:?}", event);
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

fn spawn_handshake(
    stream: TcpStream,
    peer: SocketAddr,
    state: &Arc<ServerState>,
    tx: &mpsc::Sender<ServerEvent>,
    options: &AgiChannelOptions,
) {
    let state = Arc::clone(state);
    let tx = tx.clone();
    let options = options.clone();
    tokio::spawn(async move {
        debug!("Accepted connection from {}", peer);
        let channel = match AgiChannel::from_stream(stream, options).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(peer = %peer, "AGI handshake failed: {}", e);
                return;
            }
        };

        let id = state
            .next_id
            .fetch_add(1, Ordering::Relaxed);
        {
            let mut channels = state
                .channels
                .lock()
                .await;
            if state
                .stopping
                .load(Ordering::SeqCst)
            {
                drop(channels);
                channel
                    .close()
                    .await;
                return;
            }
            channels.insert(id, channel.clone());
        }
        info!(
            peer = %peer,
            "New AGI channel {} ({})",
            channel
                .variables()
                .channel(),
            channel
                .variables()
                .request()
        );

        if tx
            .send(ServerEvent::Channel(channel.clone()))
            .await
            .is_err()
        {
            debug!("Server events receiver dropped, closing channel");
            channel
                .close()
                .await;
        }

        let reason = channel
            .closed()
            .await;
        debug!("Channel {} finished: {}", id, reason);
        state
            .channels
            .lock()
            .await
            .remove(&id);
    });
}
