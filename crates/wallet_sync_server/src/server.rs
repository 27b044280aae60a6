//! TCP server and per-connection loop.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::session::{Session, Step};
use crate::stats::ServerStats;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};
use wallet_store::Store;
use wallet_sync_protocol::{encode_frame, FrameDecoder, ServerMessage};

/// Stops a running [`SyncServer`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Stops accepting connections and tells every session to roll back and
    /// close. [`SyncServer::run`] returns once all sessions are gone.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// The sync server.
///
/// Accepts TCP connections and runs one [`Session`] per connection on its
/// own task. Sessions share nothing but the store.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use wallet_store::MemoryStore;
/// use wallet_sync_server::{ServerConfig, SyncServer};
///
/// # async fn run() -> wallet_sync_server::ServerResult<()> {
/// let server = SyncServer::bind(ServerConfig::default(), Arc::new(MemoryStore::new())).await?;
/// let shutdown = server.shutdown_handle();
/// tokio::spawn(async move {
///     let _ = tokio::signal::ctrl_c().await;
///     shutdown.shutdown();
/// });
/// server.run().await
/// # }
/// ```
pub struct SyncServer<S: Store> {
    listener: TcpListener,
    config: ServerConfig,
    store: Arc<S>,
    stats: Arc<ServerStats>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl<S: Store> SyncServer<S> {
    /// Binds the listener.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the address cannot be bound.
    pub async fn bind(config: ServerConfig, store: Arc<S>) -> ServerResult<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        info!(addr = %listener.local_addr()?, "sync server listening");
        let (tx, _) = watch::channel(false);

        Ok(Self {
            listener,
            config,
            store,
            stats: Arc::new(ServerStats::new()),
            shutdown: Arc::new(tx),
        })
    }

    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the socket address cannot be read.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the live statistics.
    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    /// Returns a handle that stops the server.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown),
        }
    }

    /// Serves connections until shutdown, then waits for every session.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok`; accept failures are logged and
    /// skipped.
    pub async fn run(self) -> ServerResult<()> {
        let Self {
            listener,
            config,
            store,
            stats,
            shutdown,
        } = self;
        let config = Arc::new(config);
        let limit = Arc::new(Semaphore::new(config.max_connections));
        let mut shutdown_rx = shutdown.subscribe();
        let mut tasks = JoinSet::new();

        loop {
            if *shutdown_rx.borrow_and_update() {
                break;
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let Ok(permit) = Arc::clone(&limit).try_acquire_owned() else {
                        warn!(%peer, max = config.max_connections, "connection limit reached, rejecting");
                        stats.record_rejected();
                        drop(stream);
                        continue;
                    };

                    stats.record_accepted();
                    tasks.spawn(serve_connection(
                        stream,
                        peer,
                        Arc::clone(&store),
                        Arc::clone(&config),
                        Arc::clone(&stats),
                        shutdown.subscribe(),
                        permit,
                    ));
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "session task failed");
                    }
                }
            }
        }

        drop(listener);
        info!(sessions = tasks.len(), "sync server stopping");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "session task failed");
            }
        }
        info!("sync server stopped");
        Ok(())
    }
}

impl<S: Store> std::fmt::Debug for SyncServer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncServer")
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

#[instrument(name = "session", skip_all, fields(%peer))]
async fn serve_connection<S: Store>(
    mut stream: TcpStream,
    peer: SocketAddr,
    store: Arc<S>,
    config: Arc<ServerConfig>,
    stats: Arc<ServerStats>,
    mut shutdown: watch::Receiver<bool>,
    _permit: OwnedSemaphorePermit,
) {
    debug!("connection accepted");
    let mut session = Session::new(store);
    let mut decoder = FrameDecoder::with_max_frame_len(config.max_frame_len);

    match drive(&mut stream, &mut session, &mut decoder, &config, &mut shutdown).await {
        Ok(()) => {}
        Err(e) => {
            if e.is_server_error() {
                error!(error = %e, "session failed");
            }
            session.abort(&e);
        }
    }

    if let Err(e) = stream.shutdown().await {
        debug!(error = %e, "socket shutdown failed");
    }
    let committed = session.is_committed();
    drop(session);
    stats.record_session_end(committed);
    debug!(committed, "connection closed");
}

/// Reads frames and feeds them to the session until it asks to close or the
/// connection fails.
async fn drive<S: Store>(
    stream: &mut TcpStream,
    session: &mut Session<S>,
    decoder: &mut FrameDecoder,
    config: &ServerConfig,
    shutdown: &mut watch::Receiver<bool>,
) -> ServerResult<()> {
    loop {
        while let Some(frame) = decoder.decode_next()? {
            debug!(phase = %session.phase(), len = frame.len(), "frame received");
            match session.handle_frame(&frame) {
                Step::Reply(message) => send(stream, &message).await?,
                Step::ReplyAndClose(message) => {
                    send(stream, &message).await?;
                    return Ok(());
                }
                Step::Close => return Ok(()),
            }
        }

        if *shutdown.borrow() {
            return Err(ServerError::ShuttingDown);
        }

        decoder.buffer_mut().reserve(config.read_buffer_size);
        let read = tokio::select! {
            read = timeout(config.idle_timeout, stream.read_buf(decoder.buffer_mut())) => read,
            _ = shutdown.changed() => return Err(ServerError::ShuttingDown),
        };

        match read {
            Err(_) => return Err(ServerError::IdleTimeout(config.idle_timeout)),
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(0)) => {
                decoder.finish()?;
                return Err(ServerError::Disconnected);
            }
            Ok(Ok(_)) => {}
        }
    }
}

async fn send(stream: &mut TcpStream, message: &ServerMessage) -> ServerResult<()> {
    let payload = message.encode()?;
    let frame = encode_frame(&payload)?;
    stream.write_all(&frame).await?;
    debug!(message = message.name(), len = payload.len(), "message sent");
    Ok(())
}
