//! Async protocol client for end-to-end tests.

use bytes::BytesMut;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use wallet_sync_protocol::{
    encode_frame, AuthRequest, AuthResponse, AuthStatus, Entity, EntityAck, EntityRequest,
    EntityResponse, FrameDecoder, FrameError, Message, ProtocolError, Timestamp,
};

/// How long the client waits for a server frame.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Client-side failures.
#[derive(Error, Debug)]
pub enum ClientError {
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The server sent an invalid frame.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// The server sent an unexpected message.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server closed the connection.
    #[error("connection closed by server")]
    Closed,

    /// No reply arrived in time.
    #[error("no reply within {0:?}")]
    Timeout(Duration),
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// One side of a sync exchange for a kind.
#[derive(Debug, Clone, Default)]
pub struct KindExchange {
    /// What the server sent.
    pub server_delta: EntityResponse,
    /// The timestamp it acknowledged.
    pub new_server_timestamp: Timestamp,
}

/// A protocol client speaking to a live server.
#[derive(Debug)]
pub struct TestClient {
    stream: TcpStream,
    decoder: FrameDecoder,
    reply_timeout: Duration,
}

impl TestClient {
    /// Connects to `addr`.
    pub async fn connect(addr: SocketAddr) -> ClientResult<Self> {
        Ok(Self {
            stream: TcpStream::connect(addr).await?,
            decoder: FrameDecoder::new(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        })
    }

    /// Sets how long to wait for replies.
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Sends a message as one frame.
    pub async fn send<M: Message>(&mut self, message: &M) -> ClientResult<()> {
        let frame = encode_frame(&message.encode()?)?;
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    /// Sends raw bytes, framed or not.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> ClientResult<()> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    /// Receives the next frame and decodes it as `M`.
    pub async fn recv<M: Message>(&mut self) -> ClientResult<M> {
        let frame = self.recv_frame().await?;
        Ok(M::decode(&frame)?)
    }

    /// Receives the next raw frame payload.
    pub async fn recv_frame(&mut self) -> ClientResult<bytes::Bytes> {
        loop {
            if let Some(frame) = self.decoder.decode_next()? {
                return Ok(frame);
            }
            if self.read_more().await? == 0 {
                return Err(ClientError::Closed);
            }
        }
    }

    /// Waits until the server closes the connection, ignoring any frames.
    pub async fn expect_closed(&mut self) -> ClientResult<()> {
        loop {
            match self.read_more().await {
                Ok(0) => return Ok(()),
                Ok(_) => {}
                // A reset counts as closed.
                Err(ClientError::Io(_)) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Sends an auth request and returns the status.
    pub async fn auth(&mut self, request: AuthRequest) -> ClientResult<AuthStatus> {
        self.send(&request).await?;
        Ok(self.recv::<AuthResponse>().await?.status)
    }

    /// Requests the server delta since `since`.
    pub async fn request_delta(&mut self, since: Timestamp) -> ClientResult<EntityResponse> {
        self.send(&EntityRequest::since(since)).await?;
        self.recv().await
    }

    /// Sends the client delta and returns the acknowledged timestamp.
    pub async fn push_delta(
        &mut self,
        added: Vec<Entity>,
        modified: Vec<Entity>,
    ) -> ClientResult<Timestamp> {
        self.send(&EntityResponse { added, modified }).await?;
        Ok(self.recv::<EntityAck>().await?.new_server_timestamp)
    }

    /// Runs one kind's request/response/ack round.
    pub async fn exchange(
        &mut self,
        since: Timestamp,
        added: Vec<Entity>,
        modified: Vec<Entity>,
    ) -> ClientResult<KindExchange> {
        let server_delta = self.request_delta(since).await?;
        let new_server_timestamp = self.push_delta(added, modified).await?;
        Ok(KindExchange {
            server_delta,
            new_server_timestamp,
        })
    }

    async fn read_more(&mut self) -> ClientResult<usize> {
        let buf: &mut BytesMut = self.decoder.buffer_mut();
        buf.reserve(4096);
        match tokio::time::timeout(self.reply_timeout, self.stream.read_buf(buf)).await {
            Ok(read) => Ok(read?),
            Err(_) => Err(ClientError::Timeout(self.reply_timeout)),
        }
    }
}
