use crate::protocol::{
    read_frame, read_presence_marker, Frame, ProtocolError, Request, DEFAULT_MAX_FRAME_BYTES,
};
use log::{debug, info};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::TcpStream;

/// Opens one fresh connection per protocol exchange.
///
/// The jukebox protocol has no session concept, so nothing is pooled or reused.
/// LIST/INFO connections are closed as soon as their frame is decoded; a PLAY
/// connection is handed to the caller as a [`PlayStream`] and lives as long as it does.
///
/// Without a response timeout an unresponsive server blocks the caller indefinitely.
#[derive(Debug, Clone)]
pub struct SessionConnector {
    server_address: String,
    response_timeout: Option<Duration>,
    max_frame_bytes: usize,
}

impl SessionConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            server_address: address.into(),
            response_timeout: None,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Bound connect and response reads by `timeout`
    pub fn with_response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// Get the server address
    pub fn server_address(&self) -> &str {
        &self.server_address
    }

    /// Send a LIST or INFO request and decode its framed response.
    ///
    /// Both responses share the same framing; only the request text differs.
    pub async fn send_and_frame(&self, request: &Request) -> Result<Frame, ProtocolError> {
        let stream = self.open(request).await?;
        let mut reader = BufReader::new(stream);
        let frame = self
            .bounded(read_frame(&mut reader, self.max_frame_bytes))
            .await?;

        debug!("🔌 Closing connection for '{}'", request);
        Ok(frame)
    }

    /// Send `PLAY <index>` and return the audio stream once the server has
    /// confirmed the song with its presence marker.
    pub async fn open_stream(&self, index: u32) -> Result<PlayStream, ProtocolError> {
        let request = Request::Play(index);
        let mut stream = self.open(&request).await?;
        let marker = self.bounded(read_presence_marker(&mut stream)).await?;

        debug!("🎵 Song {} confirmed (marker {:#04x})", index, marker);
        Ok(PlayStream { index, stream })
    }

    async fn open(&self, request: &Request) -> Result<TcpStream, ProtocolError> {
        debug!("📡 Connecting to {} for '{}'", self.server_address, request);

        let mut stream = self
            .bounded(async {
                TcpStream::connect(&self.server_address)
                    .await
                    .map_err(ProtocolError::from)
            })
            .await?;
        stream.write_all(&request.to_bytes()).await?;
        stream.flush().await?;

        info!("📤 Sent '{}' to {}", request, self.server_address);
        Ok(stream)
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T, ProtocolError>
    where
        F: Future<Output = Result<T, ProtocolError>>,
    {
        match self.response_timeout {
            Some(limit) => tokio::time::timeout(limit, operation)
                .await
                .map_err(|_| ProtocolError::Timeout)?,
            None => operation.await,
        }
    }
}

/// Raw audio bytes of an accepted PLAY request, marker already consumed.
///
/// Dropping the stream closes the connection.
#[derive(Debug)]
pub struct PlayStream {
    index: u32,
    stream: TcpStream,
}

impl PlayStream {
    /// Song index this stream was opened for
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl AsyncRead for PlayStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}
