use std::fmt;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};

/// Bytes that follow the declared length in every LIST/INFO frame.
///
/// The server always delivers `N + 6` payload bytes after a header of `N`.
/// The value is a fixed protocol parameter and must be honored exactly.
pub const FRAME_TRAILER_LEN: usize = 6;

/// Default upper bound on `N + FRAME_TRAILER_LEN` (1MB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Longest header line accepted: the digits of any `u64` plus CRLF
pub const MAX_HEADER_LEN: usize = 22;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed before the frame header was received")]
    MissingHeader,

    #[error("Invalid frame header: {0:?}")]
    InvalidHeader(String),

    #[error("Frame of {0} bytes (trailer included) exceeds the configured maximum")]
    FrameTooLarge(usize),

    #[error("Short frame: expected {expected} bytes, received {received}")]
    ShortFrame { expected: usize, received: usize },

    #[error("Invalid song request, please try again")]
    InvalidSongRequest,

    #[error("Timed out waiting for the server")]
    Timeout,
}

/// Requests a client can put on the wire
///
/// STOP and EXIT never leave the client, so they have no wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    List,
    Info(u32),
    Play(u32),
}

impl Request {
    /// Encode the request as sent on the wire: the command text with no terminator
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::List => write!(f, "LIST"),
            Request::Info(index) => write!(f, "INFO {}", index),
            Request::Play(index) => write!(f, "PLAY {}", index),
        }
    }
}

/// A decoded LIST/INFO response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    length: usize,
    payload: Vec<u8>,
}

impl Frame {
    /// Declared length from the header line
    pub fn length(&self) -> usize {
        self.length
    }

    /// All `length + FRAME_TRAILER_LEN` payload bytes, verbatim
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload decoded as text, trailer included
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Payload text without the NUL padding servers put in the trailer
    pub fn display_text(&self) -> String {
        self.text().trim_end_matches('\0').to_string()
    }
}

/// Read one LIST/INFO frame.
///
/// Reads the decimal header line `N`, then exactly `N + FRAME_TRAILER_LEN` bytes,
/// line separators inside the payload included. Never reads past the frame and
/// never returns a short one.
pub async fn read_frame<R>(reader: &mut R, max_frame_bytes: usize) -> Result<Frame, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut header = String::new();
    let header_bytes = (&mut *reader)
        .take(MAX_HEADER_LEN as u64)
        .read_line(&mut header)
        .await?;
    if header_bytes == 0 {
        return Err(ProtocolError::MissingHeader);
    }
    if !header.ends_with('\n') {
        return Err(ProtocolError::InvalidHeader(header));
    }

    let digits = header.trim_end_matches(['\r', '\n']);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::InvalidHeader(digits.to_string()));
    }
    let length: usize = digits
        .parse()
        .map_err(|_| ProtocolError::InvalidHeader(digits.to_string()))?;

    let expected = length.saturating_add(FRAME_TRAILER_LEN);
    if expected > max_frame_bytes {
        return Err(ProtocolError::FrameTooLarge(expected));
    }

    let mut payload = vec![0u8; expected];
    let mut received = 0;
    while received < expected {
        let n = reader.read(&mut payload[received..]).await?;
        if n == 0 {
            return Err(ProtocolError::ShortFrame { expected, received });
        }
        received += n;
    }

    log::debug!("📥 Decoded frame: header {} ({} bytes)", length, expected);
    Ok(Frame { length, payload })
}

/// Read the presence marker that opens every valid PLAY response.
///
/// An exhausted stream means the server rejected the song.
pub async fn read_presence_marker<R>(reader: &mut R) -> Result<u8, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut marker = [0u8; 1];
    match reader.read(&mut marker).await? {
        0 => Err(ProtocolError::InvalidSongRequest),
        _ => Ok(marker[0]),
    }
}

/// Build a LIST/INFO frame the way the jukebox server does: header, text, NUL trailer
pub fn encode_frame(text: &str) -> Vec<u8> {
    let header = format!("{}\n", text.len());
    let mut bytes = Vec::with_capacity(header.len() + text.len() + FRAME_TRAILER_LEN);
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(text.as_bytes());
    bytes.extend_from_slice(&[0u8; FRAME_TRAILER_LEN]);
    bytes
}
