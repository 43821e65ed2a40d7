use jukebox_protocol::encode_frame;
use log::{debug, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Audio is streamed in chunks of this many bytes
pub const CHUNK_SIZE: usize = 4096;

/// First byte of every accepted PLAY response
pub const PRESENCE_MARKER: u8 = b'1';

/// A song served by the mock jukebox
#[derive(Debug, Clone)]
pub struct MockSong {
    pub name: String,
    pub info: Option<String>,
    pub audio: Vec<u8>,
}

impl MockSong {
    pub fn new(name: impl Into<String>, audio: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            info: None,
            audio,
        }
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }
}

/// Configuration for the mock jukebox server
#[derive(Debug, Clone)]
pub struct MockServerConfig {
    /// Address to bind the TCP server to (use "127.0.0.1:0" for random port)
    pub bind_address: String,
    pub songs: Vec<MockSong>,
    /// Repeat a song's audio until the client goes away
    pub loop_audio: bool,
    /// Pause between audio chunks
    pub chunk_delay: Duration,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(), // Random port
            songs: Vec::new(),
            loop_audio: false,
            chunk_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct ServerStats {
    connections: AtomicUsize,
    open_streams: AtomicUsize,
    requests: Mutex<Vec<String>>,
}

/// In-process jukebox server speaking the same protocol as the real one
pub struct MockJukeboxServer {
    config: MockServerConfig,
}

impl MockJukeboxServer {
    pub fn new(config: MockServerConfig) -> Self {
        info!("🎵 Mock jukebox server configured:");
        info!("  📁 Songs: {}", config.songs.len());
        info!("  🔄 Loop: {}", config.loop_audio);
        info!("  ⏱️ Chunk delay: {:?}", config.chunk_delay);
        Self { config }
    }

    /// Bind and serve in the background until the handle is dropped
    pub async fn start(self) -> io::Result<MockServerHandle> {
        let listener = TcpListener::bind(&self.config.bind_address).await?;
        let address = listener.local_addr()?;
        info!("🎵 Mock jukebox server listening on {}", address);

        let config = Arc::new(self.config);
        let stats = Arc::new(ServerStats::default());
        let accept_stats = Arc::clone(&stats);

        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, peer)) => {
                        accept_stats.connections.fetch_add(1, Ordering::SeqCst);
                        debug!("📡 Client connected: {}", peer);
                        let config = Arc::clone(&config);
                        let stats = Arc::clone(&accept_stats);
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(socket, &config, &stats).await {
                                debug!("Client {} went away: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => warn!("⚠️ Failed to accept connection: {}", e),
                }
            }
        });

        Ok(MockServerHandle {
            address,
            stats,
            accept_task,
        })
    }
}

/// Handle to a running mock server; dropping it stops accepting connections
pub struct MockServerHandle {
    address: SocketAddr,
    stats: Arc<ServerStats>,
    accept_task: JoinHandle<()>,
}

impl MockServerHandle {
    pub fn address(&self) -> String {
        self.address.to_string()
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }

    /// Connections accepted so far
    pub fn connection_count(&self) -> usize {
        self.stats.connections.load(Ordering::SeqCst)
    }

    /// PLAY connections currently being streamed to
    pub fn open_streams(&self) -> usize {
        self.stats.open_streams.load(Ordering::SeqCst)
    }

    /// Request texts received, in arrival order
    pub fn requests(&self) -> Vec<String> {
        self.stats
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for MockServerHandle {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// LIST payload: a title line, then one `\t<index>) <name>` line per song
pub fn song_listing(songs: &[MockSong]) -> String {
    let mut listing = String::from("Songs available to stream:\n");
    for (index, song) in songs.iter().enumerate() {
        listing.push_str(&format!("\t{}) {}\n", index, song.name));
    }
    listing
}

/// INFO payload for `index`
pub fn song_info(songs: &[MockSong], index: Option<usize>) -> String {
    match index.and_then(|i| songs.get(i)) {
        Some(MockSong {
            info: Some(info), ..
        }) if !info.is_empty() => info.clone(),
        Some(_) => "Info could not be found!".to_string(),
        None => "Invalid song number!".to_string(),
    }
}

async fn handle_client(
    mut socket: TcpStream,
    config: &MockServerConfig,
    stats: &ServerStats,
) -> io::Result<()> {
    // Requests carry no terminator; one read is one request
    let mut buffer = [0u8; 1024];
    let n = socket.read(&mut buffer).await?;
    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buffer[..n]).trim().to_string();
    debug!("📥 Received request: {:?}", request);
    stats
        .requests
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(request.clone());

    let mut parts = request.split(' ');
    let verb = parts.next().unwrap_or_default();
    let index = parts.next().and_then(|arg| arg.parse::<usize>().ok());

    match (verb, index) {
        ("LIST", _) => {
            socket
                .write_all(&encode_frame(&song_listing(&config.songs)))
                .await?
        }
        ("INFO", index) => {
            socket
                .write_all(&encode_frame(&song_info(&config.songs, index)))
                .await?
        }
        ("PLAY", Some(index)) if index < config.songs.len() => {
            stats.open_streams.fetch_add(1, Ordering::SeqCst);
            let result = stream_song(&mut socket, config, &config.songs[index]).await;
            stats.open_streams.fetch_sub(1, Ordering::SeqCst);
            result?
        }
        _ => debug!("Rejecting request {:?}", request),
    }

    socket.shutdown().await
}

async fn stream_song(
    socket: &mut TcpStream,
    config: &MockServerConfig,
    song: &MockSong,
) -> io::Result<()> {
    info!("🎵 Streaming {} ({} bytes)", song.name, song.audio.len());
    socket.write_all(&[PRESENCE_MARKER]).await?;

    loop {
        for chunk in song.audio.chunks(CHUNK_SIZE) {
            socket.write_all(chunk).await?;
            if !config.chunk_delay.is_zero() {
                tokio::time::sleep(config.chunk_delay).await;
            }
        }
        if !config.loop_audio || song.audio.is_empty() {
            return Ok(());
        }
    }
}
