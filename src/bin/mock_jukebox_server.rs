use anyhow::{bail, Context};
use clap::Parser;
use jukebox_client::mock_server::{MockJukeboxServer, MockServerConfig, MockSong};
use log::info;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "mock_jukebox_server")]
#[command(about = "Mock jukebox server that streams mp3 files from a directory")]
struct Args {
    /// Directory containing the .mp3 files to serve (sibling .info files are used for INFO)
    directory: PathBuf,

    /// Address to bind the TCP server to
    #[arg(short, long, default_value = "127.0.0.1:8888")]
    address: String,

    /// Repeat each song until the client disconnects
    #[arg(long)]
    loop_audio: bool,

    /// Pause between 4096-byte audio chunks, in milliseconds
    #[arg(long, default_value = "0")]
    chunk_delay_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    info!("🚀 Starting mock jukebox server with args: {:?}", args);

    let songs = load_songs(&args.directory)?;
    let config = MockServerConfig {
        bind_address: args.address,
        songs,
        loop_audio: args.loop_audio,
        chunk_delay: Duration::from_millis(args.chunk_delay_ms),
    };

    let handle = MockJukeboxServer::new(config)
        .start()
        .await
        .context("failed to start mock jukebox server")?;
    println!("🎵 Mock jukebox server listening on {}", handle.address());

    tokio::signal::ctrl_c().await?;
    info!("🛑 Received Ctrl+C, shutting down...");
    Ok(())
}

fn load_songs(directory: &Path) -> anyhow::Result<Vec<MockSong>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(directory)
        .with_context(|| format!("cannot read {}", directory.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "mp3"))
        .collect();
    paths.sort();

    if paths.is_empty() {
        bail!("no .mp3 files found in {}", directory.display());
    }

    paths
        .into_iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let audio =
                std::fs::read(&path).with_context(|| format!("cannot read {}", path.display()))?;
            let song = MockSong::new(name, audio);
            Ok(match std::fs::read_to_string(path.with_extension("info")) {
                Ok(info) => song.with_info(info),
                Err(_) => song,
            })
        })
        .collect()
}
