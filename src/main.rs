use clap::Parser;
use jukebox_client::{
    audio_sink::build_sink, config::ClientConfig, dispatcher::CommandDispatcher,
    playback::PlaybackController, Result as JukeboxResult,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::BufReader;

#[derive(Parser)]
#[command(name = "jukebox-client")]
#[command(about = "Interactive client for a jukebox streaming server")]
#[command(long_about = "
Interactive client for a jukebox streaming server.

Each command opens a fresh connection to the server. PLAY streams the song in
the background until it ends, STOP is entered, or another song is played.

EXAMPLES:
  # Discard audio (protocol testing)
  jukebox-client 127.0.0.1 8888

  # Decode with mpg123
  jukebox-client 127.0.0.1 8888 --player \"mpg123 -q -\"

  # Save the stream of the last played song
  jukebox-client 127.0.0.1 8888 --save /tmp/song.mp3
")]
struct Args {
    /// Jukebox server host, e.g. localhost OR 10.116.70.158
    host: String,

    /// Jukebox server port, e.g. 8888
    port: u16,

    /// Player command the audio stream is piped into
    #[arg(long)]
    player: Option<String>,

    /// Write the audio stream to this file instead of playing it
    #[arg(long)]
    save: Option<PathBuf>,

    /// Give up on a server response after this many milliseconds (0 waits forever)
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    env_logger::init();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Client failed: {}", e);
            eprintln!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> JukeboxResult<()> {
    let mut config = ClientConfig::new(args.host, args.port).load_env()?;
    if let Some(millis) = args.timeout_ms {
        config = config.with_timeout_ms(millis);
    }
    if let Some(player) = args.player {
        config = config.with_player_command(player)?;
    }
    if let Some(path) = args.save {
        config = config.with_save_path(path);
    }
    log::info!("🚀 Starting jukebox client with {:?}", config);

    println!(
        "Client: Connecting to host {} on port {}",
        config.host, config.port
    );

    let (playback, playback_errors) = PlaybackController::new(build_sink(&config), config.chunk_size);
    let mut dispatcher =
        CommandDispatcher::new(config.connector(), playback, playback_errors, tokio::io::stdout());

    dispatcher.bootstrap().await?;
    dispatcher.run(BufReader::new(tokio::io::stdin())).await
}
