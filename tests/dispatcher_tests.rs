//! # Dispatcher Tests
//!
//! Drive the command dispatcher against an in-process mock jukebox server.
//! Every test binds the server to a random port on 127.0.0.1.

use jukebox_client::{
    audio_sink::{AudioError, AudioSink},
    catalog::Catalog,
    dispatcher::{CommandDispatcher, Flow, FAREWELL, HELP},
    mock_server::{MockJukeboxServer, MockServerConfig, MockServerHandle, MockSong},
    playback::{PlaybackController, PlaybackState},
};
use jukebox_protocol::{encode_frame, SessionConnector};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Sink that records audio and how many streams it serves at once
#[derive(Default)]
struct RecordingSink {
    received: Mutex<Vec<u8>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    starts: AtomicUsize,
}

impl RecordingSink {
    fn bytes_received(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl AudioSink for RecordingSink {
    async fn start(&self) -> Result<(), AudioError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        Ok(())
    }

    async fn write(&self, audio_data: &[u8]) -> Result<(), AudioError> {
        self.received.lock().unwrap().extend_from_slice(audio_data);
        Ok(())
    }

    async fn stop(&self) -> Result<(), AudioError> {
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

fn three_songs() -> Vec<MockSong> {
    (0..3u8)
        .map(|i| {
            MockSong::new(format!("song{}.mp3", i), vec![i; 10_000])
                .with_info(format!("Song {} by The Testers", i))
        })
        .collect()
}

async fn start_server(loop_audio: bool) -> MockServerHandle {
    let config = MockServerConfig {
        songs: three_songs(),
        loop_audio,
        chunk_delay: Duration::from_millis(5),
        ..Default::default()
    };
    MockJukeboxServer::new(config)
        .start()
        .await
        .expect("Failed to start mock server")
}

fn dispatcher_for(address: String, sink: Arc<RecordingSink>) -> CommandDispatcher<Vec<u8>> {
    let (playback, errors) = PlaybackController::new(sink, 1024);
    CommandDispatcher::new(SessionConnector::new(address), playback, errors, Vec::new())
}

fn output_of(dispatcher: &CommandDispatcher<Vec<u8>>) -> String {
    String::from_utf8_lossy(dispatcher.output()).into_owned()
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Condition not reached in time");
}

#[tokio::test]
async fn test_bootstrap_builds_catalog() {
    init_logging();
    let server = start_server(false).await;
    let mut dispatcher = dispatcher_for(server.address(), Arc::default());

    dispatcher.bootstrap().await.unwrap();

    assert_eq!(dispatcher.catalog().max_index(), Some(2));
    let output = output_of(&dispatcher);
    assert!(output.contains(HELP));
    assert!(output.contains("\t2) song2.mp3"));
    assert!(!output.contains('\0'));
    assert_eq!(server.requests(), vec!["LIST"]);
}

#[tokio::test]
async fn test_invalid_indices_never_reach_the_server() {
    init_logging();
    let server = start_server(false).await;
    let mut dispatcher = dispatcher_for(server.address(), Arc::default());
    dispatcher.bootstrap().await.unwrap();
    let connections = server.connection_count();

    for line in ["PLAY 5", "INFO 3", "play x", "INFO", "PLAY", "info 1 2", "PLAY -1"] {
        assert_eq!(dispatcher.handle_line(line).await.unwrap(), Flow::Continue);
    }

    assert_eq!(server.connection_count(), connections);
    let output = output_of(&dispatcher);
    assert_eq!(
        output
            .matches("Error: Invalid song request, please try again.")
            .count(),
        4
    );
    assert!(output.contains("Error: INFO for which song?"));
    assert!(output.contains("Error: PLAY for which song?"));
}

#[tokio::test]
async fn test_info_and_list_share_framing() {
    init_logging();
    let server = start_server(false).await;
    let mut dispatcher = dispatcher_for(server.address(), Arc::default());
    dispatcher.bootstrap().await.unwrap();

    dispatcher.handle_line("info 1").await.unwrap();
    dispatcher.handle_line("LIST").await.unwrap();

    let output = output_of(&dispatcher);
    assert!(output.contains("Song 1 by The Testers"));
    assert_eq!(output.matches("Songs available to stream:").count(), 2);
    assert_eq!(server.requests(), vec!["LIST", "INFO 1", "LIST"]);
}

#[tokio::test]
async fn test_play_switch_stop_exit_scenario() {
    init_logging();
    let server = start_server(true).await;
    let sink = Arc::new(RecordingSink::default());
    let mut dispatcher = dispatcher_for(server.address(), sink.clone());
    dispatcher.bootstrap().await.unwrap();

    // Out of range: rejected locally
    let connections = server.connection_count();
    dispatcher.handle_line("PLAY 5").await.unwrap();
    assert_eq!(server.connection_count(), connections);

    // First song streams in the background
    dispatcher.handle_line("PLAY 1").await.unwrap();
    assert!(dispatcher.playback().is_playing());
    wait_until(|| sink.bytes_received() > 0 && server.open_streams() == 1).await;

    // Second song replaces the first
    dispatcher.handle_line("PLAY 2").await.unwrap();
    assert_eq!(dispatcher.playback().current_index(), Some(2));
    assert!(dispatcher.playback().is_playing());
    wait_until(|| server.open_streams() == 1 && sink.starts.load(Ordering::SeqCst) == 2).await;
    assert_eq!(sink.max_active.load(Ordering::SeqCst), 1);

    // STOP leaves the controller idle and the server stops streaming
    dispatcher.handle_line("STOP").await.unwrap();
    assert_eq!(dispatcher.playback().state(), PlaybackState::Idle);
    assert_eq!(sink.active.load(Ordering::SeqCst), 0);
    wait_until(|| server.open_streams() == 0).await;

    assert_eq!(dispatcher.handle_line("EXIT").await.unwrap(), Flow::Exit);
    assert!(output_of(&dispatcher).ends_with(&format!("{}\n", FAREWELL)));
    assert_eq!(server.requests(), vec!["LIST", "PLAY 1", "PLAY 2"]);
}

#[tokio::test]
async fn test_song_plays_to_the_end() {
    init_logging();
    let server = start_server(false).await;
    let sink = Arc::new(RecordingSink::default());
    let mut dispatcher = dispatcher_for(server.address(), sink.clone());
    dispatcher.bootstrap().await.unwrap();

    dispatcher.handle_line("PLAY 0").await.unwrap();

    wait_until(|| dispatcher.playback().state() == PlaybackState::Idle).await;
    assert_eq!(sink.bytes_received(), 10_000);
}

#[tokio::test]
async fn test_stop_without_playback_is_silent() {
    init_logging();
    let server = start_server(false).await;
    let mut dispatcher = dispatcher_for(server.address(), Arc::default());
    dispatcher.bootstrap().await.unwrap();
    let before = output_of(&dispatcher);

    assert_eq!(dispatcher.handle_line("stop").await.unwrap(), Flow::Continue);
    assert_eq!(dispatcher.handle_line("STOP").await.unwrap(), Flow::Continue);

    assert_eq!(output_of(&dispatcher), before);
    assert_eq!(dispatcher.playback().state(), PlaybackState::Idle);
}

#[tokio::test]
async fn test_unknown_and_blank_lines() {
    init_logging();
    let server = start_server(false).await;
    let mut dispatcher = dispatcher_for(server.address(), Arc::default());
    dispatcher.bootstrap().await.unwrap();
    let connections = server.connection_count();

    assert_eq!(dispatcher.handle_line("").await.unwrap(), Flow::Continue);
    assert_eq!(dispatcher.handle_line("DANCE").await.unwrap(), Flow::Continue);

    let output = output_of(&dispatcher);
    assert!(output.contains("Error: Unrecognized Command."));
    assert_eq!(output.matches(HELP).count(), 2);
    assert_eq!(server.connection_count(), connections);
}

#[tokio::test]
async fn test_unreachable_server_fails_closed() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let mut dispatcher = dispatcher_for(address, Arc::default());
    dispatcher.bootstrap().await.unwrap();

    assert_eq!(*dispatcher.catalog(), Catalog::unavailable());
    for line in ["PLAY 0", "INFO 0", "LIST"] {
        assert_eq!(dispatcher.handle_line(line).await.unwrap(), Flow::Continue);
    }

    let output = output_of(&dispatcher);
    assert_eq!(output.matches("Error: ").count(), 4);
    assert_eq!(
        output
            .matches("Error: Invalid song request, please try again.")
            .count(),
        2
    );
}

#[tokio::test]
async fn test_server_rejecting_play_is_reported() {
    init_logging();
    // Claims five songs but closes every PLAY without a marker
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 64];
            let n = socket.read(&mut request).await.unwrap();
            if &request[..n] == b"LIST" {
                let listing = "Songs:\n\t0) a\n\t1) b\n\t2) c\n\t3) d\n\t4) e\n";
                socket.write_all(&encode_frame(listing)).await.unwrap();
            }
        }
    });

    let mut dispatcher = dispatcher_for(address, Arc::default());
    dispatcher.bootstrap().await.unwrap();
    assert_eq!(dispatcher.catalog().max_index(), Some(4));

    assert_eq!(dispatcher.handle_line("PLAY 4").await.unwrap(), Flow::Continue);

    assert!(output_of(&dispatcher).contains("Error: Invalid song request, please try again"));
    assert!(!dispatcher.playback().is_playing());
}

#[tokio::test]
async fn test_run_loop_until_exit() {
    init_logging();
    let server = start_server(true).await;
    let sink = Arc::new(RecordingSink::default());
    let mut dispatcher = dispatcher_for(server.address(), sink.clone());
    dispatcher.bootstrap().await.unwrap();

    let script = b"list\nplay 0\n\nbogus\nexit\nlist\n";
    dispatcher.run(BufReader::new(&script[..])).await.unwrap();

    // Nothing after EXIT is executed
    assert_eq!(server.requests(), vec!["LIST", "LIST", "PLAY 0"]);
    assert_eq!(dispatcher.playback().state(), PlaybackState::Idle);
    assert_eq!(sink.active.load(Ordering::SeqCst), 0);

    let output = output_of(&dispatcher);
    assert_eq!(output.matches(">> ").count(), 5);
    assert!(output.ends_with(&format!("{}\n", FAREWELL)));
}

#[tokio::test]
async fn test_end_of_input_exits_cleanly() {
    init_logging();
    let server = start_server(true).await;
    let sink = Arc::new(RecordingSink::default());
    let mut dispatcher = dispatcher_for(server.address(), sink.clone());
    dispatcher.bootstrap().await.unwrap();

    dispatcher.run(BufReader::new(&b"play 2\n"[..])).await.unwrap();

    assert_eq!(dispatcher.playback().state(), PlaybackState::Idle);
    assert_eq!(sink.active.load(Ordering::SeqCst), 0);
    assert!(output_of(&dispatcher).ends_with(&format!("{}\n", FAREWELL)));
}
