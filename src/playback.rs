//! Background playback of PLAY streams.
//!
//! [`PlaybackController`] owns at most one playback task. Starting or stopping
//! playback always cancels the previous task and waits for it to release its
//! stream, so two tasks never read at the same time.

use crate::audio_sink::{AudioError, AudioSink};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use strum::Display;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("song {index}: failed to read audio stream: {source}")]
    Read {
        index: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("song {index}: {source}")]
    Sink {
        index: u32,
        #[source]
        source: AudioError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[repr(u8)]
pub enum PlaybackState {
    Idle = 0,
    Running = 1,
    Cancelling = 2,
    Stopped = 3,
}

/// How a playback task ended, with the number of bytes forwarded to the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished { bytes: u64 },
    Cancelled { bytes: u64 },
    Failed { bytes: u64 },
}

type PlaybackStream = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Clone)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(PlaybackState::Idle as u8)))
    }

    fn get(&self) -> PlaybackState {
        match self.0.load(Ordering::Acquire) {
            1 => PlaybackState::Running,
            2 => PlaybackState::Cancelling,
            3 => PlaybackState::Stopped,
            _ => PlaybackState::Idle,
        }
    }

    fn set(&self, state: PlaybackState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: PlaybackState, to: PlaybackState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

struct PlaybackTask {
    index: u32,
    cancel_token: CancellationToken,
    handle: JoinHandle<PlaybackOutcome>,
}

pub struct PlaybackController {
    sink: Arc<dyn AudioSink>,
    chunk_size: usize,
    state: SharedState,
    current: Option<PlaybackTask>,
    errors: UnboundedSender<PlaybackError>,
}

impl PlaybackController {
    /// Create a controller and the channel its background failures are reported on
    pub fn new(
        sink: Arc<dyn AudioSink>,
        chunk_size: usize,
    ) -> (Self, UnboundedReceiver<PlaybackError>) {
        let (errors, receiver) = mpsc::unbounded_channel();
        let controller = Self {
            sink,
            chunk_size: chunk_size.max(1),
            state: SharedState::new(),
            current: None,
            errors,
        };
        (controller, receiver)
    }

    pub fn state(&self) -> PlaybackState {
        self.state.get()
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Running
    }

    /// Song of the task the controller still owns, finished or not
    pub fn current_index(&self) -> Option<u32> {
        self.current.as_ref().map(|task| task.index)
    }

    /// Play `stream` on a background task, replacing any active playback.
    ///
    /// The previous task is cancelled and joined before the new one is spawned.
    pub async fn start<R>(&mut self, index: u32, stream: R)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.cancel().await;

        let cancel_token = CancellationToken::new();
        let job = StreamJob {
            index,
            stream: Box::new(stream),
            sink: Arc::clone(&self.sink),
            cancel_token: cancel_token.clone(),
            chunk_size: self.chunk_size,
            state: self.state.clone(),
            errors: self.errors.clone(),
        };

        self.state.set(PlaybackState::Running);
        let handle = tokio::spawn(job.run());
        info!("▶️  Playing song {}", index);

        self.current = Some(PlaybackTask {
            index,
            cancel_token,
            handle,
        });
    }

    /// Cancel the active task and wait until it has released its stream.
    ///
    /// Returns `None` when there was nothing to cancel.
    pub async fn cancel(&mut self) -> Option<PlaybackOutcome> {
        let task = self.current.take()?;

        if self
            .state
            .transition(PlaybackState::Running, PlaybackState::Cancelling)
        {
            info!("🛑 Stopping song {}", task.index);
        }
        task.cancel_token.cancel();

        let outcome = match task.handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!("Playback task for song {} failed: {}", task.index, e);
                None
            }
        };

        self.state.set(PlaybackState::Idle);
        debug!("Playback task for song {} joined: {:?}", task.index, outcome);
        outcome
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        if let Some(task) = &self.current {
            task.cancel_token.cancel();
        }
    }
}

/// Everything one background playback task owns
struct StreamJob {
    index: u32,
    stream: PlaybackStream,
    sink: Arc<dyn AudioSink>,
    cancel_token: CancellationToken,
    chunk_size: usize,
    state: SharedState,
    errors: UnboundedSender<PlaybackError>,
}

impl StreamJob {
    async fn run(mut self) -> PlaybackOutcome {
        let outcome = match self.sink.start().await {
            Ok(()) => self.pump().await,
            Err(source) => {
                self.report(PlaybackError::Sink {
                    index: self.index,
                    source,
                });
                PlaybackOutcome::Failed { bytes: 0 }
            }
        };

        // Release the connection before the sink winds down
        drop(self.stream);

        let wind_down = match outcome {
            PlaybackOutcome::Finished { bytes } => {
                info!("⏹️  Song {} finished ({} bytes)", self.index, bytes);
                tokio::select! {
                    biased;
                    _ = self.cancel_token.cancelled() => self.sink.stop().await,
                    finished = self.sink.finish() => finished,
                }
            }
            PlaybackOutcome::Cancelled { bytes } => {
                debug!("Song {} cancelled after {} bytes", self.index, bytes);
                self.sink.stop().await
            }
            PlaybackOutcome::Failed { .. } => self.sink.stop().await,
        };
        if let Err(source) = wind_down {
            warn!("Audio sink did not stop cleanly: {}", source);
            let _ = self.errors.send(PlaybackError::Sink {
                index: self.index,
                source,
            });
        }

        self.state.set(match outcome {
            PlaybackOutcome::Finished { .. } => PlaybackState::Idle,
            _ => PlaybackState::Stopped,
        });
        outcome
    }

    async fn pump(&mut self) -> PlaybackOutcome {
        let mut buffer = vec![0u8; self.chunk_size];
        let mut bytes = 0u64;

        loop {
            if self.cancel_token.is_cancelled() {
                return PlaybackOutcome::Cancelled { bytes };
            }

            let read = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => None,
                read = self.stream.read(&mut buffer) => Some(read),
            };
            let n = match read {
                None => return PlaybackOutcome::Cancelled { bytes },
                Some(Ok(0)) => return PlaybackOutcome::Finished { bytes },
                Some(Ok(n)) => n,
                Some(Err(source)) => {
                    self.report(PlaybackError::Read {
                        index: self.index,
                        source,
                    });
                    return PlaybackOutcome::Failed { bytes };
                }
            };

            let written = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => None,
                written = self.sink.write(&buffer[..n]) => Some(written),
            };
            match written {
                None => return PlaybackOutcome::Cancelled { bytes },
                Some(Ok(())) => bytes += n as u64,
                Some(Err(source)) => {
                    self.report(PlaybackError::Sink {
                        index: self.index,
                        source,
                    });
                    return PlaybackOutcome::Failed { bytes };
                }
            }
        }
    }

    fn report(&self, failure: PlaybackError) {
        error!("❌ Playback stopped: {}", failure);
        let _ = self.errors.send(failure);
    }
}
