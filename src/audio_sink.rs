use crate::config::ClientConfig;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to write audio data: {0}")]
    WriteError(String),

    #[error("Failed to stop audio playback: {0}")]
    StopError(String),

    #[error("Audio device error: {0}")]
    DeviceError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Core trait for audio output handling.
///
/// A sink receives the raw bytes of one PLAY response at a time: `start` before
/// the first chunk, then `write` per chunk, then exactly one of `finish` (the
/// stream ended) or `stop` (playback was cancelled or failed).
#[async_trait::async_trait]
pub trait AudioSink: Send + Sync {
    /// Prepare for a new stream
    async fn start(&self) -> Result<(), AudioError> {
        Ok(())
    }

    /// Write audio data to the sink
    async fn write(&self, audio_data: &[u8]) -> Result<(), AudioError>;

    /// The stream ended naturally; let buffered audio drain
    async fn finish(&self) -> Result<(), AudioError> {
        self.stop().await
    }

    /// Stop audio playback and clear any buffered data
    async fn stop(&self) -> Result<(), AudioError>;
}

/// Pick the sink the configuration asks for: player command, then file, then nothing
pub fn build_sink(config: &ClientConfig) -> Arc<dyn AudioSink> {
    if let Some(command) = &config.player_command {
        info!("🔊 Piping audio into '{}'", command);
        Arc::new(CommandSink::new(command.clone()))
    } else if let Some(path) = &config.save_path {
        info!("💾 Saving audio to {}", path.display());
        Arc::new(FileSink::new(path.clone()))
    } else {
        info!("🔇 No player configured, audio will be discarded");
        Arc::new(NullSink::default())
    }
}

/// Discards audio, counting bytes
#[derive(Debug, Default)]
pub struct NullSink {
    bytes_written: AtomicU64,
}

impl NullSink {
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Acquire)
    }
}

#[async_trait::async_trait]
impl AudioSink for NullSink {
    async fn write(&self, audio_data: &[u8]) -> Result<(), AudioError> {
        self.bytes_written
            .fetch_add(audio_data.len() as u64, Ordering::AcqRel);
        Ok(())
    }

    async fn stop(&self) -> Result<(), AudioError> {
        Ok(())
    }
}

/// Writes each stream to a file, truncating it when a new stream starts
pub struct FileSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileSink {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl AudioSink for FileSink {
    async fn start(&self) -> Result<(), AudioError> {
        let file = File::create(&self.path).await?;
        *self.file.lock().await = Some(file);
        debug!("FileSink: Writing to {}", self.path.display());
        Ok(())
    }

    async fn write(&self, audio_data: &[u8]) -> Result<(), AudioError> {
        let mut guard = self.file.lock().await;
        let file = guard
            .as_mut()
            .ok_or_else(|| AudioError::WriteError("file sink was not started".to_string()))?;
        file.write_all(audio_data).await?;
        Ok(())
    }

    async fn stop(&self) -> Result<(), AudioError> {
        if let Some(mut file) = self.file.lock().await.take() {
            file.flush().await?;
        }
        Ok(())
    }
}

/// Pipes each stream into a freshly spawned decoder process, e.g. `mpg123 -q -`
pub struct CommandSink {
    command_line: String,
    child: Mutex<Option<Child>>,
}

impl CommandSink {
    pub fn new(command_line: String) -> Self {
        Self {
            command_line,
            child: Mutex::new(None),
        }
    }

    fn spawn(&self) -> Result<Child, AudioError> {
        let mut parts = self.command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| AudioError::DeviceError("empty player command".to_string()))?;

        Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AudioError::DeviceError(format!("failed to start '{}': {}", program, e)))
    }
}

#[async_trait::async_trait]
impl AudioSink for CommandSink {
    async fn start(&self) -> Result<(), AudioError> {
        let child = self.spawn()?;
        debug!("CommandSink: Started player (pid {:?})", child.id());
        if let Some(mut previous) = self.child.lock().await.replace(child) {
            warn!("CommandSink: Previous player still running, killing it");
            previous.kill().await?;
        }
        Ok(())
    }

    async fn write(&self, audio_data: &[u8]) -> Result<(), AudioError> {
        let mut guard = self.child.lock().await;
        let stdin = guard
            .as_mut()
            .and_then(|child| child.stdin.as_mut())
            .ok_or_else(|| AudioError::WriteError("player is not running".to_string()))?;
        stdin
            .write_all(audio_data)
            .await
            .map_err(|e| AudioError::WriteError(e.to_string()))
    }

    async fn finish(&self) -> Result<(), AudioError> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        // Closing stdin lets the player drain what it has buffered
        drop(child.stdin.take());
        let status = child.wait().await?;
        debug!("CommandSink: Player exited with {}", status);
        Ok(())
    }

    async fn stop(&self) -> Result<(), AudioError> {
        if let Some(mut child) = self.child.lock().await.take() {
            child
                .kill()
                .await
                .map_err(|e| AudioError::StopError(e.to_string()))?;
        }
        Ok(())
    }
}
