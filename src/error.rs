use crate::catalog::ValidationError;
use crate::config::ConfigError;
use crate::playback::PlaybackError;
use jukebox_protocol::ProtocolError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, JukeboxError>;

#[derive(Error, Debug)]
pub enum JukeboxError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
