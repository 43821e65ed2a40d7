use jukebox_protocol::{SessionConnector, DEFAULT_MAX_FRAME_BYTES};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Playback read size, matching the chunk size the jukebox server sends
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

pub const CHUNK_SIZE_VAR: &str = "JUKEBOX_CHUNK_SIZE";
pub const MAX_FRAME_BYTES_VAR: &str = "JUKEBOX_MAX_FRAME_BYTES";
pub const RESPONSE_TIMEOUT_VAR: &str = "JUKEBOX_RESPONSE_TIMEOUT_MS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
}

/// Client configuration: server address, playback tuning and output selection
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Bytes requested per playback read
    pub chunk_size: usize,
    /// Largest LIST/INFO frame accepted, trailer included
    pub max_frame_bytes: usize,
    /// Bound on connect and response reads. `None` waits forever.
    pub response_timeout: Option<Duration>,
    /// External decoder command line the audio stream is piped into
    pub player_command: Option<String>,
    /// File the audio stream is written to
    pub save_path: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            response_timeout: None,
            player_command: None,
            save_path: None,
        }
    }

    /// Apply overrides from the environment (and `.env`, if present)
    pub fn load_env(self) -> Result<Self, ConfigError> {
        // Load .env file if it exists (for development)
        dotenvy::dotenv().ok();

        self.apply_env(|name| env::var(name).ok())
    }

    fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(CHUNK_SIZE_VAR) {
            self.chunk_size = parse_positive(CHUNK_SIZE_VAR, &value)?;
        }
        if let Some(value) = lookup(MAX_FRAME_BYTES_VAR) {
            self.max_frame_bytes = parse_positive(MAX_FRAME_BYTES_VAR, &value)?;
        }
        if let Some(value) = lookup(RESPONSE_TIMEOUT_VAR) {
            self.response_timeout = parse_timeout(RESPONSE_TIMEOUT_VAR, &value)?;
        }
        Ok(self)
    }

    /// Timeout given in milliseconds; 0 disables it
    pub fn with_timeout_ms(mut self, millis: u64) -> Self {
        self.response_timeout = (millis > 0).then(|| Duration::from_millis(millis));
        self
    }

    pub fn with_player_command(mut self, command: impl Into<String>) -> Result<Self, ConfigError> {
        let command = command.into();
        if command.split_whitespace().next().is_none() {
            return Err(ConfigError::InvalidValue {
                name: "player".to_string(),
                value: command,
                reason: "command cannot be empty".to_string(),
            });
        }
        self.player_command = Some(command);
        Ok(self)
    }

    pub fn with_save_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_path = Some(path.into());
        self
    }

    /// `host:port` of the jukebox server
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connector(&self) -> SessionConnector {
        SessionConnector::new(self.address())
            .with_response_timeout(self.response_timeout)
            .with_max_frame_bytes(self.max_frame_bytes)
    }
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
        reason: "not a number".to_string(),
    })
}

fn parse_positive(name: &str, value: &str) -> Result<usize, ConfigError> {
    match parse_value::<usize>(name, value)? {
        0 => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        n => Ok(n),
    }
}

fn parse_timeout(name: &str, value: &str) -> Result<Option<Duration>, ConfigError> {
    let millis: u64 = parse_value(name, value)?;
    Ok((millis > 0).then(|| Duration::from_millis(millis)))
}
