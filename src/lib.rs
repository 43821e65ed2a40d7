//! # Jukebox Client
//!
//! Interactive client for a jukebox streaming server: list songs, show song
//! info, stream a song to an audio sink, stop playback.
//!
//! The wire protocol and connector live in the `jukebox_protocol` crate; this
//! crate adds the catalog, command parsing, the playback controller and the
//! dispatch loop that ties them together.

pub mod audio_sink;
pub mod catalog;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod mock_server;
pub mod playback;

pub use error::{JukeboxError, Result};
