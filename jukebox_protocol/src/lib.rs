//! # Jukebox Protocol
//!
//! Wire protocol and connector for talking to a jukebox streaming server.
//!
//! This crate provides:
//! - Request encoding and the length-prefixed LIST/INFO response framing
//! - The PLAY presence marker check
//! - [`SessionConnector`], which opens one connection per exchange
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use jukebox_protocol::{Request, SessionConnector};
//!
//! # async fn example() -> Result<(), jukebox_protocol::ProtocolError> {
//! let connector = SessionConnector::new("127.0.0.1:8888");
//!
//! // Song listing
//! let listing = connector.send_and_frame(&Request::List).await?;
//! println!("{}", listing.display_text());
//!
//! // Raw audio for song 2
//! let stream = connector.open_stream(2).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod protocol;

// Re-export commonly used types
pub use client::{PlayStream, SessionConnector};
pub use protocol::{
    encode_frame, read_frame, read_presence_marker, Frame, ProtocolError, Request,
    DEFAULT_MAX_FRAME_BYTES, FRAME_TRAILER_LEN, MAX_HEADER_LEN,
};
