//! Relay Protocol - Wire framing and message vocabulary
//!
//! This crate provides the length-prefixed frame codec used on every
//! relay connection, and the small set of texts the relay server and
//! its clients agree on (quit sentinel, sender tags, notices).

pub mod frame;
pub mod message;

pub use frame::{ChannelError, FrameReader, FrameWriter, LENGTH_PREFIX_BYTES};
pub use message::{
    display_name, format_line, join_notice, leave_notice, Inbound, ANONYMOUS, QUIT_SENTINEL,
    SERVER_TAG, SHUTDOWN_NOTICE,
};
