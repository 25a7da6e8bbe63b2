//! Message vocabulary shared by the relay server and its clients.
//!
//! The first frame a client sends is its display name. Every later frame
//! is chat text, except the quit sentinel which asks the server to end
//! the connection. Everything the server sends is a single line of the
//! form `[<tag>] <text>`.

/// Payload that requests a graceful disconnect (exact byte match).
pub const QUIT_SENTINEL: &[u8] = b"__quit__";

/// Sender tag used for server-originated notices.
pub const SERVER_TAG: &str = "Server";

/// Display name for peers that register with an empty name.
pub const ANONYMOUS: &str = "anonymous";

/// Notice broadcast to every peer when the server stops.
pub const SHUTDOWN_NOTICE: &str = "server is shutting down";

/// Formats an outgoing broadcast line.
pub fn format_line(sender_tag: &str, text: &str) -> String {
    format!("[{sender_tag}] {text}")
}

/// Interprets a handshake payload as a display name.
///
/// Invalid UTF-8 is replaced rather than rejected; an empty payload
/// maps to [`ANONYMOUS`].
pub fn display_name(payload: &[u8]) -> String {
    if payload.is_empty() {
        return ANONYMOUS.to_string();
    }
    String::from_utf8_lossy(payload).into_owned()
}

/// Join announcement text for a newly registered peer.
pub fn join_notice(name: &str) -> String {
    format!("user '{name}' joined the chat")
}

/// Leave announcement text for a departed peer.
pub fn leave_notice(name: &str) -> String {
    format!("user '{name}' left the chat")
}

/// A frame received from a registered client, after the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// The client asked to disconnect.
    Quit,

    /// Chat text to rebroadcast.
    Chat(String),
}

impl Inbound {
    /// Classifies a post-handshake payload.
    pub fn classify(payload: &[u8]) -> Self {
        if payload == QUIT_SENTINEL {
            Inbound::Quit
        } else {
            Inbound::Chat(String::from_utf8_lossy(payload).into_owned())
        }
    }
}
