use thiserror::Error;

/// Result type for LWRP operations
pub type Result<T> = std::result::Result<T, LwrpError>;

/// Errors that can occur when talking to an LWRP device
#[derive(Error, Debug)]
pub enum LwrpError {
    /// Could not establish the TCP connection to the device
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        /// Device host we tried to reach
        host: String,
        /// Device port we tried to reach
        port: u16,
        /// Underlying socket error
        source: std::io::Error,
    },

    /// Operation attempted on a session that is not connected
    #[error("session is not connected")]
    NotConnected,

    /// Connection was closed while an operation was outstanding
    #[error("connection closed")]
    ConnectionClosed,

    /// No matching reply arrived within the command deadline
    #[error("command {verb} timed out")]
    Timeout {
        /// Verb of the command that timed out
        verb: String,
    },

    /// The device rejected the login command
    #[error("login rejected: {reply}")]
    Auth {
        /// The reply line the device sent back
        reply: String,
    },

    /// A frame or field could not be interpreted
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error on the socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
