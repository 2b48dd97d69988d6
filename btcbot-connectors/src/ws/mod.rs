//! Minimal WebSocket client over raw TCP/TLS sockets.
//!
//! Only what the exchange subscribe protocol needs: the HTTP upgrade
//! handshake, masked text frames out, and text/ping/close frames in.

pub mod connection;
pub mod frame;
pub mod handshake;

use thiserror::Error;

use btcbot_domain::{normalize_error, source_codes, NormalizedError};

pub use connection::WsConnection;
pub use frame::{encode_frame, encode_text, read_frame, Frame, Opcode};
pub use handshake::{build_request, check_status_line, client_handshake, generate_key};

/// Errors raised by the socket client.
#[derive(Debug, Error)]
pub enum WsError {
    /// Socket read/write failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connect, handshake or read exceeded the deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// TLS setup or negotiation failed
    #[error("TLS error: {0}")]
    Tls(String),

    /// Peer sent a close frame or hung up
    #[error("Connection closed")]
    ConnectionClosed,

    /// Upgrade refused; carries the status line
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// URL could not be used
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Malformed frame or oversized payload
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Text frame was not UTF-8
    #[error("Invalid UTF-8 in text frame")]
    Utf8,

    /// Server refused the subscription
    #[error("Subscription rejected: {0}")]
    Rejected(String),
}

impl WsError {
    /// Transport-level failure worth one reconnect.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            WsError::Io(_) | WsError::Timeout(_) | WsError::Tls(_) | WsError::ConnectionClosed
        )
    }

    /// Classify into the shared taxonomy.
    pub fn normalize(&self) -> NormalizedError {
        let code = match self {
            WsError::Timeout(_) => source_codes::NETWORK_TIMEOUT,
            WsError::Io(_) | WsError::Tls(_) | WsError::ConnectionClosed => {
                source_codes::CONNECTION_ERROR
            }
            _ => source_codes::EXCHANGE_ERROR,
        };
        normalize_error(Some(code), self.to_string())
    }
}
