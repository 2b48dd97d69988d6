//! Connected WebSocket: dialing, sending text and reading text.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};
use url::Url;

use super::frame::{encode_frame, encode_text, read_frame, Opcode};
use super::handshake::client_handshake;
use super::WsError;

/// Byte stream a connection runs over (TCP, TLS, or an in-memory pipe).
pub trait WsIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> WsIo for T {}

/// An upgraded connection.
pub struct WsConnection {
    io: Box<dyn WsIo>,
}

impl WsConnection {
    /// Dial `url` (`ws://` or `wss://`) and upgrade. Connect and handshake
    /// together are bounded by `deadline`.
    pub async fn connect(url: &str, deadline: Duration) -> Result<Self, WsError> {
        let parsed = Url::parse(url).map_err(|e| WsError::InvalidUrl(e.to_string()))?;
        let secure = match parsed.scheme() {
            "wss" => true,
            "ws" => false,
            other => return Err(WsError::InvalidUrl(format!("unsupported scheme: {}", other))),
        };
        let host = parsed
            .host_str()
            .ok_or_else(|| WsError::InvalidUrl("missing host".to_string()))?
            .to_string();
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| WsError::InvalidUrl("missing port".to_string()))?;
        let path = match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        };
        let host_header = match parsed.port() {
            Some(explicit) => format!("{}:{}", host, explicit),
            None => host.clone(),
        };

        let connection = timeout(deadline, Self::dial(&host, port, secure, &host_header, &path))
            .await
            .map_err(|_| WsError::Timeout(format!("connect to {}", host)))??;
        info!(host = %host, port, secure, "WebSocket connected");
        Ok(connection)
    }

    async fn dial(
        host: &str,
        port: u16,
        secure: bool,
        host_header: &str,
        path: &str,
    ) -> Result<Self, WsError> {
        let tcp = TcpStream::connect((host, port)).await?;
        tcp.set_nodelay(true)?;
        let io: Box<dyn WsIo> = if secure {
            let connector = tokio_native_tls::native_tls::TlsConnector::new()
                .map_err(|e| WsError::Tls(e.to_string()))?;
            let tls = tokio_native_tls::TlsConnector::from(connector)
                .connect(host, tcp)
                .await
                .map_err(|e| WsError::Tls(e.to_string()))?;
            Box::new(tls)
        } else {
            Box::new(tcp)
        };
        Self::handshake(io, host_header, path).await
    }

    /// Upgrade an already open byte stream.
    pub async fn handshake(mut io: Box<dyn WsIo>, host: &str, path: &str) -> Result<Self, WsError> {
        client_handshake(&mut io, host, path).await?;
        Ok(Self { io })
    }

    /// Send one masked text frame.
    pub async fn send_text(&mut self, text: &str) -> Result<(), WsError> {
        self.io.write_all(&encode_text(text)).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Next text payload. Pings are answered and skipped, other non-text
    /// frames are skipped, a close frame ends the connection.
    pub async fn next_text(&mut self) -> Result<String, WsError> {
        loop {
            let frame = read_frame(&mut self.io).await?;
            match frame.opcode {
                Opcode::Text => {
                    return String::from_utf8(frame.payload).map_err(|_| WsError::Utf8);
                }
                Opcode::Ping => {
                    // Pong goes out unmasked
                    let pong = encode_frame(Opcode::Pong, &frame.payload, None);
                    self.io.write_all(&pong).await?;
                    self.io.flush().await?;
                    debug!("Answered ping");
                }
                Opcode::Close => return Err(WsError::ConnectionClosed),
                other => debug!(opcode = other.as_u8(), "Ignoring frame"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, DuplexStream};

    const SWITCHING: &[u8] = b"HTTP/1.1 101 Switching Protocols\r\n\r\n";

    async fn drain_request(server: &mut DuplexStream) {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        while !buf.ends_with(b"\r\n\r\n") {
            server.read_exact(&mut byte).await.unwrap();
            buf.push(byte[0]);
        }
    }

    async fn connected() -> (WsConnection, DuplexStream) {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let accept = async {
            drain_request(&mut server).await;
            server.write_all(SWITCHING).await.unwrap();
        };
        let (connection, _) = tokio::join!(WsConnection::handshake(Box::new(client), "h", "/ws"), accept);
        (connection.unwrap(), server)
    }

    #[tokio::test]
    async fn test_ping_is_answered_then_text_returned() {
        let (mut connection, mut server) = connected().await;

        server.write_all(&encode_frame(Opcode::Ping, b"hb", None)).await.unwrap();
        server.write_all(&encode_frame(Opcode::Binary, b"\x00", None)).await.unwrap();
        server.write_all(&encode_frame(Opcode::Text, b"{\"a\":1}", None)).await.unwrap();

        assert_eq!(connection.next_text().await.unwrap(), "{\"a\":1}");

        let pong = read_frame(&mut server).await.unwrap();
        assert_eq!(pong.opcode, Opcode::Pong);
        assert_eq!(pong.payload, b"hb");
    }

    #[tokio::test]
    async fn test_close_frame_ends_connection() {
        let (mut connection, mut server) = connected().await;
        server.write_all(&encode_frame(Opcode::Close, b"", None)).await.unwrap();
        assert!(matches!(connection.next_text().await, Err(WsError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_sent_text_is_masked() {
        let (mut connection, mut server) = connected().await;
        connection.send_text("{\"command\":\"subscribe\"}").await.unwrap();

        let mut header = [0u8; 2];
        server.read_exact(&mut header).await.unwrap();
        assert_eq!(header[0], 0x81);
        assert_ne!(header[1] & 0x80, 0);
    }

    #[tokio::test]
    async fn test_non_101_fails_before_anything_is_sent() {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let accept = async {
            drain_request(&mut server).await;
            server.write_all(b"HTTP/1.1 403 Forbidden\r\n\r\n").await.unwrap();
            server
        };
        let (result, mut server) =
            tokio::join!(WsConnection::handshake(Box::new(client), "h", "/ws"), accept);

        assert!(matches!(result, Err(WsError::Handshake(_))));
        // Client side is gone and wrote no frame after the request
        let mut rest = Vec::new();
        server.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let err = WsConnection::connect("http://example.test", Duration::from_secs(1)).await;
        assert!(matches!(err, Err(WsError::InvalidUrl(_))));
    }
}
