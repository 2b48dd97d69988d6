//! HTTP/1.1 upgrade handshake.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::WsError;

// Upper bound on the response head.
const MAX_RESPONSE_HEAD: usize = 8 * 1024;

/// Random base64 `Sec-WebSocket-Key`.
pub fn generate_key() -> String {
    STANDARD.encode(rand::random::<[u8; 16]>())
}

/// Upgrade request text.
pub fn build_request(host: &str, path: &str, key: &str) -> String {
    format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    )
}

/// Accept only a `101` status line.
pub fn check_status_line(status_line: &str) -> Result<(), WsError> {
    let mut parts = status_line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    let code = parts.next().unwrap_or_default();
    if version.starts_with("HTTP/") && code == "101" {
        Ok(())
    } else {
        Err(WsError::Handshake(status_line.trim().to_string()))
    }
}

/// Run the handshake over an already connected stream.
pub async fn client_handshake<S>(stream: &mut S, host: &str, path: &str) -> Result<(), WsError>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let key = generate_key();
    stream.write_all(build_request(host, path, &key).as_bytes()).await?;
    stream.flush().await?;

    let head = read_response_head(stream).await?;
    let status_line = head.lines().next().unwrap_or_default();
    debug!(status_line, "WebSocket upgrade response");
    check_status_line(status_line)
}

// Byte at a time so nothing past the blank line is consumed.
async fn read_response_head<R>(reader: &mut R) -> Result<String, WsError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(WsError::Handshake("response head too large".to_string()));
        }
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            if head.is_empty() {
                return Err(WsError::ConnectionClosed);
            }
            // Head cut short; judge whatever status line arrived
            break;
        }
        head.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_16_bytes() {
        let key = generate_key();
        assert_eq!(STANDARD.decode(&key).unwrap().len(), 16);
        assert_ne!(key, generate_key());
    }

    #[test]
    fn test_request_lines() {
        let request = build_request("api.coin.z.com", "/ws", "abc=");
        assert!(request.starts_with("GET /ws HTTP/1.1\r\n"));
        assert!(request.contains("Host: api.coin.z.com\r\n"));
        assert!(request.contains("Sec-WebSocket-Key: abc=\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_status_line() {
        assert!(check_status_line("HTTP/1.1 101 Switching Protocols").is_ok());
        assert!(matches!(
            check_status_line("HTTP/1.1 403 Forbidden"),
            Err(WsError::Handshake(line)) if line == "HTTP/1.1 403 Forbidden"
        ));
        assert!(check_status_line("HTTP/1.1 200 OK 101").is_err());
    }

    #[tokio::test]
    async fn test_handshake_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let server_task = tokio::spawn(async move {
            let head = read_response_head(&mut server).await.unwrap();
            server
                .write_all(b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n")
                .await
                .unwrap();
            head
        });

        client_handshake(&mut client, "example.test", "/ws").await.unwrap();
        let request = server_task.await.unwrap();
        assert!(request.contains("Upgrade: websocket"));
        assert!(request.contains("Sec-WebSocket-Version: 13"));
    }
}
