//! Frame encoding and decoding.
//!
//! ```text
//!  0               1               2               3
//!  FIN+RSV+opcode  MASK+len7       [len16 | len64] [mask key] payload
//! ```

use tokio::io::{AsyncRead, AsyncReadExt};

use super::WsError;

/// Largest payload accepted from the server.
pub const MAX_PAYLOAD_LEN: u64 = 16 * 1024 * 1024;

/// Frame opcodes the client cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    Other(u8),
}

impl Opcode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x0 => Opcode::Continuation,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            other => Opcode::Other(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
            Opcode::Other(value) => *value,
        }
    }
}

/// A decoded frame with its payload already unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

/// Encode one final frame. With `mask` set the payload is XOR-masked and the
/// key is written after the length.
pub fn encode_frame(opcode: Opcode, payload: &[u8], mask: Option<[u8; 4]>) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 14);
    out.push(0x80 | opcode.as_u8());

    let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
    let len = payload.len();
    if len < 126 {
        out.push(mask_bit | len as u8);
    } else if len <= u16::MAX as usize {
        out.push(mask_bit | 126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(mask_bit | 127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    match mask {
        Some(key) => {
            out.extend_from_slice(&key);
            out.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
        }
        None => out.extend_from_slice(payload),
    }
    out
}

/// Client text frame, masked with a fresh random key.
pub fn encode_text(text: &str) -> Vec<u8> {
    encode_frame(Opcode::Text, text.as_bytes(), Some(rand::random::<[u8; 4]>()))
}

/// Read one frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, WsError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; 2];
    read_exact(reader, &mut header).await?;

    let fin = header[0] & 0x80 != 0;
    let opcode = Opcode::from_u8(header[0] & 0x0F);
    let masked = header[1] & 0x80 != 0;

    let len = match header[1] & 0x7F {
        126 => {
            let mut ext = [0u8; 2];
            read_exact(reader, &mut ext).await?;
            u16::from_be_bytes(ext) as u64
        }
        127 => {
            let mut ext = [0u8; 8];
            read_exact(reader, &mut ext).await?;
            u64::from_be_bytes(ext)
        }
        short => short as u64,
    };
    if len > MAX_PAYLOAD_LEN {
        return Err(WsError::Protocol(format!("frame payload too large: {}", len)));
    }

    let mask = if masked {
        let mut key = [0u8; 4];
        read_exact(reader, &mut key).await?;
        Some(key)
    } else {
        None
    };

    let mut payload = vec![0u8; len as usize];
    read_exact(reader, &mut payload).await?;
    if let Some(key) = mask {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i % 4];
        }
    }

    Ok(Frame {
        fin,
        opcode,
        payload,
    })
}

// EOF mid-frame means the peer hung up.
async fn read_exact<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), WsError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(WsError::ConnectionClosed),
        Err(e) => Err(WsError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn decode(bytes: Vec<u8>) -> Result<Frame, WsError> {
        let mut reader = bytes.as_slice();
        read_frame(&mut reader).await
    }

    #[test]
    fn test_short_masked_text_layout() {
        let bytes = encode_frame(Opcode::Text, b"Hi", Some([1, 2, 3, 4]));
        assert_eq!(bytes[0], 0x81);
        assert_eq!(bytes[1], 0x80 | 2);
        assert_eq!(&bytes[2..6], &[1, 2, 3, 4]);
        assert_eq!(bytes[6], b'H' ^ 1);
        assert_eq!(bytes[7], b'i' ^ 2);
    }

    #[test]
    fn test_length_encodings() {
        let medium = encode_frame(Opcode::Text, &[b'a'; 300], None);
        assert_eq!(medium[1], 126);
        assert_eq!(u16::from_be_bytes([medium[2], medium[3]]), 300);
        assert_eq!(medium.len(), 4 + 300);

        let large = encode_frame(Opcode::Text, &vec![b'a'; 70_000], Some([0; 4]));
        assert_eq!(large[1], 0x80 | 127);
        assert_eq!(u64::from_be_bytes(large[2..10].try_into().unwrap()), 70_000);
        assert_eq!(large.len(), 10 + 4 + 70_000);
    }

    #[test]
    fn test_encode_text_is_masked() {
        let bytes = encode_text("{}");
        assert_ne!(bytes[1] & 0x80, 0);
    }

    #[tokio::test]
    async fn test_decode_masked_and_unmasked() {
        let frame = decode(encode_frame(Opcode::Text, b"hello", Some([9, 8, 7, 6]))).await.unwrap();
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(frame.payload, b"hello");

        let frame = decode(encode_frame(Opcode::Ping, b"p", None)).await.unwrap();
        assert_eq!(frame.opcode, Opcode::Ping);
        assert!(frame.fin);
    }

    #[tokio::test]
    async fn test_decode_extended_length() {
        let payload = vec![b'x'; 1000];
        let frame = decode(encode_frame(Opcode::Text, &payload, None)).await.unwrap();
        assert_eq!(frame.payload.len(), 1000);
    }

    #[tokio::test]
    async fn test_truncated_frame_is_connection_closed() {
        let mut bytes = encode_frame(Opcode::Text, b"hello", None);
        bytes.truncate(4);
        assert!(matches!(decode(bytes).await, Err(WsError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let mut bytes = vec![0x81, 127];
        bytes.extend_from_slice(&(MAX_PAYLOAD_LEN + 1).to_be_bytes());
        assert!(matches!(decode(bytes).await, Err(WsError::Protocol(_))));
    }
}
