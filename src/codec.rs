use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

// Length prefix counts the code byte plus the payload.
const LEN_PREFIX_BYTES: usize = 4;
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug)]
pub enum FrameError {
    Io(io::Error),
    Closed,
    Empty,
    TooLarge { len: usize },
}

impl FrameError {
    /// Oversized and empty frames leave the stream out of sync with the peer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Closed)
    }
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Closed => write!(f, "connection closed by peer"),
            Self::Empty => write!(f, "empty frame (missing message code)"),
            Self::TooLarge { len } => {
                write!(f, "frame too large: {len} bytes (max {MAX_FRAME_LEN})")
            }
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Closed | Self::Empty | Self::TooLarge { .. } => None,
        }
    }
}

impl From<io::Error> for FrameError {
    fn from(value: io::Error) -> Self {
        if value.kind() == io::ErrorKind::UnexpectedEof {
            return Self::Closed;
        }
        Self::Io(value)
    }
}

pub fn encode_frame(code: u8, payload: &[u8]) -> Result<Bytes, FrameError> {
    let len = payload.len() + 1;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge { len });
    }
    let mut buf = BytesMut::with_capacity(LEN_PREFIX_BYTES + len);
    buf.put_u32(len as u32);
    buf.put_u8(code);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    code: u8,
    payload: &[u8],
) -> Result<(), FrameError> {
    let frame = encode_frame(code, payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<(u8, Bytes), FrameError> {
    let len = reader.read_u32().await? as usize;
    if len == 0 {
        return Err(FrameError::Empty);
    }
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge { len });
    }

    let code = reader.read_u8().await?;
    let mut payload = vec![0u8; len - 1];
    reader.read_exact(&mut payload).await?;
    Ok((code, Bytes::from(payload)))
}
