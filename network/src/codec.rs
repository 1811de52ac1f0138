//! Length-prefixed message framing
//!
//! Frame layout: network magic (u32 BE), payload length (u32 BE), then the
//! bincode-encoded `Message`.

use crate::error::NetworkError;
use strata_core::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    pub magic: u32,
    pub max_frame_bytes: usize,
}

impl FrameCodec {
    pub fn new(magic: u32, max_frame_bytes: usize) -> Self {
        FrameCodec {
            magic,
            max_frame_bytes,
        }
    }

    pub fn encode(&self, message: &Message) -> Result<Vec<u8>, NetworkError> {
        let payload = bincode::serialize(message).map_err(|e| NetworkError::Codec(e.to_string()))?;
        if payload.len() > self.max_frame_bytes {
            return Err(NetworkError::FrameTooLarge {
                size: payload.len(),
                max: self.max_frame_bytes,
            });
        }

        let mut frame = Vec::with_capacity(8 + payload.len());
        frame.extend_from_slice(&self.magic.to_be_bytes());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    pub async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut W, message: &Message) -> Result<(), NetworkError> {
        let frame = self.encode(message)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one frame; a clean EOF before the header is `Disconnected`
    pub async fn read<R: AsyncRead + Unpin>(&self, reader: &mut R) -> Result<Message, NetworkError> {
        let mut header = [0u8; 8];
        if let Err(e) = reader.read_exact(&mut header).await {
            return Err(match e.kind() {
                std::io::ErrorKind::UnexpectedEof => NetworkError::Disconnected,
                _ => NetworkError::Io(e),
            });
        }

        let magic = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        if magic != self.magic {
            return Err(NetworkError::WrongMagic(magic));
        }
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        if len > self.max_frame_bytes {
            return Err(NetworkError::FrameTooLarge {
                size: len,
                max: self.max_frame_bytes,
            });
        }

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await?;
        bincode::deserialize(&payload).map_err(|e| NetworkError::Codec(e.to_string()))
    }
}
