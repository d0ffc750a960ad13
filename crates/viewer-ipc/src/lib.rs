//! # viewer-ipc
//!
//! Wire protocol spoken between two viewer instances in the same login session.
//!
//! Every message is a frame: a little-endian `u32` payload length followed by a
//! bincode-encoded [`ViewerRequest`] or [`ViewerResponse`]. One request is
//! answered by exactly one response on the same stream.

use serde::{Deserialize, Serialize};

/// Name of the single remote method, as it appears in logs.
pub const GO_SLURL_METHOD: &str = "GoSLURL";

/// Largest payload accepted in either direction. A locator is a short URL, so
/// anything bigger than this is a confused or hostile peer.
pub const MAX_IPC_SIZE: usize = 64 * 1024;

/// bincode tags variants by declaration index, not name: only ever append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewerRequest {
    /// Ask the receiving instance to navigate to `locator`.
    GoSlurl { locator: String },
}

impl ViewerRequest {
    pub fn method_name(&self) -> &'static str {
        match self {
            ViewerRequest::GoSlurl { .. } => GO_SLURL_METHOD,
        }
    }
}

/// Variant order is part of the wire format, as for [`ViewerRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewerResponse {
    /// The call was received. `dispatched` reports whether navigation itself
    /// accepted the locator.
    GoSlurlAck { dispatched: bool },
    /// Call-level failure on the receiving side.
    Error(String),
}

#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),
    #[error("Peer reported error: {0}")]
    Remote(String),
}

/// Encode a message into a complete frame (length prefix + payload).
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>, IpcError> {
    let payload = bincode::serialize(message)?;
    if payload.len() > MAX_IPC_SIZE {
        return Err(IpcError::FrameTooLarge(payload.len()));
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Validate a frame length prefix before allocating a buffer for it.
pub fn check_frame_len(len_buf: [u8; 4]) -> Result<usize, IpcError> {
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_IPC_SIZE {
        return Err(IpcError::FrameTooLarge(len));
    }
    Ok(len)
}

#[cfg(feature = "tokio")]
pub mod frame {
    use super::*;
    use serde::de::DeserializeOwned;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    /// Write one framed message and flush it.
    pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), IpcError>
    where
        W: AsyncWrite + Unpin,
        T: Serialize,
    {
        let frame = encode_frame(message)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one framed message. Oversized frames are rejected before the
    /// payload is read.
    pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, IpcError>
    where
        R: AsyncRead + Unpin,
        T: DeserializeOwned,
    {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf).await?;
        let len = check_frame_len(len_buf)?;

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await?;
        Ok(bincode::deserialize(&payload)?)
    }
}

/// Client side of the protocol, used by a second instance.
#[cfg(feature = "tokio")]
pub mod client {
    use super::frame::{read_frame, write_frame};
    use super::*;
    use std::path::Path;
    use tokio::net::UnixStream;

    pub struct ViewerClient {
        stream: UnixStream,
    }

    impl ViewerClient {
        /// Connect to the instance listening on `socket_path`.
        pub async fn connect_to(socket_path: &Path) -> Result<Self, IpcError> {
            let stream = UnixStream::connect(socket_path).await?;
            Ok(Self { stream })
        }

        /// Send a request and receive its response
        pub async fn send(&mut self, request: &ViewerRequest) -> Result<ViewerResponse, IpcError> {
            write_frame(&mut self.stream, request).await?;
            read_frame(&mut self.stream).await
        }

        /// Invoke `GoSLURL` on the peer. Returns whether the peer dispatched it.
        pub async fn go_slurl(&mut self, locator: &str) -> Result<bool, IpcError> {
            let request = ViewerRequest::GoSlurl {
                locator: locator.to_string(),
            };
            match self.send(&request).await? {
                ViewerResponse::GoSlurlAck { dispatched } => Ok(dispatched),
                ViewerResponse::Error(e) => Err(IpcError::Remote(e)),
            }
        }
    }
}
