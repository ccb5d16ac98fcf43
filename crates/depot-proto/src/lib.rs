//! # depot-proto
//!
//! Wire protocol for the Depot file-storage service.
//!
//! Every message travels as one frame: a little-endian u32 length prefix
//! followed by a bincode payload, capped at [`MAX_FRAME_SIZE`]. A call is
//! one TCP connection:
//!
//! - **Upload** (client-streaming): `Request::Upload`, then an `Info` frame
//!   and any number of `Chunk` frames; the client half-closes its write side
//!   and reads a single terminal [`Reply`].
//! - **Download** (server-streaming): `Request::Download`, then the server
//!   sends `Reply::Chunk` frames and closes the stream; no trailing
//!   sentinel.
//! - **List** (unary): `Request::List`, one `Reply::Files` back.
//!
//! Failures arrive as a terminal `Reply::Error` carrying an [`ErrorKind`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use depot_store::FileMetadata;

/// Upper bound on one frame, to stop a bad peer from forcing a huge
/// allocation. Not a protocol guarantee.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Transfer buffer size for upload/download chunking. An implementation
/// constant: peers must not assume any particular chunk boundary.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// First frame of every call, selecting the operation.
#[derive(Debug, Serialize, Deserialize)]
pub enum Request {
    Upload,
    Download { filename: String },
    List,
}

impl Request {
    /// Operation name, as used for admission keying and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Upload => "upload",
            Request::Download { .. } => "download",
            Request::List => "list",
        }
    }
}

/// Client frames following `Request::Upload`. The legal sequence is exactly
/// one `Info` followed by zero or more `Chunk`s; the server enforces it.
#[derive(Debug, Serialize, Deserialize)]
pub enum UploadFrame {
    Info { filename: String },
    Chunk(Vec<u8>),
}

/// Server frames. `Chunk` only appears in download streams; the others are
/// terminal.
#[derive(Debug, Serialize, Deserialize)]
pub enum Reply {
    UploadDone {
        id: String,
        filename: String,
        size: u64,
        created_at: String,
    },
    Chunk(Vec<u8>),
    Files(Vec<FileMetadata>),
    Error { kind: ErrorKind, message: String },
}

/// Failure taxonomy carried on the wire.
///
/// `ResourceExhausted` is retriable later; `InvalidArgument` and `NotFound`
/// are not retriable without changing input; `Internal` may be transient but
/// is never retried by the service itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    ResourceExhausted,
    Internal,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::NotFound => "not found",
            ErrorKind::ResourceExhausted => "resource exhausted",
            ErrorKind::Internal => "internal",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Errors raised by the framing layer itself.
#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("frame of {len} bytes exceeds the {MAX_FRAME_SIZE} byte limit")]
    FrameTooLarge { len: usize },
}

#[cfg(feature = "tokio")]
mod frame {
    use super::{ProtoError, MAX_FRAME_SIZE};
    use serde::de::DeserializeOwned;
    use serde::Serialize;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    /// Write one length-prefixed bincode frame.
    pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<(), ProtoError>
    where
        W: AsyncWrite + Unpin,
        T: Serialize,
    {
        let payload = bincode::serialize(msg)?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(ProtoError::FrameTooLarge { len: payload.len() });
        }
        writer.write_all(&(payload.len() as u32).to_le_bytes()).await?;
        writer.write_all(&payload).await?;
        Ok(())
    }

    /// Read one frame, or `None` on a clean end-of-stream at a frame
    /// boundary. End-of-stream anywhere past the first prefix byte is a
    /// truncated frame, not a clean end: callers treat `None` as successful
    /// completion, so only a boundary EOF may produce it. Oversized prefixes
    /// are rejected before any allocation.
    pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, ProtoError>
    where
        R: AsyncRead + Unpin,
        T: DeserializeOwned,
    {
        let mut len_buf = [0u8; 4];
        if reader.read(&mut len_buf[..1]).await? == 0 {
            return Ok(None);
        }
        reader.read_exact(&mut len_buf[1..]).await?;

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(ProtoError::FrameTooLarge { len });
        }

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await?;
        Ok(Some(bincode::deserialize(&payload)?))
    }
}

#[cfg(feature = "tokio")]
pub use frame::{read_frame, write_frame};

/// Async client for the Depot protocol. One connection carries one call.
#[cfg(feature = "tokio")]
pub mod client {
    use super::*;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[derive(Error, Debug)]
    pub enum ClientError {
        #[error(transparent)]
        Proto(#[from] ProtoError),

        /// The server rejected or aborted the call.
        #[error("{kind}: {message}")]
        Remote { kind: ErrorKind, message: String },

        #[error("connection closed before a terminal reply")]
        MissingReply,

        #[error("unexpected reply from server")]
        UnexpectedReply,
    }

    /// Terminal reply of a successful upload.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct UploadReceipt {
        pub id: String,
        pub filename: String,
        pub size: u64,
        pub created_at: String,
    }

    pub struct DepotClient {
        stream: TcpStream,
    }

    impl DepotClient {
        pub async fn connect(addr: &str) -> Result<Self, ClientError> {
            let stream = TcpStream::connect(addr).await.map_err(ProtoError::Io)?;
            Ok(Self { stream })
        }

        /// Stream `reader` to the server under `filename` and return the
        /// server's receipt.
        pub async fn upload<R>(
            mut self,
            filename: &str,
            reader: &mut R,
        ) -> Result<UploadReceipt, ClientError>
        where
            R: AsyncRead + Unpin,
        {
            write_frame(&mut self.stream, &Request::Upload).await?;
            write_frame(
                &mut self.stream,
                &UploadFrame::Info {
                    filename: filename.to_string(),
                },
            )
            .await?;

            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                let n = reader.read(&mut buf).await.map_err(ProtoError::Io)?;
                if n == 0 {
                    break;
                }
                write_frame(&mut self.stream, &UploadFrame::Chunk(buf[..n].to_vec())).await?;
            }

            // Half-close: end-of-stream for the server, response still
            // readable.
            self.stream.shutdown().await.map_err(ProtoError::Io)?;

            match read_frame::<_, Reply>(&mut self.stream).await? {
                Some(Reply::UploadDone {
                    id,
                    filename,
                    size,
                    created_at,
                }) => Ok(UploadReceipt {
                    id,
                    filename,
                    size,
                    created_at,
                }),
                Some(Reply::Error { kind, message }) => Err(ClientError::Remote { kind, message }),
                Some(_) => Err(ClientError::UnexpectedReply),
                None => Err(ClientError::MissingReply),
            }
        }

        /// Download `filename` into `out`, returning the byte count.
        pub async fn download<W>(
            mut self,
            filename: &str,
            out: &mut W,
        ) -> Result<u64, ClientError>
        where
            W: AsyncWrite + Unpin,
        {
            write_frame(
                &mut self.stream,
                &Request::Download {
                    filename: filename.to_string(),
                },
            )
            .await?;

            let mut received: u64 = 0;
            loop {
                match read_frame::<_, Reply>(&mut self.stream).await? {
                    Some(Reply::Chunk(bytes)) => {
                        out.write_all(&bytes).await.map_err(ProtoError::Io)?;
                        received += bytes.len() as u64;
                    }
                    Some(Reply::Error { kind, message }) => {
                        return Err(ClientError::Remote { kind, message })
                    }
                    Some(_) => return Err(ClientError::UnexpectedReply),
                    // Stream ends with no sentinel.
                    None => break,
                }
            }
            out.flush().await.map_err(ProtoError::Io)?;
            Ok(received)
        }

        pub async fn list(mut self) -> Result<Vec<FileMetadata>, ClientError> {
            write_frame(&mut self.stream, &Request::List).await?;
            match read_frame::<_, Reply>(&mut self.stream).await? {
                Some(Reply::Files(files)) => Ok(files),
                Some(Reply::Error { kind, message }) => Err(ClientError::Remote { kind, message }),
                Some(_) => Err(ClientError::UnexpectedReply),
                None => Err(ClientError::MissingReply),
            }
        }
    }
}
