//! Transfer handlers: streamed upload, chunked download, and listing.
//!
//! The facade owns the [`Store`] and mediates every blob read and write; no
//! other component touches the storage directory.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use depot_proto::{read_frame, write_frame, Reply, UploadFrame, CHUNK_SIZE};
use depot_store::{now_rfc3339, Store};

use crate::error::ServiceError;

pub struct FileService {
    store: Arc<Store>,
}

impl FileService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Client-streaming upload. Reads `UploadFrame`s off the connection
    /// until the client half-closes, then returns the terminal reply.
    ///
    /// The legal sequence is one `Info` followed by chunks. The blob is
    /// created (truncating any previous content under the same name) as soon
    /// as the info frame is accepted; a failure after that point leaves the
    /// partially written blob on disk and no metadata entry.
    pub async fn upload<S>(&self, conn: &mut S) -> Result<Reply, ServiceError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut dest: Option<tokio::fs::File> = None;
        let mut filename = String::new();
        let mut size: u64 = 0;

        loop {
            let frame = read_frame::<_, UploadFrame>(conn)
                .await
                .map_err(|e| ServiceError::internal("failed to receive data", e))?;

            match frame {
                Some(UploadFrame::Info { filename: name }) => {
                    if dest.is_some() {
                        return Err(ServiceError::invalid("file info already sent"));
                    }
                    validate_filename(&name)?;

                    let path = self.store.blob_path(&name);
                    let file = tokio::fs::File::create(&path)
                        .await
                        .map_err(|e| ServiceError::internal("failed to create file", e))?;
                    debug!(filename = %name, "upload started");
                    dest = Some(file);
                    filename = name;
                }
                Some(UploadFrame::Chunk(bytes)) => {
                    let file = dest
                        .as_mut()
                        .ok_or_else(|| ServiceError::invalid("file info not sent"))?;
                    file.write_all(&bytes)
                        .await
                        .map_err(|e| ServiceError::internal("failed to write data", e))?;
                    size += bytes.len() as u64;
                }
                None => break,
            }
        }

        let mut file = dest.ok_or_else(|| ServiceError::invalid("file not sent"))?;
        file.flush()
            .await
            .map_err(|e| ServiceError::internal("failed to write data", e))?;
        drop(file);

        // One completion timestamp for both fields: a re-upload does not
        // keep the original creation time.
        let now = now_rfc3339();
        self.store.upsert(&filename, &now);
        info!(filename = %filename, size, "upload complete");

        Ok(Reply::UploadDone {
            id: filename.clone(),
            filename,
            size,
            created_at: now,
        })
    }

    /// Server-streaming download: emits the blob as `Reply::Chunk` frames.
    /// The stream ends by closing, with no trailing sentinel. Returns
    /// `Ok(())` with nothing further to send on success.
    pub async fn download<S>(&self, filename: &str, conn: &mut S) -> Result<(), ServiceError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if filename.is_empty() {
            return Err(ServiceError::invalid("file name cannot be empty"));
        }
        // Index lookup before touching the filesystem.
        if !self.store.contains(filename) {
            return Err(ServiceError::NotFound(filename.to_string()));
        }

        let path = self.store.blob_path(filename);
        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| ServiceError::internal("failed to open file", e))?;

        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut sent: u64 = 0;
        loop {
            let n = file
                .read(&mut buffer)
                .await
                .map_err(|e| ServiceError::internal("failed to read file", e))?;
            if n == 0 {
                break;
            }
            write_frame(conn, &Reply::Chunk(buffer[..n].to_vec()))
                .await
                .map_err(|e| ServiceError::internal("failed to send data", e))?;
            sent += n as u64;
        }

        debug!(filename = %filename, sent, "download complete");
        Ok(())
    }

    /// Unary listing: a finite snapshot of the index, empty when nothing is
    /// stored.
    pub fn list(&self) -> Reply {
        Reply::Files(self.store.snapshot())
    }
}

/// Filenames are bare names under the storage root. Path separators,
/// traversal components, and NUL are rejected before any file is created.
fn validate_filename(name: &str) -> Result<(), ServiceError> {
    if name.is_empty() {
        return Err(ServiceError::invalid("file name cannot be empty"));
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') || name == "." || name == ".." {
        return Err(ServiceError::invalid(format!("invalid file name: {}", name)));
    }
    Ok(())
}
