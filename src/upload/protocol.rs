//! Transfer of one local file to the remote store.
//!
//! Files up to the chunk size go in a single request. Larger files use an
//! upload session: the first chunk opens it, middle chunks are appended at the
//! running offset, and the last chunk is sent with the commit. Nothing about a
//! session is persisted; an aborted transfer restarts from byte zero.

use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use super::UploadError;
use super::store::{RemoteError, RemoteStore, UploadCursor};

/// Default chunk size and single-request threshold (4 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// How a file of a given size is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    /// One `upload_whole` call.
    Whole,
    /// `start_session`, zero or more `append_chunk`, one `finish_session`.
    Chunked,
}

impl UploadStrategy {
    /// Strategy for `size` bytes with the given threshold.
    #[must_use]
    pub fn for_size(size: u64, chunk_size: usize) -> Self {
        if size <= chunk_size as u64 {
            Self::Whole
        } else {
            Self::Chunked
        }
    }
}

/// Sends `local` to `target`, returning the number of bytes committed.
///
/// # Errors
///
/// Returns [`UploadError::Io`] if the file cannot be read, or
/// [`UploadError::Remote`] on the first failing store call.
pub async fn transfer_file(
    store: &dyn RemoteStore,
    local: &Path,
    target: &str,
    chunk_size: usize,
) -> Result<u64, UploadError> {
    let mut file = File::open(local)
        .await
        .map_err(|e| UploadError::io(local, e))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| UploadError::io(local, e))?
        .len();

    match UploadStrategy::for_size(size, chunk_size) {
        UploadStrategy::Whole => {
            let mut bytes = Vec::with_capacity(usize::try_from(size).unwrap_or_default());
            file.read_to_end(&mut bytes)
                .await
                .map_err(|e| UploadError::io(local, e))?;
            let sent = bytes.len() as u64;
            store.upload_whole(bytes, target).await?;
            Ok(sent)
        }
        UploadStrategy::Chunked => {
            send_chunked(store, &mut file, size, target, chunk_size)
                .await
                .map_err(|e| e.with_path(local))
        }
    }
}

/// Drives one upload session over `reader`, which holds `size` bytes.
pub(crate) async fn send_chunked<R>(
    store: &dyn RemoteStore,
    reader: &mut R,
    size: u64,
    target: &str,
    chunk_size: usize,
) -> Result<u64, UploadError>
where
    R: AsyncRead + Unpin,
{
    let first = read_chunk(reader, chunk_size).await?;
    let first_len = first.len() as u64;
    let session_id = store.start_session(first).await?;
    let mut cursor = UploadCursor {
        session_id,
        offset: first_len,
    };
    debug!(session = %cursor.session_id, size, "upload session started");

    loop {
        let chunk = read_chunk(reader, chunk_size).await?;
        let len = chunk.len() as u64;

        // A short read before `size` means the file shrank; commit what was read
        if chunk.is_empty() || cursor.offset + len >= size {
            store.finish_session(chunk, &cursor, target).await?;
            return Ok(cursor.offset + len);
        }

        let acknowledged = store.append_chunk(chunk, &cursor).await?;
        let expected = cursor.offset + len;
        if acknowledged != expected {
            return Err(RemoteError::OffsetMismatch {
                session_id: cursor.session_id,
                expected,
                actual: acknowledged,
            }
            .into());
        }
        cursor.offset = expected;
    }
}

/// Reads up to `chunk_size` bytes; shorter only at end of input.
async fn read_chunk<R>(reader: &mut R, chunk_size: usize) -> Result<Vec<u8>, UploadError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(chunk_size);
    (&mut *reader)
        .take(chunk_size as u64)
        .read_to_end(&mut buf)
        .await
        .map_err(|e| UploadError::io("<upload source>", e))?;
    Ok(buf)
}
