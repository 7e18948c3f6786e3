//! Request bodies for part and object uploads.
//!
//! A [`RequestBody`] is a handle to bytes that have not necessarily been
//! loaded yet: an in-memory buffer, a byte range of a local file, a whole
//! file, or an arbitrary async reader. Whether the length is known up front
//! matters for multipart validation, see [`RequestBody::content_length`].

use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};

/// Body of an `UploadPart` or `PutObject` request.
pub enum RequestBody {
    /// Bytes already in memory.
    Bytes(Bytes),
    /// `length` bytes of `path` starting at `offset`.
    FileRange {
        /// File to read from.
        path: PathBuf,
        /// Byte offset of the range.
        offset: u64,
        /// Length of the range.
        length: u64,
    },
    /// The whole file at `path`; its length is only learned when sent.
    File(PathBuf),
    /// An async reader, with a declared length when the producer knows it.
    Reader {
        /// The byte source.
        reader: Box<dyn AsyncRead + Send + Sync + Unpin>,
        /// Declared length, if known.
        length: Option<u64>,
    },
}

impl RequestBody {
    /// Body backed by an in-memory buffer.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::Bytes(bytes.into())
    }

    /// Body backed by a byte range of a local file.
    #[must_use]
    pub fn from_file_range(path: impl Into<PathBuf>, offset: u64, length: u64) -> Self {
        Self::FileRange {
            path: path.into(),
            offset,
            length,
        }
    }

    /// Body backed by a whole local file.
    ///
    /// The length is reported as unknown; use [`from_file_range`] when the
    /// body must pass multipart size validation.
    ///
    /// [`from_file_range`]: Self::from_file_range
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Body backed by an async reader.
    #[must_use]
    pub fn from_reader(
        reader: Box<dyn AsyncRead + Send + Sync + Unpin>,
        length: Option<u64>,
    ) -> Self {
        Self::Reader { reader, length }
    }

    /// Length of the body when known before sending.
    ///
    /// # Examples
    ///
    /// ```
    /// use stowage_core::body::RequestBody;
    ///
    /// assert_eq!(RequestBody::from_bytes(vec![0u8; 16]).content_length(), Some(16));
    /// assert_eq!(RequestBody::from_path("/tmp/x").content_length(), None);
    /// ```
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        match self {
            Self::Bytes(bytes) => Some(bytes.len() as u64),
            Self::FileRange { length, .. } => Some(*length),
            Self::File(_) => None,
            Self::Reader { length, .. } => *length,
        }
    }

    /// Read the whole body into memory.
    ///
    /// File ranges are read exactly; a file shorter than the declared range
    /// is an [`UnexpectedEof`](std::io::ErrorKind::UnexpectedEof) error.
    pub async fn into_bytes(self) -> std::io::Result<Bytes> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::FileRange {
                path,
                offset,
                length,
            } => read_range(&path, offset, length).await.map(Bytes::from),
            Self::File(path) => tokio::fs::read(&path).await.map(Bytes::from),
            Self::Reader { mut reader, length } => {
                let mut buf = Vec::with_capacity(capacity_hint(length));
                reader.read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::FileRange {
                path,
                offset,
                length,
            } => f
                .debug_struct("FileRange")
                .field("path", path)
                .field("offset", offset)
                .field("length", length)
                .finish(),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Reader { length, .. } => f
                .debug_struct("Reader")
                .field("length", length)
                .finish_non_exhaustive(),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

/// Read exactly `length` bytes of `path` starting at `offset`.
pub async fn read_range(path: &Path, offset: u64, length: u64) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    let len = usize::try_from(length).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("range of {length} bytes does not fit in memory"),
        )
    })?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

fn capacity_hint(length: Option<u64>) -> usize {
    length
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or_default()
}
