//! Compressed blob storage.
//!
//! Each upload is stored gzip-compressed as `<filename>.gz` in its namespace.
//! All functions here do blocking I/O and are meant to be called from
//! `spawn_blocking`.
//!
//! Reads never inflate the whole blob up front:
//!
//! - the uncompressed size comes from the gzip ISIZE trailer
//! - the content type is sniffed from the first [`SNIFF_PREFIX_LEN`]
//!   decompressed bytes, which are then replayed ahead of the rest
//! - [`ImageReader::into_stream`] inflates chunk by chunk as the consumer pulls

use std::fmt;
use std::fs::File;
use std::io::{self, Chain, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::format::{sniff, ImageKind, SNIFF_PREFIX_LEN};
use crate::io::write_atomic_with;

// =============================================================================
// Naming
// =============================================================================

/// Suffix appended to the original filename on disk.
pub const BLOB_SUFFIX: &str = ".gz";

/// Longest accepted filename.
///
/// Leaves room for the blob suffix and the temporary-file decoration within
/// the usual 255 byte limit on file names.
pub const MAX_FILENAME_LEN: usize = 200;

/// Smallest possible gzip member: 10 byte header plus 8 byte trailer.
const GZIP_MIN_LEN: u64 = 18;

/// Bytes inflated per chunk when streaming.
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Chunks buffered between the inflating task and the consumer.
const STREAM_CHANNEL_DEPTH: usize = 4;

/// Whether `filename` can be stored without leaving its namespace.
pub fn is_valid_filename(filename: &str) -> bool {
    !filename.is_empty()
        && filename.len() <= MAX_FILENAME_LEN
        && !filename.starts_with('.')
        && !filename.contains(|c| matches!(c, '/' | '\\' | '\0'))
}

/// Path of the blob holding `filename` inside namespace `dir`.
pub fn blob_path(dir: &Path, filename: &str) -> PathBuf {
    dir.join(format!("{}{}", filename, BLOB_SUFFIX))
}

/// Original filename of a blob directory entry, if it is one.
pub fn blob_filename(entry_name: &str) -> Option<&str> {
    entry_name
        .strip_suffix(BLOB_SUFFIX)
        .filter(|name| is_valid_filename(name))
}

// =============================================================================
// Writing
// =============================================================================

/// Compress `content` into a blob at `path`, atomically replacing any
/// existing file.
pub fn write_blob(path: &Path, content: &[u8]) -> io::Result<()> {
    write_atomic_with(path, |file| {
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(content)?;
        encoder.finish()?;
        Ok(())
    })
}

// =============================================================================
// Reading
// =============================================================================

/// An opened blob, ready to stream.
#[derive(Debug)]
pub struct OpenedBlob {
    /// Decompressing reader positioned at the start of the image
    pub reader: ImageReader,

    /// Uncompressed size in bytes
    pub size: u64,

    /// Sniffed format, `None` if the stored bytes are not a supported image
    pub kind: Option<ImageKind>,
}

/// Open the blob at `path` for streaming decompression.
pub fn open_blob(path: &Path) -> io::Result<OpenedBlob> {
    let mut file = File::open(path)?;
    let size = read_uncompressed_size(&mut file)?;

    let mut decoder = GzDecoder::new(file);
    let mut prefix = Vec::with_capacity(SNIFF_PREFIX_LEN);
    Read::by_ref(&mut decoder)
        .take(SNIFF_PREFIX_LEN as u64)
        .read_to_end(&mut prefix)?;

    let kind = sniff(&prefix);

    Ok(OpenedBlob {
        reader: ImageReader {
            inner: Cursor::new(prefix).chain(decoder),
        },
        size,
        kind,
    })
}

/// Read the ISIZE field of the gzip trailer and rewind.
///
/// ISIZE is the uncompressed length modulo 2^32; uploads are bounded far
/// below that.
fn read_uncompressed_size(file: &mut File) -> io::Result<u64> {
    if file.metadata()?.len() < GZIP_MIN_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "blob is too short to be gzip data",
        ));
    }

    file.seek(SeekFrom::End(-4))?;
    let mut trailer = [0u8; 4];
    file.read_exact(&mut trailer)?;
    file.seek(SeekFrom::Start(0))?;

    Ok(u32::from_le_bytes(trailer) as u64)
}

/// Decompressing reader over a stored image.
pub struct ImageReader {
    inner: Chain<Cursor<Vec<u8>>, GzDecoder<File>>,
}

impl Read for ImageReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl fmt::Debug for ImageReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageReader").finish_non_exhaustive()
    }
}

impl ImageReader {
    /// Inflate on a blocking task and hand out chunks as an async stream.
    ///
    /// Dropping the stream stops the task at the next chunk boundary. Must be
    /// called from within a Tokio runtime.
    pub fn into_stream(mut self) -> ReceiverStream<io::Result<Bytes>> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_DEPTH);

        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                match self.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = tx.blocking_send(Err(e));
                        break;
                    }
                }
            }
        });

        ReceiverStream::new(rx)
    }
}
