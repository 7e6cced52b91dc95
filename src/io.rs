use crate::Result;
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use async_compression::tokio::write::{GzipEncoder, ZstdEncoder};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter};

/// Compression applied to the extracted flat file, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

impl Compression {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()).unwrap_or_default() {
            "gz" => Compression::Gzip,
            "zst" => Compression::Zstd,
            _ => Compression::None,
        }
    }
}

/// Open a flat file for reading, decompressing gzip/zstd transparently.
pub async fn reader_from_path(path: &Path) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
    let file = File::open(path).await?;
    // Use a larger buffer for fewer syscalls (1 MiB)
    let buf = BufReader::with_capacity(1 << 20, file);
    let reader: Box<dyn AsyncRead + Unpin + Send> = match Compression::for_path(path) {
        Compression::Gzip => Box::new(GzipDecoder::new(buf)),
        Compression::Zstd => Box::new(ZstdDecoder::new(buf)),
        Compression::None => Box::new(buf),
    };
    Ok(reader)
}

/// Create (truncating) a flat file for writing, compressing by extension.
///
/// Callers must `shutdown()` the writer so compressed trailers are emitted.
pub async fn writer_to_path(path: &Path) -> Result<Box<dyn AsyncWrite + Unpin + Send>> {
    let file = File::create(path).await?;
    let buf = BufWriter::with_capacity(1 << 20, file);
    let writer: Box<dyn AsyncWrite + Unpin + Send> = match Compression::for_path(path) {
        Compression::Gzip => Box::new(GzipEncoder::new(buf)),
        Compression::Zstd => Box::new(ZstdEncoder::new(buf)),
        Compression::None => Box::new(buf),
    };
    Ok(writer)
}
