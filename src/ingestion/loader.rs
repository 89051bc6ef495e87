//! Built-in loaders and the byte-stream pipeline: decompression, stats and decoding.

use std::fs;
use std::io::{self, Cursor, Read};
use std::sync::{Arc, Mutex, MutexGuard};

use encoding_rs::{DecoderResult, Encoding};
use flate2::read::MultiGzDecoder;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{TableError, TableResult};
use crate::file::{Compression, File, Hashing, Source};

use super::{ByteStream, Loader};

/// Reads `Source::Path` from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileLoader;

impl Loader for FileLoader {
    fn open(&self, file: &File) -> TableResult<ByteStream> {
        match file.source() {
            Source::Path(path) => Ok(Box::new(fs::File::open(path)?)),
            other => Err(mismatch("file", other)),
        }
    }
}

/// Serves `Source::Text` as UTF-8 bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextLoader;

impl Loader for TextLoader {
    fn open(&self, file: &File) -> TableResult<ByteStream> {
        match file.source() {
            Source::Text(text) => Ok(Box::new(Cursor::new(text.clone().into_bytes()))),
            other => Err(mismatch("text", other)),
        }
    }
}

/// Serves `Source::Bytes` as is.
#[derive(Debug, Default, Clone, Copy)]
pub struct BufferLoader;

impl Loader for BufferLoader {
    fn open(&self, file: &File) -> TableResult<ByteStream> {
        match file.source() {
            Source::Bytes(bytes) => Ok(Box::new(Cursor::new(Arc::clone(bytes)))),
            other => Err(mismatch("buffer", other)),
        }
    }
}

fn mismatch(scheme: &str, source: &Source) -> TableError {
    TableError::Scheme {
        message: format!("scheme \"{scheme}\" cannot load source {source}"),
    }
}

enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
}

struct StatsState {
    bytes: u64,
    hasher: Hasher,
}

/// Byte count and streaming hash shared between a stream and its table.
#[derive(Clone)]
pub struct StreamStats {
    inner: Arc<Mutex<StatsState>>,
}

impl std::fmt::Debug for StreamStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamStats").field("bytes", &self.bytes()).finish()
    }
}

impl StreamStats {
    pub fn new(hashing: Hashing) -> Self {
        let hasher = match hashing {
            Hashing::Sha256 => Hasher::Sha256(Sha256::new()),
            Hashing::Sha512 => Hasher::Sha512(Sha512::new()),
        };
        Self {
            inner: Arc::new(Mutex::new(StatsState { bytes: 0, hasher })),
        }
    }

    fn state(&self) -> MutexGuard<'_, StatsState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update(&self, chunk: &[u8]) {
        let mut state = self.state();
        state.bytes += chunk.len() as u64;
        match &mut state.hasher {
            Hasher::Sha256(h) => h.update(chunk),
            Hasher::Sha512(h) => h.update(chunk),
        }
    }

    pub fn bytes(&self) -> u64 {
        self.state().bytes
    }

    /// Lowercase hex digest of the bytes read so far.
    pub fn hash(&self) -> String {
        match &self.state().hasher {
            Hasher::Sha256(h) => format!("{:x}", h.clone().finalize()),
            Hasher::Sha512(h) => format!("{:x}", h.clone().finalize()),
        }
    }
}

struct StatsReader<R> {
    inner: R,
    stats: StreamStats,
}

impl<R: Read> Read for StatsReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.stats.update(&buf[..n]);
        Ok(n)
    }
}

/// Open a file through its loader, decompress it and count/hash the decompressed bytes.
pub fn open_byte_stream(loader: &dyn Loader, file: &File, stats: &StreamStats) -> TableResult<ByteStream> {
    let raw = loader.open(file)?;
    let stream: ByteStream = match file.compression() {
        None => raw,
        Some(Compression::Gz) => {
            let mut decoder = MultiGzDecoder::new(raw);
            let head = read_prefix(&mut decoder, 8192).map_err(|e| compression_error(Compression::Gz, e))?;
            Box::new(Cursor::new(head).chain(decoder))
        }
        Some(Compression::Zip) => Box::new(Cursor::new(unzip(raw, file.compression_path())?)),
    };
    Ok(Box::new(StatsReader {
        inner: stream,
        stats: stats.clone(),
    }))
}

fn compression_error(compression: Compression, err: impl std::fmt::Display) -> TableError {
    TableError::Compression {
        message: format!("cannot decompress {} source: {err}", compression.as_str()),
    }
}

fn unzip(mut raw: ByteStream, member: Option<&str>) -> TableResult<Vec<u8>> {
    let mut archive_bytes = Vec::new();
    raw.read_to_end(&mut archive_bytes)?;
    let mut archive =
        zip::ZipArchive::new(Cursor::new(archive_bytes)).map_err(|e| compression_error(Compression::Zip, e))?;
    let name = match member {
        Some(name) => name.to_string(),
        None => archive
            .file_names()
            .filter(|n| !n.ends_with('/'))
            .min()
            .map(str::to_string)
            .ok_or_else(|| compression_error(Compression::Zip, "archive is empty"))?,
    };
    let mut entry = archive
        .by_name(&name)
        .map_err(|e| compression_error(Compression::Zip, format!("{name}: {e}")))?;
    let mut out = Vec::new();
    entry
        .read_to_end(&mut out)
        .map_err(|e| compression_error(Compression::Zip, e))?;
    Ok(out)
}

/// Read up to `limit` bytes without losing them: returns the prefix and a stream that
/// replays it before the rest.
pub fn peek(mut stream: ByteStream, limit: usize) -> TableResult<(Vec<u8>, ByteStream)> {
    let prefix = read_prefix(&mut stream, limit)?;
    Ok((prefix.clone(), Box::new(Cursor::new(prefix).chain(stream))))
}

fn read_prefix(stream: &mut impl Read, limit: usize) -> io::Result<Vec<u8>> {
    let mut prefix = Vec::with_capacity(limit.min(64 * 1024));
    stream.by_ref().take(limit as u64).read_to_end(&mut prefix)?;
    Ok(prefix)
}

/// Resolve an encoding label, erroring on unknown labels.
pub fn lookup_encoding(label: &str) -> TableResult<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| TableError::Encoding {
        message: format!("encoding \"{label}\" is not supported"),
    })
}

/// Streaming transcoder to UTF-8 that fails on malformed input.
///
/// A BOM of the source encoding is removed. Malformed sequences surface as
/// `io::ErrorKind::InvalidData`.
pub struct DecodingReader<R> {
    inner: R,
    decoder: encoding_rs::Decoder,
    input: Box<[u8]>,
    in_start: usize,
    in_end: usize,
    output: Box<[u8]>,
    out_start: usize,
    out_end: usize,
    eof: bool,
    done: bool,
}

const DECODE_CHUNK: usize = 8 * 1024;

impl<R: Read> DecodingReader<R> {
    pub fn new(inner: R, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            decoder: encoding.new_decoder_with_bom_removal(),
            input: vec![0; DECODE_CHUNK].into_boxed_slice(),
            in_start: 0,
            in_end: 0,
            output: vec![0; DECODE_CHUNK * 3 + 16].into_boxed_slice(),
            out_start: 0,
            out_end: 0,
            eof: false,
            done: false,
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        while self.out_start == self.out_end && !self.done {
            if self.in_start == self.in_end && !self.eof {
                let n = self.inner.read(&mut self.input)?;
                self.in_start = 0;
                self.in_end = n;
                self.eof = n == 0;
            }
            let (result, read, written) = self.decoder.decode_to_utf8_without_replacement(
                &self.input[self.in_start..self.in_end],
                &mut self.output,
                self.eof,
            );
            self.in_start += read;
            self.out_start = 0;
            self.out_end = written;
            match result {
                DecoderResult::Malformed(_, _) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("cannot decode source as {}", self.decoder.encoding().name()),
                    ));
                }
                DecoderResult::InputEmpty if self.eof => self.done = true,
                _ => {}
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.fill()?;
        let n = buf.len().min(self.out_end - self.out_start);
        buf[..n].copy_from_slice(&self.output[self.out_start..self.out_start + n]);
        self.out_start += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression as Level;
    use flate2::write::GzEncoder;

    use super::*;

    fn read_all(mut stream: impl Read) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        stream.read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn stats_count_and_hash() {
        let file = File::from_text("id\n1\n");
        let stats = StreamStats::new(Hashing::Sha256);
        let stream = open_byte_stream(&TextLoader, &file, &stats).unwrap();
        assert_eq!(read_all(stream).unwrap(), b"id\n1\n");
        assert_eq!(stats.bytes(), 5);
        assert_eq!(stats.hash().len(), 64);

        let sha512 = StreamStats::new(Hashing::Sha512);
        read_all(open_byte_stream(&TextLoader, &file, &sha512).unwrap()).unwrap();
        assert_eq!(sha512.hash().len(), 128);
    }

    #[test]
    fn gzip_is_decompressed() {
        let mut encoder = GzEncoder::new(Vec::new(), Level::default());
        encoder.write_all(b"a,b\n1,2\n").unwrap();
        let file = File::from_bytes(encoder.finish().unwrap()).with_compression(Some(Compression::Gz));
        let stats = StreamStats::new(Hashing::Sha256);
        let stream = open_byte_stream(&BufferLoader, &file, &stats).unwrap();
        assert_eq!(read_all(stream).unwrap(), b"a,b\n1,2\n");
        assert_eq!(stats.bytes(), 8);
    }

    #[test]
    fn broken_gzip_is_a_compression_error() {
        let file = File::from_bytes(b"not gzip".to_vec()).with_compression(Some(Compression::Gz));
        let stats = StreamStats::new(Hashing::Sha256);
        let err = open_byte_stream(&BufferLoader, &file, &stats).err().unwrap();
        assert!(matches!(err, TableError::Compression { .. }));
    }

    #[test]
    fn decoding_reader_transcodes_and_rejects() {
        let latin1 = DecodingReader::new(&b"caf\xe9"[..], encoding_rs::WINDOWS_1252);
        assert_eq!(String::from_utf8(read_all(latin1).unwrap()).unwrap(), "café");

        let bom = DecodingReader::new(&b"\xef\xbb\xbfid"[..], encoding_rs::UTF_8);
        assert_eq!(read_all(bom).unwrap(), b"id");

        let bad = DecodingReader::new(&b"caf\xe9"[..], encoding_rs::UTF_8);
        assert_eq!(read_all(bad).unwrap_err().kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn peek_replays_prefix() {
        let stream: ByteStream = Box::new(Cursor::new(b"abcdef".to_vec()));
        let (prefix, rest) = peek(stream, 3).unwrap();
        assert_eq!(prefix, b"abc");
        assert_eq!(read_all(rest).unwrap(), b"abcdef");
        assert!(lookup_encoding("latin1").is_ok());
        assert!(lookup_encoding("klingon").is_err());
    }
}
