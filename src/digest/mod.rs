mod crc32;
mod md5;
pub mod pipeline;
pub mod reader;
mod sha;
pub mod source;
pub mod transform;

use std::{fmt::Display, io::Read, path::Path, sync::Arc, thread};

use log::{debug, trace, warn};

use crate::{config::DigestConfig, error::DigestError};
use pipeline::{BufferPool, ChunkBuffer, DoubleBuffer};
use reader::ChunkedReader;
use source::StreamOpener;
use transform::{HashTransform, TransformSet};

/// The default chunk size used to read files, 6 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 4096 * 256 * 6;

/// The largest accepted chunk size, 1 GiB. Each running digest holds two chunks.
pub const MAX_CHUNK_SIZE: usize = 1 << 30;

/// Defines the digest algorithms computed by the engine.
#[derive(
    Debug,
    Clone,
    Copy,
    Hash,
    PartialEq,
    Eq,
    strum_macros::EnumString,
    strum_macros::EnumIter,
    strum_macros::Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum DigestAlgorithm {
    /// CRC32 (CRC-32/ISO-HDLC) is always computed.
    CRC32,
    /// MD5 is computed only in deep mode.
    MD5,
    /// SHA-1 is computed only in deep mode.
    SHA1,
}

impl DigestAlgorithm {
    /// Length of the finalized digest in bytes.
    pub fn digest_len(&self) -> usize {
        match self {
            DigestAlgorithm::CRC32 => 4,
            DigestAlgorithm::MD5 => 16,
            DigestAlgorithm::SHA1 => 20,
        }
    }

    /// Whether the algorithm is only computed during deep verification.
    pub fn is_deep_only(&self) -> bool {
        !matches!(self, DigestAlgorithm::CRC32)
    }

    /// Creates a fresh accumulator for the algorithm.
    pub fn transform(self) -> Box<dyn HashTransform> {
        match self {
            DigestAlgorithm::CRC32 => Box::<crc32::Crc32Transform>::default(),
            DigestAlgorithm::MD5 => Box::<md5::Md5Transform>::default(),
            DigestAlgorithm::SHA1 => Box::<sha::Sha1Transform>::default(),
        }
    }
}

/// A single digest run over a stream of known length.
pub struct DigestRequest<R> {
    pub source: R,
    pub length: u64,
    /// Also compute MD5 and SHA1.
    pub deep: bool,
}

/// The digests of one successful run.
///
/// `md5` and `sha1` are `None` only when the run was not deep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestResult {
    pub crc32: [u8; 4],
    pub md5: Option<[u8; 16]>,
    pub sha1: Option<[u8; 20]>,
}

impl DigestResult {
    /// The CRC32 value as an integer.
    pub fn crc32_value(&self) -> u32 {
        u32::from_be_bytes(self.crc32)
    }

    /// Hex-encoded digest for the given algorithm, if it was computed.
    pub fn hex(&self, algorithm: DigestAlgorithm) -> Option<String> {
        match algorithm {
            DigestAlgorithm::CRC32 => Some(hex::encode(self.crc32)),
            DigestAlgorithm::MD5 => self.md5.map(hex::encode),
            DigestAlgorithm::SHA1 => self.sha1.map(hex::encode),
        }
    }
}

impl Display for DigestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.crc32_value())?;
        if let Some(md5) = self.md5 {
            write!(f, " {}", hex::encode(md5))?;
        }
        if let Some(sha1) = self.sha1 {
            write!(f, " {}", hex::encode(sha1))?;
        }
        Ok(())
    }
}

/// Computes digests of a stream in one sequential pass with overlapped reads.
///
/// Each iteration hashes the current chunk with one worker per active
/// algorithm while another worker reads the following chunk into the
/// second buffer. All workers are joined before the buffers rotate, so at
/// most two chunks exist at any time.
#[derive(Debug, Clone)]
pub struct DigestEngine {
    chunk_size: usize,
    pool: Option<Arc<BufferPool>>,
}

impl DigestEngine {
    pub fn new(chunk_size: usize) -> Result<Self, DigestError> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(DigestError::InvalidChunkSize(chunk_size));
        }

        Ok(Self {
            chunk_size,
            pool: None,
        })
    }

    pub fn from_config(config: &DigestConfig) -> Result<Self, DigestError> {
        Self::new(config.chunk_size_bytes)
    }

    /// Reuses buffers from `pool` instead of allocating them for every run.
    pub fn with_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Buffer capacity for a stream of `length` bytes, never larger than the stream itself.
    pub fn buffer_capacity(&self, length: u64) -> usize {
        usize::try_from(length)
            .map_or(self.chunk_size, |length| length.min(self.chunk_size))
            .max(1)
    }

    /// Opens `path` through `opener` and digests it.
    ///
    /// Open failures are returned before any buffer is allocated.
    pub fn digest_file<O: StreamOpener>(
        &self,
        opener: &O,
        path: &Path,
        deep: bool,
    ) -> Result<DigestResult, DigestError> {
        let opened = opener.open_read(path)?;
        self.digest(DigestRequest {
            source: opened.stream,
            length: opened.length,
            deep,
        })
    }

    /// Digests the request's stream, consuming and closing it.
    pub fn digest<R: Read + Send>(
        &self,
        request: DigestRequest<R>,
    ) -> Result<DigestResult, DigestError> {
        let transforms = TransformSet::for_request(request.deep);
        self.run(request.source, request.length, transforms)
    }

    fn run<R: Read + Send>(
        &self,
        source: R,
        length: u64,
        transforms: TransformSet,
    ) -> Result<DigestResult, DigestError> {
        debug!(
            "digesting {} bytes in {} byte chunks with {:?}",
            length,
            self.chunk_size,
            transforms.algorithms()
        );

        let capacity = self.buffer_capacity(length);
        let mut buffers = match &self.pool {
            Some(pool) => pool.checkout(capacity),
            None => DoubleBuffer::new(capacity),
        };

        debug_assert_eq!(buffers.capacity(), capacity);

        let mut reader = ChunkedReader::new(source, length);
        let result = pump(&mut reader, transforms, &mut buffers);
        let (chunks, remaining) = (reader.chunks(), reader.remaining());
        drop(reader.into_inner());

        if let Some(pool) = &self.pool {
            pool.restore(buffers);
            trace!("{} buffers idle in pool", pool.idle());
        }

        match &result {
            Ok(digests) => debug!("digested {} chunks: {}", chunks, digests),
            Err(e) => warn!(
                "digest aborted after {} chunks with {} bytes remaining: {}",
                chunks, remaining, e
            ),
        }

        result
    }
}

/// Primes the hashing buffer with a synchronous read of the first chunk, drives
/// the read/hash loop and finalizes the transforms once the stream is exhausted.
fn pump<R: Read + Send>(
    reader: &mut ChunkedReader<R>,
    mut transforms: TransformSet,
    buffers: &mut DoubleBuffer,
) -> Result<DigestResult, DigestError> {
    // prime
    reader.read_chunk(buffers.hashing_mut())?;

    while !buffers.hashing().is_empty() {
        let (hashing, reading) = buffers.split();
        trace!("hashing {} bytes", hashing.len());
        hash_and_prefetch(hashing.valid(), &mut transforms, reader, reading)?;
        buffers.rotate();
    }

    transforms.finalize()
}

/// Fans out one update per transform plus the read of the next chunk, then joins them all.
fn hash_and_prefetch<R: Read + Send>(
    chunk: &[u8],
    transforms: &mut TransformSet,
    reader: &mut ChunkedReader<R>,
    staging: &mut ChunkBuffer,
) -> Result<(), DigestError> {
    thread::scope(|scope| {
        let hashers: Vec<_> = transforms
            .iter_mut()
            .map(|transform| {
                let algorithm = transform.algorithm();
                (algorithm, scope.spawn(move || transform.update(chunk)))
            })
            .collect();
        let prefetch = scope.spawn(move || reader.read_chunk(staging));

        let mut failure = None;
        for (algorithm, hasher) in hashers {
            if hasher.join().is_err() {
                failure.get_or_insert(DigestError::WorkerPanicked(algorithm.to_string()));
            }
        }

        let read = prefetch
            .join()
            .unwrap_or_else(|_| Err(DigestError::WorkerPanicked("reader".to_string())));

        match failure {
            Some(e) => Err(e),
            None => read.map(|_| ()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::STATUS_IO_FAILURE;
    use fake::{Fake, Faker};
    use proptest::prelude::*;
    use sha1::Digest as _;
    use std::io::{self, Cursor, Write};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::NamedTempFile;

    const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";
    const EMPTY_SHA1: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

    fn digest_bytes(
        data: &[u8],
        chunk_size: usize,
        deep: bool,
    ) -> Result<DigestResult, DigestError> {
        DigestEngine::new(chunk_size).unwrap().digest(DigestRequest {
            source: Cursor::new(data.to_vec()),
            length: data.len() as u64,
            deep,
        })
    }

    /// Bitwise CRC-32/ISO-HDLC used as an independent reference.
    fn reference_crc32(data: &[u8]) -> u32 {
        let mut crc = 0xFFFF_FFFFu32;
        for byte in data {
            crc ^= u32::from(*byte);
            for _ in 0..8 {
                let mask = (crc & 1).wrapping_neg();
                crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
            }
        }
        !crc
    }

    /// Serves `data` but fails every read at or past `fail_at`.
    struct FailingReader {
        inner: Cursor<Vec<u8>>,
        fail_at: u64,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let position = self.inner.position();
            if position >= self.fail_at {
                return Err(io::Error::new(io::ErrorKind::Other, "injected failure"));
            }

            let allowed = (self.fail_at - position).min(buf.len() as u64) as usize;
            self.inner.read(&mut buf[..allowed])
        }
    }

    /// Flags `closed` when the engine drops the stream.
    struct TrackedReader<R> {
        inner: R,
        closed: Arc<AtomicBool>,
    }

    impl<R: Read> Read for TrackedReader<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl<R> Drop for TrackedReader<R> {
        fn drop(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct PanickingTransform;

    impl HashTransform for PanickingTransform {
        fn algorithm(&self) -> DigestAlgorithm {
            DigestAlgorithm::MD5
        }

        fn update(&mut self, _chunk: &[u8]) {
            panic!("corrupted accumulator");
        }

        fn finalize(self: Box<Self>) -> Vec<u8> {
            Vec::new()
        }
    }

    #[test]
    fn check_value_matches_crc32_iso_hdlc() {
        let result = digest_bytes(b"123456789", 4, false).unwrap();
        assert_eq!(result.crc32_value(), 0xCBF4_3926);
        assert_eq!(result.hex(DigestAlgorithm::CRC32).unwrap(), "cbf43926");
    }

    #[test]
    fn empty_input_produces_empty_digests() {
        let result = digest_bytes(b"", 16, true).unwrap();

        assert_eq!(result.crc32_value(), 0);
        assert_eq!(hex::encode(result.md5.unwrap()), EMPTY_MD5);
        assert_eq!(hex::encode(result.sha1.unwrap()), EMPTY_SHA1);
    }

    #[test]
    fn shallow_run_leaves_deep_digests_absent() {
        let result = digest_bytes(b"123456789", 3, false).unwrap();

        assert!(result.md5.is_none());
        assert!(result.sha1.is_none());
        assert_eq!(result.to_string(), "cbf43926");
    }

    #[test]
    fn deep_run_populates_every_digest() {
        let result = digest_bytes(b"123456789", 2, true).unwrap();

        assert_eq!(
            result.hex(DigestAlgorithm::MD5).unwrap(),
            "25f9e794323b453885f5181f1b624d0b"
        );
        assert_eq!(
            result.hex(DigestAlgorithm::SHA1).unwrap(),
            "f7c3bc1d808e04732adf679965ccc34ca7ae3441"
        );
    }

    #[test]
    fn chunk_larger_than_input_is_a_single_iteration() {
        let small = digest_bytes(b"123456789", 1, true).unwrap();
        let large = digest_bytes(b"123456789", DEFAULT_CHUNK_SIZE, true).unwrap();
        assert_eq!(small, large);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let data: Vec<u8> = Faker.fake();
        let first = digest_bytes(&data, 7, true).unwrap();

        for _ in 0..3 {
            assert_eq!(digest_bytes(&data, 7, true).unwrap(), first);
        }
    }

    #[test]
    fn read_failure_at_every_chunk_aborts() {
        let data: Vec<u8> = (0..100u8).collect();
        let chunk_size = 16;
        let chunks = data.len().div_ceil(chunk_size);

        for chunk in 0..chunks {
            let engine = DigestEngine::new(chunk_size).unwrap();
            let result = engine.digest(DigestRequest {
                source: FailingReader {
                    inner: Cursor::new(data.clone()),
                    fail_at: (chunk * chunk_size) as u64,
                },
                length: data.len() as u64,
                deep: true,
            });

            let error = result.expect_err("injected failure must abort the digest");
            assert!(matches!(error, DigestError::ReadFailure(_)), "chunk {}", chunk);
            assert_eq!(error.status_code(), STATUS_IO_FAILURE);
        }
    }

    #[test]
    fn truncated_stream_aborts() {
        let engine = DigestEngine::new(8).unwrap();
        let result = engine.digest(DigestRequest {
            source: Cursor::new(vec![0u8; 20]),
            length: 40,
            deep: false,
        });

        assert!(matches!(result, Err(DigestError::ReadFailure(_))));
    }

    #[test]
    fn panicking_worker_aborts() {
        let engine = DigestEngine::new(4).unwrap();
        let transforms = TransformSet::from_transforms(vec![
            DigestAlgorithm::CRC32.transform(),
            Box::new(PanickingTransform),
        ]);

        let result = engine.run(Cursor::new(b"123456789".to_vec()), 9, transforms);
        match result {
            Err(DigestError::WorkerPanicked(worker)) => assert_eq!(worker, "md5"),
            other => panic!("expected WorkerPanicked, got {:?}", other),
        }
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(matches!(
            DigestEngine::new(0),
            Err(DigestError::InvalidChunkSize(0))
        ));
    }

    #[test]
    fn oversized_chunk_size_is_rejected() {
        assert!(matches!(
            DigestEngine::new(MAX_CHUNK_SIZE + 1),
            Err(DigestError::InvalidChunkSize(_))
        ));
        assert!(matches!(
            DigestEngine::new(usize::MAX),
            Err(DigestError::InvalidChunkSize(usize::MAX))
        ));
    }

    #[test]
    fn buffers_never_exceed_stream_length() {
        let engine = DigestEngine::new(MAX_CHUNK_SIZE).unwrap();

        assert_eq!(engine.buffer_capacity(9), 9);
        assert_eq!(engine.buffer_capacity(0), 1);
        assert_eq!(engine.buffer_capacity(u64::MAX), MAX_CHUNK_SIZE);
        assert_eq!(DigestEngine::new(4).unwrap().buffer_capacity(9), 4);
    }

    #[test]
    fn largest_chunk_size_digests_small_stream() {
        let result = digest_bytes(b"123456789", MAX_CHUNK_SIZE, false).unwrap();
        assert_eq!(result.crc32_value(), 0xCBF4_3926);
    }

    #[test]
    fn stream_is_closed_after_success() {
        let closed = Arc::new(AtomicBool::new(false));
        let result = DigestEngine::new(4).unwrap().digest(DigestRequest {
            source: TrackedReader {
                inner: Cursor::new(b"123456789".to_vec()),
                closed: closed.clone(),
            },
            length: 9,
            deep: true,
        });

        assert!(result.is_ok());
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn stream_is_closed_after_read_failure() {
        let closed = Arc::new(AtomicBool::new(false));
        let result = DigestEngine::new(4).unwrap().digest(DigestRequest {
            source: TrackedReader {
                inner: FailingReader {
                    inner: Cursor::new(b"123456789".to_vec()),
                    fail_at: 4,
                },
                closed: closed.clone(),
            },
            length: 9,
            deep: true,
        });

        assert!(matches!(result, Err(DigestError::ReadFailure(_))));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn pooled_runs_return_buffers() {
        let pool = Arc::new(BufferPool::new(4));
        let engine = DigestEngine::new(5).unwrap().with_pool(pool.clone());

        let data = b"pooled buffers are reused";
        for _ in 0..3 {
            let result = engine
                .digest(DigestRequest {
                    source: Cursor::new(data.to_vec()),
                    length: data.len() as u64,
                    deep: false,
                })
                .unwrap();
            assert_eq!(result.crc32_value(), crc32fast::hash(data));
            assert_eq!(pool.idle(), 2);
        }

        let failed = engine.digest(DigestRequest {
            source: Cursor::new(Vec::new()),
            length: 10,
            deep: false,
        });
        assert!(failed.is_err());
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn digest_file_reads_from_disk() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"123456789").unwrap();
        temp_file.flush().unwrap();

        let result = DigestEngine::new(2)
            .unwrap()
            .digest_file(&source::FileOpener, temp_file.path(), false)
            .unwrap();
        assert_eq!(result.crc32_value(), 0xCBF4_3926);
    }

    #[test]
    fn digest_file_propagates_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let result = DigestEngine::new(2).unwrap().digest_file(
            &source::FileOpener,
            &dir.path().join("missing"),
            true,
        );

        assert!(matches!(result, Err(DigestError::NotFound(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn chunking_does_not_change_digests(
            data in proptest::collection::vec(any::<u8>(), 0..512),
            first in 1usize..64,
            second in 64usize..1024,
        ) {
            let a = digest_bytes(&data, first, true).unwrap();
            let b = digest_bytes(&data, second, true).unwrap();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn matches_reference_implementations(
            data in proptest::collection::vec(any::<u8>(), 0..2048),
            chunk_size in 1usize..300,
        ) {
            let result = digest_bytes(&data, chunk_size, true).unwrap();

            prop_assert_eq!(result.crc32_value(), reference_crc32(&data));
            prop_assert_eq!(result.md5.unwrap(), ::md5::compute(&data).0);
            prop_assert_eq!(result.sha1.unwrap().to_vec(), sha1::Sha1::digest(&data).to_vec());
        }
    }
}
