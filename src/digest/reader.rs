use std::io::Read;

use log::trace;

use super::pipeline::ChunkBuffer;
use crate::error::DigestError;

/// Pulls consecutive chunks of a stream of known length into chunk buffers.
///
/// Every chunk is `min(remaining, capacity)` bytes, so only the final chunk
/// can be short. A stream that ends before its declared length is a read
/// failure; nothing is retried.
pub struct ChunkedReader<R> {
    stream: R,
    remaining: u64,
    chunks: u64,
}

impl<R: Read> ChunkedReader<R> {
    pub fn new(stream: R, length: u64) -> Self {
        Self {
            stream,
            remaining: length,
            chunks: 0,
        }
    }

    /// Bytes not yet handed out as chunks.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Number of non-empty chunks read so far.
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    /// Size of the next chunk for a buffer of the given capacity.
    pub fn next_chunk_size(&self, capacity: usize) -> usize {
        usize::try_from(self.remaining).map_or(capacity, |remaining| remaining.min(capacity))
    }

    /// Fills `buffer` with the next chunk, returning its length. Zero means the stream is exhausted.
    pub fn read_chunk(&mut self, buffer: &mut ChunkBuffer) -> Result<usize, DigestError> {
        let size = self.next_chunk_size(buffer.capacity());
        buffer
            .fill_from(&mut self.stream, size)
            .map_err(DigestError::ReadFailure)?;

        if size > 0 {
            self.remaining -= size as u64;
            self.chunks += 1;
            trace!("read chunk {} ({} bytes)", self.chunks, size);
        }

        Ok(size)
    }

    pub fn into_inner(self) -> R {
        self.stream
    }
}
