use std::{
    io::{self, Read},
    sync::Mutex,
};

use log::trace;

/// A fixed-capacity buffer holding one chunk of the stream.
///
/// Only the first `len` bytes are valid; the final chunk of a stream is
/// usually shorter than the capacity.
#[derive(Debug)]
pub struct ChunkBuffer {
    data: Vec<u8>,
    len: usize,
}

impl ChunkBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_vec(Vec::new(), capacity)
    }

    fn from_vec(mut data: Vec<u8>, capacity: usize) -> Self {
        data.resize(capacity, 0);
        Self { data, len: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The bytes of the chunk currently held by the buffer.
    pub fn valid(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Replaces the buffer contents with exactly `size` bytes from `stream`.
    ///
    /// On failure the buffer is left empty.
    pub fn fill_from<R: Read>(&mut self, stream: &mut R, size: usize) -> io::Result<()> {
        debug_assert!(size <= self.capacity());
        self.len = 0;
        stream.read_exact(&mut self.data[..size])?;
        self.len = size;
        Ok(())
    }

    fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

/// The role a buffer slot plays during the current iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRole {
    /// Read by the hash workers.
    Hashing,
    /// Written by the prefetching reader.
    Reading,
}

/// Two same-size chunk buffers whose roles rotate at every barrier.
///
/// [`DoubleBuffer::split`] hands out a shared borrow of the hashing slot and
/// an exclusive borrow of the reading slot, so the borrow checker rules out
/// the reader touching bytes that are still being hashed. Rotation flips the
/// role tags; no bytes are copied.
#[derive(Debug)]
pub struct DoubleBuffer {
    slots: [ChunkBuffer; 2],
    hashing: usize,
}

impl DoubleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: [
                ChunkBuffer::with_capacity(capacity),
                ChunkBuffer::with_capacity(capacity),
            ],
            hashing: 0,
        }
    }

    fn from_vecs(first: Vec<u8>, second: Vec<u8>, capacity: usize) -> Self {
        Self {
            slots: [
                ChunkBuffer::from_vec(first, capacity),
                ChunkBuffer::from_vec(second, capacity),
            ],
            hashing: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots[0].capacity()
    }

    pub fn role(&self, slot: usize) -> BufferRole {
        if slot == self.hashing {
            BufferRole::Hashing
        } else {
            BufferRole::Reading
        }
    }

    /// The buffer currently holding the chunk to hash.
    pub fn hashing(&self) -> &ChunkBuffer {
        &self.slots[self.hashing]
    }

    /// Exclusive access to the hashing slot, used to prime the pipeline.
    pub fn hashing_mut(&mut self) -> &mut ChunkBuffer {
        &mut self.slots[self.hashing]
    }

    /// Borrows both slots for one iteration: the hashing slot shared, the reading slot exclusive.
    pub fn split(&mut self) -> (&ChunkBuffer, &mut ChunkBuffer) {
        let [first, second] = &mut self.slots;
        if self.hashing == 0 {
            (&*first, second)
        } else {
            (&*second, first)
        }
    }

    /// Swaps the roles of the two slots.
    pub fn rotate(&mut self) {
        self.hashing ^= 1;
        trace!("buffer slot 0 is now {:?}", self.role(0));
    }

    fn into_vecs(self) -> [Vec<u8>; 2] {
        let [first, second] = self.slots;
        [first.into_vec(), second.into_vec()]
    }
}

/// A caller-owned pool of chunk buffers shared across digest runs.
///
/// Buffers are checked out as a [`DoubleBuffer`] at the start of a run and
/// handed back when the run ends, so a batch of files reuses the same
/// allocations without any process-wide state.
#[derive(Debug)]
pub struct BufferPool {
    idle: Mutex<Vec<Vec<u8>>>,
    max_idle: usize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(8)
    }
}

impl BufferPool {
    /// Creates a pool retaining at most `max_idle` buffers between runs.
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Number of buffers currently waiting in the pool.
    pub fn idle(&self) -> usize {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Takes two buffers from the pool, allocating any that are missing.
    pub fn checkout(&self, capacity: usize) -> DoubleBuffer {
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        let first = idle.pop().unwrap_or_default();
        let second = idle.pop().unwrap_or_default();
        DoubleBuffer::from_vecs(first, second, capacity)
    }

    /// Returns both buffers of a finished run to the pool.
    pub fn restore(&self, buffers: DoubleBuffer) {
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        for buffer in buffers.into_vecs() {
            if idle.len() < self.max_idle {
                idle.push(buffer);
            }
        }
    }
}
