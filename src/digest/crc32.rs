use super::{transform::HashTransform, DigestAlgorithm};

/// CRC-32/ISO-HDLC accumulator, finalized as big-endian bytes.
#[derive(Default)]
pub struct Crc32Transform {
    hasher: crc32fast::Hasher,
}

impl HashTransform for Crc32Transform {
    fn algorithm(&self) -> DigestAlgorithm {
        DigestAlgorithm::CRC32
    }

    fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.hasher.finalize().to_be_bytes().to_vec()
    }
}
