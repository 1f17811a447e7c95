use sha1::Digest as _;

use super::{transform::HashTransform, DigestAlgorithm};

/// SHA1 accumulator.
#[derive(Default)]
pub struct Sha1Transform {
    hasher: sha1::Sha1,
}

impl HashTransform for Sha1Transform {
    fn algorithm(&self) -> DigestAlgorithm {
        DigestAlgorithm::SHA1
    }

    fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.hasher.finalize().to_vec()
    }
}
