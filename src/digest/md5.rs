use super::{transform::HashTransform, DigestAlgorithm};

/// MD5 accumulator.
pub struct Md5Transform {
    hasher: md5::Context,
}

impl Default for Md5Transform {
    fn default() -> Self {
        Self {
            hasher: md5::Context::new(),
        }
    }
}

impl HashTransform for Md5Transform {
    fn algorithm(&self) -> DigestAlgorithm {
        DigestAlgorithm::MD5
    }

    fn update(&mut self, chunk: &[u8]) {
        self.hasher.consume(chunk);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.hasher.compute().0.to_vec()
    }
}
