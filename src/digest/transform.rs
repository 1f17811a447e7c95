use log::debug;
use strum::IntoEnumIterator;

use super::{DigestAlgorithm, DigestResult};
use crate::error::DigestError;

/// An incremental hash accumulator fed one chunk at a time.
///
/// Each transform owns its whole state, so transforms for different
/// algorithms can be updated from different threads over the same chunk.
/// `finalize` consumes the transform, which makes updating after
/// finalization impossible.
pub trait HashTransform: Send {
    /// The algorithm this transform computes.
    fn algorithm(&self) -> DigestAlgorithm;

    /// Accumulates the next chunk of the stream.
    fn update(&mut self, chunk: &[u8]);

    /// Pads and finishes the accumulator, returning the digest bytes.
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

/// The set of transforms active for one digest run.
pub struct TransformSet {
    transforms: Vec<Box<dyn HashTransform>>,
}

impl TransformSet {
    /// Builds the transforms for a run, CRC32 always, MD5 and SHA1 only when `deep` is set.
    pub fn for_request(deep: bool) -> Self {
        let transforms = DigestAlgorithm::iter()
            .filter(|algorithm| deep || !algorithm.is_deep_only())
            .map(DigestAlgorithm::transform)
            .collect();

        Self { transforms }
    }

    #[cfg(test)]
    pub fn from_transforms(transforms: Vec<Box<dyn HashTransform>>) -> Self {
        Self { transforms }
    }

    /// The algorithms in this set, in the order they were created.
    pub fn algorithms(&self) -> Vec<DigestAlgorithm> {
        self.transforms.iter().map(|t| t.algorithm()).collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn HashTransform>> {
        self.transforms.iter_mut()
    }

    /// Finalizes every transform and collects the digests into a result.
    pub fn finalize(self) -> Result<DigestResult, DigestError> {
        let mut result = DigestResult::default();

        for transform in self.transforms {
            let algorithm = transform.algorithm();
            let digest = transform.finalize();
            debug!("{} = {}", algorithm, hex::encode(&digest));

            match algorithm {
                DigestAlgorithm::CRC32 => result.crc32 = fixed(algorithm, &digest)?,
                DigestAlgorithm::MD5 => result.md5 = Some(fixed(algorithm, &digest)?),
                DigestAlgorithm::SHA1 => result.sha1 = Some(fixed(algorithm, &digest)?),
            }
        }

        Ok(result)
    }
}

fn fixed<const N: usize>(
    algorithm: DigestAlgorithm,
    digest: &[u8],
) -> Result<[u8; N], DigestError> {
    digest.try_into().map_err(|_| DigestError::DigestLength {
        algorithm,
        expected: N,
        actual: digest.len(),
    })
}
