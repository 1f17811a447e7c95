use std::path::PathBuf;

use colored::Colorize;
use log::debug;
use strum::IntoEnumIterator;

use crate::{
    config::DigestConfig,
    digest::{source::FileOpener, DigestAlgorithm, DigestEngine, DigestResult},
    error::DigestError,
};

/// Digests a file is expected to have. MD5 and SHA1 are optional.
#[derive(Debug, Clone, Default)]
pub struct ExpectedDigests {
    pub crc32: String,
    pub md5: Option<String>,
    pub sha1: Option<String>,
}

impl ExpectedDigests {
    /// Deep mode is needed as soon as a cryptographic digest is expected.
    pub fn requires_deep(&self) -> bool {
        self.md5.is_some() || self.sha1.is_some()
    }

    /// The normalized expected digest for `algorithm`, if one was given.
    pub fn get(&self, algorithm: DigestAlgorithm) -> Option<String> {
        let raw = match algorithm {
            DigestAlgorithm::CRC32 => Some(&self.crc32),
            DigestAlgorithm::MD5 => self.md5.as_ref(),
            DigestAlgorithm::SHA1 => self.sha1.as_ref(),
        }?;

        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        Some(digits.to_lowercase())
    }

    /// Checks every expected digest is well-formed hex of the right length.
    pub fn validate(&self) -> Result<(), VerifyError> {
        for algorithm in DigestAlgorithm::iter() {
            if let Some(expected) = self.get(algorithm) {
                let valid = hex::decode(&expected)
                    .map(|bytes| bytes.len() == algorithm.digest_len())
                    .unwrap_or(false);
                if !valid {
                    return Err(VerifyError::InvalidDigest {
                        algorithm,
                        value: expected,
                    });
                }
            }
        }
        Ok(())
    }

    /// Compares the expected digests against a successful digest run.
    pub fn mismatches(&self, result: &DigestResult) -> Vec<Mismatch> {
        DigestAlgorithm::iter()
            .filter_map(|algorithm| {
                let expected = self.get(algorithm)?;
                let actual = result.hex(algorithm);
                if actual.as_deref() == Some(expected.as_str()) {
                    None
                } else {
                    Some(Mismatch {
                        algorithm,
                        expected,
                        actual,
                    })
                }
            })
            .collect()
    }
}

/// An expected digest that differs from the computed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub algorithm: DigestAlgorithm,
    pub expected: String,
    pub actual: Option<String>,
}

#[derive(Debug)]
/// Options for verifying a single file
pub struct VerifyOptions {
    /// Path to the file to verify
    pub filepath: PathBuf,
    /// Digests the file must match
    pub expected: ExpectedDigests,
    /// Chunk size and deep mode
    pub config: DigestConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("Digest Error: {0}")]
    DigestError(#[from] DigestError),

    #[error("Task Join Error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("Invalid expected {algorithm} digest {value:?}")]
    InvalidDigest {
        algorithm: DigestAlgorithm,
        value: String,
    },

    #[error("{0} digest(s) did not match")]
    Mismatch(usize),
}

/// Digests the file and returns the expected digests that did not match.
///
/// A failed digest is returned as an error and never compared.
pub async fn check(options: &VerifyOptions) -> Result<Vec<Mismatch>, VerifyError> {
    options.expected.validate()?;

    let engine = DigestEngine::from_config(&options.config)?;
    let deep = options.config.deep || options.expected.requires_deep();
    let filepath = options.filepath.clone();

    let result =
        tokio::task::spawn_blocking(move || engine.digest_file(&FileOpener, &filepath, deep))
            .await??;

    Ok(options.expected.mismatches(&result))
}

pub async fn verify(options: VerifyOptions) -> Result<(), VerifyError> {
    debug!("{:?}", options);
    let mismatches = check(&options).await?;
    let name = options.filepath.display();

    if mismatches.is_empty() {
        println!("{}", format!("✓ {}", name).green());
        return Ok(());
    }

    println!("{}", format!("✗ {}", name).red());
    for mismatch in &mismatches {
        println!(
            "  {} expected {} got {}",
            mismatch.algorithm,
            mismatch.expected.green(),
            mismatch.actual.as_deref().unwrap_or("nothing").red()
        );
    }

    Err(VerifyError::Mismatch(mismatches.len()))
}
