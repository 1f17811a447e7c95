use std::{fmt::Display, path::Path};

use serde::Serialize;

use crate::{
    digest::{DigestAlgorithm, DigestResult},
    error::{DigestError, STATUS_OK},
};

/// Output format of the `digest` command.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    strum_macros::Display,
    clap::ValueEnum,
)]
#[strum(serialize_all = "lowercase")]
pub enum ReportFormat {
    /// `<crc32> [<md5> <sha1>] <path>` per file
    #[default]
    Text,
    /// A JSON array with one object per file
    Json,
    /// Simple File Verification, `<path> <CRC32>` per file
    SFV,
}

/// The outcome of digesting one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub path: String,
    pub status: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crc32: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    open_failure: bool,
}

impl FileReport {
    pub fn new(path: &Path, result: &Result<DigestResult, DigestError>) -> Self {
        let path = path.to_string_lossy().to_string();
        match result {
            Ok(digests) => FileReport {
                path,
                status: STATUS_OK,
                crc32: digests.hex(DigestAlgorithm::CRC32),
                md5: digests.hex(DigestAlgorithm::MD5),
                sha1: digests.hex(DigestAlgorithm::SHA1),
                error: None,
                open_failure: false,
            },
            Err(e) => FileReport {
                path,
                status: e.status_code(),
                crc32: None,
                md5: None,
                sha1: None,
                error: Some(e.to_string()),
                open_failure: e.is_open_failure(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Whether the file could not be opened at all.
    pub fn is_open_failure(&self) -> bool {
        self.open_failure
    }
}

impl Display for FileReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(error) = &self.error {
            return write!(f, "{}: {} (status 0x{:02x})", self.path, error, self.status);
        }

        for digest in [&self.crc32, &self.md5, &self.sha1].into_iter().flatten() {
            write!(f, "{} ", digest)?;
        }
        write!(f, "{}", self.path)
    }
}

/// Renders successful reports in the requested format.
///
/// Failed reports only appear in the JSON output, the other formats leave
/// them to be printed separately.
pub fn render(format: ReportFormat, reports: &[FileReport]) -> Result<String, serde_json::Error> {
    let succeeded = reports.iter().filter(|report| report.is_ok());

    let output: String = match format {
        ReportFormat::Text => succeeded.map(|report| format!("{}\n", report)).collect(),
        ReportFormat::Json => serde_json::to_string_pretty(reports)? + "\n",
        ReportFormat::SFV => {
            let mut output = format!(
                "; Generated by {} v{} on {}\n",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                chrono::Local::now().format("%Y-%m-%d at %H:%M:%S")
            );
            for report in succeeded {
                if let Some(crc32) = &report.crc32 {
                    output.push_str(&format!("{} {}\n", report.path, crc32.to_uppercase()));
                }
            }
            output
        }
    };

    Ok(output)
}
