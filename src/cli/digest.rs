use std::{path::PathBuf, sync::Arc};

use colored::Colorize;
use log::{debug, info};

use super::report::{render, FileReport, ReportFormat};
use crate::{
    config::DigestConfig,
    digest::{pipeline::BufferPool, source::FileOpener, DigestEngine},
    error::DigestError,
};

#[derive(Debug)]
/// Options for digesting files
pub struct DigestOptions {
    /// Files or directories to digest
    pub paths: Vec<PathBuf>,
    /// Chunk size and deep mode
    pub config: DigestConfig,
    /// Format of the printed report
    pub format: ReportFormat,
    /// Maximum number of files digested at the same time
    pub max_workers: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum DigestCommandError {
    #[error("Digest Error: {0}")]
    DigestError(#[from] DigestError),

    #[error("Task Join Error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("Failed to acquire task worker permit, {0}")]
    PermitError(#[from] tokio::sync::AcquireError),

    #[error("Pattern Error: {0}")]
    PatternError(#[from] glob::PatternError),

    #[error("Glob Error: {0}")]
    GlobError(#[from] glob::GlobError),

    #[error("Render Error: {0}")]
    RenderError(#[from] serde_json::Error),

    #[error("max_workers must be greater than 0")]
    NoWorkers,

    #[error("{failed} of {total} files could not be digested")]
    Failures { failed: usize, total: usize },
}

pub type DigestCommandResult<T> = Result<T, DigestCommandError>;

/// Expands directories into the regular files beneath them.
///
/// Other paths are kept as given so that missing files are reported as open failures.
pub fn expand_paths(paths: &[PathBuf]) -> DigestCommandResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }

        let pattern = format!(
            "{}/**/*",
            glob::Pattern::escape(path.to_string_lossy().as_ref())
        );
        for entry in glob::glob(&pattern)? {
            let entry = entry?;
            if entry.is_file() {
                files.push(entry);
            }
        }
    }

    Ok(files)
}

/// Digests every file on the blocking pool, at most `max_workers` at a time.
///
/// Reports are returned in the same order as `files`.
pub async fn digest_files(
    engine: &DigestEngine,
    files: Vec<PathBuf>,
    deep: bool,
    max_workers: usize,
) -> DigestCommandResult<Vec<FileReport>> {
    if max_workers == 0 {
        return Err(DigestCommandError::NoWorkers);
    }

    let worker_semaphore = Arc::new(tokio::sync::Semaphore::new(max_workers));
    let mut tasks = Vec::with_capacity(files.len());

    for filepath in files {
        let permit = worker_semaphore.clone().acquire_owned().await?;
        let engine = engine.clone();

        tasks.push(tokio::task::spawn_blocking(move || {
            let result = engine.digest_file(&FileOpener, &filepath, deep);
            drop(permit);
            FileReport::new(&filepath, &result)
        }));
    }

    let mut reports = Vec::with_capacity(tasks.len());
    for task in tasks {
        reports.push(task.await?);
    }

    Ok(reports)
}

pub async fn digest(options: DigestOptions) -> DigestCommandResult<()> {
    debug!("{:?}", options);
    options.config.validate()?;

    let engine = DigestEngine::from_config(&options.config)?
        .with_pool(Arc::new(BufferPool::new(options.max_workers * 2)));
    let files = expand_paths(&options.paths)?;
    info!(
        "Digesting {} files in {} byte chunks with {} workers (deep: {}, format: {})",
        files.len(),
        engine.chunk_size(),
        options.max_workers,
        options.config.deep,
        options.format
    );

    let reports = digest_files(&engine, files, options.config.deep, options.max_workers).await?;

    if options.format != ReportFormat::Json {
        for report in reports.iter().filter(|report| !report.is_ok()) {
            let symbol = if report.is_open_failure() { "?" } else { "✗" };
            eprintln!("{} {}", symbol.red(), report.to_string().red());
        }
    }
    print!("{}", render(options.format, &reports)?);

    let failed = reports.iter().filter(|report| !report.is_ok()).count();
    if failed > 0 {
        return Err(DigestCommandError::Failures {
            failed,
            total: reports.len(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::{Fake, Faker};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn expand_paths_walks_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("a.bin"), b"a").unwrap();
        fs::write(dir.path().join("nested").join("b.bin"), b"b").unwrap();

        let mut files = expand_paths(&[dir.path().to_path_buf()]).unwrap();
        files.sort();

        assert_eq!(
            files,
            vec![
                dir.path().join("a.bin"),
                dir.path().join("nested").join("b.bin")
            ]
        );
    }

    #[test]
    fn expand_paths_keeps_missing_files() {
        let missing = PathBuf::from("does/not/exist.bin");
        assert_eq!(expand_paths(&[missing.clone()]).unwrap(), vec![missing]);
    }

    #[tokio::test]
    async fn digest_files_preserves_order_and_reports_failures() {
        let dir = tempdir().unwrap();
        let payload: Vec<u8> = Faker.fake();
        let present = dir.path().join("present.bin");
        let missing = dir.path().join("missing.bin");
        fs::write(&present, &payload).unwrap();
        fs::write(dir.path().join("check.txt"), b"123456789").unwrap();

        let engine = DigestEngine::new(64).unwrap();
        let reports = digest_files(
            &engine,
            vec![present.clone(), missing, dir.path().join("check.txt")],
            true,
            2,
        )
        .await
        .unwrap();

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].path, present.to_string_lossy());
        assert_eq!(
            reports[0].crc32,
            Some(hex::encode(crc32fast::hash(&payload).to_be_bytes()))
        );
        assert!(reports[0].md5.is_some());
        assert!(!reports[1].is_ok());
        assert!(reports[1].crc32.is_none());
        assert_eq!(reports[2].crc32.as_deref(), Some("cbf43926"));
    }

    #[tokio::test]
    async fn digest_files_requires_workers() {
        let engine = DigestEngine::new(64).unwrap();
        assert!(matches!(
            digest_files(&engine, Vec::new(), false, 0).await,
            Err(DigestCommandError::NoWorkers)
        ));
    }

    #[tokio::test]
    async fn digest_fails_when_any_file_fails() {
        let dir = tempdir().unwrap();
        let result = digest(DigestOptions {
            paths: vec![dir.path().join("missing.bin")],
            config: DigestConfig::default(),
            format: ReportFormat::Text,
            max_workers: 1,
        })
        .await;

        assert!(matches!(
            result,
            Err(DigestCommandError::Failures {
                failed: 1,
                total: 1
            })
        ));
    }
}
