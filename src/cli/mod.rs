mod digest;
mod report;
mod verify;

use std::{
    path::{Path, PathBuf},
    thread,
};

use clap::Parser;
use log::debug;
use simplelog::ColorChoice;

use crate::config::DigestConfig;
use report::ReportFormat;
use verify::ExpectedDigests;

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
    /// Enable debug output
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,
    /// Disable color output
    #[arg(long, global = true, default_value_t = false)]
    pub no_color: bool,
}

#[derive(Debug, clap::Subcommand)]
pub enum Commands {
    /// Compute digests of files and directories
    Digest {
        /// Files or directories to digest
        #[arg(required = true, value_parser = clap::value_parser!(PathBuf))]
        paths: Vec<PathBuf>,
        /// Also compute MD5 and SHA1
        #[arg(short, long, default_value_t = false)]
        deep: bool,
        /// Chunk size to use for reading files
        #[arg(short, long)]
        chunk_size: Option<usize>,
        /// Path to a TOML configuration file
        #[arg(long, value_parser = clap::value_parser!(PathBuf))]
        config: Option<PathBuf>,
        /// Format of the printed report
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
        /// Maximum number of files to digest at once
        #[arg(short = 'x', long = "max-workers")]
        max_workers: Option<usize>,
    },

    /// Verify a file against expected digests
    Verify {
        /// Path to the file to verify
        #[arg(value_parser = clap::value_parser!(PathBuf))]
        filepath: PathBuf,
        /// Expected CRC32 as 8 hex digits
        #[arg(long)]
        crc32: String,
        /// Expected MD5, enables deep mode
        #[arg(long)]
        md5: Option<String>,
        /// Expected SHA1, enables deep mode
        #[arg(long)]
        sha1: Option<String>,
        /// Chunk size to use for reading the file
        #[arg(short, long)]
        chunk_size: Option<usize>,
        /// Path to a TOML configuration file
        #[arg(long, value_parser = clap::value_parser!(PathBuf))]
        config: Option<PathBuf>,
    },
}

/// Loads the configuration file, applies command-line overrides and logs the result.
fn effective_config(
    filepath: Option<&Path>,
    chunk_size: Option<usize>,
    deep: bool,
) -> anyhow::Result<DigestConfig> {
    let config = DigestConfig::load(filepath)?.with_overrides(chunk_size, deep);
    debug!("Effective configuration:\n{}", config.to_toml()?);
    Ok(config)
}

pub async fn cli() -> anyhow::Result<()> {
    let args = Cli::parse();

    if args.debug {
        simplelog::CombinedLogger::init(vec![
            simplelog::TermLogger::new(
                simplelog::LevelFilter::Debug,
                simplelog::Config::default(),
                simplelog::TerminalMode::Mixed,
                if args.no_color {
                    ColorChoice::Never
                } else {
                    ColorChoice::Auto
                },
            ),
            simplelog::WriteLogger::new(
                simplelog::LevelFilter::Debug,
                simplelog::Config::default(),
                std::fs::File::create(format!(
                    "{}_deepsum.log",
                    chrono::Local::now().format("%FT%T")
                ))?,
            ),
        ])?;
    }

    if args.no_color {
        colored::control::set_override(false);
    }

    debug!("{:?}", args);
    match args.command {
        Commands::Digest {
            paths,
            deep,
            chunk_size,
            config,
            format,
            max_workers,
        } => {
            digest::digest(digest::DigestOptions {
                paths,
                config: effective_config(config.as_deref(), chunk_size, deep)?,
                format,
                max_workers: match max_workers {
                    Some(max_workers) => max_workers,
                    None => thread::available_parallelism()?.get(),
                },
            })
            .await?;
        }
        Commands::Verify {
            filepath,
            crc32,
            md5,
            sha1,
            chunk_size,
            config,
        } => {
            verify::verify(verify::VerifyOptions {
                filepath,
                expected: ExpectedDigests { crc32, md5, sha1 },
                config: effective_config(config.as_deref(), chunk_size, false)?,
            })
            .await?;
        }
    }

    Ok(())
}
