mod cli;
mod config;
mod digest;
mod error;

use colored::Colorize;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match cli::cli().await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}
