//! yuna-repack
//!
//! Rewrites a Yuna DB file in place to the minimum size its data needs.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};
use yuna::Config;

/// Yuna repack
#[derive(Parser, Debug)]
#[command(name = "yuna-repack")]
#[command(about = "Shrink a Yuna DB file to the minimum size needed for its contents")]
#[command(version)]
struct Args {
    /// Yuna DB file to repack in place
    filename: PathBuf,

    /// The file is an LMDB directory rather than a single file
    #[arg(long)]
    directory: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();

    let config = Config::builder().single_file(!args.directory).build();

    match yuna::repack_file(&args.filename, &config) {
        Ok(report) => {
            tracing::info!(
                "Repacked {}: {} -> {} bytes",
                args.filename.display(),
                report.before,
                report.after
            );
        }
        Err(e) => {
            tracing::error!("Failed to repack {}: {}", args.filename.display(), e);
            eprintln!("yuna-repack: {}: {}", args.filename.display(), e);
            std::process::exit(1);
        }
    }
}
