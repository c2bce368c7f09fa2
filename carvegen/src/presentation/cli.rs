use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "synthetic disk images with ground truth for file-carving research",
    long_about = None
)]
pub struct Cli {
    /// Path of the run configuration file
    pub config: PathBuf,

    /// Re-run the processing phase even when this session has run before
    #[arg(long)]
    pub force: bool,
}
