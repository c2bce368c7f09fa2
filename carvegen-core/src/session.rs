use crate::content::sha256_hex;
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

const FINGERPRINT_LEN: usize = 10;

/// Where this run's chunk artifacts live, and whether an identical run
/// already produced them.
pub struct Session {
    pub contents_dir: PathBuf,
    pub already_ran: bool,
}

/// Derive the contents directory for a (source tree, definitions) pair.
/// The directory name joins the truncated digest of the sorted source
/// file names with the truncated digest of the definitions document, so
/// identical inputs always resolve to the same directory.
pub fn resolve(source: &Path, definitions_file: &Path) -> Result<Session> {
    let mut names: Vec<String> = WalkDir::new(source)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    let names_digest = sha256_hex(names.concat().as_bytes());
    let defs_digest = sha256_hex(&fs::read(definitions_file)?);

    let dir_name = format!(
        "{}_{}",
        &names_digest[..FINGERPRINT_LEN],
        &defs_digest[..FINGERPRINT_LEN]
    );
    let contents_dir = std::env::current_dir()?.join(dir_name);
    let already_ran = contents_dir.exists();
    if already_ran {
        info!(dir = %contents_dir.display(), "session has already run");
    } else {
        fs::create_dir_all(&contents_dir)?;
    }
    Ok(Session {
        contents_dir,
        already_ran,
    })
}
