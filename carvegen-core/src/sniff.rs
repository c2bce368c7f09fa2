use crate::error::Result;
use std::path::Path;

/// Descriptive label for a sniffed type. Harvester tags are matched as
/// prefixes of these labels, so each starts with the conventional short
/// name of the format.
fn label(kind: &infer::Type) -> String {
    match kind.extension() {
        "jpg" => "JPEG image data".to_string(),
        "png" => "PNG image data".to_string(),
        "gif" => "GIF image data".to_string(),
        "bmp" => "BMP image data".to_string(),
        "elf" => "ELF executable".to_string(),
        "exe" => "PE executable".to_string(),
        "pdf" => "PDF document".to_string(),
        "zip" => "Zip archive data".to_string(),
        "gz" => "gzip compressed data".to_string(),
        "tar" => "POSIX tar archive".to_string(),
        other => format!("{} ({})", other.to_uppercase(), kind.mime_type()),
    }
}

/// Classify a file by its magic bytes. Content that matches no known
/// signature classifies as plain "data".
pub fn classify(path: &Path) -> Result<String> {
    match infer::get_from_path(path)? {
        Some(kind) => Ok(label(&kind)),
        None => Ok("data".to_string()),
    }
}
