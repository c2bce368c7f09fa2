use crate::config::StageDef;
use crate::content::sha256_hex;
use crate::error::{CarveError, Result};
use crate::sniff;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Subdirectory of the contents root holding per-file hash manifests.
pub const HASH_DIR: &str = "SHA-256 hashes";

const DEFAULT_NOISE_EVERY: usize = 100;
const DEFAULT_SPLIT_SIZE: usize = 1000;
const JPEG_HEADER_LEN: usize = 100;

/// Everything a stage may need besides the buffers themselves.
pub struct StageContext<'a> {
    /// Path of the source file being processed.
    pub source: &'a Path,
    /// Directory chunk artifacts and hash manifests are written under.
    pub contents_dir: &'a Path,
}

/// One processing step of a pipeline. Stage chains are assembled from
/// configuration by name, so every variant corresponds to a descriptor
/// kind name (`FileEntry` covers `File`, `FileJPEG` and `FileELF`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageKind {
    /// Entry stage: reads the whole source file into a single buffer. An
    /// expected type tag (e.g. "JPEG") is checked against the classifier.
    FileEntry { expect: Option<String> },
    /// Zero every `every`-th byte of each buffer, starting at `every - 1`.
    Noise { every: usize },
    /// Drop the first 100 bytes of each buffer.
    HeaderJpeg,
    /// Re-partition the concatenated buffer list into `size`-byte blocks.
    Split { size: usize },
    /// Append one digest line per buffer to the hash manifest.
    SaveHashes,
    /// Persist buffer `i` as `<basename>_<i>` under the contents root.
    WriteChunks,
    /// Reserved transport stages; currently inert.
    SendTcp,
    SendUdp,
}

impl StageKind {
    pub fn from_descriptor(name: &str, params: &[Value]) -> Result<Self> {
        match name {
            "File" => no_params(name, params, StageKind::FileEntry { expect: None }),
            "FileJPEG" => no_params(
                name,
                params,
                StageKind::FileEntry {
                    expect: Some("JPEG".to_string()),
                },
            ),
            "FileELF" => no_params(
                name,
                params,
                StageKind::FileEntry {
                    expect: Some("ELF".to_string()),
                },
            ),
            "Noise" => Ok(StageKind::Noise {
                every: usize_param(name, params, DEFAULT_NOISE_EVERY)?,
            }),
            "HeaderJPEG" => no_params(name, params, StageKind::HeaderJpeg),
            "Split" => Ok(StageKind::Split {
                size: usize_param(name, params, DEFAULT_SPLIT_SIZE)?,
            }),
            "SaveHashes" => no_params(name, params, StageKind::SaveHashes),
            "DiskImage" => no_params(name, params, StageKind::WriteChunks),
            "SendTCP" => no_params(name, params, StageKind::SendTcp),
            "SendUDP" => no_params(name, params, StageKind::SendUdp),
            other => Err(CarveError::Config(format!("unknown stage kind `{other}`"))),
        }
    }

    fn is_entry(&self) -> bool {
        matches!(self, StageKind::FileEntry { .. })
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageKind::WriteChunks | StageKind::SendTcp | StageKind::SendUdp
        )
    }

    pub fn apply(&self, buffers: Vec<Vec<u8>>, ctx: &StageContext) -> Result<Vec<Vec<u8>>> {
        match self {
            StageKind::FileEntry { expect } => read_source(ctx, expect.as_deref()),
            StageKind::Noise { every } => Ok(stamp_noise(buffers, *every)),
            StageKind::HeaderJpeg => Ok(strip_header(buffers)),
            StageKind::Split { size } => Ok(split_blocks(buffers, *size)),
            StageKind::SaveHashes => save_hashes(buffers, ctx),
            StageKind::WriteChunks => write_chunks(buffers, ctx),
            StageKind::SendTcp | StageKind::SendUdp => Ok(buffers),
        }
    }
}

fn no_params(name: &str, params: &[Value], kind: StageKind) -> Result<StageKind> {
    if !params.is_empty() {
        return Err(CarveError::Config(format!("`{name}` takes no parameters")));
    }
    Ok(kind)
}

fn usize_param(name: &str, params: &[Value], default: usize) -> Result<usize> {
    let value = match params {
        [] => return Ok(default),
        [value] => value,
        _ => {
            return Err(CarveError::Config(format!(
                "too many parameters for `{name}`"
            )));
        }
    };
    let n = value.as_u64().ok_or_else(|| {
        CarveError::Config(format!("parameter for `{name}` must be an integer"))
    })?;
    if n == 0 {
        return Err(CarveError::Config(format!(
            "parameter for `{name}` must be at least 1"
        )));
    }
    Ok(n as usize)
}

fn read_source(ctx: &StageContext, expect: Option<&str>) -> Result<Vec<Vec<u8>>> {
    let bytes = fs::read(ctx.source)?;
    let classification = sniff::classify(ctx.source)?;
    debug!(
        source = %ctx.source.display(),
        sha256 = %sha256_hex(&bytes),
        %classification,
        "read source file"
    );
    if let Some(tag) = expect {
        if !classification.starts_with(tag) {
            warn!(
                source = %ctx.source.display(),
                expected = tag,
                classified = %classification,
                "type tag mismatch"
            );
        }
    }
    Ok(vec![bytes])
}

fn stamp_noise(mut buffers: Vec<Vec<u8>>, every: usize) -> Vec<Vec<u8>> {
    for buf in &mut buffers {
        for byte in buf.iter_mut().skip(every - 1).step_by(every) {
            *byte = 0;
        }
    }
    buffers
}

fn strip_header(mut buffers: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
    for buf in &mut buffers {
        let cut = buf.len().min(JPEG_HEADER_LEN);
        buf.drain(..cut);
    }
    buffers
}

fn split_blocks(buffers: Vec<Vec<u8>>, size: usize) -> Vec<Vec<u8>> {
    let joined = buffers.concat();
    joined.chunks(size).map(<[u8]>::to_vec).collect()
}

fn basename(path: &Path) -> Result<&str> {
    path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
        CarveError::Format(format!(
            "source path has no usable file name: {}",
            path.display()
        ))
    })
}

fn save_hashes(buffers: Vec<Vec<u8>>, ctx: &StageContext) -> Result<Vec<Vec<u8>>> {
    let dir = ctx.contents_dir.join(HASH_DIR);
    fs::create_dir_all(&dir)?;
    let manifest = dir.join(format!("{}.txt", basename(ctx.source)?));
    let mut file = OpenOptions::new().create(true).append(true).open(manifest)?;
    for buf in &buffers {
        writeln!(file, "{}", sha256_hex(buf))?;
    }
    Ok(buffers)
}

fn write_chunks(buffers: Vec<Vec<u8>>, ctx: &StageContext) -> Result<Vec<Vec<u8>>> {
    let base = basename(ctx.source)?;
    for (i, buf) in buffers.iter().enumerate() {
        fs::write(ctx.contents_dir.join(format!("{base}_{}", i + 1)), buf)?;
    }
    Ok(buffers)
}

/// An ordered stage sequence: one entry stage, then transforms, with any
/// terminal stage last.
#[derive(Clone, Debug)]
pub struct StageChain {
    stages: Vec<StageKind>,
}

impl StageChain {
    pub fn new(stages: Vec<StageKind>) -> Result<Self> {
        let Some(first) = stages.first() else {
            return Err(CarveError::Config("stage chain is empty".to_string()));
        };
        if !first.is_entry() {
            return Err(CarveError::Config(
                "stage chain must begin with a file entry stage".to_string(),
            ));
        }
        if stages.iter().skip(1).any(StageKind::is_entry) {
            return Err(CarveError::Config(
                "stage chain has more than one entry stage".to_string(),
            ));
        }
        if stages.iter().rev().skip(1).any(StageKind::is_terminal) {
            return Err(CarveError::Config(
                "a terminal stage must come last in the chain".to_string(),
            ));
        }
        Ok(Self { stages })
    }

    /// Build a chain from ordered `{ name: [params] }` descriptors.
    pub fn from_descriptors(descriptors: &[StageDef]) -> Result<Self> {
        let mut stages = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let (name, params) = descriptor.entry()?;
            stages.push(StageKind::from_descriptor(name, params)?);
        }
        Self::new(stages)
    }

    pub fn stages(&self) -> &[StageKind] {
        &self.stages
    }

    /// Run every stage in order against `source`, returning the final
    /// buffer list.
    pub fn run(&self, source: &Path, contents_dir: &Path) -> Result<Vec<Vec<u8>>> {
        let ctx = StageContext {
            source,
            contents_dir,
        };
        let mut buffers = vec![Vec::new()];
        for stage in &self.stages {
            buffers = stage.apply(buffers, &ctx)?;
        }
        Ok(buffers)
    }
}
