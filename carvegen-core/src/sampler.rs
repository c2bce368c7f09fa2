use crate::content::{Chunk, ChunksOfFile};
use crate::error::{CarveError, Result};
use crate::stage::HASH_DIR;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

pub const IMAGE_DIR: &str = "Disk Image";
pub const IMAGE_FILE: &str = "disk_image.img";
pub const TRUTH_MAP_FILE: &str = "truth_map.txt";

const TRUTH_MAP_HEADER: &str = "Number,\tSize,\tChunk Offset,\tFile,\tSHA-256 Hash\n\n";

/// The compositor: reloads persisted chunks, scatters them through a
/// noise-filled image of the configured size, and records every placement
/// in the truth map.
pub struct DiskImageSampler {
    size: usize,
    image_dir: PathBuf,
    merge_chunks: bool,
    files: Vec<ChunksOfFile>,
}

impl DiskImageSampler {
    /// Creates `<image_path>/Disk Image/`, seeds the truth map with its
    /// header line, and reloads every chunk under `contents_path`. A
    /// broken chunk store aborts and removes the partial output.
    pub fn new(
        size_mb: u64,
        contents_path: &Path,
        image_path: &Path,
        merge_chunks: bool,
    ) -> Result<Self> {
        let image_dir = image_path.join(IMAGE_DIR);
        fs::create_dir_all(&image_dir)?;
        let mut truth_map = File::create(image_dir.join(TRUTH_MAP_FILE))?;
        truth_map.write_all(TRUTH_MAP_HEADER.as_bytes())?;

        let files = match load_stored_files(contents_path) {
            Ok(files) => files,
            Err(err) => {
                let _ = fs::remove_dir_all(&image_dir);
                return Err(err);
            }
        };

        Ok(Self {
            size: (size_mb * 1_000_000) as usize,
            image_dir,
            merge_chunks,
            files,
        })
    }

    pub fn files(&self) -> &[ChunksOfFile] {
        &self.files
    }

    /// Total bytes claimed by all reloaded chunks.
    pub fn reserved_size(&self) -> usize {
        self.files.iter().map(ChunksOfFile::len).sum()
    }

    /// Build the noise image, place every unit at a random gap, and write
    /// the image file. Refuses (and removes the output directory) when the
    /// stored contents cannot fit.
    pub fn generate_image(&mut self) -> Result<()> {
        let reserved = self.reserved_size();
        if reserved > self.size {
            fs::remove_dir_all(&self.image_dir)?;
            return Err(CarveError::ImageTooSmall {
                required_mb: reserved as f64 / 1e6,
            });
        }

        info!(size = self.size, reserved, "generating disk image");
        let mut rng = rand::rng();
        let mut image = vec![0u8; self.size];
        rng.fill_bytes(&mut image);

        self.distribute(&mut image, &mut rng);

        fs::write(self.image_dir.join(IMAGE_FILE), &image)?;
        info!(path = %self.image_dir.display(), "disk image written");
        Ok(())
    }

    /// Scatter the placement units through the image. With merge off the
    /// units are single chunks; with merge on, whole files whose chunks
    /// then occupy contiguous offsets.
    fn distribute(&mut self, image: &mut [u8], rng: &mut impl Rng) {
        let reserved = self.reserved_size();
        let free = image.len() - reserved;

        if self.merge_chunks {
            self.files.shuffle(rng);
            let mut walk = GapWalk::new(sorted_gaps(rng, self.files.len(), free));
            for file in &mut self.files {
                let content = file.content();
                let start = walk.next_slot(content.len());
                image[start..start + content.len()].copy_from_slice(&content);
                file.set_offsets(start as u64);
            }
        } else {
            let mut chunks: Vec<&mut Chunk> = self
                .files
                .iter_mut()
                .flat_map(|file| file.chunks_mut().iter_mut())
                .collect();
            chunks.shuffle(rng);
            let mut walk = GapWalk::new(sorted_gaps(rng, chunks.len(), free));
            for chunk in chunks {
                let start = walk.next_slot(chunk.len());
                image[start..start + chunk.len()].copy_from_slice(chunk.content());
                chunk.set_offset(start as u64);
            }
        }
    }

    /// Append one record per placed chunk, ascending by offset.
    pub fn fill_truth_map(&self) -> Result<()> {
        let mut placed: Vec<&Chunk> = self
            .files
            .iter()
            .flat_map(|file| file.chunks().iter())
            .collect();
        placed.sort_by_key(|chunk| chunk.offset());

        let mut truth_map = OpenOptions::new()
            .append(true)
            .open(self.image_dir.join(TRUTH_MAP_FILE))?;
        for chunk in placed {
            chunk.write_record(&mut truth_map)?;
        }
        info!(path = %self.image_dir.display(), "truth map written");
        Ok(())
    }
}

/// Sorted samples from a uniform distribution over `[0, free]`, one per
/// placement unit.
fn sorted_gaps(rng: &mut impl Rng, count: usize, free: usize) -> Vec<usize> {
    let mut gaps: Vec<usize> = (0..count).map(|_| rng.random_range(0..=free)).collect();
    gaps.sort_unstable();
    gaps
}

/// Walks the image left to right, advancing by the delta between
/// consecutive sorted gap samples before each unit. Advances are never
/// negative, so placed intervals cannot overlap.
struct GapWalk {
    position: usize,
    last_gap: usize,
    gaps: std::vec::IntoIter<usize>,
}

impl GapWalk {
    fn new(gaps: Vec<usize>) -> Self {
        Self {
            position: 0,
            last_gap: 0,
            gaps: gaps.into_iter(),
        }
    }

    /// Start offset for the next unit of `len` bytes.
    fn next_slot(&mut self, len: usize) -> usize {
        let gap = self.gaps.next().unwrap_or(self.last_gap);
        self.position += gap - self.last_gap;
        let start = self.position;
        self.position += len;
        self.last_gap = gap;
        start
    }
}

/// Rebuild `ChunksOfFile` records from the chunk naming convention: every
/// `<name>_1` entry names a logical file whose chunks are loaded in
/// ascending suffix order until the next suffix is missing.
fn load_stored_files(contents_dir: &Path) -> Result<Vec<ChunksOfFile>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(contents_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(logical) = name.strip_suffix("_1") {
            names.push(logical.to_string());
        }
    }
    names.sort();

    let mut files = Vec::with_capacity(names.len());
    for logical in names {
        files.push(load_chunks(contents_dir, &logical)?);
    }
    Ok(files)
}

fn load_chunks(contents_dir: &Path, logical: &str) -> Result<ChunksOfFile> {
    let manifest_path = contents_dir.join(HASH_DIR).join(format!("{logical}.txt"));
    let manifest = fs::read_to_string(&manifest_path).map_err(|err| {
        CarveError::Format(format!("missing hash manifest for `{logical}`: {err}"))
    })?;
    let digests: Vec<&str> = manifest.lines().collect();

    let mut chunks = Vec::new();
    let mut index = 1;
    loop {
        let chunk_path = contents_dir.join(format!("{logical}_{index}"));
        if !chunk_path.is_file() {
            break;
        }
        let content = fs::read(&chunk_path)?;
        let digest = digests.get(index - 1).ok_or_else(|| {
            CarveError::Format(format!("no digest line {index} for `{logical}`"))
        })?;
        chunks.push(Chunk::new(content, index, logical, *digest));
        index += 1;
    }
    ChunksOfFile::new(logical, chunks)
}
