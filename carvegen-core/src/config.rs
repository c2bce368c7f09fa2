use crate::error::{CarveError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// The run configuration handed to the CLI entrypoint.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub paths: Paths,
    pub components: Components,
}

#[derive(Debug, Deserialize)]
pub struct Paths {
    /// Root directory to harvest.
    pub source: PathBuf,
    /// The structured definitions document (tags, stage chains, sampler).
    pub json_file: PathBuf,
    /// Suggested chunk persistence path; the session cache may override it.
    pub stored_contents: PathBuf,
    /// Parent directory under which `Disk Image/` is created.
    pub destination: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct Components {
    pub harvester: String,
    pub sampler: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvesterKind {
    FileHarvester,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerKind {
    DiskImageSampler,
}

impl Components {
    pub fn harvester_kind(&self) -> Result<HarvesterKind> {
        match self.harvester.as_str() {
            "FileHarvester" => Ok(HarvesterKind::FileHarvester),
            other => Err(CarveError::Config(format!(
                "unknown harvester kind `{other}`"
            ))),
        }
    }

    pub fn sampler_kind(&self) -> Result<SamplerKind> {
        match self.sampler.as_str() {
            "DiskImageSampler" => Ok(SamplerKind::DiskImageSampler),
            other => Err(CarveError::Config(format!("unknown sampler kind `{other}`"))),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| CarveError::Config(format!("{}: {e}", path.display())))
    }
}

/// The definitions document: accepted type tags, one stage chain per tag,
/// and the sampler parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct Definitions {
    pub harvester: Vec<String>,
    pub pipelines: Vec<PipelineDef>,
    pub sampler: SamplerDef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineDef {
    pub stages: Vec<StageDef>,
}

/// One `{ "Name": [params] }` stage descriptor.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct StageDef(BTreeMap<String, Vec<Value>>);

impl StageDef {
    /// The single `(name, params)` pair of this descriptor.
    pub fn entry(&self) -> Result<(&str, &[Value])> {
        let mut pairs = self.0.iter();
        let (name, params) = pairs.next().ok_or_else(|| {
            CarveError::Config("empty stage descriptor".to_string())
        })?;
        if pairs.next().is_some() {
            return Err(CarveError::Config(
                "stage descriptor must name exactly one stage".to_string(),
            ));
        }
        Ok((name.as_str(), params.as_slice()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplerDef {
    /// Image size in megabytes; single-element list.
    pub size: Vec<u64>,
    /// Whether chunks of one file stay contiguous; single-element list.
    pub merge: Vec<bool>,
}

impl SamplerDef {
    pub fn size_mb(&self) -> Result<u64> {
        self.size.first().copied().ok_or_else(|| {
            CarveError::Config("sampler.size must hold one value".to_string())
        })
    }

    pub fn merge_chunks(&self) -> Result<bool> {
        self.merge.first().copied().ok_or_else(|| {
            CarveError::Config("sampler.merge must hold one value".to_string())
        })
    }
}

impl Definitions {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let defs: Definitions = serde_json::from_str(&raw)
            .map_err(|e| CarveError::Config(format!("{}: {e}", path.display())))?;
        defs.validate()?;
        Ok(defs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.harvester.len() != self.pipelines.len() {
            return Err(CarveError::Config(format!(
                "{} file types but {} pipelines",
                self.harvester.len(),
                self.pipelines.len()
            )));
        }
        Ok(())
    }
}
